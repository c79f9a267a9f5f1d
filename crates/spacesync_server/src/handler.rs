//! Request handlers for sync endpoints.

use crate::config::{RetryConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use spacesync_core::{CoreResult, SyncEngine, Version};
use spacesync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, SpaceId};
use std::thread;
use tracing::{debug, warn};

/// Typed handlers for push, pull and provisioning.
///
/// Retryable store failures are retried according to the configured
/// [`RetryConfig`]; a failed attempt leaves nothing behind, so retrying the
/// whole operation is safe.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    engine: SyncEngine,
    config: ServerConfig,
}

impl RequestHandler {
    /// Creates a request handler.
    pub fn new(engine: SyncEngine, config: ServerConfig) -> Self {
        Self { engine, config }
    }

    /// Returns the engine requests are handled by.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handles a push request.
    pub fn handle_push(&self, space_id: &SpaceId, request: &PushRequest) -> ServerResult<PushResponse> {
        let size = request.mutations.len();
        if size > self.config.max_push_batch {
            return Err(ServerError::BatchTooLarge {
                size,
                max: self.config.max_push_batch,
            });
        }
        if self.config.validate_requests {
            request.validate()?;
        }

        let outcome = with_retry(&self.config.retry, "push", || {
            self.engine.push(space_id, request)
        })?;
        if let Some(gap) = &outcome.out_of_order {
            debug!(
                space_id = %space_id,
                client_id = %gap.client_id,
                expected = gap.expected,
                "push truncated at sequence gap"
            );
        }
        Ok(PushResponse::default())
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, space_id: &SpaceId, request: &PullRequest) -> ServerResult<PullResponse> {
        if self.config.validate_requests && request.client_group_id.is_empty() {
            return Err(ServerError::InvalidRequest(
                "clientGroupID must not be empty".into(),
            ));
        }
        with_retry(&self.config.retry, "pull", || self.engine.pull(space_id, request))
    }

    /// Provisions a space, with a generated id unless one is given.
    pub fn handle_create_space(&self, space_id: Option<&SpaceId>) -> ServerResult<SpaceId> {
        match space_id {
            Some(id) => {
                self.engine.create_space_with_id(id, Version::ZERO)?;
                Ok(id.clone())
            }
            None => Ok(self.engine.create_space()?),
        }
    }

    /// Returns whether a space exists.
    pub fn handle_space_exists(&self, space_id: &SpaceId) -> bool {
        self.engine.space_exists(space_id)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up.
fn with_retry<T>(
    retry: &RetryConfig,
    operation: &str,
    mut op: impl FnMut() -> CoreResult<T>,
) -> ServerResult<T> {
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                attempt += 1;
                let delay = retry.delay_for_attempt(attempt);
                warn!(operation, attempt, ?delay, error = %err, "retrying after store failure");
                thread::sleep(delay);
            }
            Err(err) => return Err(err.into()),
        }
    }
}
