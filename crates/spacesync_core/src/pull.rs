//! Pull processing.

use crate::error::{CoreError, CoreResult};
use crate::store::VersionedStore;
use crate::types::Version;
use spacesync_protocol::{PatchOperation, PullRequest, PullResponse, SpaceId};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Computes incremental patches for clients.
///
/// All reads of one pull come from a single snapshot, so the patch, the
/// last-mutation-id changes and the returned cookie agree with each other.
/// The snapshot is a read lock on the space: pushes to the space wait until
/// the pull has finished building its response.
#[derive(Debug, Clone)]
pub struct PullProcessor {
    store: Arc<VersionedStore>,
}

impl PullProcessor {
    /// Creates a pull processor.
    pub fn new(store: Arc<VersionedStore>) -> Self {
        Self { store }
    }

    /// Returns what changed in `space_id` since the request's cookie.
    ///
    /// # Errors
    ///
    /// Returns `SpaceNotFound` for an unknown space; pull fails in no other
    /// way.
    pub fn process(&self, space_id: &SpaceId, request: &PullRequest) -> CoreResult<PullResponse> {
        let start = Instant::now();
        let since = Version::new(request.since());

        let (entries, last_mutation_id_changes, cookie) = {
            let read = self.store.begin_read(space_id);
            let entries = read.get_changed_entries(since);
            let changes = read.get_last_mutation_ids_since(&request.client_group_id, since);
            let cookie = read
                .get_cookie()
                .ok_or_else(|| CoreError::space_not_found(space_id))?;
            (entries, changes, cookie)
        };

        let patch: Vec<PatchOperation> = entries
            .into_iter()
            .map(|entry| {
                if entry.deleted {
                    PatchOperation::del(entry.key)
                } else {
                    PatchOperation::put(entry.key, entry.value)
                }
            })
            .collect();

        debug!(
            space_id = %space_id,
            client_group_id = %request.client_group_id,
            %since,
            %cookie,
            ops = patch.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "pull computed"
        );

        Ok(PullResponse {
            cookie: cookie.as_u64(),
            last_mutation_id_changes,
            patch,
        })
    }
}
