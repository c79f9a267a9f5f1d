//! The sync engine facade.

use crate::dispatcher::MutatorRegistry;
use crate::error::{CoreError, CoreResult};
use crate::notifier::{ChangeNotifier, Subscription};
use crate::pull::PullProcessor;
use crate::push::{PushOutcome, PushProcessor};
use crate::store::VersionedStore;
use crate::types::{SpaceSummary, Version};
use rand::distributions::Alphanumeric;
use rand::Rng;
use spacesync_protocol::{PullRequest, PullResponse, PushRequest, SpaceId};
use std::sync::Arc;
use tracing::info;

/// Length of generated space ids.
const SPACE_ID_LEN: usize = 6;

/// Attempts at finding an unused random space id.
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Wires the store, the mutator registry and the change notifier together.
///
/// The notifier is injected; an engine only pokes the listeners registered
/// on the notifier it was built with.
///
/// A [`ReadTransaction`](crate::ReadTransaction) taken from
/// [`store`](Self::store) holds the space's state lock until it is dropped,
/// and every push to that space waits for it. Pushing to the same space on
/// the thread that still holds one deadlocks.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    store: Arc<VersionedStore>,
    notifier: Arc<ChangeNotifier>,
    push: PushProcessor,
    pull: PullProcessor,
}

impl SyncEngine {
    /// Creates an engine.
    pub fn new(
        store: Arc<VersionedStore>,
        mutators: Arc<MutatorRegistry>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self {
            push: PushProcessor::new(Arc::clone(&store), mutators, Arc::clone(&notifier)),
            pull: PullProcessor::new(Arc::clone(&store)),
            store,
            notifier,
        }
    }

    /// Applies a mutation batch. See [`PushProcessor::process`].
    pub fn push(&self, space_id: &SpaceId, request: &PushRequest) -> CoreResult<PushOutcome> {
        self.push.process(space_id, request)
    }

    /// Computes a patch. See [`PullProcessor::process`].
    pub fn pull(&self, space_id: &SpaceId, request: &PullRequest) -> CoreResult<PullResponse> {
        self.pull.process(space_id, request)
    }

    /// Creates a space with a random six-character alphanumeric id at
    /// version 0.
    pub fn create_space(&self) -> CoreResult<SpaceId> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let candidate: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(SPACE_ID_LEN)
                .map(char::from)
                .collect();
            let space_id = SpaceId::new(candidate);
            match self.store.create_space(&space_id, Version::ZERO) {
                Ok(()) => {
                    info!(space_id = %space_id, "space created");
                    return Ok(space_id);
                }
                Err(CoreError::SpaceExists { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(CoreError::invalid_operation("could not find an unused space id"))
    }

    /// Creates a space with an explicit id and initial version.
    pub fn create_space_with_id(&self, space_id: &SpaceId, version: Version) -> CoreResult<()> {
        self.store.create_space(space_id, version)?;
        info!(space_id = %space_id, %version, "space created");
        Ok(())
    }

    /// Returns true if the space exists.
    #[must_use]
    pub fn space_exists(&self, space_id: &SpaceId) -> bool {
        self.store.space_exists(space_id)
    }

    /// Returns a summary of every space.
    #[must_use]
    pub fn list_spaces(&self) -> Vec<SpaceSummary> {
        self.store.list_spaces()
    }

    /// Registers a poke listener for `space_id`.
    pub fn subscribe<F>(&self, space_id: &SpaceId, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.add_listener(space_id, listener)
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    /// Returns the change notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }
}
