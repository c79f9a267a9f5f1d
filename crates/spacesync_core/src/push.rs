//! Push processing.

use crate::dispatcher::{DispatchOutcome, MutatorRegistry};
use crate::error::{CoreError, CoreResult};
use crate::notifier::ChangeNotifier;
use crate::store::VersionedStore;
use crate::types::Version;
use spacesync_protocol::{ClientId, PushRequest, SpaceId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The mutation that stopped a batch because its id skipped ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfOrder {
    /// Client whose sequence has a gap.
    pub client_id: ClientId,
    /// The id the server expected next.
    pub expected: u64,
    /// The id the client sent.
    pub actual: u64,
    /// Mutations left unprocessed, the offending one included.
    pub dropped: usize,
}

/// What a committed push did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Cookie after the commit.
    pub version: Version,
    /// Mutations whose mutator ran successfully.
    pub applied: usize,
    /// Mutations skipped as already processed.
    pub skipped: usize,
    /// Mutations with no registered mutator.
    pub unknown: usize,
    /// Mutations whose mutator failed.
    pub failed: usize,
    /// Set when the batch was truncated at a sequence gap.
    pub out_of_order: Option<OutOfOrder>,
}

impl PushOutcome {
    fn new(version: Version) -> Self {
        Self {
            version,
            applied: 0,
            skipped: 0,
            unknown: 0,
            failed: 0,
            out_of_order: None,
        }
    }

    /// Mutations that advanced their client's last mutation id.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.applied + self.unknown + self.failed
    }
}

/// Applies client mutation batches.
///
/// One batch is one write transaction: mutations already processed are
/// skipped, the first sequence gap truncates the rest of the batch, and
/// the space version advances by exactly one on commit. Subscribers of the
/// space are poked after the commit.
#[derive(Debug, Clone)]
pub struct PushProcessor {
    store: Arc<VersionedStore>,
    mutators: Arc<MutatorRegistry>,
    notifier: Arc<ChangeNotifier>,
}

impl PushProcessor {
    /// Creates a push processor.
    pub fn new(
        store: Arc<VersionedStore>,
        mutators: Arc<MutatorRegistry>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self {
            store,
            mutators,
            notifier,
        }
    }

    /// Processes one batch against `space_id`.
    ///
    /// # Errors
    ///
    /// Returns `SpaceNotFound` for an unknown space, `VersionExhausted` for
    /// a space already at `u64::MAX`, and storage errors from the commit.
    /// In every case nothing from the batch is visible.
    pub fn process(&self, space_id: &SpaceId, request: &PushRequest) -> CoreResult<PushOutcome> {
        let start = Instant::now();
        debug!(
            space_id = %space_id,
            client_group_id = %request.client_group_id,
            mutations = request.mutations.len(),
            "processing push"
        );

        let mut tx = self.store.begin_write(space_id)?;
        let prev = tx
            .get_cookie()
            .ok_or_else(|| CoreError::space_not_found(space_id))?;
        let next = prev.next().ok_or_else(|| CoreError::VersionExhausted {
            space_id: space_id.clone(),
        })?;

        let mut last_mutation_ids = tx.get_last_mutation_ids(&request.client_ids());
        let mut outcome = PushOutcome::new(next);

        for (index, mutation) in request.mutations.iter().enumerate() {
            let last = last_mutation_ids
                .get(&mutation.client_id)
                .copied()
                .unwrap_or(0);
            let expected = last + 1;

            if mutation.id < expected {
                debug!(
                    client_id = %mutation.client_id,
                    id = mutation.id,
                    expected,
                    "mutation already processed"
                );
                outcome.skipped += 1;
                continue;
            }

            if mutation.id > expected {
                let dropped = request.mutations.len() - index;
                warn!(
                    client_id = %mutation.client_id,
                    id = mutation.id,
                    expected,
                    dropped,
                    "mutation from the future, truncating batch"
                );
                outcome.out_of_order = Some(OutOfOrder {
                    client_id: mutation.client_id.clone(),
                    expected,
                    actual: mutation.id,
                    dropped,
                });
                break;
            }

            match self.mutators.dispatch(&mut tx, mutation) {
                DispatchOutcome::Applied { writes } => {
                    debug!(name = %mutation.name, id = mutation.id, writes, "mutation applied");
                    outcome.applied += 1;
                }
                DispatchOutcome::UnknownMutator => {
                    warn!(
                        client_id = %mutation.client_id,
                        id = mutation.id,
                        name = %mutation.name,
                        "unknown mutator, skipping"
                    );
                    outcome.unknown += 1;
                }
                DispatchOutcome::Failed(err) => {
                    warn!(
                        client_id = %mutation.client_id,
                        id = mutation.id,
                        name = %mutation.name,
                        error = %err,
                        "mutator failed, discarding its writes"
                    );
                    outcome.failed += 1;
                }
            }
            last_mutation_ids.insert(mutation.client_id.clone(), expected);
        }

        tx.set_last_mutation_ids(&request.client_group_id, &last_mutation_ids, next);
        tx.set_cookie(next)?;
        let version = tx.commit()?;

        info!(
            space_id = %space_id,
            %version,
            applied = outcome.applied,
            skipped = outcome.skipped,
            elapsed_us = start.elapsed().as_micros() as u64,
            "push committed"
        );

        self.notifier.poke(space_id);
        Ok(outcome)
    }
}
