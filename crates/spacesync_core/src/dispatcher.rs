//! Mutation dispatch.
//!
//! Domain mutators are plain function values registered by name. Each one
//! runs against a [`MutationTx`] view of the push transaction and writes
//! into its own write set, which is merged into the transaction only if the
//! mutator returns `Ok`.

use crate::error::MutatorError;
use crate::store::WriteTransaction;
use crate::write_set::WriteSet;
use serde_json::Value;
use spacesync_protocol::{ClientId, Mutation};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// The transaction capability handed to a mutator.
///
/// Reads see committed state, the writes of earlier mutations in the same
/// batch and this mutation's own writes.
pub trait MutationTx {
    /// Client that sent the mutation.
    fn client_id(&self) -> &ClientId;

    /// Client-local id of the mutation.
    fn mutation_id(&self) -> u64;

    /// Returns the live value under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Returns true if `key` holds a live value.
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns every live `(key, value)` under `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Value)>;

    /// Writes `value` under `key`.
    fn put(&mut self, key: &str, value: Value);

    /// Tombstones `key`. Returns whether it held a live value.
    fn del(&mut self, key: &str) -> bool;
}

/// A registered mutator.
pub type MutatorFn = dyn Fn(&mut dyn MutationTx, &Value) -> Result<(), MutatorError> + Send + Sync;

/// Result of dispatching one mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The mutator ran; its writes joined the transaction.
    Applied {
        /// Number of keys the mutator wrote.
        writes: usize,
    },
    /// No mutator is registered under the mutation's name.
    UnknownMutator,
    /// The mutator returned an error or panicked; its writes were dropped.
    Failed(MutatorError),
}

struct ScopedMutation<'a, 's> {
    tx: &'a WriteTransaction<'s>,
    mutation: &'a Mutation,
    writes: WriteSet,
}

impl MutationTx for ScopedMutation<'_, '_> {
    fn client_id(&self) -> &ClientId {
        &self.mutation.client_id
    }

    fn mutation_id(&self) -> u64 {
        self.mutation.id
    }

    fn get(&self, key: &str) -> Option<Value> {
        match self.writes.get(key) {
            Some(write) => write.visible_value().cloned(),
            None => self.tx.get(key),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        let mut view: BTreeMap<String, Value> = self.tx.scan_prefix(prefix).into_iter().collect();
        self.writes.overlay_prefix(&mut view, prefix);
        view.into_iter().collect()
    }

    fn put(&mut self, key: &str, value: Value) {
        self.writes.put(key, value);
    }

    fn del(&mut self, key: &str) -> bool {
        let existed = self.has(key);
        self.writes.delete(key);
        existed
    }
}

/// Name-to-mutator mapping used by the push processor.
#[derive(Clone, Default)]
pub struct MutatorRegistry {
    mutators: HashMap<String, Arc<MutatorFn>>,
}

impl MutatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mutator` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, mutator: F) -> &mut Self
    where
        F: Fn(&mut dyn MutationTx, &Value) -> Result<(), MutatorError> + Send + Sync + 'static,
    {
        self.mutators.insert(name.into(), Arc::new(mutator));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, mutator: F) -> Self
    where
        F: Fn(&mut dyn MutationTx, &Value) -> Result<(), MutatorError> + Send + Sync + 'static,
    {
        self.register(name, mutator);
        self
    }

    /// Returns true if a mutator is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.mutators.contains_key(name)
    }

    /// Number of registered mutators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    /// Returns true if no mutator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mutators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the mutator named by `mutation` against `tx`.
    ///
    /// Failures are isolated to the mutation: an error or panic drops only
    /// this mutator's writes and never aborts the transaction.
    pub fn dispatch(&self, tx: &mut WriteTransaction<'_>, mutation: &Mutation) -> DispatchOutcome {
        let Some(mutator) = self.mutators.get(&mutation.name) else {
            return DispatchOutcome::UnknownMutator;
        };

        let mut scoped = ScopedMutation {
            tx,
            mutation,
            writes: WriteSet::new(),
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            mutator(&mut scoped, &mutation.args)
        }));
        let writes = scoped.writes;

        match result {
            Ok(Ok(())) => {
                let count = writes.len();
                tx.merge_writes(writes);
                DispatchOutcome::Applied { writes: count }
            }
            Ok(Err(err)) => DispatchOutcome::Failed(err),
            Err(payload) => DispatchOutcome::Failed(MutatorError::new(format!(
                "mutator panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

impl fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutatorRegistry")
            .field("mutators", &self.names())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
