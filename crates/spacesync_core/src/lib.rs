//! # spacesync core
//!
//! The synchronization engine behind spacesync.
//!
//! Clients mutate a shared key-value space optimistically and later
//! reconcile with the server-authoritative store:
//!
//! - **push** replays a batch of client mutations through named mutators
//!   inside one store transaction, skipping mutations that were already
//!   applied and stopping at the first gap, then advances the space
//!   version ("cookie") by exactly one
//! - **pull** diffs the store against a client's last cookie and returns a
//!   put/del patch plus the per-client last-mutation-id deltas of the
//!   requesting client group
//! - the **change notifier** pokes subscribers of a space after each
//!   committed push so they pull again
//!
//! ## Example
//!
//! ```rust
//! use spacesync_core::{ChangeNotifier, MutatorRegistry, SyncEngine, Version, VersionedStore};
//! use spacesync_protocol::{Mutation, PullRequest, PushRequest, SpaceId};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut mutators = MutatorRegistry::new();
//! mutators.register("put", |tx, args| {
//!     let key = args["key"].as_str().unwrap_or_default().to_string();
//!     tx.put(&key, args["value"].clone());
//!     Ok(())
//! });
//!
//! let store = Arc::new(VersionedStore::open_in_memory().unwrap());
//! let engine = SyncEngine::new(store, Arc::new(mutators), Arc::new(ChangeNotifier::new()));
//!
//! let space = SpaceId::from("demo");
//! engine.create_space_with_id(&space, Version::ZERO).unwrap();
//!
//! let push = PushRequest::new(
//!     "group-1",
//!     vec![Mutation::new("client-1", 1, "put", json!({"key": "todo/1", "value": {"text": "a"}}))],
//! );
//! engine.push(&space, &push).unwrap();
//!
//! let pulled = engine.pull(&space, &PullRequest::new("group-1", None)).unwrap();
//! assert_eq!(pulled.cookie, 1);
//! assert_eq!(pulled.patch.len(), 1);
//! ```
//!
//! ## Key Invariants
//!
//! - A space's version never decreases and grows by exactly one per
//!   committed push batch
//! - A client's last mutation id grows by exactly one per applied mutation
//! - Buffered entry writes are never visible outside their transaction
//! - Entries are tombstoned, never removed, so pulls can report deletes

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod dir;
mod dispatcher;
mod engine;
mod error;
pub mod journal;
mod notifier;
mod pull;
mod push;
mod store;
mod types;
mod write_set;

pub use config::StoreConfig;
pub use dispatcher::{DispatchOutcome, MutationTx, MutatorFn, MutatorRegistry};
pub use engine::SyncEngine;
pub use error::{CoreError, CoreResult, MutatorError};
pub use notifier::{ChangeNotifier, Subscription};
pub use pull::PullProcessor;
pub use push::{OutOfOrder, PushOutcome, PushProcessor};
pub use store::{ReadTransaction, VersionedStore, WriteTransaction};
pub use types::{ChangedEntry, ClientRecord, EntryRecord, SpaceSummary, Version};
pub use write_set::{PendingWrite, WriteSet};

pub use spacesync_protocol::{ClientGroupId, ClientId, SpaceId};

/// Crate version, reported by tooling.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
