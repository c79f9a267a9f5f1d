//! The versioned store.
//!
//! Each space is held in memory behind its own locks and made durable
//! through the commit journal:
//!
//! - a **writer lock** serializes write transactions on the space, so the
//!   cookie a push reads cannot be superseded before it commits
//! - a **state lock** lets read transactions hold a consistent snapshot
//!   while commits swap in new rows
//!
//! Spaces never share locks; operations on different spaces proceed
//! independently. The space map itself is only write-locked to provision a
//! space.

mod state;
mod transaction;

pub use transaction::{ReadTransaction, WriteTransaction};

pub(crate) use state::CommitBatch;

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{CreateSpaceRecord, Journal, JournalRecord};
use crate::types::{SpaceSummary, Version};
use parking_lot::{Mutex, RwLock};
use spacesync_protocol::SpaceId;
use spacesync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use state::{from_millis, to_millis, SpaceState};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Locks of one space.
pub(crate) struct SpaceCell {
    writer: Arc<Mutex<()>>,
    state: Arc<RwLock<SpaceState>>,
}

impl SpaceCell {
    fn new(state: SpaceState) -> Self {
        Self {
            writer: Arc::new(Mutex::new(())),
            state: Arc::new(RwLock::new(state)),
        }
    }
}

/// Durable mapping from `(space, key)` to versioned entries, plus the
/// per-space cookie and per-client last mutation ids.
///
/// # Thread Safety
///
/// `VersionedStore` is `Send + Sync` and is shared behind an `Arc`.
pub struct VersionedStore {
    config: StoreConfig,
    spaces: RwLock<HashMap<SpaceId, Arc<SpaceCell>>>,
    journal: Journal,
    _dir: Option<StoreDir>,
}

impl VersionedStore {
    /// Opens an ephemeral store.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), StoreConfig::default())
    }

    /// Opens (or creates) a store directory with default configuration.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens a store directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another process has the directory open, and
    /// `JournalCorruption` if the journal cannot be replayed.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path.as_ref(), config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let mut store = Self::open_with_backend(Box::new(backend), config)?;
        store._dir = Some(dir);
        Ok(store)
    }

    /// Opens a store over an arbitrary journal backend, replaying whatever
    /// the backend already holds.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let journal = Journal::new(backend, config.sync_on_commit);
        let records = journal.recover()?;

        let mut spaces: HashMap<SpaceId, Arc<SpaceCell>> = HashMap::new();
        let mut commits = 0usize;
        for scanned in records {
            let offset = scanned.offset;
            match scanned.record {
                JournalRecord::CreateSpace(record) => {
                    if spaces.contains_key(&record.space_id) {
                        return Err(CoreError::journal_corruption(
                            offset,
                            format!("space {} created twice", record.space_id),
                        ));
                    }
                    let state = SpaceState::new(
                        Version::new(record.version),
                        from_millis(record.created_at_ms),
                    );
                    spaces.insert(record.space_id, Arc::new(SpaceCell::new(state)));
                }
                JournalRecord::Commit(record) => {
                    let cell = spaces.get(&record.space_id).ok_or_else(|| {
                        CoreError::journal_corruption(
                            offset,
                            format!("commit to unknown space {}", record.space_id),
                        )
                    })?;
                    let mut state = cell.state.write();
                    if record.version <= state.version.as_u64() {
                        return Err(CoreError::journal_corruption(
                            offset,
                            format!(
                                "space {} version {} does not advance past {}",
                                record.space_id, record.version, state.version
                            ),
                        ));
                    }
                    state.apply(CommitBatch::from_record(record)?);
                    commits += 1;
                }
            }
        }

        info!(spaces = spaces.len(), commits, "versioned store opened");

        Ok(Self {
            config,
            spaces: RwLock::new(spaces),
            journal,
            _dir: None,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Provisions a space at `version`.
    ///
    /// # Errors
    ///
    /// Returns `SpaceExists` if the id is taken.
    pub fn create_space(&self, space_id: &SpaceId, version: Version) -> CoreResult<()> {
        if space_id.is_empty() {
            return Err(CoreError::invalid_operation("space id must not be empty"));
        }

        let mut spaces = self.spaces.write();
        if spaces.contains_key(space_id) {
            return Err(CoreError::SpaceExists {
                space_id: space_id.clone(),
            });
        }

        let now = SystemTime::now();
        self.journal
            .append(&JournalRecord::CreateSpace(CreateSpaceRecord {
                space_id: space_id.clone(),
                version: version.as_u64(),
                created_at_ms: to_millis(now),
            }))?;
        spaces.insert(
            space_id.clone(),
            Arc::new(SpaceCell::new(SpaceState::new(version, now))),
        );

        debug!(space_id = %space_id, %version, "space created");
        Ok(())
    }

    /// Returns true if the space has a cookie.
    #[must_use]
    pub fn space_exists(&self, space_id: &SpaceId) -> bool {
        self.spaces.read().contains_key(space_id)
    }

    /// Returns a summary of every space, ordered by id.
    #[must_use]
    pub fn list_spaces(&self) -> Vec<SpaceSummary> {
        let cells: Vec<(SpaceId, Arc<SpaceCell>)> = self
            .spaces
            .read()
            .iter()
            .map(|(id, cell)| (id.clone(), Arc::clone(cell)))
            .collect();

        let mut summaries: Vec<SpaceSummary> = cells
            .iter()
            .map(|(id, cell)| cell.state.read().summary(id))
            .collect();
        summaries.sort_by(|a, b| a.space_id.cmp(&b.space_id));
        summaries
    }

    /// Starts a read transaction holding a snapshot of the space.
    ///
    /// The snapshot is a read lock on the space state. Commits to the space
    /// block until the transaction is dropped, so a thread must not commit
    /// to a space while it still holds a read transaction on it.
    #[must_use]
    pub fn begin_read(&self, space_id: &SpaceId) -> ReadTransaction {
        let snapshot = self.cell(space_id).map(|cell| cell.state.read_arc());
        ReadTransaction::new(space_id.clone(), snapshot)
    }

    /// Starts the write transaction of a space, waiting for the current one
    /// to finish.
    ///
    /// An unknown space still yields a transaction; its `get_cookie` reads
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns `TransactionConflict` if `lock_timeout` is configured and
    /// expires.
    pub fn begin_write(&self, space_id: &SpaceId) -> CoreResult<WriteTransaction<'_>> {
        let cell = self.cell(space_id);
        let writer = match &cell {
            None => None,
            Some(cell) => {
                let guard = match self.config.lock_timeout {
                    Some(timeout) => cell.writer.try_lock_arc_for(timeout).ok_or_else(|| {
                        CoreError::TransactionConflict {
                            space_id: space_id.clone(),
                        }
                    })?,
                    None => cell.writer.lock_arc(),
                };
                Some(guard)
            }
        };
        Ok(WriteTransaction::new(self, space_id.clone(), cell, writer))
    }

    /// Returns the journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.size()
    }

    fn cell(&self, space_id: &SpaceId) -> Option<Arc<SpaceCell>> {
        self.spaces.read().get(space_id).cloned()
    }

    /// Journals a batch and then applies it. If the append fails the space
    /// is left untouched.
    pub(crate) fn commit_batch(
        &self,
        space_id: &SpaceId,
        cell: &SpaceCell,
        batch: CommitBatch,
    ) -> CoreResult<()> {
        let record = JournalRecord::Commit(batch.to_record(space_id)?);
        self.journal.append(&record)?;
        cell.state.write().apply(batch);
        Ok(())
    }
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("spaces", &self.spaces.read().len())
            .field("config", &self.config)
            .finish()
    }
}
