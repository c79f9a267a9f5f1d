//! Read and write transactions over one space.

use super::state::{CommitBatch, PendingClient, SpaceState};
use super::{SpaceCell, VersionedStore};
use crate::error::{CoreError, CoreResult};
use crate::types::{ChangedEntry, Version};
use crate::write_set::WriteSet;
use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockReadGuard};
use parking_lot::{RawMutex, RawRwLock};
use serde_json::Value;
use spacesync_protocol::{ClientGroupId, ClientId, SpaceId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// A consistent snapshot of one space.
///
/// All reads observe the same version. Commits to the space wait until the
/// snapshot is dropped, so keep read transactions short.
pub struct ReadTransaction {
    space_id: SpaceId,
    snapshot: Option<ArcRwLockReadGuard<RawRwLock, SpaceState>>,
}

impl ReadTransaction {
    pub(super) fn new(
        space_id: SpaceId,
        snapshot: Option<ArcRwLockReadGuard<RawRwLock, SpaceState>>,
    ) -> Self {
        Self { space_id, snapshot }
    }

    /// Returns the space this transaction reads.
    #[must_use]
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Returns the space's cookie, or `None` for an unknown space.
    #[must_use]
    pub fn get_cookie(&self) -> Option<Version> {
        self.snapshot.as_ref().map(|state| state.version)
    }

    /// Returns every entry written after `since`, tombstones included, in
    /// key order.
    #[must_use]
    pub fn get_changed_entries(&self, since: Version) -> Vec<ChangedEntry> {
        let Some(state) = &self.snapshot else {
            return Vec::new();
        };
        state
            .entries
            .iter()
            .filter(|(_, entry)| entry.version > since)
            .map(|(key, entry)| ChangedEntry {
                key: key.clone(),
                value: entry.value.clone(),
                deleted: entry.deleted,
            })
            .collect()
    }

    /// Returns the last mutation id of every client in `group` whose row
    /// changed after `since`.
    #[must_use]
    pub fn get_last_mutation_ids_since(
        &self,
        group: &ClientGroupId,
        since: Version,
    ) -> BTreeMap<ClientId, u64> {
        let Some(state) = &self.snapshot else {
            return BTreeMap::new();
        };
        state
            .clients
            .iter()
            .filter(|(_, client)| &client.client_group_id == group && client.version > since)
            .map(|(id, client)| (id.clone(), client.last_mutation_id))
            .collect()
    }

    /// Returns the last mutation id of each client; unknown clients read as 0.
    #[must_use]
    pub fn get_last_mutation_ids(&self, client_ids: &BTreeSet<ClientId>) -> BTreeMap<ClientId, u64> {
        client_ids
            .iter()
            .map(|id| {
                let last = self
                    .snapshot
                    .as_ref()
                    .and_then(|state| state.clients.get(id))
                    .map_or(0, |client| client.last_mutation_id);
                (id.clone(), last)
            })
            .collect()
    }

    /// Returns the live value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.snapshot
            .as_ref()
            .and_then(|state| state.entries.get(key))
            .filter(|entry| !entry.deleted)
            .map(|entry| entry.value.clone())
    }
}

impl fmt::Debug for ReadTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTransaction")
            .field("space_id", &self.space_id)
            .field("cookie", &self.get_cookie())
            .finish()
    }
}

/// The single writer of one space.
///
/// Holds the space's writer lock from `begin_write` until the transaction is
/// committed or dropped, so pushes against the same space serialize. Rows
/// are buffered and become visible only on [`commit`](Self::commit);
/// dropping the transaction discards them.
pub struct WriteTransaction<'s> {
    store: &'s VersionedStore,
    space_id: SpaceId,
    cell: Option<Arc<SpaceCell>>,
    _writer: Option<ArcMutexGuard<RawMutex, ()>>,
    cookie: Option<Version>,
    clients: BTreeMap<ClientId, PendingClient>,
    writes: WriteSet,
    finished: bool,
}

impl<'s> WriteTransaction<'s> {
    pub(super) fn new(
        store: &'s VersionedStore,
        space_id: SpaceId,
        cell: Option<Arc<SpaceCell>>,
        writer: Option<ArcMutexGuard<RawMutex, ()>>,
    ) -> Self {
        Self {
            store,
            space_id,
            cell,
            _writer: writer,
            cookie: None,
            clients: BTreeMap::new(),
            writes: WriteSet::new(),
            finished: false,
        }
    }

    /// Returns the space this transaction writes.
    #[must_use]
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Returns the cookie as seen by this transaction, or `None` for an
    /// unknown space.
    #[must_use]
    pub fn get_cookie(&self) -> Option<Version> {
        let cell = self.cell.as_ref()?;
        Some(self.cookie.unwrap_or_else(|| cell.state.read().version))
    }

    /// Overwrites the cookie. The caller is responsible for monotonicity;
    /// [`commit`](Self::commit) rejects a version that does not advance.
    pub fn set_cookie(&mut self, version: Version) -> CoreResult<()> {
        if self.cell.is_none() {
            return Err(CoreError::space_not_found(&self.space_id));
        }
        self.cookie = Some(version);
        Ok(())
    }

    /// Returns the last mutation id of each client, including rows set
    /// earlier in this transaction; unknown clients read as 0.
    #[must_use]
    pub fn get_last_mutation_ids(&self, client_ids: &BTreeSet<ClientId>) -> BTreeMap<ClientId, u64> {
        let state = self.cell.as_ref().map(|cell| cell.state.read());
        client_ids
            .iter()
            .map(|id| {
                let last = match self.clients.get(id) {
                    Some(pending) => pending.last_mutation_id,
                    None => state
                        .as_ref()
                        .and_then(|s| s.clients.get(id))
                        .map_or(0, |client| client.last_mutation_id),
                };
                (id.clone(), last)
            })
            .collect()
    }

    /// Upserts the rows of every client in `last_mutation_ids` with the given
    /// group and `version = at`.
    pub fn set_last_mutation_ids(
        &mut self,
        group: &ClientGroupId,
        last_mutation_ids: &BTreeMap<ClientId, u64>,
        at: Version,
    ) {
        for (client_id, &last_mutation_id) in last_mutation_ids {
            self.clients.insert(
                client_id.clone(),
                PendingClient {
                    client_group_id: group.clone(),
                    last_mutation_id,
                    version: at,
                },
            );
        }
    }

    /// Returns the live value under `key`, including this transaction's
    /// buffered writes.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(write) = self.writes.get(key) {
            return write.visible_value().cloned();
        }
        let cell = self.cell.as_ref()?;
        let state = cell.state.read();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.deleted)
            .map(|entry| entry.value.clone())
    }

    /// Returns every live `(key, value)` whose key starts with `prefix`, in
    /// key order, including this transaction's buffered writes.
    #[must_use]
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        let mut view = BTreeMap::new();
        if let Some(cell) = &self.cell {
            let state = cell.state.read();
            let range = state
                .entries
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(prefix));
            for (key, entry) in range {
                if !entry.deleted {
                    view.insert(key.clone(), entry.value.clone());
                }
            }
        }
        self.writes.overlay_prefix(&mut view, prefix);
        view.into_iter().collect()
    }

    /// Buffers a put.
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.writes.put(key, value);
    }

    /// Buffers a tombstone.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.delete(key);
    }

    /// Returns the buffered entry writes.
    #[must_use]
    pub fn pending_writes(&self) -> &WriteSet {
        &self.writes
    }

    pub(crate) fn merge_writes(&mut self, writes: WriteSet) {
        self.writes.merge(writes);
    }

    /// Makes the buffered rows durable and visible, stamping every written
    /// entry with the new cookie.
    ///
    /// Returns the space's version after the commit. A transaction that set
    /// nothing commits trivially.
    ///
    /// # Errors
    ///
    /// Returns `SpaceNotFound` for an unknown space, `InvalidOperation` if
    /// rows are pending but the cookie does not advance, and storage errors
    /// from the journal. On error nothing becomes visible.
    pub fn commit(mut self) -> CoreResult<Version> {
        self.finished = true;
        let cell = self
            .cell
            .clone()
            .ok_or_else(|| CoreError::space_not_found(&self.space_id))?;
        let current = cell.state.read().version;

        let version = match self.cookie {
            Some(version) => version,
            None if self.clients.is_empty() && self.writes.is_empty() => return Ok(current),
            None => {
                return Err(CoreError::invalid_operation(
                    "transaction has pending rows but did not set the space version",
                ))
            }
        };
        if version <= current {
            return Err(CoreError::invalid_operation(format!(
                "space version must advance past {current}, got {version}"
            )));
        }

        let batch = CommitBatch {
            version,
            at: SystemTime::now(),
            clients: std::mem::take(&mut self.clients),
            writes: std::mem::take(&mut self.writes),
        };
        self.store.commit_batch(&self.space_id, &cell, batch)?;
        Ok(version)
    }

    /// Discards the buffered rows and releases the writer lock.
    pub fn abort(mut self) {
        self.finished = true;
    }

    fn has_pending(&self) -> bool {
        self.cookie.is_some() || !self.clients.is_empty() || !self.writes.is_empty()
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished && self.has_pending() {
            debug!(
                space_id = %self.space_id,
                writes = self.writes.len(),
                "discarding uncommitted write transaction"
            );
        }
    }
}

impl fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("space_id", &self.space_id)
            .field("cookie", &self.cookie)
            .field("clients", &self.clients.len())
            .field("writes", &self.writes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_space(version: u64) -> (VersionedStore, SpaceId) {
        let store = VersionedStore::open_in_memory().unwrap();
        let space = SpaceId::from("s1");
        store.create_space(&space, Version::new(version)).unwrap();
        (store, space)
    }

    fn ids(list: &[&str]) -> BTreeSet<ClientId> {
        list.iter().map(|s| ClientId::from(*s)).collect()
    }

    #[test]
    fn unknown_space_reads_absent() {
        let store = VersionedStore::open_in_memory().unwrap();
        let space = SpaceId::from("missing");

        let read = store.begin_read(&space);
        assert_eq!(read.get_cookie(), None);
        assert!(read.get_changed_entries(Version::ZERO).is_empty());

        let mut write = store.begin_write(&space).unwrap();
        assert_eq!(write.get_cookie(), None);
        assert!(matches!(
            write.set_cookie(Version::new(1)),
            Err(CoreError::SpaceNotFound { .. })
        ));
    }

    #[test]
    fn buffered_writes_invisible_until_commit() {
        let (store, space) = store_with_space(5);

        let mut tx = store.begin_write(&space).unwrap();
        tx.put("todo/1", json!({"text": "a"}));
        assert_eq!(tx.get("todo/1"), Some(json!({"text": "a"})));
        assert_eq!(store.begin_read(&space).get("todo/1"), None);

        tx.set_cookie(Version::new(6)).unwrap();
        assert_eq!(tx.commit().unwrap(), Version::new(6));

        let read = store.begin_read(&space);
        assert_eq!(read.get_cookie(), Some(Version::new(6)));
        let changed = read.get_changed_entries(Version::new(5));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].key, "todo/1");
        assert!(!changed[0].deleted);
    }

    #[test]
    fn dropped_transaction_leaves_no_trace() {
        let (store, space) = store_with_space(0);
        {
            let mut tx = store.begin_write(&space).unwrap();
            tx.put("k", json!(1));
            tx.set_cookie(Version::new(1)).unwrap();
        }
        let read = store.begin_read(&space);
        assert_eq!(read.get_cookie(), Some(Version::ZERO));
        assert_eq!(read.get("k"), None);
    }

    #[test]
    fn last_mutation_ids_default_to_zero_and_overlay() {
        let (store, space) = store_with_space(0);
        let group = ClientGroupId::from("g1");

        let mut tx = store.begin_write(&space).unwrap();
        let before = tx.get_last_mutation_ids(&ids(&["c1", "c2"]));
        assert_eq!(before.values().copied().collect::<Vec<_>>(), vec![0, 0]);

        let mut updated = BTreeMap::new();
        updated.insert(ClientId::from("c1"), 3);
        tx.set_last_mutation_ids(&group, &updated, Version::new(1));
        assert_eq!(tx.get_last_mutation_ids(&ids(&["c1"]))[&ClientId::from("c1")], 3);
        tx.set_cookie(Version::new(1)).unwrap();
        tx.commit().unwrap();

        let read = store.begin_read(&space);
        assert_eq!(read.get_last_mutation_ids(&ids(&["c1", "c9"]))[&ClientId::from("c9")], 0);
        let since = read.get_last_mutation_ids_since(&group, Version::ZERO);
        assert_eq!(since.len(), 1);
        assert!(read
            .get_last_mutation_ids_since(&group, Version::new(1))
            .is_empty());
        assert!(read
            .get_last_mutation_ids_since(&ClientGroupId::from("other"), Version::ZERO)
            .is_empty());
    }

    #[test]
    fn tombstones_are_reported_as_changes() {
        let (store, space) = store_with_space(0);

        let mut tx = store.begin_write(&space).unwrap();
        tx.put("a", json!(1));
        tx.put("b", json!(2));
        tx.set_cookie(Version::new(1)).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin_write(&space).unwrap();
        tx.delete("a");
        tx.set_cookie(Version::new(2)).unwrap();
        tx.commit().unwrap();

        let read = store.begin_read(&space);
        assert_eq!(read.get("a"), None);
        let changed = read.get_changed_entries(Version::new(1));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].key, "a");
        assert!(changed[0].deleted);

        let all = read.get_changed_entries(Version::ZERO);
        let keys: Vec<_> = all.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn scan_prefix_merges_committed_and_pending() {
        let (store, space) = store_with_space(0);

        let mut tx = store.begin_write(&space).unwrap();
        tx.put("todo/1", json!(1));
        tx.put("todo/2", json!(2));
        tx.put("user/1", json!("u"));
        tx.set_cookie(Version::new(1)).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin_write(&space).unwrap();
        tx.delete("todo/1");
        tx.put("todo/3", json!(3));
        let scanned = tx.scan_prefix("todo/");
        let keys: Vec<_> = scanned.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["todo/2", "todo/3"]);
    }

    #[test]
    fn commit_requires_advancing_version() {
        let (store, space) = store_with_space(4);

        let mut tx = store.begin_write(&space).unwrap();
        tx.put("k", json!(1));
        assert!(matches!(tx.commit(), Err(CoreError::InvalidOperation { .. })));

        let mut tx = store.begin_write(&space).unwrap();
        tx.put("k", json!(1));
        tx.set_cookie(Version::new(4)).unwrap();
        assert!(matches!(tx.commit(), Err(CoreError::InvalidOperation { .. })));

        let tx = store.begin_write(&space).unwrap();
        assert_eq!(tx.commit().unwrap(), Version::new(4));
    }
}
