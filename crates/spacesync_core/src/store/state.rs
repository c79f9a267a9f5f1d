//! In-memory state of one space and the batches applied to it.

use crate::error::{CoreError, CoreResult};
use crate::journal::{ClientRow, CommitRecord, EntryRow};
use crate::types::{ClientRecord, EntryRecord, SpaceSummary, Version};
use crate::write_set::{PendingWrite, WriteSet};
use serde_json::Value;
use spacesync_protocol::{ClientGroupId, ClientId, SpaceId};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current rows of one space.
#[derive(Debug, Clone)]
pub(crate) struct SpaceState {
    pub(crate) version: Version,
    pub(crate) last_modified: SystemTime,
    pub(crate) entries: BTreeMap<String, EntryRecord>,
    pub(crate) clients: BTreeMap<ClientId, ClientRecord>,
}

impl SpaceState {
    pub(crate) fn new(version: Version, created_at: SystemTime) -> Self {
        Self {
            version,
            last_modified: created_at,
            entries: BTreeMap::new(),
            clients: BTreeMap::new(),
        }
    }

    /// Applies a committed batch. Used for live commits and journal replay.
    pub(crate) fn apply(&mut self, batch: CommitBatch) {
        for (client_id, row) in batch.clients {
            self.clients.insert(
                client_id,
                ClientRecord {
                    client_group_id: row.client_group_id,
                    last_mutation_id: row.last_mutation_id,
                    version: row.version,
                    last_modified: batch.at,
                },
            );
        }

        for (key, write) in batch.writes {
            let (value, deleted) = match write {
                PendingWrite::Put(value) => (value, false),
                PendingWrite::Delete => (Value::Null, true),
            };
            self.entries.insert(
                key,
                EntryRecord {
                    value,
                    deleted,
                    version: batch.version,
                    last_modified: batch.at,
                },
            );
        }

        self.version = batch.version;
        self.last_modified = batch.at;
    }

    pub(crate) fn summary(&self, space_id: &SpaceId) -> SpaceSummary {
        let tombstones = self.entries.values().filter(|e| e.deleted).count();
        SpaceSummary {
            space_id: space_id.clone(),
            version: self.version,
            live_entries: self.entries.len() - tombstones,
            tombstones,
            clients: self.clients.len(),
            last_modified: self.last_modified,
        }
    }
}

/// A pending client row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingClient {
    pub(crate) client_group_id: ClientGroupId,
    pub(crate) last_mutation_id: u64,
    pub(crate) version: Version,
}

/// Everything one transaction commits.
#[derive(Debug, Clone)]
pub(crate) struct CommitBatch {
    pub(crate) version: Version,
    pub(crate) at: SystemTime,
    pub(crate) clients: BTreeMap<ClientId, PendingClient>,
    pub(crate) writes: WriteSet,
}

impl CommitBatch {
    pub(crate) fn to_record(&self, space_id: &SpaceId) -> CoreResult<CommitRecord> {
        let clients = self
            .clients
            .iter()
            .map(|(client_id, row)| ClientRow {
                client_id: client_id.clone(),
                client_group_id: row.client_group_id.clone(),
                last_mutation_id: row.last_mutation_id,
                version: row.version.as_u64(),
            })
            .collect();

        let entries = self
            .writes
            .iter()
            .map(|(key, write)| -> CoreResult<EntryRow> {
                let value = match write {
                    PendingWrite::Put(value) => Some(
                        serde_json::to_string(value).map_err(|e| CoreError::codec(e.to_string()))?,
                    ),
                    PendingWrite::Delete => None,
                };
                Ok(EntryRow {
                    key: key.clone(),
                    value,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(CommitRecord {
            space_id: space_id.clone(),
            version: self.version.as_u64(),
            committed_at_ms: to_millis(self.at),
            clients,
            entries,
        })
    }

    pub(crate) fn from_record(record: CommitRecord) -> CoreResult<Self> {
        let clients = record
            .clients
            .into_iter()
            .map(|row| {
                (
                    row.client_id,
                    PendingClient {
                        client_group_id: row.client_group_id,
                        last_mutation_id: row.last_mutation_id,
                        version: Version::new(row.version),
                    },
                )
            })
            .collect();

        let mut writes = WriteSet::new();
        for row in record.entries {
            match row.value {
                Some(text) => {
                    let value =
                        serde_json::from_str(&text).map_err(|e| CoreError::codec(e.to_string()))?;
                    writes.put(row.key, value);
                }
                None => writes.delete(row.key),
            }
        }

        Ok(Self {
            version: Version::new(record.version),
            at: from_millis(record.committed_at_ms),
            clients,
            writes,
        })
    }
}

pub(crate) fn to_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub(crate) fn from_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(version: u64) -> CommitBatch {
        let mut writes = WriteSet::new();
        writes.put("todo/1", json!({"text": "a"}));
        writes.delete("todo/2");
        let mut clients = BTreeMap::new();
        clients.insert(
            ClientId::from("c1"),
            PendingClient {
                client_group_id: ClientGroupId::from("g1"),
                last_mutation_id: 4,
                version: Version::new(version),
            },
        );
        CommitBatch {
            version: Version::new(version),
            at: from_millis(1_000),
            clients,
            writes,
        }
    }

    #[test]
    fn apply_stamps_version() {
        let mut state = SpaceState::new(Version::new(5), from_millis(0));
        state.apply(batch(6));

        assert_eq!(state.version, Version::new(6));
        assert_eq!(state.entries["todo/1"].version, Version::new(6));
        assert!(state.entries["todo/2"].deleted);
        assert_eq!(state.entries["todo/2"].value, Value::Null);
        assert_eq!(state.clients[&ClientId::from("c1")].last_mutation_id, 4);

        let summary = state.summary(&SpaceId::from("s"));
        assert_eq!(summary.live_entries, 1);
        assert_eq!(summary.tombstones, 1);
        assert_eq!(summary.clients, 1);
    }

    #[test]
    fn record_conversion_preserves_batch() {
        let original = batch(3);
        let record = original.to_record(&SpaceId::from("s")).unwrap();
        assert_eq!(record.entries[1].value, None);

        let restored = CommitBatch::from_record(record).unwrap();
        assert_eq!(restored.version, original.version);
        assert_eq!(restored.at, original.at);
        assert_eq!(restored.clients, original.clients);
        assert_eq!(restored.writes, original.writes);
    }

    #[test]
    fn millis_conversion() {
        let at = from_millis(1_700_000_000_123);
        assert_eq!(to_millis(at), 1_700_000_000_123);
    }
}
