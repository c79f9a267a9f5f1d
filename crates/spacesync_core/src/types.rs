//! Core type definitions.

use serde_json::Value;
use spacesync_protocol::{ClientGroupId, SpaceId};
use std::fmt;
use std::time::SystemTime;

/// A space version, the "cookie" clients use as their sync watermark.
///
/// Versions never decrease and grow by one per committed push batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

impl Version {
    /// The version of a freshly provisioned space.
    pub const ZERO: Version = Version(0);

    /// Creates a version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next version, or `None` once the space has reached
    /// `u64::MAX`.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(version: u64) -> Self {
        Self(version)
    }
}

/// The current row for one key of a space.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    /// Domain payload; `Null` for tombstones.
    pub value: Value,
    /// Logical deletion flag.
    pub deleted: bool,
    /// Space version of the transaction that last wrote the key.
    pub version: Version,
    /// Informational commit time.
    pub last_modified: SystemTime,
}

/// Replay state of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Group the client last pushed with.
    pub client_group_id: ClientGroupId,
    /// Highest applied mutation id.
    pub last_mutation_id: u64,
    /// Space version at which the row was last updated.
    pub version: Version,
    /// Informational commit time.
    pub last_modified: SystemTime,
}

/// One entry reported by a changed-entries scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedEntry {
    /// Entry key.
    pub key: String,
    /// Current value (`Null` for tombstones).
    pub value: Value,
    /// Whether the entry is tombstoned.
    pub deleted: bool,
}

/// Inspection summary of one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceSummary {
    /// Space id.
    pub space_id: SpaceId,
    /// Current cookie.
    pub version: Version,
    /// Entries that are not tombstoned.
    pub live_entries: usize,
    /// Tombstoned entries.
    pub tombstones: usize,
    /// Known clients.
    pub clients: usize,
    /// Time of the last commit or of creation.
    pub last_modified: SystemTime,
}
