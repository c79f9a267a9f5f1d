//! Journal record types and payload encoding.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use spacesync_protocol::{ClientGroupId, ClientId, SpaceId};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"SSJR";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Type tag of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A space was provisioned.
    CreateSpace = 1,
    /// A push batch committed.
    Commit = 2,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateSpace),
            2 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Provisioning of a space at its initial version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSpaceRecord {
    /// New space.
    pub space_id: SpaceId,
    /// Initial cookie.
    pub version: u64,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
}

/// One committed transaction: the new cookie plus every row it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Space the transaction ran against.
    pub space_id: SpaceId,
    /// Cookie after the commit.
    pub version: u64,
    /// Commit time, milliseconds since the Unix epoch.
    pub committed_at_ms: u64,
    /// Client rows written by the transaction.
    pub clients: Vec<ClientRow>,
    /// Entry rows written by the transaction, in key order.
    pub entries: Vec<EntryRow>,
}

/// A client's new last mutation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRow {
    /// Client.
    pub client_id: ClientId,
    /// Group the client pushed with.
    pub client_group_id: ClientGroupId,
    /// New last mutation id.
    pub last_mutation_id: u64,
    /// Space version recorded on the client row.
    pub version: u64,
}

/// An entry write. `value` carries the JSON text of a put; `None` is a
/// tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRow {
    /// Entry key.
    pub key: String,
    /// JSON text of the value, or `None` for a delete.
    pub value: Option<String>,
}

/// A record in the commit journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// A space was provisioned.
    CreateSpace(CreateSpaceRecord),
    /// A push batch committed.
    Commit(CommitRecord),
}

impl JournalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::CreateSpace(_) => RecordType::CreateSpace,
            Self::Commit(_) => RecordType::Commit,
        }
    }

    /// Returns the space the record belongs to.
    #[must_use]
    pub fn space_id(&self) -> &SpaceId {
        match self {
            Self::CreateSpace(r) => &r.space_id,
            Self::Commit(r) => &r.space_id,
        }
    }

    /// Returns the cookie the space holds after this record.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::CreateSpace(r) => r.version,
            Self::Commit(r) => r.version,
        }
    }

    /// Serializes the record payload (without envelope) as CBOR.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        let result = match self {
            Self::CreateSpace(r) => ciborium::ser::into_writer(r, &mut buf),
            Self::Commit(r) => ciborium::ser::into_writer(r, &mut buf),
        };
        result.map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(buf)
    }

    /// Deserializes a record payload of the given type.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> CoreResult<Self> {
        match record_type {
            RecordType::CreateSpace => ciborium::de::from_reader(payload)
                .map(Self::CreateSpace)
                .map_err(|e| CoreError::codec(e.to_string())),
            RecordType::Commit => ciborium::de::from_reader(payload)
                .map(Self::Commit)
                .map_err(|e| CoreError::codec(e.to_string())),
        }
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
