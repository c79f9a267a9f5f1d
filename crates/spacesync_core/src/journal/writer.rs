//! Journal writer and reader.

use crate::error::{CoreError, CoreResult};
use crate::journal::record::{
    compute_crc32, JournalRecord, RecordType, JOURNAL_MAGIC, JOURNAL_VERSION,
};
use parking_lot::Mutex;
use spacesync_storage::{FileBackend, StorageBackend};
use std::path::Path;
use tracing::{debug, warn};

/// Header size: magic (4) + version (2) + type (1) + length (4).
const HEADER_SIZE: usize = 11;

/// CRC size.
const CRC_SIZE: usize = 4;

/// A decoded record and the offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Byte offset of the record envelope.
    pub offset: u64,
    /// The record.
    pub record: JournalRecord,
}

/// Result of reading the whole journal.
#[derive(Debug, Clone, Default)]
pub struct JournalScan {
    /// Every intact record, in append order.
    pub records: Vec<ScannedRecord>,
    /// Length of the intact prefix.
    pub valid_len: u64,
    /// Total bytes in the backend.
    pub total_len: u64,
}

impl JournalScan {
    /// Bytes after the last intact record.
    #[must_use]
    pub fn torn_bytes(&self) -> u64 {
        self.total_len - self.valid_len
    }
}

/// Append-only journal over a storage backend.
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl Journal {
    /// Creates a journal over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Opens the journal file at `path` for reading only.
    ///
    /// Used by tooling that inspects a store without locking it.
    pub fn open_read_only(path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open_read_only(path)?;
        Ok(Self::new(Box::new(backend), false))
    }

    /// Appends a record and returns its offset.
    ///
    /// If the backend fails partway, the journal is truncated back to its
    /// previous length so no torn record is left behind for the next
    /// append to follow.
    pub fn append(&self, record: &JournalRecord) -> CoreResult<u64> {
        let payload = record.encode_payload()?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        data.push(record.record_type().as_byte());
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("journal record payload too large"))?;
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let before = backend.size()?;

        let written = backend.append(&data).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(rollback) = backend.truncate(before) {
                    warn!(error = %rollback, "failed to roll back partial journal append");
                }
                Err(err.into())
            }
        }
    }

    /// Reads every intact record.
    ///
    /// An envelope that runs past the end of the journal, or a final
    /// envelope that fails its checksum, is a torn tail: scanning stops
    /// there and the bytes are reported by [`JournalScan::torn_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `JournalCorruption` for a bad magic, format version or
    /// record type, for a checksum failure with more data after it, and for
    /// a record that passes its checksum but does not decode.
    pub fn scan(&self) -> CoreResult<JournalScan> {
        let data = {
            let backend = self.backend.lock();
            backend.read_from(0)?
        };

        let total_len = data.len() as u64;
        let mut records = Vec::new();
        let mut pos = 0usize;

        loop {
            match frame_at(&data, pos) {
                Frame::End => break,
                Frame::Corrupt(message) => {
                    return Err(CoreError::journal_corruption(pos as u64, message));
                }
                Frame::Record {
                    record_type,
                    payload,
                    next,
                } => {
                    let record = JournalRecord::decode_payload(record_type, payload).map_err(
                        |e| CoreError::journal_corruption(pos as u64, e.to_string()),
                    )?;
                    records.push(ScannedRecord {
                        offset: pos as u64,
                        record,
                    });
                    pos = next;
                }
            }
        }

        Ok(JournalScan {
            records,
            valid_len: pos as u64,
            total_len,
        })
    }

    /// Scans the journal and truncates a torn tail.
    ///
    /// Corruption ahead of intact records is returned as an error and the
    /// journal is left untouched.
    pub fn recover(&self) -> CoreResult<Vec<ScannedRecord>> {
        let scan = self.scan()?;
        if scan.torn_bytes() > 0 {
            warn!(
                valid_len = scan.valid_len,
                torn_bytes = scan.torn_bytes(),
                "truncating torn journal tail"
            );
            let mut backend = self.backend.lock();
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }
        debug!(records = scan.records.len(), "journal recovered");
        Ok(scan.records)
    }

    /// Returns the current journal size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }
}

/// What lies at one offset of the journal.
enum Frame<'a> {
    /// A complete envelope with a valid checksum.
    Record {
        record_type: RecordType,
        payload: &'a [u8],
        next: usize,
    },
    /// End of the journal, or a torn tail.
    End,
    /// Bytes that no partial append could have produced.
    Corrupt(String),
}

fn frame_at(data: &[u8], pos: usize) -> Frame<'_> {
    let Some(header) = pos
        .checked_add(HEADER_SIZE)
        .and_then(|end| data.get(pos..end))
    else {
        return Frame::End;
    };
    // A zero-filled tail is space the filesystem extended but never wrote.
    if data[pos..].iter().all(|&b| b == 0) {
        return Frame::End;
    }
    if header[0..4] != JOURNAL_MAGIC {
        return Frame::Corrupt("bad journal magic".into());
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != JOURNAL_VERSION {
        return Frame::Corrupt(format!("unsupported journal version {version}"));
    }
    let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

    let payload_start = pos + HEADER_SIZE;
    let Some(end) = payload_start
        .checked_add(len)
        .and_then(|crc_start| crc_start.checked_add(CRC_SIZE))
        .filter(|&end| end <= data.len())
    else {
        return Frame::End;
    };
    let crc_start = end - CRC_SIZE;

    let stored = u32::from_le_bytes([
        data[crc_start],
        data[crc_start + 1],
        data[crc_start + 2],
        data[crc_start + 3],
    ]);
    if compute_crc32(&data[pos..crc_start]) != stored {
        // Only the last envelope can be half-written.
        if end == data.len() {
            return Frame::End;
        }
        return Frame::Corrupt("checksum mismatch".into());
    }

    match RecordType::from_byte(header[6]) {
        Some(record_type) => Frame::Record {
            record_type,
            payload: &data[payload_start..crc_start],
            next: end,
        },
        None => Frame::Corrupt(format!("unknown record type {}", header[6])),
    }
}
