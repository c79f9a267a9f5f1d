//! Commit journal.
//!
//! Every space creation and every committed push batch is appended as one
//! framed record before it becomes visible in memory. On open the journal
//! is replayed to rebuild all spaces; a torn record at the tail (from a
//! crash mid-append) is truncated away.
//!
//! Record layout:
//!
//! ```text
//! magic "SSJR" (4) | format version u16 (2) | type (1) | length u32 (4) | CBOR payload | crc32 (4)
//! ```

mod record;
mod writer;

pub use record::{
    compute_crc32, ClientRow, CommitRecord, CreateSpaceRecord, EntryRow, JournalRecord,
    RecordType, JOURNAL_MAGIC, JOURNAL_VERSION,
};
pub use writer::{Journal, JournalScan, ScannedRecord};

use std::path::{Path, PathBuf};

/// Returns the journal file inside a store directory.
pub fn journal_path(store_dir: &Path) -> PathBuf {
    crate::dir::StoreDir::journal_path_in(store_dir)
}
