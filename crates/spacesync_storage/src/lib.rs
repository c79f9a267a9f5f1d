//! # spacesync storage
//!
//! Byte backends underneath the spacesync commit journal.
//!
//! Backends are **opaque append-only byte stores**. They know nothing about
//! spaces, entries or journal records; the core crate owns the record
//! framing and replays it on open.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral stores and tests
//! - [`FileBackend`] - persistent journal file
//! - [`FaultInjectingBackend`] - wraps another backend and fails on demand,
//!   used to exercise commit failure paths
//!
//! ## Example
//!
//! ```rust
//! use spacesync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod fault;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use fault::{FaultControls, FaultInjectingBackend};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
