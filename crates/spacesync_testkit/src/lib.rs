//! # spacesync testkit
//!
//! Test utilities for spacesync.
//!
//! This crate provides:
//! - Engine fixtures backed by memory or a temporary directory
//! - Example mutator registries (a todo list and a generic key-value set)
//! - A client replica model that applies pull patches
//! - Property-based test generators using proptest
//!
//! The cross-crate integration and property tests live in `tests/`.
//!
//! ## Usage
//!
//! ```rust
//! use spacesync_testkit::prelude::*;
//!
//! let engine = TestEngine::memory(kv_mutators());
//! let space = engine.space("demo");
//! engine
//!     .push(&space, &push_request("g", vec![put_mutation("c", 1, "k", serde_json::json!(1))]))
//!     .unwrap();
//!
//! let mut replica = Replica::new("g");
//! replica.pull_from(&engine, &space).unwrap();
//! assert_eq!(replica.cookie, Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
