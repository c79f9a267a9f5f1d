//! # spacesync server
//!
//! Transport-agnostic endpoint layer over the spacesync engine.
//!
//! This crate provides:
//! - JSON push, pull and space provisioning endpoints through
//!   [`SyncServer::handle`], with errors mapped to status codes
//! - push batch limits and request validation
//! - bounded retry with exponential backoff for retryable store failures
//! - [`PokeStream`], an async stream of poke events per space for
//!   server-sent events or websocket transports
//!
//! HTTP routing is left to the embedding application: map each route onto a
//! [`SyncRequest`] and write the returned [`SyncReply`].
//!
//! ```rust
//! use spacesync_core::{ChangeNotifier, MutatorRegistry, SyncEngine, VersionedStore};
//! use spacesync_server::{ServerConfig, SyncRequest, SyncServer};
//! use std::sync::Arc;
//!
//! let engine = SyncEngine::new(
//!     Arc::new(VersionedStore::open_in_memory().unwrap()),
//!     Arc::new(MutatorRegistry::new()),
//!     Arc::new(ChangeNotifier::new()),
//! );
//! let server = SyncServer::new(engine, ServerConfig::default());
//!
//! let reply = server.handle(SyncRequest::Pull {
//!     space_id: "missing".into(),
//!     body: br#"{"clientGroupID": "g1", "cookie": null}"#.to_vec(),
//! });
//! assert_eq!(reply.status, 404);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod poke;
mod server;

pub use config::{RetryConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use poke::PokeStream;
pub use server::{SyncReply, SyncRequest, SyncServer};
