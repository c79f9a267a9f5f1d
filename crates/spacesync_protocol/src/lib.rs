//! # spacesync protocol
//!
//! Wire types exchanged between clients and a spacesync server.
//!
//! This crate provides:
//! - Identifier newtypes (`SpaceId`, `ClientId`, `ClientGroupId`)
//! - `Mutation` and the push request/response pair
//! - The pull request/response pair and `PatchOperation`
//! - `PokeEvent`, the zero-payload "re-pull now" signal
//! - JSON encoding/decoding through [`WireMessage`]
//!
//! Field names follow the established push/pull wire format
//! (`clientGroupID`, `clientID`, `lastMutationIDChanges`); the
//! `...Id` spellings are accepted on input.
//!
//! This is a pure protocol crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod ids;
mod messages;
mod patch;
mod poke;

pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ClientGroupId, ClientId, SpaceId};
pub use messages::{
    CreateSpaceResponse, ErrorBody, Mutation, PullRequest, PullResponse, PushRequest,
    PushResponse, SpaceExistsResponse, WireMessage,
};
pub use patch::{apply_patch, PatchOperation};
pub use poke::PokeEvent;
