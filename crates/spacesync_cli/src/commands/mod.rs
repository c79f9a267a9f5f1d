//! CLI command implementations.

pub mod create_space;
pub mod dump_journal;
pub mod inspect;
pub mod verify;
