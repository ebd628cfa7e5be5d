//! CLI command implementations.

pub mod export;
pub mod inspect;
pub mod migrate;
pub mod store;
pub mod sweep;
pub mod verify;
