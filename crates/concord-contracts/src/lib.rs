//! # concord-contracts
//!
//! Shared types, schemas, and contracts for the Concord simulation engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions, configuration, and error types.

pub mod config;
pub mod error;
pub mod event;
pub mod log;
pub mod meta;
pub mod mutate;
pub mod permissions;
pub mod proposal;
pub mod provision;
pub mod score;
pub mod scout;
pub mod state;
