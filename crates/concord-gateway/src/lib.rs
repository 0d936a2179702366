//! # concord-gateway
//!
//! The single entry point to a language model for the Concord engine.
//!
//! This crate provides:
//! - [`gateway::ModelGateway`] — the provider-agnostic backend trait
//! - [`gateway::request_object`] — validated structured generation; the only
//!   path through which model output becomes a typed contract object
//! - [`schemas`] — the JSON Schema document for every payload kind
//! - [`scripted::ScriptedGateway`] — a deterministic in-memory backend for
//!   tests and the demo scenarios

pub mod gateway;
pub mod schemas;
pub mod scripted;

pub use gateway::{request_object, ModelGateway, ModelRequest, TokenUsage};
pub use schemas::{validate_payload, PayloadKind};
pub use scripted::ScriptedGateway;
