//! Runtime error types for the Concord simulation engine.
//!
//! All fallible operations across the workspace return `ConcordResult<T>`.
//! Error variants carry enough context for the orchestrator to decide whether
//! a failure is local to one turn, fatal to one episode, or fatal to a
//! creation attempt.

use thiserror::Error;

/// The unified error type for the Concord runtime.
#[derive(Debug, Error)]
pub enum ConcordError {
    /// A model-produced payload did not match its declared schema.
    ///
    /// Recovered locally by the environment's validation retry loop — this is
    /// the ONLY error class that loop catches.
    #[error("structured output rejected: {reason}")]
    SchemaValidation { reason: String },

    /// A state mutation targeted a path the speaker is not authorized to touch.
    ///
    /// Fatal to the episode: the environment raises and the orchestrator
    /// treats the run as corrupted.
    #[error("agent '{speaker_id}' may not mutate '{path}': {reason}")]
    PermissionViolation {
        speaker_id: String,
        path: String,
        reason: String,
    },

    /// An agent exhausted its forced-concession budget; the episode ends
    /// with the `corrupted` termination reason.
    #[error("episode corrupted: agent '{speaker_id}' forfeited {penalties} turns")]
    EpisodeCorrupted { speaker_id: String, penalties: u32 },

    /// Mounting a created agent would exceed the spawn cap.
    #[error("created-agent cap of {limit} reached; cannot mount '{agent_id}'")]
    MaxAgentsExceeded { agent_id: String, limit: u32 },

    /// A provisioned agent spec violates the safety guardrails.
    #[error("unsafe agent design rejected: {reason}")]
    UnsafeAgentDesign { reason: String },

    /// The model backend failed outside of schema validation.
    ///
    /// Provider and transport failures propagate out of the episode; they are
    /// never absorbed by the validation retry loop.
    #[error("model gateway error: {reason}")]
    Gateway { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The episode journal could not be appended to or sealed.
    #[error("journal write failed: {reason}")]
    Journal { reason: String },

    /// The persistence layer failed.
    #[error("store error: {reason}")]
    Store { reason: String },
}

/// Convenience alias used throughout the Concord crates.
pub type ConcordResult<T> = Result<T, ConcordError>;
