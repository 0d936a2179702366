//! # concord-engine
//!
//! The deterministic episode environment for Concord negotiations.
//!
//! This crate provides:
//! - The trait seams ([`traits`]) between the environment and the actors and
//!   meta-agents it drives
//! - The [`environment::Environment`] execution-loop state machine: turn
//!   sequencing, schema-repair retries with penalty fallback, permission
//!   enforcement, mutation application, consecutive-agreement termination,
//!   disruptor cadence, context pruning, and the token circuit breaker
//! - The hash-chained [`journal`] that archives the full transcript
//!
//! ## Usage
//!
//! ```rust,ignore
//! use concord_engine::{Environment, ActorRoster};
//!
//! let mut env = Environment::new(&initial_state, turn_order, config);
//! let outcome = env.run_episode(&roster).await?;
//! ```

pub mod environment;
pub mod journal;
pub mod mutation;
pub mod redaction;
pub mod traits;

pub use environment::{ActorRoster, Environment};
pub use journal::{EpisodeJournal, SealedTranscript};
