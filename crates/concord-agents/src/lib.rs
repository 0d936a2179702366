//! # concord-agents
//!
//! Turn-taking participants and meta-agents for the Concord engine.
//!
//! - [`actor::PrimaryActor`] — unrestricted negotiator with an immutable
//!   core and a mutable strategy
//! - [`actor::CreatedActor`] — provisioner-minted, permission-restricted
//!   participant
//! - [`critic::Critic`] — stateless episode judge
//! - [`capitalizer::CapitalizerAgent`] — overlap spotter (hints redacted by
//!   the environment)
//! - [`disruptor`] — information and tension disruptors
//! - [`provisioner::Provisioner`] — designs new participants under safety
//!   guardrails
//! - [`explorer::Explorer`] — periodic ingredient-graph research with a
//!   deterministic fallback
//!
//! The meta-agents share no hierarchy; each wraps the gateway with a
//! role-specific system prompt and output schema.

pub mod actor;
pub mod capitalizer;
pub mod critic;
pub mod disruptor;
pub mod explorer;
pub mod provisioner;

pub use actor::{CreatedActor, PrimaryActor};
pub use capitalizer::CapitalizerAgent;
pub use critic::Critic;
pub use disruptor::{InfoDisruptorAgent, TensionDisruptorAgent};
pub use explorer::Explorer;
pub use provisioner::Provisioner;
