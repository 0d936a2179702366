//! # concord-evolve
//!
//! The self-improvement loop for Concord negotiations.
//!
//! - [`orchestrator::Orchestrator`] — the generation loop: parallel epochs,
//!   per-actor mutation, plateau-gated provisioning, explorer sweeps
//! - [`mutator::StrategyMutator`] — variant generation, successive-halving
//!   shadow trials, and the LCB + Mann-Whitney acceptance gate
//! - [`stats`] — the statistics behind the gate

pub mod mutator;
pub mod orchestrator;
pub mod stats;

pub use mutator::{MutationOutcome, ShadowPlan, ShadowRunner, StrategyMutator};
pub use orchestrator::{ApprovalGate, AutoApprove, DenyAll, GenerationReport, Orchestrator, RunSummary};
