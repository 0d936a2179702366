//! Critic output and per-epoch results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::{StateObject, TerminationReason};

/// Score assigned to a corrupted episode's primary actors, bypassing the
/// critic's model call entirely.
pub const CORRUPTED_SCORE: i64 = -5;

/// One agent's judged performance in one episode.
///
/// Scores are integer-discrete in [-5, 5] — model-generated continuous
/// arithmetic drifts, integers do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentScore {
    pub agent_id: String,
    pub score: i64,
    pub rationale: String,
}

/// The critic's raw structured output: one score triple per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticEvaluation {
    pub evaluations: Vec<AgentScore>,
}

/// The critic's full judgment over one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochResult {
    /// Snapshot of the state the episode terminated on.
    pub final_state: StateObject,
    /// Per-agent integer scores in [-5, 5].
    pub scores: BTreeMap<String, i64>,
    /// How the episode ended.
    pub termination_reason: TerminationReason,
}

impl EpochResult {
    /// The target agent's score, defaulting to 0 when the critic did not
    /// score it (e.g. an agent mounted mid-generation).
    pub fn score_for(&self, agent_id: &str) -> i64 {
        self.scores.get(agent_id).copied().unwrap_or(0)
    }

    /// Mean score across the given agents, used when gating a newly
    /// provisioned participant on overall primary-actor performance.
    pub fn mean_over(&self, agent_ids: &[String]) -> f64 {
        if agent_ids.is_empty() {
            return 0.0;
        }
        let sum: i64 = agent_ids.iter().map(|id| self.score_for(id)).sum();
        sum as f64 / agent_ids.len() as f64
    }
}
