//! Explorer payloads: the ingredient graph it scans and the convergence
//! hypotheses it returns.

use serde::{Deserialize, Serialize};

/// One node in the explorer's in-memory ingredient graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    pub label: String,
    /// Coarse grouping used when looking for cross-category convergence.
    pub category: String,
    /// Ids of related ingredients.
    #[serde(default)]
    pub links: Vec<String>,
}

/// The explorer's raw structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisBatch {
    pub hypotheses: Vec<ConvergenceHypothesis>,
}

/// A full hypothesis produced by an explorer sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceHypothesis {
    pub title: String,
    /// Feasibility in [1, 10].
    pub feasibility_score: u8,
    /// Which negotiated position the hypothesis would unsettle.
    pub disruption_target: String,
    /// Longer free-text justification; summarized away before injection.
    pub rationale: String,
}

impl ConvergenceHypothesis {
    /// The compact form injected into `StateObject::scout_hypotheses`.
    pub fn to_scout(&self) -> ScoutHypothesis {
        ScoutHypothesis {
            title: self.title.clone(),
            feasibility_score: self.feasibility_score,
            disruption_target: self.disruption_target.clone(),
        }
    }
}

/// The summary of a hypothesis as the debating actors see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutHypothesis {
    pub title: String,
    pub feasibility_score: u8,
    pub disruption_target: String,
}
