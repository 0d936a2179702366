//! The negotiation state document and episode-level outcome types.
//!
//! `StateObject` is the living document agents negotiate over. It is created
//! once per episode by deep-copying the scenario's initial state and is
//! mutated exclusively by the environment in response to validated proposals.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::log::ActionLogEntry;
use crate::scout::ScoutHypothesis;

/// Reserved key inside `StateObject::variables` holding the shared tension
/// reading the tension disruptor overwrites each turn.
pub const GLOBAL_TENSION_KEY: &str = "global_tension_level";

/// The shared structured state one episode runs over.
///
/// Invariants enforced by the environment:
/// - `turn_number` strictly increases by 1 per completed step, including
///   penalized skips, and is never touched by actors directly.
/// - `variables` is only mutated through validated, permission-checked
///   proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateObject {
    /// Completed-step counter, starting at 0.
    pub turn_number: u64,
    /// The id of the agent whose turn is currently being executed.
    pub current_speaker_id: String,
    /// True once a terminal condition has been reached. Absorbing.
    pub is_terminal: bool,
    /// The domain-specific negotiation payload. Open mapping; dotted mutation
    /// paths are rooted here.
    pub variables: Map<String, Value>,
    /// Environment-written hints visible to the next speaker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injections: Option<Injections>,
    /// Explorer output injected into the debate, newest sweep wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scout_hypotheses: Option<Vec<ScoutHypothesis>>,
}

impl StateObject {
    /// Build a fresh pre-episode state over the given variables.
    pub fn new(variables: Map<String, Value>) -> Self {
        Self {
            turn_number: 0,
            current_speaker_id: String::new(),
            is_terminal: false,
            variables,
            injections: None,
            scout_hypotheses: None,
        }
    }

    /// The current shared tension level, if the scenario tracks one.
    pub fn global_tension_level(&self) -> Option<u8> {
        self.variables
            .get(GLOBAL_TENSION_KEY)
            .and_then(Value::as_u64)
            .map(|v| v as u8)
    }
}

/// Hints the environment injects between turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Injections {
    /// Redacted strategic hint produced by the capitalizer for the current
    /// speaker. Overwritten every turn the capitalizer runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capitalizer_hint: Option<String>,
}

/// Why an episode left the `Running` state. All variants are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Two consecutive turns both carried `propose_resolution = true`.
    Agreement,
    /// A speaker with abort authority set `abort_episode = true`.
    AbortEpisode,
    /// The hard turn cap was reached.
    Timeout,
    /// Cumulative token spend crossed the episode budget.
    TokenLimit,
    /// Forced concessions reached the corruption threshold.
    Corrupted,
}

impl TerminationReason {
    /// Stable string form used in events, logs, and persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agreement => "agreement",
            Self::AbortEpisode => "abort_episode",
            Self::Timeout => "timeout",
            Self::TokenLimit => "token_limit",
            Self::Corrupted => "corrupted",
        }
    }
}

/// Everything an episode yields back to the orchestrator.
///
/// `transcript` is the full, unpruned action log — the critic always sees
/// every entry, regardless of how aggressively the live context was pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    /// Unique id assigned at environment construction.
    pub episode_id: String,
    /// Snapshot of the state at termination.
    pub final_state: StateObject,
    /// The complete action log, in turn order.
    pub transcript: Vec<ActionLogEntry>,
    /// Which terminal condition ended the episode.
    pub reason: TerminationReason,
    /// Total tokens consumed across every model call in the episode.
    pub tokens_spent: u64,
}
