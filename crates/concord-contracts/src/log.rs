//! Per-turn audit records.
//!
//! The action log is append-only within an episode. The live view actors see
//! is pruned by the context-management protocol; the journaled archive the
//! critic receives never is.

use serde::{Deserialize, Serialize};

use crate::proposal::StateMutation;

/// Speaker id under which information-disruptor bulletins enter the log.
pub const INFO_DISRUPTOR_ID: &str = "disruptor_info";

/// One turn's audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// The turn number at which the entry was recorded.
    pub turn: u64,
    /// Who produced the entry.
    pub speaker_id: String,
    /// The turn payload.
    #[serde(flatten)]
    pub body: LogBody,
}

/// The two shapes a log entry can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogBody {
    /// A validated actor turn.
    Turn {
        internal_monologue: String,
        public_dialogue: String,
        state_mutations: Vec<StateMutation>,
        propose_resolution: bool,
        abort_episode: bool,
    },
    /// An information-disruptor bulletin injected into the transcript.
    Bulletin { headline: String, severity: Severity },
}

impl ActionLogEntry {
    /// Render the public face of this entry — dialogue for actor turns,
    /// headline for bulletins. Monologues never appear here.
    pub fn public_line(&self) -> String {
        match &self.body {
            LogBody::Turn { public_dialogue, .. } => {
                format!("{}: {}", self.speaker_id, public_dialogue)
            }
            LogBody::Bulletin { headline, severity } => {
                format!("[{} bulletin] {}", severity.as_str(), headline)
            }
        }
    }

    /// The private monologue, when the entry is an actor turn.
    pub fn monologue(&self) -> Option<&str> {
        match &self.body {
            LogBody::Turn {
                internal_monologue, ..
            } => Some(internal_monologue),
            LogBody::Bulletin { .. } => None,
        }
    }
}

/// How alarming a disruptor bulletin is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}
