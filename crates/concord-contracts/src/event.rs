//! The event surface emitted by the environment.
//!
//! Events are the observable side channel of an episode: consumers (the demo
//! CLI, persistence, dashboards) subscribe through an `EventSink`
//! implementation wired into the environment at construction.

use serde::{Deserialize, Serialize};

use crate::proposal::ActionProposal;
use crate::provision::NewAgentProvisioning;
use crate::state::{StateObject, TerminationReason};

/// Everything an environment announces while running an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EnvEvent {
    /// A fresh episode began over a deep-copied initial state.
    #[serde(rename = "episode:start")]
    EpisodeStart { episode_id: String },

    /// One speaker completed a validated turn.
    #[serde(rename = "turn:complete")]
    TurnComplete {
        speaker_id: String,
        proposal: ActionProposal,
    },

    /// A speaker exhausted its validation retries and forfeited the turn.
    #[serde(rename = "turn:penalty")]
    TurnPenalty { speaker_id: String, retries: u32 },

    /// The live context window was pruned down to its bound.
    #[serde(rename = "context:pruned")]
    ContextPruned { dropped: usize },

    /// The episode reached a terminal condition.
    #[serde(rename = "episode:complete")]
    EpisodeComplete {
        final_state: StateObject,
        reason: TerminationReason,
    },

    /// A provisioned agent was mounted into the turn order.
    #[serde(rename = "agent:created")]
    AgentCreated { spec: NewAgentProvisioning },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_their_wire_names() {
        let event = EnvEvent::TurnPenalty {
            speaker_id: "side_a".to_string(),
            retries: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "turn:penalty");
        assert_eq!(json["speaker_id"], "side_a");
    }

    #[test]
    fn pruned_event_is_distinct_from_penalty() {
        let event = EnvEvent::ContextPruned { dropped: 7 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "context:pruned");
    }
}
