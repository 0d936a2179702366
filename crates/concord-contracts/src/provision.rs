//! The provisioner's output: a specification for a dynamically minted
//! participant, plus the turn-injection cadence grammar.

use serde::{Deserialize, Serialize};

use crate::permissions::AgentPermissions;

/// A complete design for a new permission-restricted participant.
///
/// Produced by the provisioner via structured generation, validated against
/// the safety guardrails, optionally gated on human approval, then shadow-
/// tested before it is mounted into the live roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgentProvisioning {
    /// Roster id. Must not collide with an existing participant.
    pub agent_id: String,
    /// Design family, e.g. "mediator" or "escalation_broker". Rejected
    /// archetypes are remembered so the provisioner does not repeat them.
    pub archetype: String,
    /// Cadence expression of the form `speak_every_N_turns`.
    pub turn_injection_logic: String,
    /// The agent's full system prompt.
    pub system_prompt: String,
    /// Goal statements appended beneath the system prompt.
    #[serde(default)]
    pub core_goals: Vec<String>,
    /// Authorization scope. Must pass the created-agent guardrails.
    pub permissions: AgentPermissions,
    /// Why the provisioner believes this design breaks the deadlock.
    pub design_rationale: String,
}

/// Parsed turn-injection cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnInjection {
    /// The new participant is slotted in after every N-th existing turn.
    pub every_n_turns: u32,
}

impl TurnInjection {
    /// Parse a `speak_every_N_turns` expression.
    ///
    /// Anything that does not match the grammar falls back to N = 1 — a
    /// malformed cadence from the model should degrade to "speaks often",
    /// not fail the mount.
    pub fn parse(expr: &str) -> Self {
        let n = expr
            .strip_prefix("speak_every_")
            .and_then(|rest| rest.strip_suffix("_turns").or_else(|| rest.strip_suffix("_turn")))
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        Self { every_n_turns: n }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::TurnInjection;

    #[test]
    fn parses_well_formed_cadence() {
        assert_eq!(TurnInjection::parse("speak_every_3_turns").every_n_turns, 3);
        assert_eq!(TurnInjection::parse("speak_every_1_turn").every_n_turns, 1);
    }

    #[test]
    fn malformed_cadence_defaults_to_one() {
        assert_eq!(TurnInjection::parse("whenever").every_n_turns, 1);
        assert_eq!(TurnInjection::parse("speak_every_x_turns").every_n_turns, 1);
        assert_eq!(TurnInjection::parse("speak_every_0_turns").every_n_turns, 1);
    }
}
