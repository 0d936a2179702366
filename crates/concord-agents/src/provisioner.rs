//! The provisioner: designs a new participant when evolution plateaus.
//!
//! Two model passes: a free-text deadlock analysis first, then structured
//! generation of the agent spec with the analysis in context. The safety
//! guardrails run after generation — a design holding abort or resolution
//! authority, or an oversized mutation cap, is rejected outright.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use concord_contracts::error::{ConcordError, ConcordResult};
use concord_contracts::provision::NewAgentProvisioning;
use concord_contracts::score::EpochResult;
use concord_contracts::state::StateObject;
use concord_gateway::{request_object, ModelGateway, ModelRequest, PayloadKind, TokenUsage};

const ANALYSIS_SYSTEM: &str = "\
A negotiation has stalled across an entire generation of strategy mutations. \
From the epoch results, explain in a short paragraph why the parties are \
deadlocked: which positions never move, and what structural force is missing \
from the table.";

const DESIGN_SYSTEM: &str = "\
Design one new participant that would break the deadlock described below. \
The participant must be narrowly scoped: it may only touch state paths it \
genuinely needs, it never ends episodes, and it makes at most 3 state \
mutations per turn. Avoid archetypes that have already failed.";

/// Designs new participants. Stateless; the orchestrator owns the
/// failed-archetype ledger and the cooldown.
pub struct Provisioner {
    gateway: Arc<dyn ModelGateway>,
}

impl Provisioner {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Produce a guardrail-checked agent design for the current deadlock.
    pub async fn design_agent(
        &self,
        initial: &StateObject,
        epoch_results: &[EpochResult],
        failed_archetypes: &[String],
    ) -> ConcordResult<(NewAgentProvisioning, TokenUsage)> {
        let mut usage = TokenUsage::default();

        // Pass 1: free-text deadlock analysis.
        let summary = serde_json::to_string_pretty(&json!({
            "initial_state": initial,
            "episodes": epoch_results
                .iter()
                .map(|r| json!({
                    "termination_reason": r.termination_reason.as_str(),
                    "scores": r.scores,
                    "final_variables": r.final_state.variables,
                }))
                .collect::<Vec<_>>(),
        }))
        .expect("epoch summary must serialize");

        let analysis_request = ModelRequest::free_text(ANALYSIS_SYSTEM, &summary);
        let (analysis, analysis_usage) =
            self.gateway.generate_text(&analysis_request).await?;
        usage.absorb(analysis_usage);

        // Pass 2: structured design, with the analysis in context.
        let design_user = serde_json::to_string_pretty(&json!({
            "deadlock_analysis": analysis,
            "initial_state": initial,
            "failed_archetypes": failed_archetypes,
        }))
        .expect("design context must serialize");

        let design_request =
            ModelRequest::structured(DESIGN_SYSTEM, design_user, PayloadKind::AgentProvisioning);
        let (spec, design_usage): (NewAgentProvisioning, TokenUsage) =
            request_object(self.gateway.as_ref(), &design_request).await?;
        usage.absorb(design_usage);

        // Guardrails run on whatever the model returned, not on what the
        // prompt asked for.
        if let Err(reason) = spec.permissions.check_created_guardrails() {
            warn!(
                agent_id = %spec.agent_id,
                archetype = %spec.archetype,
                %reason,
                "provisioned design rejected by guardrails"
            );
            return Err(ConcordError::UnsafeAgentDesign { reason });
        }

        info!(
            agent_id = %spec.agent_id,
            archetype = %spec.archetype,
            cadence = %spec.turn_injection_logic,
            "provisioner produced a conforming design"
        );

        Ok((spec, usage))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use concord_contracts::error::ConcordError;
    use concord_contracts::state::StateObject;
    use concord_gateway::{PayloadKind, ScriptedGateway};

    use super::Provisioner;

    fn design(can_abort: bool, cap: u8) -> serde_json::Value {
        json!({
            "agent_id": "mediator_1",
            "archetype": "mediator",
            "turn_injection_logic": "speak_every_3_turns",
            "system_prompt": "You broker compromises between the parties.",
            "core_goals": ["surface shared interests"],
            "permissions": {
                "can_modify_fields": ["mediation"],
                "cannot_modify_fields": ["concessions"],
                "can_abort_episode": can_abort,
                "can_propose_resolution": false,
                "max_state_mutations_per_turn": cap
            },
            "design_rationale": "neither side will move first"
        })
    }

    #[tokio::test]
    async fn conforming_design_is_returned() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue_text("Both sides anchor on tariffs and nobody reframes.");
        gateway.enqueue(PayloadKind::AgentProvisioning, design(false, 2));

        let provisioner = Provisioner::new(gateway);
        let initial = StateObject::new(serde_json::Map::new());
        let (spec, usage) = provisioner.design_agent(&initial, &[], &[]).await.unwrap();

        assert_eq!(spec.agent_id, "mediator_1");
        assert!(usage.total() > 0, "both passes must be accounted");
    }

    #[tokio::test]
    async fn abort_authority_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue_text("analysis");
        gateway.enqueue(PayloadKind::AgentProvisioning, design(true, 2));

        let provisioner = Provisioner::new(gateway);
        let initial = StateObject::new(serde_json::Map::new());
        let err = provisioner.design_agent(&initial, &[], &[]).await.unwrap_err();

        assert!(matches!(err, ConcordError::UnsafeAgentDesign { .. }));
    }

    #[tokio::test]
    async fn oversized_mutation_cap_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue_text("analysis");
        gateway.enqueue(PayloadKind::AgentProvisioning, design(false, 4));

        let provisioner = Provisioner::new(gateway);
        let initial = StateObject::new(serde_json::Map::new());
        let err = provisioner.design_agent(&initial, &[], &[]).await.unwrap_err();

        assert!(matches!(err, ConcordError::UnsafeAgentDesign { .. }));
    }
}
