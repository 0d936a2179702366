//! Turn-taking participants: primary actors and created agents.
//!
//! A primary actor's system content is layered: Layer 1 is the immutable
//! core identity, Layer 2 the current mutable strategy, with an optional
//! validation note from the previous retry appended (and cleared between
//! turns). Layer 3 — the current state — travels as the user message.
//!
//! The mutator evolves Layer 2 through `with_mutated_strategy`; there is no
//! API anywhere that alters Layer 1.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use concord_contracts::error::ConcordResult;
use concord_contracts::mutate::Hyperparameters;
use concord_contracts::proposal::ActionProposal;
use concord_contracts::provision::NewAgentProvisioning;
use concord_engine::traits::{TurnActor, TurnAttempt, TurnContext};
use concord_gateway::{validate_payload, ModelGateway, ModelRequest, PayloadKind};

/// Serialize the turn context into the user message actors negotiate from.
fn render_turn_payload(ctx: &TurnContext) -> String {
    serde_json::to_string_pretty(&json!({
        "turn_number": ctx.turn_number,
        "max_turns": ctx.max_turns,
        "current_speaker_id": ctx.current_speaker_id,
        "transcript": ctx.transcript,
        "variables": ctx.variables,
        "injections": ctx.injections,
        "scout_hypotheses": ctx.scout_hypotheses,
    }))
    .expect("turn context must serialize")
}

/// Format accumulated validator messages for the retry prompt.
fn validation_note(feedback: &[String]) -> String {
    let mut note = String::from(
        "\n\nYour previous reply was rejected by the output validator. \
         Correct these problems and answer again:\n",
    );
    for message in feedback {
        note.push_str("- ");
        note.push_str(message);
        note.push('\n');
    }
    note
}

/// Ask the gateway for one proposal attempt, folding schema failures into
/// the attempt so token usage survives either way.
async fn attempt_proposal(
    gateway: &dyn ModelGateway,
    request: &ModelRequest,
) -> ConcordResult<TurnAttempt> {
    let (value, usage) = gateway.generate_value(request).await?;
    let outcome = match validate_payload(PayloadKind::ActionProposal, &value) {
        Ok(()) => serde_json::from_value::<ActionProposal>(value)
            .map_err(|e| format!("proposal passed its schema but failed to decode: {e}")),
        Err(reason) => Err(reason),
    };
    Ok(TurnAttempt { outcome, usage })
}

/// An unrestricted negotiating participant.
///
/// Stateless at turn granularity: everything a turn needs arrives in the
/// context, and nothing from the turn is retained.
pub struct PrimaryActor {
    id: String,
    /// Layer 1. Fixed at construction, carried unchanged through every
    /// strategy mutation.
    core_identity: String,
    /// Layer 2. Replaced wholesale when a mutation is accepted.
    strategy: String,
    hyperparameters: Hyperparameters,
    gateway: Arc<dyn ModelGateway>,
}

impl PrimaryActor {
    pub fn new(
        id: impl Into<String>,
        core_identity: impl Into<String>,
        strategy: impl Into<String>,
        hyperparameters: Hyperparameters,
        gateway: Arc<dyn ModelGateway>,
    ) -> Self {
        Self {
            id: id.into(),
            core_identity: core_identity.into(),
            strategy: strategy.into(),
            hyperparameters,
            gateway,
        }
    }

    /// A fresh actor with the same id and immutable core but a new strategy
    /// and sampling settings.
    pub fn with_mutated_strategy(
        &self,
        strategy_text: impl Into<String>,
        hyperparameters: Hyperparameters,
    ) -> Self {
        Self {
            id: self.id.clone(),
            core_identity: self.core_identity.clone(),
            strategy: strategy_text.into(),
            hyperparameters,
            gateway: self.gateway.clone(),
        }
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn core_identity(&self) -> &str {
        &self.core_identity
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        self.hyperparameters
    }

    fn system_content(&self, feedback: &[String]) -> String {
        let mut system = format!("{}\n\n## Current strategy\n{}", self.core_identity, self.strategy);
        if !feedback.is_empty() {
            system.push_str(&validation_note(feedback));
        }
        system
    }
}

#[async_trait]
impl TurnActor for PrimaryActor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn take_turn(&self, ctx: &TurnContext) -> ConcordResult<TurnAttempt> {
        let request = ModelRequest::structured(
            self.system_content(&ctx.validation_feedback),
            render_turn_payload(ctx),
            PayloadKind::ActionProposal,
        )
        .with_sampling(
            self.hyperparameters.temperature,
            self.hyperparameters.frequency_penalty,
        );
        attempt_proposal(self.gateway.as_ref(), &request).await
    }
}

/// A provisioner-minted participant.
///
/// Speaks through the same proposal schema as a primary actor; its
/// authority is constrained by the permissions the environment registered
/// at mount time, not by anything in this type.
pub struct CreatedActor {
    id: String,
    system_prompt: String,
    gateway: Arc<dyn ModelGateway>,
}

impl CreatedActor {
    /// Build the actor for a mounted spec.
    pub fn from_spec(spec: &NewAgentProvisioning, gateway: Arc<dyn ModelGateway>) -> Self {
        let mut system_prompt = spec.system_prompt.clone();
        if !spec.core_goals.is_empty() {
            system_prompt.push_str("\n\n## Core goals\n");
            for goal in &spec.core_goals {
                system_prompt.push_str("- ");
                system_prompt.push_str(goal);
                system_prompt.push('\n');
            }
        }
        Self {
            id: spec.agent_id.clone(),
            system_prompt,
            gateway,
        }
    }
}

#[async_trait]
impl TurnActor for CreatedActor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn take_turn(&self, ctx: &TurnContext) -> ConcordResult<TurnAttempt> {
        let mut system = self.system_prompt.clone();
        if !ctx.validation_feedback.is_empty() {
            system.push_str(&validation_note(&ctx.validation_feedback));
        }
        let request =
            ModelRequest::structured(system, render_turn_payload(ctx), PayloadKind::ActionProposal);
        attempt_proposal(self.gateway.as_ref(), &request).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map};

    use concord_contracts::mutate::Hyperparameters;
    use concord_engine::traits::{TurnActor, TurnContext};
    use concord_gateway::{PayloadKind, ScriptedGateway};

    use super::PrimaryActor;

    fn ctx() -> TurnContext {
        TurnContext {
            turn_number: 0,
            max_turns: 20,
            current_speaker_id: "side_a".to_string(),
            transcript: vec![],
            variables: Map::new(),
            injections: None,
            scout_hypotheses: None,
            validation_feedback: vec![],
        }
    }

    fn actor(gateway: Arc<ScriptedGateway>) -> PrimaryActor {
        PrimaryActor::new(
            "side_a",
            "You negotiate on behalf of the coastal bloc.",
            "Open aggressively, concede slowly.",
            Hyperparameters::default(),
            gateway,
        )
    }

    #[tokio::test]
    async fn valid_payload_becomes_a_proposal() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue(
            PayloadKind::ActionProposal,
            json!({
                "internal_monologue": "probe for weakness",
                "public_dialogue": "Our tariffs are not on the table.",
                "state_mutations": [],
                "propose_resolution": false,
                "abort_episode": false
            }),
        );

        let attempt = actor(gateway).take_turn(&ctx()).await.unwrap();
        let proposal = attempt.outcome.unwrap();
        assert_eq!(proposal.public_dialogue, "Our tariffs are not on the table.");
        assert!(attempt.usage.total() > 0);
    }

    #[tokio::test]
    async fn invalid_payload_keeps_usage_and_reports_the_failure() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue(PayloadKind::ActionProposal, json!({ "half": "a turn" }));

        let attempt = actor(gateway).take_turn(&ctx()).await.unwrap();
        let reason = attempt.outcome.unwrap_err();
        assert!(reason.contains("public_dialogue"), "reason was: {reason}");
        assert!(attempt.usage.total() > 0, "failed attempts still cost tokens");
    }

    #[test]
    fn mutation_preserves_the_immutable_core() {
        let gateway = Arc::new(ScriptedGateway::new());
        let original = actor(gateway);

        let mutated = original.with_mutated_strategy(
            "Anchor low, trade concessions for timeline.",
            Hyperparameters {
                temperature: 0.4,
                frequency_penalty: 0.3,
            },
        );

        assert_eq!(mutated.id(), original.id());
        assert_eq!(mutated.core_identity(), original.core_identity());
        assert_ne!(mutated.strategy(), original.strategy());
        assert_eq!(mutated.hyperparameters().temperature, 0.4);
    }

    #[test]
    fn retry_feedback_lands_in_the_system_content() {
        let gateway = Arc::new(ScriptedGateway::new());
        let actor = actor(gateway);
        let system = actor.system_content(&["field 'path' must be a string".to_string()]);

        assert!(system.contains("rejected by the output validator"));
        assert!(system.contains("field 'path' must be a string"));
        // The layers are still present, in order.
        assert!(system.starts_with("You negotiate on behalf of the coastal bloc."));
        assert!(system.contains("## Current strategy"));
    }
}
