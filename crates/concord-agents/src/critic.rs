//! The critic: stateless per-episode judge.
//!
//! Receives the initial state, final state, and the full transcript, and
//! returns one integer score per agent in [-5, 5]. Corrupted episodes never
//! reach the model — the score is hard-coded.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use concord_contracts::error::ConcordResult;
use concord_contracts::score::{CriticEvaluation, EpochResult, CORRUPTED_SCORE};
use concord_contracts::state::{EpisodeOutcome, StateObject, TerminationReason};
use concord_gateway::{request_object, ModelGateway, ModelRequest, PayloadKind, TokenUsage};

/// Sampling temperature for evaluation. Kept low: the judge should be as
/// deterministic as the backend allows.
const CRITIC_TEMPERATURE: f64 = 0.1;

const CRITIC_SYSTEM: &str = "\
You are the impartial judge of a concluded negotiation episode. Score every \
listed agent's performance as an integer from -5 (actively harmed its own \
position) to 5 (achieved its goals efficiently). Judge outcomes against the \
initial state, not style. Return one evaluation per agent.";

/// Stateless episode judge. Holds no memory across episodes.
pub struct Critic {
    gateway: Arc<dyn ModelGateway>,
}

impl Critic {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Judge one episode.
    ///
    /// `primary_ids` names the unrestricted negotiators: on a `corrupted`
    /// episode they each receive the hard-coded penalty score and the model
    /// is never consulted.
    pub async fn evaluate(
        &self,
        initial: &StateObject,
        outcome: &EpisodeOutcome,
        primary_ids: &[String],
    ) -> ConcordResult<(EpochResult, TokenUsage)> {
        if outcome.reason == TerminationReason::Corrupted {
            debug!(
                episode_id = %outcome.episode_id,
                "corrupted episode; bypassing the judge"
            );
            let scores = primary_ids
                .iter()
                .map(|id| (id.clone(), CORRUPTED_SCORE))
                .collect();
            return Ok((
                EpochResult {
                    final_state: outcome.final_state.clone(),
                    scores,
                    termination_reason: outcome.reason,
                },
                TokenUsage::default(),
            ));
        }

        let user = serde_json::to_string_pretty(&json!({
            "agents_to_score": primary_ids,
            "initial_state": initial,
            "final_state": outcome.final_state,
            "termination_reason": outcome.reason.as_str(),
            "transcript": outcome.transcript,
        }))
        .expect("episode outcome must serialize");

        let request = ModelRequest::structured(CRITIC_SYSTEM, user, PayloadKind::CriticEvaluation)
            .with_sampling(CRITIC_TEMPERATURE, 0.0);

        let (evaluation, usage): (CriticEvaluation, TokenUsage) =
            request_object(self.gateway.as_ref(), &request).await?;

        let scores = evaluation
            .evaluations
            .into_iter()
            .map(|e| (e.agent_id, e.score))
            .collect();

        Ok((
            EpochResult {
                final_state: outcome.final_state.clone(),
                scores,
                termination_reason: outcome.reason,
            },
            usage,
        ))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
