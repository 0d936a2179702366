//! Strategy mutation: propose, shadow-test, and statistically gate
//! replacement strategies for a primary actor.
//!
//! Runs batch-mode once per generation per actor, in three phases:
//!
//! - **A — Generation**: summarize the actor's worst 20% of episodes and ask
//!   the model for replacement strategies.
//! - **B — Shadow trials** (successive halving): a cheap 3-episode,
//!   3-turn-capped prune keeps the top half of variants; survivors get the
//!   full shadow-trial budget against the frozen opponents.
//! - **C — Acceptance gate**: highest lower-confidence-bound variant wins,
//!   and is accepted only if its LCB clears the baseline mean by the
//!   improvement margin AND a Mann-Whitney test finds the shift significant.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use concord_agents::PrimaryActor;
use concord_contracts::config::SimulationConfig;
use concord_contracts::error::ConcordResult;
use concord_contracts::mutate::VariantBatch;
use concord_contracts::score::EpochResult;
use concord_engine::traits::TurnActor;
use concord_gateway::{request_object, ModelGateway, ModelRequest, PayloadKind, TokenUsage};

use crate::stats::{lower_confidence_bound, mann_whitney_u_test, mean};

/// Episodes in the fast-prune trial.
const FAST_PRUNE_EPISODES: u32 = 3;
/// Turn cap applied during the fast prune.
const FAST_PRUNE_TURN_CAP: u64 = 3;

const MUTATOR_SYSTEM: &str = "\
You improve one negotiator's strategy. You are given its identity, current \
strategy, and the episodes where it scored worst this generation. Propose \
the requested number of alternative strategies. Each must be a complete \
replacement, not a diff, and each should attack a different weakness visible \
in the failures.";

/// Everything a shadow trial run needs to know.
#[derive(Debug, Clone, Copy)]
pub struct ShadowPlan {
    /// How many isolated episodes to run.
    pub episodes: u32,
    /// Optional turn-cap override (used by the fast prune).
    pub max_turns: Option<u64>,
}

/// Scores the target actor earned across a shadow-trial run, one per episode.
pub type ShadowScores = ConcordResult<Vec<f64>>;
type ShadowFuture = Pin<Box<dyn Future<Output = ShadowScores> + Send>>;

/// Opens fresh environments with the candidate substituted for the target
/// actor's slot and runs them against the frozen opponents. Provided by the
/// orchestrator.
pub type ShadowRunner = Arc<dyn Fn(Arc<PrimaryActor>, ShadowPlan) -> ShadowFuture + Send + Sync>;

/// What a mutation round decided.
pub enum MutationOutcome {
    /// The winning variant cleared the gate; `actor` carries the new
    /// strategy over the unchanged immutable core.
    Accepted {
        actor: Arc<PrimaryActor>,
        variant_id: String,
        lcb: f64,
        p_value: f64,
    },
    /// No variant cleared the gate.
    Rejected { best_lcb: f64, p_value: f64 },
}

/// Batch-mode strategy mutator.
///
/// The plateau counter is shared across the parallel per-actor calls of a
/// generation; it moves exactly once per generation, via
/// [`StrategyMutator::record_generation`], after all per-actor results are
/// collected.
pub struct StrategyMutator {
    gateway: Arc<dyn ModelGateway>,
    config: Arc<SimulationConfig>,
    plateau_counter: AtomicU32,
}

impl StrategyMutator {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: Arc<SimulationConfig>) -> Self {
        Self {
            gateway,
            config,
            plateau_counter: AtomicU32::new(0),
        }
    }

    /// Run one full mutation round for `target`.
    pub async fn mutate_actor(
        &self,
        target: &Arc<PrimaryActor>,
        epoch_results: &[EpochResult],
        runner: &ShadowRunner,
    ) -> ConcordResult<MutationOutcome> {
        let target_id = target.id().to_string();
        let baseline: Vec<f64> = epoch_results
            .iter()
            .map(|r| r.score_for(&target_id) as f64)
            .collect();
        let baseline_mean = mean(&baseline);

        // ── Phase A: variant generation from the failing slice ───────────────
        let mut ranked: Vec<&EpochResult> = epoch_results.iter().collect();
        ranked.sort_by_key(|r| r.score_for(&target_id));
        let worst_count = (ranked.len() as f64 * 0.2).ceil() as usize;
        let failing: Vec<_> = ranked
            .iter()
            .take(worst_count.max(1).min(ranked.len()))
            .map(|r| {
                json!({
                    "score": r.score_for(&target_id),
                    "termination_reason": r.termination_reason.as_str(),
                    "final_variables": r.final_state.variables,
                })
            })
            .collect();

        let user = serde_json::to_string_pretty(&json!({
            "agent_id": target_id,
            "current_strategy": target.strategy(),
            "current_hyperparameters": target.hyperparameters(),
            "requested_variants": self.config.mutation_variants,
            "worst_episodes": failing,
        }))
        .expect("mutation context must serialize");

        let request = ModelRequest::structured(MUTATOR_SYSTEM, user, PayloadKind::MutatorVariants);
        let (batch, _usage): (VariantBatch, TokenUsage) =
            request_object(self.gateway.as_ref(), &request).await?;

        debug!(
            agent_id = %target_id,
            variants = batch.variants.len(),
            "mutation variants generated"
        );

        // ── Phase B: successive halving ──────────────────────────────────────
        //
        // Fast prune: a cheap trial per variant, keep the top half.
        let mut pruned: Vec<(Arc<PrimaryActor>, String, f64)> = Vec::new();
        for variant in &batch.variants {
            let candidate = Arc::new(
                target.with_mutated_strategy(&variant.strategy_text, variant.hyperparameters),
            );
            let scores = runner(
                candidate.clone(),
                ShadowPlan {
                    episodes: FAST_PRUNE_EPISODES,
                    max_turns: Some(FAST_PRUNE_TURN_CAP),
                },
            )
            .await?;
            pruned.push((candidate, variant.variant_id.clone(), mean(&scores)));
        }
        pruned.sort_by(|a, b| b.2.total_cmp(&a.2));
        let survivors = pruned.len().div_ceil(2);
        pruned.truncate(survivors);

        // Full trials for the survivors.
        let mut judged: Vec<(Arc<PrimaryActor>, String, Vec<f64>, f64)> = Vec::new();
        for (candidate, variant_id, _) in pruned {
            let scores = runner(
                candidate.clone(),
                ShadowPlan {
                    episodes: self.config.shadow_trial_count,
                    max_turns: None,
                },
            )
            .await?;
            let lcb = lower_confidence_bound(&scores, self.config.acceptance_lcb_lambda);
            judged.push((candidate, variant_id, scores, lcb));
        }

        // ── Phase C: acceptance gate ─────────────────────────────────────────
        let best = judged
            .into_iter()
            .max_by(|a, b| a.3.total_cmp(&b.3));
        let (candidate, variant_id, shadow_scores, lcb) = match best {
            Some(best) => best,
            None => {
                return Ok(MutationOutcome::Rejected {
                    best_lcb: f64::NEG_INFINITY,
                    p_value: 1.0,
                })
            }
        };

        let p_value = mann_whitney_u_test(&shadow_scores, &baseline).p_value;
        let clears_margin = lcb > baseline_mean + self.config.improvement_margin;
        let significant = p_value < self.config.acceptance_p_value_threshold;

        if clears_margin && significant {
            info!(
                agent_id = %target_id,
                variant_id = %variant_id,
                lcb,
                p_value,
                baseline_mean,
                "mutation accepted"
            );
            Ok(MutationOutcome::Accepted {
                actor: candidate,
                variant_id,
                lcb,
                p_value,
            })
        } else {
            debug!(
                agent_id = %target_id,
                variant_id = %variant_id,
                lcb,
                p_value,
                baseline_mean,
                clears_margin,
                significant,
                "mutation rejected"
            );
            Ok(MutationOutcome::Rejected {
                best_lcb: lcb,
                p_value,
            })
        }
    }

    /// Advance the plateau clock for a finished generation: reset when any
    /// actor's mutation was accepted, else one single increment.
    pub fn record_generation(&self, any_accepted: bool) {
        if any_accepted {
            self.plateau_counter.store(0, Ordering::SeqCst);
        } else {
            self.plateau_counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Restart the plateau clock (after a successful agent creation).
    pub fn reset_plateau(&self) {
        self.plateau_counter.store(0, Ordering::SeqCst);
    }

    pub fn plateau_counter(&self) -> u32 {
        self.plateau_counter.load(Ordering::SeqCst)
    }

    pub fn is_plateaued(&self, patience: u32) -> bool {
        self.plateau_counter() >= patience
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use concord_agents::PrimaryActor;
    use concord_contracts::config::SimulationConfig;
    use concord_contracts::mutate::Hyperparameters;
    use concord_contracts::score::EpochResult;
    use concord_contracts::state::{StateObject, TerminationReason};
    use concord_gateway::{PayloadKind, ScriptedGateway};

    use super::{MutationOutcome, ShadowPlan, ShadowRunner, StrategyMutator};

    fn epoch(scores: &[i64]) -> Vec<EpochResult> {
        scores
            .iter()
            .map(|&s| EpochResult {
                final_state: StateObject::new(serde_json::Map::new()),
                scores: [("side_a".to_string(), s)].into_iter().collect(),
                termination_reason: TerminationReason::Timeout,
            })
            .collect()
    }

    fn variants_payload(ids: &[&str]) -> serde_json::Value {
        json!({
            "variants": ids.iter().map(|id| json!({
                "variant_id": id,
                "strategy_text": format!("strategy {id}"),
                "hyperparameters": { "temperature": 0.5, "frequency_penalty": 0.1 }
            })).collect::<Vec<_>>()
        })
    }

    fn target(gateway: Arc<ScriptedGateway>) -> Arc<PrimaryActor> {
        Arc::new(PrimaryActor::new(
            "side_a",
            "core",
            "original strategy",
            Hyperparameters::default(),
            gateway,
        ))
    }

    /// A runner that scores by strategy text and records every invocation.
    fn scoring_runner(
        scores_by_strategy: HashMap<String, f64>,
        calls: Arc<Mutex<Vec<(String, u32)>>>,
    ) -> ShadowRunner {
        Arc::new(move |candidate, plan: ShadowPlan| {
            let score = *scores_by_strategy.get(candidate.strategy()).unwrap_or(&0.0);
            calls
                .lock()
                .unwrap()
                .push((candidate.strategy().to_string(), plan.episodes));
            Box::pin(async move {
                // Slight deterministic spread so stddev and ranks are finite.
                Ok((0..plan.episodes)
                    .map(|i| score + (i as f64) * 0.01)
                    .collect())
            })
        })
    }

    fn config() -> Arc<SimulationConfig> {
        let mut c = SimulationConfig::default();
        c.shadow_trial_count = 10;
        Arc::new(c)
    }

    #[tokio::test]
    async fn dominant_variant_is_accepted() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue(PayloadKind::MutatorVariants, variants_payload(&["v1", "v2"]));

        let scores = HashMap::from([
            ("strategy v1".to_string(), 4.0),
            ("strategy v2".to_string(), -1.0),
        ]);
        let calls = Arc::new(Mutex::new(vec![]));
        let runner = scoring_runner(scores, calls.clone());

        let mutator = StrategyMutator::new(gateway.clone(), config());
        let outcome = mutator
            .mutate_actor(&target(gateway), &epoch(&[-2, -1, 0, -1, -2]), &runner)
            .await
            .unwrap();

        match outcome {
            MutationOutcome::Accepted { actor, variant_id, lcb, p_value } => {
                assert_eq!(variant_id, "v1");
                assert_eq!(actor.strategy(), "strategy v1");
                assert!(lcb > -1.0 + 0.5, "lcb {lcb} must clear margin");
                assert!(p_value < 0.05);
            }
            MutationOutcome::Rejected { best_lcb, p_value } => {
                panic!("expected acceptance, got rejection (lcb {best_lcb}, p {p_value})")
            }
        }
    }

    #[tokio::test]
    async fn indistinct_variant_is_rejected() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue(PayloadKind::MutatorVariants, variants_payload(&["v1"]));

        // Shadow scores match the baseline: no margin, no significance.
        let scores = HashMap::from([("strategy v1".to_string(), 0.0)]);
        let runner = scoring_runner(scores, Arc::new(Mutex::new(vec![])));

        let mutator = StrategyMutator::new(gateway.clone(), config());
        let outcome = mutator
            .mutate_actor(&target(gateway), &epoch(&[0, 0, 0, 0, 0]), &runner)
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn fast_prune_halves_the_field() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue(
            PayloadKind::MutatorVariants,
            variants_payload(&["v1", "v2", "v3", "v4"]),
        );

        let scores = HashMap::from([
            ("strategy v1".to_string(), 4.0),
            ("strategy v2".to_string(), 3.0),
            ("strategy v3".to_string(), -2.0),
            ("strategy v4".to_string(), -3.0),
        ]);
        let calls = Arc::new(Mutex::new(vec![]));
        let runner = scoring_runner(scores, calls.clone());

        let mutator = StrategyMutator::new(gateway.clone(), config());
        mutator
            .mutate_actor(&target(gateway), &epoch(&[-2, -2, -2, -2, -2]), &runner)
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        // 4 fast prunes (3 episodes each) + 2 full runs (10 episodes each).
        let fast: Vec<_> = calls.iter().filter(|(_, n)| *n == 3).collect();
        let full: Vec<_> = calls.iter().filter(|(_, n)| *n == 10).collect();
        assert_eq!(fast.len(), 4);
        assert_eq!(full.len(), 2);
        // Only the top half got full trials.
        assert!(full.iter().all(|(s, _)| s == "strategy v1" || s == "strategy v2"));
    }

    #[tokio::test]
    async fn plateau_counter_moves_once_per_generation() {
        let gateway = Arc::new(ScriptedGateway::new());
        let mutator = StrategyMutator::new(gateway, config());

        mutator.record_generation(false);
        mutator.record_generation(false);
        assert_eq!(mutator.plateau_counter(), 2);
        assert!(!mutator.is_plateaued(5));

        mutator.record_generation(true);
        assert_eq!(mutator.plateau_counter(), 0);

        for _ in 0..5 {
            mutator.record_generation(false);
        }
        assert!(mutator.is_plateaued(5));
    }
}
