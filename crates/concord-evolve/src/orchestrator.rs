//! The generation loop.
//!
//! Each generation: run an epoch of independent environments in parallel,
//! judge every episode, mutate each primary actor under the statistical
//! acceptance gate, and — when evolution plateaus — provision a brand-new
//! participant, shadow-test it, and mount it into the live roster.
//!
//! All episode and shadow-trial fan-out shares one semaphore sized by
//! `max_concurrency`. The active-agents mapping is mutated only between
//! generations, never concurrently with an in-flight epoch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use concord_agents::{CreatedActor, Critic, Explorer, PrimaryActor, Provisioner};
use concord_contracts::config::SimulationConfig;
use concord_contracts::error::{ConcordError, ConcordResult};
use concord_contracts::provision::NewAgentProvisioning;
use concord_contracts::score::EpochResult;
use concord_contracts::state::{StateObject, TerminationReason};
use concord_engine::traits::{
    EventSink, InfoDisruptor, NullEventSink, StrategicObserver, TensionDisruptor, TurnActor,
};
use concord_engine::{ActorRoster, Environment};
use concord_gateway::ModelGateway;

use crate::mutator::{MutationOutcome, ShadowPlan, ShadowRunner, StrategyMutator};
use crate::stats::{lower_confidence_bound, mann_whitney_u_test, mean};

/// Human-in-the-loop gate for mounting provisioned agents.
pub trait ApprovalGate: Send + Sync {
    fn approve(&self, spec: &NewAgentProvisioning) -> bool;
}

/// Approves every design. The default, and the right gate for unattended
/// runs with `require_human_approval_for_creation = false` semantics left
/// to configuration.
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn approve(&self, _spec: &NewAgentProvisioning) -> bool {
        true
    }
}

/// Denies every design.
pub struct DenyAll;

impl ApprovalGate for DenyAll {
    fn approve(&self, _spec: &NewAgentProvisioning) -> bool {
        false
    }
}

/// What one generation did.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub generation: u32,
    /// Mean critic score per primary actor across the epoch.
    pub mean_scores: BTreeMap<String, f64>,
    /// `(agent_id, variant_id)` for every accepted mutation.
    pub accepted_variants: Vec<(String, String)>,
    /// Id of an agent mounted this generation, if any.
    pub created_agent: Option<String>,
    /// True when every episode terminated in agreement.
    pub all_agreement: bool,
}

/// The whole run, generation by generation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub reports: Vec<GenerationReport>,
    /// True when the run short-circuited on an all-agreement epoch.
    pub converged: bool,
}

/// Everything one episode worker needs, snapshotted so workers never borrow
/// the orchestrator.
#[derive(Clone)]
struct EpisodeBlueprint {
    config: Arc<SimulationConfig>,
    initial: StateObject,
    primary_order: Vec<String>,
    primary_ids: Vec<String>,
    roster: ActorRoster,
    created_specs: Vec<NewAgentProvisioning>,
    capitalizer: Option<Arc<dyn StrategicObserver>>,
    info_disruptor: Option<Arc<dyn InfoDisruptor>>,
    tension_disruptor: Option<Arc<dyn TensionDisruptor>>,
    sink: Arc<dyn EventSink>,
    critic: Arc<Critic>,
}

impl EpisodeBlueprint {
    /// Open a fresh environment, run one episode, judge it.
    async fn run_one(self) -> ConcordResult<EpochResult> {
        let mut env = Environment::new(&self.initial, self.primary_order.clone(), self.config.clone())
            .with_event_sink(self.sink.clone());
        if let Some(capitalizer) = &self.capitalizer {
            env = env.with_capitalizer(capitalizer.clone());
        }
        if let Some(info) = &self.info_disruptor {
            env = env.with_info_disruptor(info.clone());
        }
        if let Some(tension) = &self.tension_disruptor {
            env = env.with_tension_disruptor(tension.clone());
        }
        for spec in &self.created_specs {
            env.mount_agent(spec)?;
        }

        let outcome = env.run_episode(&self.roster).await?;
        let (result, _usage) = self
            .critic
            .evaluate(&self.initial, &outcome, &self.primary_ids)
            .await?;
        Ok(result)
    }
}

/// Drives generations of epochs, mutation, creation, and explorer sweeps.
pub struct Orchestrator {
    config: Arc<SimulationConfig>,
    gateway: Arc<dyn ModelGateway>,
    initial_state: StateObject,
    /// The live primary roster. Replaced entries are accepted mutations.
    actors: BTreeMap<String, Arc<PrimaryActor>>,
    /// Provisioned agents mounted into the live roster.
    created: Vec<(NewAgentProvisioning, Arc<CreatedActor>)>,
    critic: Arc<Critic>,
    mutator: Arc<StrategyMutator>,
    provisioner: Option<Provisioner>,
    explorer: Option<Explorer>,
    capitalizer: Option<Arc<dyn StrategicObserver>>,
    info_disruptor: Option<Arc<dyn InfoDisruptor>>,
    tension_disruptor: Option<Arc<dyn TensionDisruptor>>,
    approval: Arc<dyn ApprovalGate>,
    sink: Arc<dyn EventSink>,
    failed_archetypes: Vec<String>,
    creation_cooldown: u32,
    limiter: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        config: SimulationConfig,
        gateway: Arc<dyn ModelGateway>,
        initial_state: StateObject,
        primaries: Vec<PrimaryActor>,
    ) -> Self {
        let config = Arc::new(config);
        let limiter = Arc::new(Semaphore::new(config.max_concurrency));
        let critic = Arc::new(Critic::new(gateway.clone()));
        let mutator = Arc::new(StrategyMutator::new(gateway.clone(), config.clone()));
        let actors = primaries
            .into_iter()
            .map(|actor| (actor.id().to_string(), Arc::new(actor)))
            .collect();

        Self {
            config,
            gateway,
            initial_state,
            actors,
            created: Vec::new(),
            critic,
            mutator,
            provisioner: None,
            explorer: None,
            capitalizer: None,
            info_disruptor: None,
            tension_disruptor: None,
            approval: Arc::new(AutoApprove),
            sink: Arc::new(NullEventSink),
            failed_archetypes: Vec::new(),
            creation_cooldown: 0,
            limiter,
        }
    }

    pub fn with_provisioner(mut self, provisioner: Provisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_explorer(mut self, explorer: Explorer) -> Self {
        self.explorer = Some(explorer);
        self
    }

    pub fn with_capitalizer(mut self, capitalizer: Arc<dyn StrategicObserver>) -> Self {
        self.capitalizer = Some(capitalizer);
        self
    }

    pub fn with_info_disruptor(mut self, disruptor: Arc<dyn InfoDisruptor>) -> Self {
        self.info_disruptor = Some(disruptor);
        self
    }

    pub fn with_tension_disruptor(mut self, disruptor: Arc<dyn TensionDisruptor>) -> Self {
        self.tension_disruptor = Some(disruptor);
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = gate;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn failed_archetypes(&self) -> &[String] {
        &self.failed_archetypes
    }

    pub fn created_agents(&self) -> impl Iterator<Item = &NewAgentProvisioning> {
        self.created.iter().map(|(spec, _)| spec)
    }

    pub fn actor(&self, id: &str) -> Option<&Arc<PrimaryActor>> {
        self.actors.get(id)
    }

    pub fn plateau_counter(&self) -> u32 {
        self.mutator.plateau_counter()
    }

    /// Run generations until convergence or the configured bound.
    pub async fn run(&mut self) -> ConcordResult<RunSummary> {
        let mut reports = Vec::new();
        let mut converged = false;

        for generation in 0..self.config.max_generations {
            if self.creation_cooldown > 0 {
                self.creation_cooldown -= 1;
            }

            info!(generation, "generation starting");

            // ── Phase 1: Execution ───────────────────────────────────────────
            let epoch = self.run_epoch().await;
            if epoch.is_empty() {
                warn!(generation, "every episode in the epoch failed; skipping");
                continue;
            }

            let mean_scores = self.mean_scores(&epoch);
            let all_agreement = epoch
                .iter()
                .all(|r| r.termination_reason == TerminationReason::Agreement);

            if all_agreement {
                info!(generation, "all episodes agreed; run converged");
                reports.push(GenerationReport {
                    generation,
                    mean_scores,
                    accepted_variants: vec![],
                    created_agent: None,
                    all_agreement,
                });
                converged = true;
                break;
            }

            // ── Phase 2: Mutation ────────────────────────────────────────────
            let accepted = self.run_mutation_phase(&epoch).await;
            self.mutator.record_generation(!accepted.is_empty());

            // ── Phase 3: Creation ────────────────────────────────────────────
            let mut created_agent = None;
            if accepted.is_empty()
                && self.provisioner.is_some()
                && self.mutator.is_plateaued(self.config.creation_patience)
                && self.creation_cooldown == 0
                && (self.created.len() as u32) < self.config.max_active_created_agents
            {
                created_agent = self.attempt_creation(&epoch).await;
                self.creation_cooldown = self.config.creation_cooldown_generations;
                if created_agent.is_some() {
                    self.mutator.reset_plateau();
                }
            }

            // ── Phase 4: Explorer sweep ──────────────────────────────────────
            if let Some(explorer) = &self.explorer {
                if generation % self.config.scout_sweep_interval_generations == 0 {
                    let (hypotheses, _usage) = explorer.scan().await;
                    debug!(count = hypotheses.len(), "scout hypotheses refreshed");
                    self.initial_state.scout_hypotheses =
                        Some(hypotheses.iter().map(|h| h.to_scout()).collect());
                }
            }

            reports.push(GenerationReport {
                generation,
                mean_scores,
                accepted_variants: accepted,
                created_agent,
                all_agreement,
            });
        }

        Ok(RunSummary { reports, converged })
    }

    // ── Phase 1 internals ─────────────────────────────────────────────────────

    /// Launch `epoch_size` episodes under the concurrency limiter. Failed
    /// episodes are logged and skipped; the generation continues on
    /// whatever completed.
    async fn run_epoch(&self) -> Vec<EpochResult> {
        let blueprint = self.blueprint(self.sink.clone());
        let mut set = JoinSet::new();

        for _ in 0..self.config.epoch_size {
            let blueprint = blueprint.clone();
            let limiter = self.limiter.clone();
            set.spawn(async move {
                let _permit = limiter.acquire_owned().await.map_err(|_| {
                    ConcordError::Config {
                        reason: "concurrency limiter closed".to_string(),
                    }
                })?;
                blueprint.run_one().await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => warn!(error = %e, "episode failed; skipping"),
                Err(e) => warn!(error = %e, "episode worker aborted"),
            }
        }
        results
    }

    fn blueprint(&self, sink: Arc<dyn EventSink>) -> EpisodeBlueprint {
        let mut roster: ActorRoster = BTreeMap::new();
        for (id, actor) in &self.actors {
            roster.insert(id.clone(), actor.clone() as Arc<dyn TurnActor>);
        }
        for (spec, actor) in &self.created {
            roster.insert(spec.agent_id.clone(), actor.clone() as Arc<dyn TurnActor>);
        }

        let primary_ids: Vec<String> = self.actors.keys().cloned().collect();

        EpisodeBlueprint {
            config: self.config.clone(),
            initial: self.initial_state.clone(),
            primary_order: primary_ids.clone(),
            primary_ids,
            roster,
            created_specs: self.created.iter().map(|(spec, _)| spec.clone()).collect(),
            capitalizer: self.capitalizer.clone(),
            info_disruptor: self.info_disruptor.clone(),
            tension_disruptor: self.tension_disruptor.clone(),
            sink,
            critic: self.critic.clone(),
        }
    }

    fn mean_scores(&self, epoch: &[EpochResult]) -> BTreeMap<String, f64> {
        self.actors
            .keys()
            .map(|id| {
                let scores: Vec<f64> =
                    epoch.iter().map(|r| r.score_for(id) as f64).collect();
                (id.clone(), mean(&scores))
            })
            .collect()
    }

    // ── Phase 2 internals ─────────────────────────────────────────────────────

    /// Mutate every primary actor in parallel; apply accepted variants to
    /// the live roster. Returns `(agent_id, variant_id)` per acceptance.
    async fn run_mutation_phase(&mut self, epoch: &[EpochResult]) -> Vec<(String, String)> {
        let mut set = JoinSet::new();

        for (id, actor) in &self.actors {
            let mutator = self.mutator.clone();
            let runner = self.shadow_runner_for(id);
            let actor = actor.clone();
            let epoch = epoch.to_vec();
            let id = id.clone();
            set.spawn(async move {
                let outcome = mutator.mutate_actor(&actor, &epoch, &runner).await;
                (id, outcome)
            });
        }

        let mut accepted = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(MutationOutcome::Accepted { actor, variant_id, lcb, p_value }))) => {
                    info!(
                        agent_id = %id,
                        variant_id = %variant_id,
                        lcb,
                        p_value,
                        "strategy replaced in the live roster"
                    );
                    self.actors.insert(id.clone(), actor);
                    accepted.push((id, variant_id));
                }
                Ok((id, Ok(MutationOutcome::Rejected { best_lcb, p_value }))) => {
                    debug!(agent_id = %id, best_lcb, p_value, "no variant cleared the gate");
                }
                Ok((id, Err(e))) => warn!(agent_id = %id, error = %e, "mutation round failed"),
                Err(e) => warn!(error = %e, "mutation worker aborted"),
            }
        }
        accepted
    }

    /// Build the shadow-trial runner for one actor slot: fresh environments
    /// per trial, candidate substituted, opponents frozen, no event noise.
    fn shadow_runner_for(&self, target_id: &str) -> ShadowRunner {
        let base = self.blueprint(Arc::new(NullEventSink));
        let limiter = self.limiter.clone();
        let target = target_id.to_string();

        Arc::new(move |candidate, plan: ShadowPlan| {
            let mut blueprint = base.clone();
            let limiter = limiter.clone();
            let target = target.clone();

            Box::pin(async move {
                if let Some(cap) = plan.max_turns {
                    let mut config = (*blueprint.config).clone();
                    config.max_turns_per_episode = cap;
                    blueprint.config = Arc::new(config);
                }
                blueprint
                    .roster
                    .insert(target.clone(), candidate as Arc<dyn TurnActor>);

                let mut set = JoinSet::new();
                for _ in 0..plan.episodes {
                    let blueprint = blueprint.clone();
                    let limiter = limiter.clone();
                    let target = target.clone();
                    set.spawn(async move {
                        let _permit = limiter.acquire_owned().await.map_err(|_| {
                            ConcordError::Config {
                                reason: "concurrency limiter closed".to_string(),
                            }
                        })?;
                        let result = blueprint.run_one().await?;
                        Ok::<f64, ConcordError>(result.score_for(&target) as f64)
                    });
                }

                let mut scores = Vec::new();
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok(Ok(score)) => scores.push(score),
                        Ok(Err(e)) => warn!(error = %e, "shadow trial failed; skipping"),
                        Err(e) => warn!(error = %e, "shadow trial worker aborted"),
                    }
                }
                Ok(scores)
            })
        })
    }

    // ── Phase 3 internals ─────────────────────────────────────────────────────

    /// Design, approve, shadow-test, and possibly mount a new participant.
    /// Every failure path archives the archetype (when one is known) and
    /// returns `None`.
    async fn attempt_creation(&mut self, epoch: &[EpochResult]) -> Option<String> {
        let provisioner = self.provisioner.as_ref()?;

        let (spec, _usage) = match provisioner
            .design_agent(&self.initial_state, epoch, &self.failed_archetypes)
            .await
        {
            Ok(design) => design,
            Err(e) => {
                warn!(error = %e, "provisioning failed");
                return None;
            }
        };

        if self.config.require_human_approval_for_creation && !self.approval.approve(&spec) {
            info!(archetype = %spec.archetype, "agent design denied by the approval gate");
            self.failed_archetypes.push(spec.archetype);
            return None;
        }

        let shadow_means = match self.run_creation_trials(&spec).await {
            Ok(means) if !means.is_empty() => means,
            Ok(_) => {
                warn!(archetype = %spec.archetype, "creation trials produced no results");
                self.failed_archetypes.push(spec.archetype);
                return None;
            }
            Err(e) => {
                warn!(archetype = %spec.archetype, error = %e, "creation trials failed");
                self.failed_archetypes.push(spec.archetype);
                return None;
            }
        };

        // Gate on overall primary performance: the new participant must lift
        // the whole table, not itself.
        let primary_ids: Vec<String> = self.actors.keys().cloned().collect();
        let baseline_means: Vec<f64> =
            epoch.iter().map(|r| r.mean_over(&primary_ids)).collect();
        let lcb = lower_confidence_bound(&shadow_means, self.config.acceptance_lcb_lambda);
        let p_value = mann_whitney_u_test(&shadow_means, &baseline_means).p_value;
        let clears = lcb > mean(&baseline_means) + self.config.improvement_margin
            && p_value < self.config.acceptance_p_value_threshold;

        if !clears {
            info!(
                archetype = %spec.archetype,
                lcb,
                p_value,
                "new agent rejected by the acceptance gate"
            );
            self.failed_archetypes.push(spec.archetype);
            return None;
        }

        let agent_id = spec.agent_id.clone();
        let actor = Arc::new(CreatedActor::from_spec(&spec, self.gateway.clone()));
        info!(
            agent_id = %agent_id,
            archetype = %spec.archetype,
            lcb,
            p_value,
            "new agent mounted into the live roster"
        );
        self.created.push((spec, actor));
        Some(agent_id)
    }

    /// Shadow-test a candidate agent: full episodes with it mounted,
    /// scored as the per-episode mean over the primary actors.
    async fn run_creation_trials(&self, spec: &NewAgentProvisioning) -> ConcordResult<Vec<f64>> {
        let mut blueprint = self.blueprint(Arc::new(NullEventSink));
        blueprint.created_specs.push(spec.clone());
        blueprint.roster.insert(
            spec.agent_id.clone(),
            Arc::new(CreatedActor::from_spec(spec, self.gateway.clone())) as Arc<dyn TurnActor>,
        );

        let mut set = JoinSet::new();
        for _ in 0..self.config.shadow_trial_count {
            let blueprint = blueprint.clone();
            let limiter = self.limiter.clone();
            set.spawn(async move {
                let _permit = limiter.acquire_owned().await.map_err(|_| {
                    ConcordError::Config {
                        reason: "concurrency limiter closed".to_string(),
                    }
                })?;
                let primary_ids = blueprint.primary_ids.clone();
                let result = blueprint.run_one().await?;
                Ok::<f64, ConcordError>(result.mean_over(&primary_ids))
            });
        }

        let mut means = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(score)) => means.push(score),
                Ok(Err(e)) => warn!(error = %e, "creation trial failed; skipping"),
                Err(e) => warn!(error = %e, "creation trial worker aborted"),
            }
        }
        Ok(means)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
