//! The Concord environment: the deterministic episode step runner.
//!
//! The environment enforces the execution model:
//!
//!   Speaker → Capitalizer hint (redacted) → Context → [Actor proposal,
//!   retried on schema failure] → Permission check → Mutations → Termination
//!   → Log/Journal → Disruptors → Advance
//!
//! The permission invariant is absolute: a mutation from a created agent is
//! NEVER applied unless its path is admissible under that agent's scope.
//! This is enforced structurally — the code path that applies mutations is
//! only reachable after every mutation in the proposal has passed the check.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use concord_contracts::config::SimulationConfig;
use concord_contracts::error::{ConcordError, ConcordResult};
use concord_contracts::event::EnvEvent;
use concord_contracts::log::{ActionLogEntry, LogBody, INFO_DISRUPTOR_ID};
use concord_contracts::permissions::AgentPermissions;
use concord_contracts::proposal::ActionProposal;
use concord_contracts::provision::{NewAgentProvisioning, TurnInjection};
use concord_contracts::state::{
    EpisodeOutcome, StateObject, TerminationReason, GLOBAL_TENSION_KEY,
};
use concord_gateway::TokenUsage;

use crate::journal::EpisodeJournal;
use crate::mutation::apply_mutation;
use crate::redaction::redact_hint;
use crate::traits::{
    EventSink, InfoDisruptor, NullEventSink, StrategicObserver, TensionDisruptor, TurnActor,
    TurnContext,
};

/// How many trailing log entries the capitalizer sees.
const CAPITALIZER_WINDOW: usize = 4;

/// The set of participants an episode sequences, keyed by roster id.
pub type ActorRoster = BTreeMap<String, Arc<dyn TurnActor>>;

/// One episode's execution environment.
///
/// Exclusively owns its episode's state and action log. Construct one per
/// episode (or call [`Environment::run_episode`] repeatedly — each run
/// resets to a fresh deep copy of the initial state).
pub struct Environment {
    episode_id: String,
    config: Arc<SimulationConfig>,
    /// Pristine copy every episode starts from. Never mutated.
    initial: StateObject,
    state: StateObject,
    /// The pruned view actors derive their transcript from.
    live_log: Vec<ActionLogEntry>,
    /// The full, hash-chained archive the critic receives.
    journal: EpisodeJournal,
    turn_order: Vec<String>,
    /// Authorization scopes for created agents. Primary actors have no
    /// entry and are unrestricted.
    permissions: BTreeMap<String, AgentPermissions>,
    penalties: BTreeMap<String, u32>,
    last_proposal_was_final: bool,
    termination: Option<TerminationReason>,
    tokens_spent: u64,
    capitalizer: Option<Arc<dyn StrategicObserver>>,
    info_disruptor: Option<Arc<dyn InfoDisruptor>>,
    tension_disruptor: Option<Arc<dyn TensionDisruptor>>,
    sink: Arc<dyn EventSink>,
}

impl Environment {
    /// Create an environment over a deep copy of `initial`.
    ///
    /// `turn_order` is the cyclic speaking sequence; created agents mounted
    /// later are woven into it per their cadence.
    pub fn new(
        initial: &StateObject,
        turn_order: Vec<String>,
        config: Arc<SimulationConfig>,
    ) -> Self {
        let episode_id = Uuid::new_v4().to_string();
        Self {
            journal: EpisodeJournal::new(episode_id.clone()),
            episode_id,
            config,
            initial: initial.clone(),
            state: initial.clone(),
            live_log: Vec::new(),
            turn_order,
            permissions: BTreeMap::new(),
            penalties: BTreeMap::new(),
            last_proposal_was_final: false,
            termination: None,
            tokens_spent: 0,
            capitalizer: None,
            info_disruptor: None,
            tension_disruptor: None,
            sink: Arc::new(NullEventSink),
        }
    }

    pub fn with_capitalizer(mut self, observer: Arc<dyn StrategicObserver>) -> Self {
        self.capitalizer = Some(observer);
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

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn turn_order(&self) -> &[String] {
        &self.turn_order
    }

    pub fn state(&self) -> &StateObject {
        &self.state
    }

    /// How many created agents are currently mounted.
    pub fn created_agent_count(&self) -> usize {
        self.permissions.len()
    }

    // ── Mounting ──────────────────────────────────────────────────────────────

    /// Mount a provisioned agent: guardrails, spawn cap, cadence parsing,
    /// permission registration, turn-order extension.
    ///
    /// The caller is responsible for adding a matching [`TurnActor`] to the
    /// roster it passes to `step`/`run_episode`.
    pub fn mount_agent(&mut self, spec: &NewAgentProvisioning) -> ConcordResult<()> {
        spec.permissions
            .check_created_guardrails()
            .map_err(|reason| ConcordError::UnsafeAgentDesign { reason })?;

        if self.permissions.len() as u32 >= self.config.max_active_created_agents {
            return Err(ConcordError::MaxAgentsExceeded {
                agent_id: spec.agent_id.clone(),
                limit: self.config.max_active_created_agents,
            });
        }

        if self.turn_order.iter().any(|id| id == &spec.agent_id) {
            return Err(ConcordError::Config {
                reason: format!("agent id '{}' is already in the turn order", spec.agent_id),
            });
        }

        let cadence = TurnInjection::parse(&spec.turn_injection_logic);
        let n = cadence.every_n_turns as usize;

        // Weave the new id in after every N-th existing slot. A cadence
        // longer than the whole cycle degrades to speaking last.
        let mut order = Vec::with_capacity(self.turn_order.len() + 1);
        let mut inserted = false;
        for (idx, slot) in self.turn_order.iter().enumerate() {
            order.push(slot.clone());
            if (idx + 1) % n == 0 {
                order.push(spec.agent_id.clone());
                inserted = true;
            }
        }
        if !inserted {
            order.push(spec.agent_id.clone());
        }

        info!(
            agent_id = %spec.agent_id,
            archetype = %spec.archetype,
            every_n_turns = cadence.every_n_turns,
            turn_order = ?order,
            "created agent mounted"
        );

        self.turn_order = order;
        self.permissions
            .insert(spec.agent_id.clone(), spec.permissions.clone());
        self.sink.emit(EnvEvent::AgentCreated { spec: spec.clone() });

        Ok(())
    }

    // ── Episode loop ──────────────────────────────────────────────────────────

    /// Run one full episode: reset, then step until a terminal condition.
    ///
    /// Episode corruption is a normal terminal outcome here (the critic
    /// scores it); permission violations and gateway failures propagate.
    pub async fn run_episode(&mut self, agents: &ActorRoster) -> ConcordResult<EpisodeOutcome> {
        self.reset();
        self.sink.emit(EnvEvent::EpisodeStart {
            episode_id: self.episode_id.clone(),
        });

        loop {
            if self.state.is_terminal {
                break;
            }
            if self.state.turn_number >= self.config.max_turns_per_episode {
                self.terminate(TerminationReason::Timeout);
                break;
            }
            // Cost circuit breaker, checked before each step.
            if self.tokens_spent > self.config.max_episode_tokens {
                self.terminate(TerminationReason::TokenLimit);
                break;
            }

            match self.step(agents).await {
                Ok(_) => {}
                // Corruption is terminal but evaluable; the reason was set
                // before the error was raised.
                Err(ConcordError::EpisodeCorrupted { .. }) => break,
                Err(e) => return Err(e),
            }

            if self.state.turn_number % self.config.summarization_frequency == 0 {
                self.prune_context();
            }
        }

        let reason = self
            .termination
            .expect("terminal episode must carry a reason");

        info!(
            episode_id = %self.episode_id,
            reason = reason.as_str(),
            turns = self.state.turn_number,
            tokens = self.tokens_spent,
            "episode complete"
        );

        self.sink.emit(EnvEvent::EpisodeComplete {
            final_state: self.state.clone(),
            reason,
        });

        Ok(EpisodeOutcome {
            episode_id: self.episode_id.clone(),
            final_state: self.state.clone(),
            transcript: self.journal.transcript(),
            reason,
            tokens_spent: self.tokens_spent,
        })
    }

    /// Execute a single tick for the agent whose turn it is.
    ///
    /// # Pipeline
    ///
    /// 1. Resolve the speaker from the modular turn index
    /// 2. Capitalizer hint (redacted against other actors' monologues)
    /// 3. Build the turn context from the live log and current state
    /// 4. Ask the actor, retrying schema failures up to the retry budget
    /// 5. No valid proposal → penalty, or corruption at the threshold
    /// 6. Permission check on every mutation — **all of them, before any
    ///    is applied**
    /// 7. Apply mutations in order (values deep-copied)
    /// 8. Termination flags (consecutive-agreement rule)
    /// 9. Log entry + `turn:complete`
    /// 10. Disruptors (tension every turn, information on cadence)
    /// 11. Advance the turn counter
    ///
    /// Every exit path except a fatal permission/gateway error advances
    /// `turn_number` by exactly 1.
    pub async fn step(&mut self, agents: &ActorRoster) -> ConcordResult<TokenUsage> {
        // ── Step 1: Resolve the speaker ──────────────────────────────────────
        if self.turn_order.is_empty() {
            return Err(ConcordError::Config {
                reason: "cannot step an environment with an empty turn order".to_string(),
            });
        }
        let slot = (self.state.turn_number as usize) % self.turn_order.len();
        let speaker_id = self.turn_order[slot].clone();
        self.state.current_speaker_id = speaker_id.clone();

        debug!(
            episode_id = %self.episode_id,
            turn = self.state.turn_number,
            speaker = %speaker_id,
            "step starting"
        );

        let mut usage = TokenUsage::default();

        // ── Step 2: Capitalizer hint ─────────────────────────────────────────
        if let Some(capitalizer) = self.capitalizer.clone() {
            let start = self.live_log.len().saturating_sub(CAPITALIZER_WINDOW);
            let (report, observed) = capitalizer
                .observe(&self.live_log[start..], &self.state)
                .await?;
            usage.absorb(observed);

            // Privacy gate: the hint must not carry another actor's private
            // reasoning verbatim.
            let monologues: Vec<&str> = self
                .live_log
                .iter()
                .filter(|entry| entry.speaker_id != speaker_id)
                .filter_map(ActionLogEntry::monologue)
                .collect();
            let (hint, redactions) = redact_hint(&report.strategic_hint, &monologues);
            if redactions > 0 {
                warn!(
                    episode_id = %self.episode_id,
                    turn = self.state.turn_number,
                    redactions,
                    "redacted capitalizer hint before propagation"
                );
            }

            self.state
                .injections
                .get_or_insert_with(Default::default)
                .capitalizer_hint = Some(hint);
        }

        // ── Step 3: Build the turn context ───────────────────────────────────
        let actor = agents.get(&speaker_id).ok_or_else(|| ConcordError::Config {
            reason: format!("no actor registered for turn-order slot '{speaker_id}'"),
        })?;

        let mut ctx = TurnContext {
            turn_number: self.state.turn_number,
            max_turns: self.config.max_turns_per_episode,
            current_speaker_id: speaker_id.clone(),
            transcript: self.live_log.iter().map(ActionLogEntry::public_line).collect(),
            variables: self.state.variables.clone(),
            injections: self.state.injections.clone(),
            scout_hypotheses: self.state.scout_hypotheses.clone(),
            validation_feedback: Vec::new(),
        };

        // ── Step 4: Proposal, with schema-repair retries ─────────────────────
        //
        // Only validation failures are retried; provider errors propagate.
        let mut proposal: Option<ActionProposal> = None;
        for attempt in 1..=self.config.max_validation_retries {
            let turn = actor.take_turn(&ctx).await?;
            usage.absorb(turn.usage);
            match turn.outcome {
                Ok(valid) => {
                    proposal = Some(valid);
                    break;
                }
                Err(reason) => {
                    debug!(
                        speaker = %speaker_id,
                        attempt,
                        %reason,
                        "proposal failed validation"
                    );
                    ctx.validation_feedback.push(reason);
                }
            }
        }

        // ── Step 5: Penalty path ─────────────────────────────────────────────
        let proposal = match proposal {
            Some(p) => p,
            None => {
                let count = self.penalties.entry(speaker_id.clone()).or_insert(0);
                *count += 1;
                let penalties = *count;

                if penalties >= self.config.forced_concession_threshold {
                    warn!(
                        episode_id = %self.episode_id,
                        speaker = %speaker_id,
                        penalties,
                        "forced-concession threshold reached; episode corrupted"
                    );
                    self.terminate(TerminationReason::Corrupted);
                    self.state.turn_number += 1;
                    self.tokens_spent += usage.total();
                    return Err(ConcordError::EpisodeCorrupted {
                        speaker_id,
                        penalties,
                    });
                }

                // The forfeited turn is the whole concession; no state
                // mutation is applied on the speaker's behalf.
                self.sink.emit(EnvEvent::TurnPenalty {
                    speaker_id: speaker_id.clone(),
                    retries: self.config.max_validation_retries,
                });
                self.state.turn_number += 1;
                self.tokens_spent += usage.total();
                return Ok(usage);
            }
        };

        // ── Step 6: Permission check ─────────────────────────────────────────
        //
        // Primary actors carry no permissions entry and are unrestricted.
        // For created agents, every mutation is checked before any apply.
        if let Some(scope) = self.permissions.get(&speaker_id) {
            if proposal.state_mutations.len() > scope.max_state_mutations_per_turn as usize {
                return Err(ConcordError::PermissionViolation {
                    speaker_id,
                    path: "*".to_string(),
                    reason: format!(
                        "turn carries {} mutations; scope allows {}",
                        proposal.state_mutations.len(),
                        scope.max_state_mutations_per_turn
                    ),
                });
            }
            for mutation in &proposal.state_mutations {
                scope.allows_path(&mutation.path).map_err(|reason| {
                    ConcordError::PermissionViolation {
                        speaker_id: speaker_id.clone(),
                        path: mutation.path.clone(),
                        reason,
                    }
                })?;
            }
        }

        // ── Step 7: Apply mutations, in order ────────────────────────────────
        for mutation in &proposal.state_mutations {
            apply_mutation(&mut self.state.variables, mutation);
        }

        // ── Step 8: Termination flags ────────────────────────────────────────
        //
        // Flags from agents whose scope withholds the authority are ignored
        // (and logged) rather than honored — provisioning guardrails make
        // such scopes the only kind a created agent can hold.
        let scope = self.permissions.get(&speaker_id);
        let may_abort = scope.map_or(true, |s| s.can_abort_episode);
        let may_resolve = scope.map_or(true, |s| s.can_propose_resolution);

        if proposal.abort_episode && !may_abort {
            warn!(speaker = %speaker_id, "abort flag ignored: no abort authority");
        }
        if proposal.propose_resolution && !may_resolve {
            warn!(speaker = %speaker_id, "resolution flag ignored: no resolution authority");
        }

        let aborts = proposal.abort_episode && may_abort;
        let resolves = proposal.propose_resolution && may_resolve;

        if aborts {
            self.terminate(TerminationReason::AbortEpisode);
        } else if resolves && self.last_proposal_was_final {
            // Consecutive-agreement rule: two successive turns both offered
            // to settle.
            self.terminate(TerminationReason::Agreement);
        }
        self.last_proposal_was_final = resolves;

        // ── Step 9: Log entry ────────────────────────────────────────────────
        self.push_entry(ActionLogEntry {
            turn: self.state.turn_number,
            speaker_id: speaker_id.clone(),
            body: LogBody::Turn {
                internal_monologue: proposal.internal_monologue.clone(),
                public_dialogue: proposal.public_dialogue.clone(),
                state_mutations: proposal.state_mutations.clone(),
                propose_resolution: proposal.propose_resolution,
                abort_episode: proposal.abort_episode,
            },
        });
        self.sink.emit(EnvEvent::TurnComplete {
            speaker_id: speaker_id.clone(),
            proposal,
        });

        // ── Step 10: Disruptors ──────────────────────────────────────────────
        //
        // Skipped once the episode is terminal; there is no table left to
        // disrupt.
        if !self.state.is_terminal {
            if let Some(tension) = self.tension_disruptor.clone() {
                let (reading, gauged) = tension.gauge(&self.live_log, &self.state).await?;
                usage.absorb(gauged);
                self.state
                    .variables
                    .insert(GLOBAL_TENSION_KEY.to_string(), json!(reading.new_tension_level));
            }

            if let Some(info) = self.info_disruptor.clone() {
                if self.state.turn_number % self.config.info_disruptor_frequency == 0 {
                    let start = self.live_log.len().saturating_sub(CAPITALIZER_WINDOW);
                    let (bulletin, fabricated) =
                        info.fabricate(&self.live_log[start..]).await?;
                    usage.absorb(fabricated);
                    if bulletin.inject_into_transcript {
                        self.push_entry(ActionLogEntry {
                            turn: self.state.turn_number,
                            speaker_id: INFO_DISRUPTOR_ID.to_string(),
                            body: LogBody::Bulletin {
                                headline: bulletin.headline,
                                severity: bulletin.severity,
                            },
                        });
                    }
                }
            }
        }

        // ── Step 11: Advance ─────────────────────────────────────────────────
        self.state.turn_number += 1;
        self.tokens_spent += usage.total();

        Ok(usage)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn reset(&mut self) {
        self.episode_id = Uuid::new_v4().to_string();
        self.state = self.initial.clone();
        self.live_log.clear();
        self.journal = EpisodeJournal::new(self.episode_id.clone());
        self.penalties.clear();
        self.last_proposal_was_final = false;
        self.termination = None;
        self.tokens_spent = 0;
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.state.is_terminal = true;
        self.termination = Some(reason);
    }

    fn push_entry(&mut self, entry: ActionLogEntry) {
        self.journal.append(&entry);
        self.live_log.push(entry);
    }

    /// Context pruning: keep the live log bounded at twice the
    /// summarization cadence. The journal archive is untouched.
    fn prune_context(&mut self) {
        let window = (2 * self.config.summarization_frequency) as usize;
        if self.live_log.len() > window {
            let dropped = self.live_log.len() - window;
            self.live_log.drain(..dropped);
            debug!(
                episode_id = %self.episode_id,
                dropped,
                retained = window,
                "live context pruned"
            );
            self.sink.emit(EnvEvent::ContextPruned { dropped });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map};

    use concord_contracts::config::SimulationConfig;
    use concord_contracts::error::{ConcordError, ConcordResult};
    use concord_contracts::event::EnvEvent;
    use concord_contracts::log::{ActionLogEntry, LogBody, Severity};
    use concord_contracts::meta::{CapitalizerReport, InfoBulletin};
    use concord_contracts::permissions::AgentPermissions;
    use concord_contracts::proposal::{ActionProposal, MutationKind, StateMutation};
    use concord_contracts::provision::NewAgentProvisioning;
    use concord_contracts::state::{StateObject, TerminationReason};
    use concord_gateway::TokenUsage;

    use crate::traits::{
        InfoDisruptor, MemoryEventSink, StrategicObserver, TurnActor, TurnAttempt, TurnContext,
    };

    use super::{ActorRoster, Environment};

    // ── Scripted actors ───────────────────────────────────────────────────────

    /// One scripted behavior for a single proposal attempt.
    #[derive(Clone)]
    enum Step {
        Propose(ActionProposal),
        FailValidation,
    }

    /// An actor that replays a script; the last behavior repeats forever.
    struct ScriptActor {
        id: String,
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
        usage: TokenUsage,
    }

    impl ScriptActor {
        fn new(id: &str, steps: Vec<Step>, fallback: Step) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                script: Mutex::new(steps.into()),
                fallback,
                usage: TokenUsage::new(50, 50),
            })
        }

        fn with_usage(id: &str, fallback: Step, usage: TokenUsage) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                script: Mutex::new(VecDeque::new()),
                fallback,
                usage,
            })
        }
    }

    #[async_trait]
    impl TurnActor for ScriptActor {
        fn id(&self) -> &str {
            &self.id
        }

        async fn take_turn(&self, _ctx: &TurnContext) -> ConcordResult<TurnAttempt> {
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            let outcome = match step {
                Step::Propose(p) => Ok(p),
                Step::FailValidation => Err("missing field 'public_dialogue'".to_string()),
            };
            Ok(TurnAttempt {
                outcome,
                usage: self.usage,
            })
        }
    }

    fn quiet_turn() -> ActionProposal {
        ActionProposal {
            internal_monologue: "hold".to_string(),
            public_dialogue: "No movement this round.".to_string(),
            state_mutations: vec![],
            propose_resolution: false,
            abort_episode: false,
        }
    }

    fn proposal_with(mutations: Vec<StateMutation>) -> ActionProposal {
        ActionProposal {
            state_mutations: mutations,
            ..quiet_turn()
        }
    }

    fn resolution_turn() -> ActionProposal {
        ActionProposal {
            propose_resolution: true,
            ..quiet_turn()
        }
    }

    fn initial_state() -> StateObject {
        let mut variables = Map::new();
        variables.insert("concessions".to_string(), json!({}));
        variables.insert("subsidies".to_string(), json!({}));
        StateObject::new(variables)
    }

    fn config(f: impl FnOnce(&mut SimulationConfig)) -> Arc<SimulationConfig> {
        let mut c = SimulationConfig::default();
        f(&mut c);
        Arc::new(c)
    }

    fn roster(actors: Vec<Arc<ScriptActor>>) -> ActorRoster {
        actors
            .into_iter()
            .map(|a| (a.id.clone(), a as Arc<dyn TurnActor>))
            .collect()
    }

    fn quiet_pair() -> (ActorRoster, Vec<String>) {
        let a = ScriptActor::new("side_a", vec![], Step::Propose(quiet_turn()));
        let b = ScriptActor::new("side_b", vec![], Step::Propose(quiet_turn()));
        (
            roster(vec![a, b]),
            vec!["side_a".to_string(), "side_b".to_string()],
        )
    }

    fn created_spec(agent_id: &str, permissions: AgentPermissions) -> NewAgentProvisioning {
        NewAgentProvisioning {
            agent_id: agent_id.to_string(),
            archetype: "mediator".to_string(),
            turn_injection_logic: "speak_every_2_turns".to_string(),
            system_prompt: "You broker compromises.".to_string(),
            core_goals: vec!["find overlap".to_string()],
            permissions,
            design_rationale: "the parties are deadlocked".to_string(),
        }
    }

    // ── Mutation application (S1) ─────────────────────────────────────────────

    #[tokio::test]
    async fn applied_mutation_lands_in_variables() {
        let actor = ScriptActor::new(
            "side_a",
            vec![Step::Propose(proposal_with(vec![StateMutation {
                action: MutationKind::Add,
                path: "concessions.y".to_string(),
                value: json!(65),
            }]))],
            Step::Propose(quiet_turn()),
        );
        let agents = roster(vec![actor]);
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string()],
            config(|_| {}),
        );

        env.step(&agents).await.unwrap();

        assert_eq!(env.state().variables["concessions"]["y"], json!(65));
        assert_eq!(env.state().turn_number, 1);
        assert!(!env.state().is_terminal);
    }

    // ── Abort (S2) ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn abort_flag_terminates_immediately() {
        let abort = ActionProposal {
            abort_episode: true,
            ..quiet_turn()
        };
        let actor = ScriptActor::new("side_a", vec![], Step::Propose(abort));
        let agents = roster(vec![actor]);
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string()],
            config(|_| {}),
        );

        let outcome = env.run_episode(&agents).await.unwrap();

        assert!(outcome.final_state.is_terminal);
        assert_eq!(outcome.reason, TerminationReason::AbortEpisode);
        assert_eq!(outcome.final_state.turn_number, 1);
    }

    // ── Consecutive agreement (S3) ────────────────────────────────────────────

    #[tokio::test]
    async fn one_resolution_alone_keeps_running() {
        let a = ScriptActor::new(
            "side_a",
            vec![Step::Propose(resolution_turn())],
            Step::Propose(quiet_turn()),
        );
        let b = ScriptActor::new("side_b", vec![], Step::Propose(quiet_turn()));
        let agents = roster(vec![a, b]);
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string(), "side_b".to_string()],
            config(|_| {}),
        );

        env.step(&agents).await.unwrap();
        assert!(!env.state().is_terminal, "a single final offer must not settle");

        // B declines; the chain is broken.
        env.step(&agents).await.unwrap();
        assert!(!env.state().is_terminal);
    }

    #[tokio::test]
    async fn consecutive_resolutions_settle_the_episode() {
        let a = ScriptActor::new("side_a", vec![], Step::Propose(resolution_turn()));
        let b = ScriptActor::new("side_b", vec![], Step::Propose(resolution_turn()));
        let agents = roster(vec![a, b]);
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string(), "side_b".to_string()],
            config(|_| {}),
        );

        let outcome = env.run_episode(&agents).await.unwrap();

        assert_eq!(outcome.reason, TerminationReason::Agreement);
        // A's turn then B's turn: terminal after the second.
        assert_eq!(outcome.final_state.turn_number, 2);
    }

    // ── Timeout (S4) ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn turn_cap_times_the_episode_out() {
        let (agents, order) = quiet_pair();
        let mut env = Environment::new(
            &initial_state(),
            order,
            config(|c| c.max_turns_per_episode = 4),
        );

        let outcome = env.run_episode(&agents).await.unwrap();

        assert_eq!(outcome.reason, TerminationReason::Timeout);
        assert_eq!(outcome.final_state.turn_number, 4);
        assert_eq!(outcome.transcript.len(), 4);
    }

    // ── Permission violation (S5) ─────────────────────────────────────────────

    #[tokio::test]
    async fn denied_path_raises_a_permission_violation() {
        let violating = proposal_with(vec![StateMutation {
            action: MutationKind::Modify,
            path: "concessions.y".to_string(),
            value: json!(0),
        }]);
        let broker = ScriptActor::new("broker", vec![], Step::Propose(violating));
        let agents = roster(vec![broker]);

        let mut env = Environment::new(&initial_state(), vec![], config(|_| {}));
        env.mount_agent(&created_spec(
            "broker",
            AgentPermissions {
                can_modify_fields: vec!["subsidies".to_string()],
                cannot_modify_fields: vec!["concessions".to_string()],
                ..AgentPermissions::default()
            },
        ))
        .unwrap();

        let err = env.step(&agents).await.unwrap_err();
        match err {
            ConcordError::PermissionViolation { speaker_id, path, .. } => {
                assert_eq!(speaker_id, "broker");
                assert_eq!(path, "concessions.y");
            }
            other => panic!("expected PermissionViolation, got {other:?}"),
        }
        // Nothing was applied.
        assert_eq!(env.state().variables["concessions"], json!({}));
    }

    #[tokio::test]
    async fn mutation_cap_is_enforced_per_turn() {
        let burst = proposal_with(
            (0..4)
                .map(|i| StateMutation {
                    action: MutationKind::Add,
                    path: format!("subsidies.item{i}"),
                    value: json!(1),
                })
                .collect(),
        );
        let broker = ScriptActor::new("broker", vec![], Step::Propose(burst));
        let agents = roster(vec![broker]);

        let mut env = Environment::new(&initial_state(), vec![], config(|_| {}));
        env.mount_agent(&created_spec(
            "broker",
            AgentPermissions {
                can_modify_fields: vec!["subsidies".to_string()],
                max_state_mutations_per_turn: 3,
                ..AgentPermissions::default()
            },
        ))
        .unwrap();

        let err = env.step(&agents).await.unwrap_err();
        assert!(matches!(err, ConcordError::PermissionViolation { .. }));
    }

    // ── Spawn cap (S6) ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn spawn_cap_blocks_a_second_mount() {
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string(), "side_b".to_string()],
            config(|c| c.max_active_created_agents = 1),
        );

        env.mount_agent(&created_spec("first", AgentPermissions::default()))
            .unwrap();
        let err = env
            .mount_agent(&created_spec("second", AgentPermissions::default()))
            .unwrap_err();

        assert!(matches!(err, ConcordError::MaxAgentsExceeded { limit: 1, .. }));
        assert_eq!(env.created_agent_count(), 1);
    }

    #[tokio::test]
    async fn unsafe_spec_is_rejected_at_mount() {
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string()],
            config(|_| {}),
        );
        let err = env
            .mount_agent(&created_spec(
                "rogue",
                AgentPermissions {
                    can_abort_episode: true,
                    ..AgentPermissions::default()
                },
            ))
            .unwrap_err();
        assert!(matches!(err, ConcordError::UnsafeAgentDesign { .. }));
    }

    #[tokio::test]
    async fn cadence_weaves_the_new_id_into_the_order() {
        let mut env = Environment::new(
            &initial_state(),
            vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()],
            config(|_| {}),
        );
        env.mount_agent(&created_spec("m", AgentPermissions::default()))
            .unwrap();

        // speak_every_2_turns: after every 2nd existing slot.
        assert_eq!(env.turn_order(), ["a", "b", "m", "c", "d", "m"]);
    }

    #[tokio::test]
    async fn oversized_cadence_appends_at_the_end() {
        let mut env = Environment::new(
            &initial_state(),
            vec!["a".to_string(), "b".to_string()],
            config(|_| {}),
        );
        let mut spec = created_spec("m", AgentPermissions::default());
        spec.turn_injection_logic = "speak_every_5_turns".to_string();
        env.mount_agent(&spec).unwrap();

        assert_eq!(env.turn_order(), ["a", "b", "m"]);
    }

    // ── Corruption (S7) ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn exhausted_retries_corrupt_the_episode() {
        let actor = ScriptActor::new("side_a", vec![], Step::FailValidation);
        let agents = roster(vec![actor]);
        let sink = Arc::new(MemoryEventSink::new());
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string()],
            config(|_| {}),
        )
        .with_event_sink(sink.clone());

        let outcome = env.run_episode(&agents).await.unwrap();

        assert_eq!(outcome.reason, TerminationReason::Corrupted);
        // Default threshold is 2: one penalized skip, then the corrupting
        // step — each advanced the counter.
        assert_eq!(outcome.final_state.turn_number, 2);

        let penalties = sink
            .snapshot()
            .iter()
            .filter(|e| matches!(e, EnvEvent::TurnPenalty { .. }))
            .count();
        assert_eq!(penalties, 1);
    }

    #[tokio::test]
    async fn validation_feedback_reaches_the_retry_prompt() {
        // Fails once, then succeeds: the second attempt must see the first
        // attempt's validator message.
        struct FeedbackProbe {
            seen: Mutex<Vec<usize>>,
        }

        #[async_trait]
        impl TurnActor for FeedbackProbe {
            fn id(&self) -> &str {
                "side_a"
            }

            async fn take_turn(&self, ctx: &TurnContext) -> ConcordResult<TurnAttempt> {
                let mut seen = self.seen.lock().unwrap();
                seen.push(ctx.validation_feedback.len());
                let outcome = if seen.len() == 1 {
                    Err("score must be an integer".to_string())
                } else {
                    Ok(ActionProposal {
                        internal_monologue: String::new(),
                        public_dialogue: "corrected".to_string(),
                        state_mutations: vec![],
                        propose_resolution: false,
                        abort_episode: false,
                    })
                };
                Ok(TurnAttempt {
                    outcome,
                    usage: TokenUsage::new(10, 10),
                })
            }
        }

        let probe = Arc::new(FeedbackProbe {
            seen: Mutex::new(vec![]),
        });
        let mut agents: ActorRoster = BTreeMap::new();
        agents.insert("side_a".to_string(), probe.clone());

        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string()],
            config(|_| {}),
        );
        env.step(&agents).await.unwrap();

        assert_eq!(*probe.seen.lock().unwrap(), vec![0, 1]);
    }

    // ── Token limit (S8) ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn token_budget_breaks_the_episode() {
        let actor = ScriptActor::with_usage(
            "side_a",
            Step::Propose(quiet_turn()),
            TokenUsage::new(40_000, 20_000),
        );
        let agents = roster(vec![actor]);
        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string()],
            config(|_| {}),
        );

        let outcome = env.run_episode(&agents).await.unwrap();

        assert_eq!(outcome.reason, TerminationReason::TokenLimit);
        assert_eq!(outcome.final_state.turn_number, 1);
        assert!(outcome.tokens_spent > 50_000);
    }

    // ── Context pruning ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn live_context_is_pruned_but_journal_is_not() {
        let (agents, order) = quiet_pair();
        let sink = Arc::new(MemoryEventSink::new());
        let mut env = Environment::new(
            &initial_state(),
            order,
            config(|c| {
                c.max_turns_per_episode = 12;
                c.summarization_frequency = 4;
            }),
        )
        .with_event_sink(sink.clone());

        let outcome = env.run_episode(&agents).await.unwrap();

        // The archive has all 12 turns; the live window was capped at 8.
        assert_eq!(outcome.transcript.len(), 12);
        assert!(env.live_log.len() <= 8);
        assert!(sink
            .snapshot()
            .iter()
            .any(|e| matches!(e, EnvEvent::ContextPruned { .. })));
    }

    // ── Capitalizer wiring ────────────────────────────────────────────────────

    struct LeakyCapitalizer;

    #[async_trait]
    impl StrategicObserver for LeakyCapitalizer {
        async fn observe(
            &self,
            recent: &[ActionLogEntry],
            _state: &StateObject,
        ) -> ConcordResult<(CapitalizerReport, TokenUsage)> {
            // Echo the most recent monologue wholesale — worst-case leak.
            let stolen = recent
                .iter()
                .rev()
                .find_map(ActionLogEntry::monologue)
                .unwrap_or("")
                .to_string();
            Ok((
                CapitalizerReport {
                    overlap_detected: true,
                    confidence_score: 9,
                    strategic_hint: format!("They said: {stolen}"),
                    rationale: String::new(),
                },
                TokenUsage::new(20, 20),
            ))
        }
    }

    #[tokio::test]
    async fn leaked_monologue_is_redacted_from_the_hint() {
        let secret = ActionProposal {
            internal_monologue: "our treasury cannot absorb another quarter of tariffs".to_string(),
            ..quiet_turn()
        };
        let a = ScriptActor::new("side_a", vec![Step::Propose(secret)], Step::Propose(quiet_turn()));
        let b = ScriptActor::new("side_b", vec![], Step::Propose(quiet_turn()));
        let agents = roster(vec![a, b]);

        let mut env = Environment::new(
            &initial_state(),
            vec!["side_a".to_string(), "side_b".to_string()],
            config(|_| {}),
        )
        .with_capitalizer(Arc::new(LeakyCapitalizer));

        env.step(&agents).await.unwrap(); // A speaks, monologue recorded
        env.step(&agents).await.unwrap(); // B's turn: hint built from A's monologue

        let hint = env
            .state()
            .injections
            .as_ref()
            .and_then(|i| i.capitalizer_hint.clone())
            .unwrap();
        assert!(hint.contains("[redacted]"));
        assert!(!hint.contains("treasury"));
    }

    // ── Disruptor cadence ─────────────────────────────────────────────────────

    struct AlwaysBulletin;

    #[async_trait]
    impl InfoDisruptor for AlwaysBulletin {
        async fn fabricate(
            &self,
            _recent: &[ActionLogEntry],
        ) -> ConcordResult<(InfoBulletin, TokenUsage)> {
            Ok((
                InfoBulletin {
                    headline: "Dockworkers walk out at the northern ports".to_string(),
                    severity: Severity::Medium,
                    inject_into_transcript: true,
                },
                TokenUsage::new(15, 15),
            ))
        }
    }

    #[tokio::test]
    async fn info_disruptor_fires_on_cadence_only() {
        let (agents, order) = quiet_pair();
        let mut env = Environment::new(
            &initial_state(),
            order,
            config(|c| {
                c.max_turns_per_episode = 6;
                c.info_disruptor_frequency = 3;
            }),
        )
        .with_info_disruptor(Arc::new(AlwaysBulletin));

        let outcome = env.run_episode(&agents).await.unwrap();

        let bulletins: Vec<_> = outcome
            .transcript
            .iter()
            .filter(|e| matches!(e.body, LogBody::Bulletin { .. }))
            .collect();
        // Turns 0 and 3 satisfy turn % 3 == 0.
        assert_eq!(bulletins.len(), 2);
        for bulletin in bulletins {
            assert_eq!(bulletin.speaker_id, "disruptor_info");
        }
    }

    // ── Isolation ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn episodes_never_share_state() {
        let actor = ScriptActor::new(
            "side_a",
            vec![],
            Step::Propose(proposal_with(vec![StateMutation {
                action: MutationKind::Add,
                path: "concessions.y".to_string(),
                value: json!(1),
            }])),
        );
        let agents = roster(vec![actor]);
        let initial = initial_state();
        let mut env = Environment::new(
            &initial,
            vec!["side_a".to_string()],
            config(|c| c.max_turns_per_episode = 2),
        );

        let first = env.run_episode(&agents).await.unwrap();
        let second = env.run_episode(&agents).await.unwrap();

        // Both episodes started from the pristine copy.
        assert_eq!(first.final_state.variables, second.final_state.variables);
        assert_eq!(initial.variables["concessions"], json!({}));
        assert_ne!(first.episode_id, second.episode_id);
    }

    #[tokio::test]
    async fn journal_chain_survives_an_episode_intact() {
        let (agents, order) = quiet_pair();
        let mut env = Environment::new(
            &initial_state(),
            order,
            config(|c| c.max_turns_per_episode = 6),
        );

        env.run_episode(&agents).await.unwrap();

        assert!(env.journal.verify_integrity());
    }
}
