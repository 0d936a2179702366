//! Scripted demo scenarios.
//!
//! Each scenario wires real Concord components — environment, gateway
//! validation, permissions, journal, orchestrator — around the deterministic
//! scripted gateway, so the full pipeline runs with no model backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map};

use concord_agents::{CreatedActor, Critic, PrimaryActor, Provisioner};
use concord_contracts::config::SimulationConfig;
use concord_contracts::error::{ConcordError, ConcordResult};
use concord_contracts::mutate::Hyperparameters;
use concord_contracts::permissions::AgentPermissions;
use concord_contracts::provision::NewAgentProvisioning;
use concord_contracts::state::StateObject;
use concord_engine::traits::{MemoryEventSink, TurnActor};
use concord_engine::{ActorRoster, Environment};
use concord_evolve::Orchestrator;
use concord_gateway::{PayloadKind, ScriptedGateway};
use concord_memory::SqliteStore;

/// Config overrides shared by the demo scenarios, shown here as the TOML an
/// operator would ship.
const DEMO_CONFIG: &str = "
max_turns_per_episode = 6
epoch_size = 2
shadow_trial_count = 2
max_concurrency = 2
max_generations = 2
creation_patience = 1
";

fn demo_config() -> ConcordResult<SimulationConfig> {
    SimulationConfig::from_toml_str(DEMO_CONFIG)
}

fn trade_summit_state() -> StateObject {
    let mut variables = Map::new();
    variables.insert("concessions".to_string(), json!({}));
    variables.insert("tariffs".to_string(), json!({ "steel": 12, "grain": 7 }));
    variables.insert("global_tension_level".to_string(), json!(4));
    StateObject::new(variables)
}

fn primary(id: &str, identity: &str, strategy: &str, gateway: Arc<ScriptedGateway>) -> PrimaryActor {
    PrimaryActor::new(id, identity, strategy, Hyperparameters::default(), gateway)
}

fn proposal(
    monologue: &str,
    dialogue: &str,
    mutations: serde_json::Value,
    resolve: bool,
) -> serde_json::Value {
    json!({
        "internal_monologue": monologue,
        "public_dialogue": dialogue,
        "state_mutations": mutations,
        "propose_resolution": resolve,
        "abort_episode": false
    })
}

/// Scenario 1: one full episode ending in consecutive agreement, with the
/// transcript journaled, verified, and persisted.
pub async fn run_episode() -> ConcordResult<()> {
    println!("— Scenario: negotiated agreement —");

    let gateway = Arc::new(ScriptedGateway::new().repeating());
    gateway.enqueue(
        PayloadKind::ActionProposal,
        proposal(
            "steel is where they will bend",
            "We can open steel tariffs for discussion.",
            json!([{ "action": "add", "path": "concessions.steel", "value": 10 }]),
            false,
        ),
    );
    gateway.enqueue(
        PayloadKind::ActionProposal,
        proposal(
            "take the steel offer, close fast",
            "Acceptable, if grain stays untouched. We can settle here.",
            json!([{ "action": "modify", "path": "tariffs.steel", "value": 10 }]),
            true,
        ),
    );
    gateway.enqueue(
        PayloadKind::ActionProposal,
        proposal("done", "Agreed. Put it in writing.", json!([]), true),
    );

    let side_a = primary(
        "side_a",
        "You negotiate for the coastal bloc.",
        "Trade steel access for grain protection.",
        gateway.clone(),
    );
    let side_b = primary(
        "side_b",
        "You negotiate for the inland league.",
        "Settle quickly once steel moves.",
        gateway,
    );

    let mut roster: ActorRoster = BTreeMap::new();
    let order = vec!["side_a".to_string(), "side_b".to_string()];
    roster.insert("side_a".to_string(), Arc::new(side_a) as Arc<dyn TurnActor>);
    roster.insert("side_b".to_string(), Arc::new(side_b) as Arc<dyn TurnActor>);

    let sink = Arc::new(MemoryEventSink::new());
    let mut env = Environment::new(&trade_summit_state(), order, Arc::new(demo_config()?))
        .with_event_sink(sink.clone());

    let outcome = env.run_episode(&roster).await?;

    for entry in &outcome.transcript {
        println!("  [turn {}] {}", entry.turn, entry.public_line());
    }
    println!("  terminated: {}", outcome.reason.as_str());
    println!("  events emitted: {}", sink.snapshot().len());

    // Archive the run.
    let store = SqliteStore::open_in_memory()?;
    let generation_id = store.insert_generation(0, false, &json!({ "demo": "episode" }))?;
    store.insert_episode(
        generation_id,
        &outcome.episode_id,
        outcome.reason,
        None,
        None,
        &json!(outcome.final_state.variables),
        "complete",
    )?;
    store.insert_action_log(&outcome.episode_id, &outcome.transcript)?;
    println!(
        "  persisted transcript: {} entries",
        store.action_log(&outcome.episode_id)?.len()
    );

    println!();
    Ok(())
}

/// Scenario 2: an actor that keeps failing schema validation forfeits turns
/// until the episode is declared corrupted.
pub async fn run_corruption() -> ConcordResult<()> {
    println!("— Scenario: schema corruption —");

    // Every scripted payload is malformed, so every retry fails.
    let gateway = Arc::new(ScriptedGateway::new().repeating());
    gateway.enqueue(PayloadKind::ActionProposal, json!({ "gibberish": true }));

    let rogue = primary(
        "side_a",
        "You negotiate erratically.",
        "No strategy survives contact.",
        gateway,
    );
    let mut roster: ActorRoster = BTreeMap::new();
    roster.insert("side_a".to_string(), Arc::new(rogue) as Arc<dyn TurnActor>);

    let mut env = Environment::new(
        &trade_summit_state(),
        vec!["side_a".to_string()],
        Arc::new(demo_config()?),
    );
    let outcome = env.run_episode(&roster).await?;
    println!("  terminated: {}", outcome.reason.as_str());
    println!("  turns consumed by penalties: {}", outcome.final_state.turn_number);

    // The critic bypasses the model for corrupted runs.
    let critic = Critic::new(Arc::new(ScriptedGateway::new()));
    let (result, _) = critic
        .evaluate(&trade_summit_state(), &outcome, &["side_a".to_string()])
        .await?;
    println!("  hard-coded critic score: {}", result.scores["side_a"]);

    println!();
    Ok(())
}

/// Scenario 3: a created agent stepping outside its permission scope kills
/// the turn.
pub async fn run_permissions() -> ConcordResult<()> {
    println!("— Scenario: permission violation —");

    let gateway = Arc::new(ScriptedGateway::new().repeating());
    gateway.enqueue(
        PayloadKind::ActionProposal,
        proposal(
            "rewrite the concessions directly",
            "Allow me to adjust the concession table.",
            json!([{ "action": "modify", "path": "concessions.steel", "value": 0 }]),
            false,
        ),
    );

    let spec = NewAgentProvisioning {
        agent_id: "auditor_1".to_string(),
        archetype: "auditor".to_string(),
        turn_injection_logic: "speak_every_1_turn".to_string(),
        system_prompt: "You audit the subsidy ledger.".to_string(),
        core_goals: vec!["keep subsidies honest".to_string()],
        permissions: AgentPermissions {
            can_modify_fields: vec!["subsidies".to_string()],
            cannot_modify_fields: vec!["concessions".to_string()],
            ..AgentPermissions::default()
        },
        design_rationale: "subsidy claims keep drifting".to_string(),
    };

    let mut env = Environment::new(&trade_summit_state(), vec![], Arc::new(demo_config()?));
    env.mount_agent(&spec)?;
    println!("  mounted '{}' with scope subsidies/*", spec.agent_id);

    let mut roster: ActorRoster = BTreeMap::new();
    roster.insert(
        "auditor_1".to_string(),
        Arc::new(CreatedActor::from_spec(&spec, gateway)) as Arc<dyn TurnActor>,
    );

    match env.step(&roster).await {
        Err(ConcordError::PermissionViolation { path, .. }) => {
            println!("  violation caught at path '{path}' — episode raised");
        }
        other => println!("  unexpected outcome: {other:?}"),
    }

    println!();
    Ok(())
}

/// Scenario 4: a short generation loop — stalled epochs, a plateau, and a
/// provisioning attempt judged by the statistical gate.
pub async fn run_evolution() -> ConcordResult<()> {
    println!("— Scenario: generation loop —");

    let gateway = Arc::new(ScriptedGateway::new().repeating());
    gateway.enqueue(
        PayloadKind::ActionProposal,
        proposal("hold", "Our position stands.", json!([]), false),
    );
    gateway.enqueue(
        PayloadKind::CriticEvaluation,
        json!({
            "evaluations": [
                { "agent_id": "side_a", "score": 0, "rationale": "static" },
                { "agent_id": "side_b", "score": 0, "rationale": "static" }
            ]
        }),
    );
    gateway.enqueue(
        PayloadKind::MutatorVariants,
        json!({
            "variants": [{
                "variant_id": "v1",
                "strategy_text": "Lead with a grain-for-steel package.",
                "hyperparameters": { "temperature": 0.5, "frequency_penalty": 0.1 }
            }]
        }),
    );
    gateway.enqueue_text("Both delegations anchor on tariffs and re-state positions verbatim.");
    gateway.enqueue(
        PayloadKind::AgentProvisioning,
        json!({
            "agent_id": "mediator_1",
            "archetype": "mediator",
            "turn_injection_logic": "speak_every_2_turns",
            "system_prompt": "You broker compromises.",
            "core_goals": ["surface shared interests"],
            "permissions": {
                "can_modify_fields": ["mediation"],
                "cannot_modify_fields": ["concessions", "tariffs"],
                "can_abort_episode": false,
                "can_propose_resolution": false,
                "max_state_mutations_per_turn": 2
            },
            "design_rationale": "the table needs a third voice"
        }),
    );

    let mut orchestrator = Orchestrator::new(
        demo_config()?,
        gateway.clone(),
        trade_summit_state(),
        vec![
            primary(
                "side_a",
                "You negotiate for the coastal bloc.",
                "Concede nothing.",
                gateway.clone(),
            ),
            primary(
                "side_b",
                "You negotiate for the inland league.",
                "Stall for time.",
                gateway.clone(),
            ),
        ],
    )
    .with_provisioner(Provisioner::new(gateway));

    let summary = orchestrator.run().await?;

    for report in &summary.reports {
        println!(
            "  generation {}: mean scores {:?}, accepted {:?}, created {:?}",
            report.generation, report.mean_scores, report.accepted_variants, report.created_agent
        );
    }
    println!("  converged: {}", summary.converged);
    println!("  archived archetypes: {:?}", orchestrator.failed_archetypes());

    println!();
    Ok(())
}
