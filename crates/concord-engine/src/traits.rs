//! Trait seams between the environment and the components it drives.
//!
//! The environment trusts nothing it is wired with: actor proposals pass
//! schema validation and permission checks, capitalizer hints are redacted,
//! disruptor outputs are schema-validated by the gateway before they arrive
//! here. The traits only define *when* each component is consulted.
//!
//! The meta-agents share no hierarchy — each is an independent capability
//! the environment composes.

use async_trait::async_trait;
use serde_json::{Map, Value};

use concord_contracts::error::ConcordResult;
use concord_contracts::event::EnvEvent;
use concord_contracts::log::ActionLogEntry;
use concord_contracts::meta::{CapitalizerReport, InfoBulletin, TensionReading};
use concord_contracts::proposal::ActionProposal;
use concord_contracts::scout::ScoutHypothesis;
use concord_contracts::state::{Injections, StateObject};
use concord_gateway::TokenUsage;

/// Everything a speaker sees when asked for a turn.
///
/// Built fresh by the environment at the top of each step; the transcript is
/// derived from the *live* (pruned) log, never from the full journal.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub turn_number: u64,
    pub max_turns: u64,
    pub current_speaker_id: String,
    /// Public transcript lines: dialogue for actor turns, headlines for
    /// disruptor bulletins. Monologues never appear.
    pub transcript: Vec<String>,
    /// The negotiated variables subtree, including environmental values such
    /// as the shared tension level.
    pub variables: Map<String, Value>,
    pub injections: Option<Injections>,
    pub scout_hypotheses: Option<Vec<ScoutHypothesis>>,
    /// Validator error messages accumulated across this turn's retries.
    /// Cleared between turns — retry context never outlives its turn.
    pub validation_feedback: Vec<String>,
}

/// The result of asking an actor for one proposal attempt.
///
/// Validation failures are data, not errors: the environment needs the
/// attempt's token usage either way, and only schema failures are retried.
#[derive(Debug)]
pub struct TurnAttempt {
    /// A validated proposal, or the validator's message for the retry prompt.
    pub outcome: Result<ActionProposal, String>,
    pub usage: TokenUsage,
}

/// A turn-taking participant: primary actor or created agent.
#[async_trait]
pub trait TurnActor: Send + Sync {
    /// The roster id this actor answers to.
    fn id(&self) -> &str;

    /// Produce one proposal attempt for the given context.
    ///
    /// Implementations convert schema-validation failures into
    /// `TurnAttempt::outcome = Err(..)` so usage is preserved; transport and
    /// provider failures propagate as hard errors.
    async fn take_turn(&self, ctx: &TurnContext) -> ConcordResult<TurnAttempt>;
}

/// The capitalizer: reads the recent exchange (monologues included) and
/// offers the current speaker a strategic hint.
#[async_trait]
pub trait StrategicObserver: Send + Sync {
    async fn observe(
        &self,
        recent: &[ActionLogEntry],
        state: &StateObject,
    ) -> ConcordResult<(CapitalizerReport, TokenUsage)>;
}

/// The information disruptor: fabricates news bulletins on cadence.
#[async_trait]
pub trait InfoDisruptor: Send + Sync {
    async fn fabricate(&self, recent: &[ActionLogEntry])
        -> ConcordResult<(InfoBulletin, TokenUsage)>;
}

/// The tension disruptor: re-reads the room after every turn.
#[async_trait]
pub trait TensionDisruptor: Send + Sync {
    async fn gauge(
        &self,
        log: &[ActionLogEntry],
        state: &StateObject,
    ) -> ConcordResult<(TensionReading, TokenUsage)>;
}

/// Consumer of the environment's event surface.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EnvEvent);
}

/// Discards every event. The default sink.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: EnvEvent) {}
}

/// Records every event for later inspection. Reference implementation used
/// by the tests and the demo.
#[derive(Default)]
pub struct MemoryEventSink {
    events: std::sync::Mutex<Vec<EnvEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events emitted so far, in order.
    pub fn snapshot(&self) -> Vec<EnvEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: EnvEvent) {
        self.events
            .lock()
            .expect("event sink lock poisoned")
            .push(event);
    }
}
