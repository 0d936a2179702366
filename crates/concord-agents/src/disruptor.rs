//! Disruptors: controlled chaos on a cadence.
//!
//! The information disruptor fabricates news bulletins the environment
//! injects into the transcript; the tension disruptor re-reads the room
//! after every turn and overwrites the shared tension level.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use concord_contracts::error::ConcordResult;
use concord_contracts::log::ActionLogEntry;
use concord_contracts::meta::{InfoBulletin, TensionReading};
use concord_contracts::state::StateObject;
use concord_engine::traits::{InfoDisruptor, TensionDisruptor};
use concord_gateway::{request_object, ModelGateway, ModelRequest, PayloadKind, TokenUsage};

const INFO_SYSTEM: &str = "\
You are a wire service inventing one plausible external development that \
pressures the ongoing negotiation. React to the recent exchange; do not \
repeat an earlier headline. Severity reflects how hard the news hits the \
parties' positions.";

const TENSION_SYSTEM: &str = "\
You monitor the emotional temperature of a negotiation. From the transcript \
and current positions, rate the tension in the room from 1 (cordial) to 10 \
(on the verge of collapse).";

/// Fabricates bulletins on the environment's cadence.
pub struct InfoDisruptorAgent {
    gateway: Arc<dyn ModelGateway>,
}

impl InfoDisruptorAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl InfoDisruptor for InfoDisruptorAgent {
    async fn fabricate(
        &self,
        recent: &[ActionLogEntry],
    ) -> ConcordResult<(InfoBulletin, TokenUsage)> {
        let lines: Vec<String> = recent.iter().map(ActionLogEntry::public_line).collect();
        let user = serde_json::to_string_pretty(&json!({ "recent_transcript": lines }))
            .expect("bulletin context must serialize");

        let request = ModelRequest::structured(INFO_SYSTEM, user, PayloadKind::InfoBulletin);
        request_object(self.gateway.as_ref(), &request).await
    }
}

/// Re-gauges the shared tension level after every turn.
pub struct TensionDisruptorAgent {
    gateway: Arc<dyn ModelGateway>,
}

impl TensionDisruptorAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TensionDisruptor for TensionDisruptorAgent {
    async fn gauge(
        &self,
        log: &[ActionLogEntry],
        state: &StateObject,
    ) -> ConcordResult<(TensionReading, TokenUsage)> {
        let lines: Vec<String> = log.iter().map(ActionLogEntry::public_line).collect();
        let user = serde_json::to_string_pretty(&json!({
            "transcript": lines,
            "variables": state.variables,
            "previous_tension": state.global_tension_level(),
        }))
        .expect("tension context must serialize");

        let request = ModelRequest::structured(TENSION_SYSTEM, user, PayloadKind::TensionReading);
        request_object(self.gateway.as_ref(), &request).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
