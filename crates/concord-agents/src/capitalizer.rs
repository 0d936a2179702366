//! The capitalizer: spots exploitable overlap between the parties' private
//! positions and hands the current speaker a hint.
//!
//! Privacy is NOT this component's job — the environment redacts the hint
//! against other actors' monologues before it propagates.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use concord_contracts::error::ConcordResult;
use concord_contracts::log::ActionLogEntry;
use concord_contracts::meta::CapitalizerReport;
use concord_contracts::state::StateObject;
use concord_engine::traits::StrategicObserver;
use concord_gateway::{request_object, ModelGateway, ModelRequest, PayloadKind, TokenUsage};

const CAPITALIZER_SYSTEM: &str = "\
You watch a live negotiation from the inside: you can read every party's \
private monologue. Look for overlap between their true positions that the \
current speaker could capitalize on. Summarize the opportunity in your own \
words as a short strategic hint. Never quote another party's private \
reasoning verbatim.";

pub struct CapitalizerAgent {
    gateway: Arc<dyn ModelGateway>,
}

impl CapitalizerAgent {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl StrategicObserver for CapitalizerAgent {
    async fn observe(
        &self,
        recent: &[ActionLogEntry],
        state: &StateObject,
    ) -> ConcordResult<(CapitalizerReport, TokenUsage)> {
        let user = serde_json::to_string_pretty(&json!({
            "current_speaker_id": state.current_speaker_id,
            "recent_exchange": recent,
            "variables": state.variables,
        }))
        .expect("capitalizer context must serialize");

        let request =
            ModelRequest::structured(CAPITALIZER_SYSTEM, user, PayloadKind::CapitalizerReport);
        request_object(self.gateway.as_ref(), &request).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use concord_contracts::state::StateObject;
    use concord_engine::traits::StrategicObserver;
    use concord_gateway::{PayloadKind, ScriptedGateway};

    use super::CapitalizerAgent;

    #[tokio::test]
    async fn returns_the_scripted_report() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.enqueue(
            PayloadKind::CapitalizerReport,
            json!({
                "overlap_detected": true,
                "confidence_score": 7,
                "strategic_hint": "Both sides privately value the timeline over the rate.",
                "rationale": "timeline concerns appear on both sides"
            }),
        );

        let capitalizer = CapitalizerAgent::new(gateway);
        let state = StateObject::new(serde_json::Map::new());
        let (report, usage) = capitalizer.observe(&[], &state).await.unwrap();

        assert!(report.overlap_detected);
        assert_eq!(report.confidence_score, 7);
        assert!(usage.total() > 0);
    }
}
