//! The explorer: periodic outside-the-table research.
//!
//! Scans an in-memory ingredient graph for cross-category convergence and
//! returns hypotheses whose summaries are injected into the debate. The
//! explorer never fails a generation: any error during structured
//! generation degrades to a deterministic single-hypothesis fallback.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use concord_contracts::scout::{ConvergenceHypothesis, HypothesisBatch, Ingredient};
use concord_gateway::{request_object, ModelGateway, ModelRequest, PayloadKind, TokenUsage};

const EXPLORER_SYSTEM: &str = "\
You research forces outside a negotiation that could reshape it. From the \
ingredient graph, propose convergence hypotheses: combinations of linked \
ingredients from different categories that, if realized, would disrupt a \
currently negotiated position. Rate feasibility honestly.";

/// Periodic researcher over a static ingredient graph.
pub struct Explorer {
    gateway: Arc<dyn ModelGateway>,
    ingredients: Vec<Ingredient>,
}

impl Explorer {
    pub fn new(gateway: Arc<dyn ModelGateway>, ingredients: Vec<Ingredient>) -> Self {
        Self {
            gateway,
            ingredients,
        }
    }

    /// Run one sweep. Infallible by design: generation errors fall back to
    /// [`Explorer::fallback_hypothesis`].
    pub async fn scan(&self) -> (Vec<ConvergenceHypothesis>, TokenUsage) {
        let user = serde_json::to_string_pretty(&json!({ "ingredients": self.ingredients }))
            .expect("ingredient graph must serialize");
        let request =
            ModelRequest::structured(EXPLORER_SYSTEM, user, PayloadKind::ConvergenceHypotheses);

        match request_object::<HypothesisBatch>(self.gateway.as_ref(), &request).await {
            Ok((batch, usage)) if !batch.hypotheses.is_empty() => (batch.hypotheses, usage),
            Ok((_, usage)) => {
                warn!("explorer sweep returned no hypotheses; using fallback");
                (vec![self.fallback_hypothesis()], usage)
            }
            Err(e) => {
                warn!(error = %e, "explorer sweep failed; using fallback");
                (vec![self.fallback_hypothesis()], TokenUsage::default())
            }
        }
    }

    /// Deterministic single hypothesis built from the graph itself: the
    /// first cross-category link, or a neutral placeholder for a graph too
    /// small to connect.
    fn fallback_hypothesis(&self) -> ConvergenceHypothesis {
        let pair = self.ingredients.iter().find_map(|a| {
            a.links.iter().find_map(|link| {
                self.ingredients
                    .iter()
                    .find(|b| &b.id == link && b.category != a.category)
                    .map(|b| (a, b))
            })
        });

        match pair {
            Some((a, b)) => ConvergenceHypothesis {
                title: format!("{} converges with {}", a.label, b.label),
                feasibility_score: 5,
                disruption_target: b.category.clone(),
                rationale: format!(
                    "linked ingredients '{}' and '{}' sit in different categories",
                    a.id, b.id
                ),
            },
            None => ConvergenceHypothesis {
                title: "No cross-category convergence found".to_string(),
                feasibility_score: 1,
                disruption_target: String::new(),
                rationale: "the ingredient graph has no cross-category links".to_string(),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
