//! JSON Schema contracts for every model-produced payload.
//!
//! Nothing a model returns is trusted until it has passed the schema for its
//! payload kind. Validation collects every violation before returning so the
//! retry prompt shows the model the full failure set in one pass.

use std::sync::OnceLock;

use serde_json::{json, Value};

/// Every structured payload kind a model can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    ActionProposal,
    CriticEvaluation,
    CapitalizerReport,
    InfoBulletin,
    TensionReading,
    MutatorVariants,
    AgentProvisioning,
    ConvergenceHypotheses,
}

impl PayloadKind {
    /// Stable identifier used in logs and retry prompts.
    pub fn schema_id(&self) -> &'static str {
        match self {
            Self::ActionProposal => "action-proposal-v1",
            Self::CriticEvaluation => "critic-evaluation-v1",
            Self::CapitalizerReport => "capitalizer-report-v1",
            Self::InfoBulletin => "info-bulletin-v1",
            Self::TensionReading => "tension-reading-v1",
            Self::MutatorVariants => "mutator-variants-v1",
            Self::AgentProvisioning => "agent-provisioning-v1",
            Self::ConvergenceHypotheses => "convergence-hypotheses-v1",
        }
    }

    /// The JSON Schema document for this payload kind.
    pub fn schema(&self) -> &'static Value {
        match self {
            Self::ActionProposal => action_proposal_schema(),
            Self::CriticEvaluation => critic_evaluation_schema(),
            Self::CapitalizerReport => capitalizer_report_schema(),
            Self::InfoBulletin => info_bulletin_schema(),
            Self::TensionReading => tension_reading_schema(),
            Self::MutatorVariants => mutator_variants_schema(),
            Self::AgentProvisioning => agent_provisioning_schema(),
            Self::ConvergenceHypotheses => convergence_hypotheses_schema(),
        }
    }
}

/// Validate `payload` against the schema for `kind`.
///
/// On failure, returns a single message listing every violation — the
/// environment feeds this verbatim into the actor's retry context.
pub fn validate_payload(kind: PayloadKind, payload: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(kind.schema())
        .unwrap_or_else(|e| panic!("schema '{}' must compile: {e}", kind.schema_id()));

    let failures: Vec<String> = validator
        .iter_errors(payload)
        .map(|error| format!("at {}: {}", error.instance_path, error))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "payload does not satisfy schema '{}': {}",
            kind.schema_id(),
            failures.join("; ")
        ))
    }
}

// ── Schema documents ──────────────────────────────────────────────────────────

fn action_proposal_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["internal_monologue", "public_dialogue"],
            "properties": {
                "internal_monologue": { "type": "string" },
                "public_dialogue": { "type": "string" },
                "state_mutations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["action", "path", "value"],
                        "properties": {
                            "action": { "enum": ["modify", "add"] },
                            "path": { "type": "string", "minLength": 1 }
                        }
                    }
                },
                "propose_resolution": { "type": "boolean" },
                "abort_episode": { "type": "boolean" }
            }
        })
    })
}

fn critic_evaluation_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["evaluations"],
            "properties": {
                "evaluations": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["agent_id", "score", "rationale"],
                        "properties": {
                            "agent_id": { "type": "string", "minLength": 1 },
                            "score": { "type": "integer", "minimum": -5, "maximum": 5 },
                            "rationale": { "type": "string" }
                        }
                    }
                }
            }
        })
    })
}

fn capitalizer_report_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["overlap_detected", "confidence_score", "strategic_hint", "rationale"],
            "properties": {
                "overlap_detected": { "type": "boolean" },
                "confidence_score": { "type": "integer", "minimum": 1, "maximum": 10 },
                "strategic_hint": { "type": "string" },
                "rationale": { "type": "string" }
            }
        })
    })
}

fn info_bulletin_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["headline", "severity", "inject_into_transcript"],
            "properties": {
                "headline": { "type": "string", "minLength": 1 },
                "severity": { "enum": ["low", "medium", "high"] },
                "inject_into_transcript": { "type": "boolean" }
            }
        })
    })
}

fn tension_reading_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["new_tension_level", "rationale"],
            "properties": {
                "new_tension_level": { "type": "integer", "minimum": 1, "maximum": 10 },
                "rationale": { "type": "string" }
            }
        })
    })
}

fn mutator_variants_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["variants"],
            "properties": {
                "variants": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["variant_id", "strategy_text", "hyperparameters"],
                        "properties": {
                            "variant_id": { "type": "string", "minLength": 1 },
                            "strategy_text": { "type": "string", "minLength": 1 },
                            "hyperparameters": {
                                "type": "object",
                                "required": ["temperature", "frequency_penalty"],
                                "properties": {
                                    "temperature": { "type": "number", "minimum": 0.0, "maximum": 2.0 },
                                    "frequency_penalty": { "type": "number", "minimum": -2.0, "maximum": 2.0 }
                                }
                            }
                        }
                    }
                }
            }
        })
    })
}

fn agent_provisioning_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": [
                "agent_id", "archetype", "turn_injection_logic",
                "system_prompt", "permissions", "design_rationale"
            ],
            "properties": {
                "agent_id": { "type": "string", "minLength": 1 },
                "archetype": { "type": "string", "minLength": 1 },
                "turn_injection_logic": { "type": "string" },
                "system_prompt": { "type": "string", "minLength": 1 },
                "core_goals": { "type": "array", "items": { "type": "string" } },
                "permissions": {
                    "type": "object",
                    "properties": {
                        "can_modify_fields": { "type": "array", "items": { "type": "string" } },
                        "cannot_modify_fields": { "type": "array", "items": { "type": "string" } },
                        "can_abort_episode": { "type": "boolean" },
                        "can_propose_resolution": { "type": "boolean" },
                        "max_state_mutations_per_turn": { "type": "integer", "minimum": 0 }
                    }
                },
                "design_rationale": { "type": "string" }
            }
        })
    })
}

fn convergence_hypotheses_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["hypotheses"],
            "properties": {
                "hypotheses": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["title", "feasibility_score", "disruption_target", "rationale"],
                        "properties": {
                            "title": { "type": "string", "minLength": 1 },
                            "feasibility_score": { "type": "integer", "minimum": 1, "maximum": 10 },
                            "disruption_target": { "type": "string" },
                            "rationale": { "type": "string" }
                        }
                    }
                }
            }
        })
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
