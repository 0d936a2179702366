//! Mutator payloads: candidate strategy variants and their sampling settings.

use serde::{Deserialize, Serialize};

/// Sampling settings attached to a strategy variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub temperature: f64,
    pub frequency_penalty: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            frequency_penalty: 0.0,
        }
    }
}

/// The mutator's raw structured output: a non-empty batch of variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantBatch {
    pub variants: Vec<StrategyVariant>,
}

/// One candidate replacement strategy for a primary actor.
///
/// The mutator proposes a non-empty ordered sequence of these; shadow trials
/// and the statistical acceptance gate decide which (if any) survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyVariant {
    pub variant_id: String,
    pub strategy_text: String,
    pub hyperparameters: Hyperparameters,
}
