//! Simulation configuration.
//!
//! `SimulationConfig` is deserialized from TOML (or constructed with
//! `Default::default()`). Every knob carries the engine's documented default
//! so a scenario file only needs to override what it cares about.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConcordError, ConcordResult};

fn default_max_turns_per_episode() -> u64 {
    20
}
fn default_max_episode_tokens() -> u64 {
    50_000
}
fn default_max_concurrency() -> usize {
    5
}
fn default_epoch_size() -> u32 {
    10
}
fn default_mutation_variants() -> u32 {
    3
}
fn default_shadow_trial_count() -> u32 {
    10
}
fn default_improvement_margin() -> f64 {
    0.5
}
fn default_acceptance_lcb_lambda() -> f64 {
    1.0
}
fn default_acceptance_p_value_threshold() -> f64 {
    0.05
}
fn default_creation_patience() -> u32 {
    5
}
fn default_max_active_created_agents() -> u32 {
    3
}
fn default_creation_cooldown_generations() -> u32 {
    3
}
fn default_require_human_approval_for_creation() -> bool {
    true
}
fn default_max_validation_retries() -> u32 {
    3
}
fn default_forced_concession_threshold() -> u32 {
    2
}
fn default_scout_sweep_interval_generations() -> u32 {
    5
}
fn default_info_disruptor_frequency() -> u64 {
    3
}
fn default_summarization_frequency() -> u64 {
    5
}
fn default_max_generations() -> u32 {
    100
}

/// Every tunable the engine and orchestrator read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Hard turn cap per episode.
    #[serde(default = "default_max_turns_per_episode")]
    pub max_turns_per_episode: u64,
    /// Episode-level token circuit breaker.
    #[serde(default = "default_max_episode_tokens")]
    pub max_episode_tokens: u64,
    /// Bounded-parallelism limit for episodes and shadow trials.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Episodes per generation.
    #[serde(default = "default_epoch_size")]
    pub epoch_size: u32,
    /// Variants requested from the mutator per actor per generation.
    #[serde(default = "default_mutation_variants")]
    pub mutation_variants: u32,
    /// Full shadow trials per surviving variant.
    #[serde(default = "default_shadow_trial_count")]
    pub shadow_trial_count: u32,
    /// δ a variant's LCB must clear above the baseline mean.
    #[serde(default = "default_improvement_margin")]
    pub improvement_margin: f64,
    /// λ multiplier on the population stddev in the LCB.
    #[serde(default = "default_acceptance_lcb_lambda")]
    pub acceptance_lcb_lambda: f64,
    /// Mann-Whitney significance cutoff.
    #[serde(default = "default_acceptance_p_value_threshold")]
    pub acceptance_p_value_threshold: f64,
    /// Plateau generations tolerated before provisioning triggers.
    #[serde(default = "default_creation_patience")]
    pub creation_patience: u32,
    /// Spawn cap on concurrently mounted created agents.
    #[serde(default = "default_max_active_created_agents")]
    pub max_active_created_agents: u32,
    /// Generations to wait after any creation attempt.
    #[serde(default = "default_creation_cooldown_generations")]
    pub creation_cooldown_generations: u32,
    /// Require a human in the loop before mounting a provisioned agent.
    #[serde(default = "default_require_human_approval_for_creation")]
    pub require_human_approval_for_creation: bool,
    /// Schema-fix attempts per turn before the penalty path.
    #[serde(default = "default_max_validation_retries")]
    pub max_validation_retries: u32,
    /// Penalties tolerated before the episode is declared corrupted.
    #[serde(default = "default_forced_concession_threshold")]
    pub forced_concession_threshold: u32,
    /// Explorer sweep cadence in generations.
    #[serde(default = "default_scout_sweep_interval_generations")]
    pub scout_sweep_interval_generations: u32,
    /// Information-disruptor cadence in turns.
    #[serde(default = "default_info_disruptor_frequency")]
    pub info_disruptor_frequency: u64,
    /// Context-prune cadence in turns.
    #[serde(default = "default_summarization_frequency")]
    pub summarization_frequency: u64,
    /// Outer generation-loop bound.
    #[serde(default = "default_max_generations")]
    pub max_generations: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        // Round-trip through an empty table so the serde defaults are the
        // single source of truth.
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl SimulationConfig {
    /// Parse `s` as a TOML configuration document.
    pub fn from_toml_str(s: &str) -> ConcordResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ConcordError::Config {
            reason: format!("failed to parse simulation config TOML: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> ConcordResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConcordError::Config {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject configurations the engine cannot run under.
    fn validate(&self) -> ConcordResult<()> {
        let positive: [(&str, u64); 7] = [
            ("max_turns_per_episode", self.max_turns_per_episode),
            ("max_concurrency", self.max_concurrency as u64),
            ("epoch_size", self.epoch_size as u64),
            ("mutation_variants", self.mutation_variants as u64),
            ("max_validation_retries", self.max_validation_retries as u64),
            ("info_disruptor_frequency", self.info_disruptor_frequency),
            ("summarization_frequency", self.summarization_frequency),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConcordError::Config {
                    reason: format!("'{key}' must be positive"),
                });
            }
        }
        if !(0.0..1.0).contains(&self.acceptance_p_value_threshold) {
            return Err(ConcordError::Config {
                reason: "'acceptance_p_value_threshold' must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
