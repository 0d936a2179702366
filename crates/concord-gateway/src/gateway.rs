//! The single entry point to a language model.
//!
//! Every component that needs model output — actors, critic, capitalizer,
//! disruptors, mutator, provisioner, explorer — goes through `ModelGateway`.
//! The gateway returns raw values plus token accounting; `request_object`
//! layers schema validation and typed decoding on top, producing the
//! `SchemaValidation` errors the environment's retry loop feeds back to the
//! model.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use concord_contracts::error::{ConcordError, ConcordResult};

use crate::schemas::{validate_payload, PayloadKind};

/// Token accounting for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Fold another call's usage into this accumulator.
    pub fn absorb(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// One request to the model backend.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Role-specific system content.
    pub system: String,
    /// The user-visible message (typically the serialized turn context).
    pub user: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Frequency penalty.
    pub frequency_penalty: f64,
    /// When set, the backend is asked for an object conforming to this
    /// payload kind; when `None`, free text is expected.
    pub payload: Option<PayloadKind>,
}

impl ModelRequest {
    /// A structured-object request with neutral sampling defaults.
    pub fn structured(system: impl Into<String>, user: impl Into<String>, kind: PayloadKind) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            frequency_penalty: 0.0,
            payload: Some(kind),
        }
    }

    /// A free-text request.
    pub fn free_text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            frequency_penalty: 0.0,
            payload: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, frequency_penalty: f64) -> Self {
        self.temperature = temperature;
        self.frequency_penalty = frequency_penalty;
        self
    }
}

/// A provider-agnostic model backend.
///
/// Implementations are untrusted in the same sense the agents are: whatever
/// they return is validated before any component acts on it. Transport and
/// provider failures surface as `ConcordError::Gateway` and are never
/// absorbed by the validation retry loop.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Request a raw JSON value (the backend's best attempt at the payload
    /// kind named in the request).
    async fn generate_value(&self, request: &ModelRequest) -> ConcordResult<(Value, TokenUsage)>;

    /// Request free text.
    async fn generate_text(&self, request: &ModelRequest) -> ConcordResult<(String, TokenUsage)>;
}

/// Request a schema-validated, typed object from the model.
///
/// The value is validated against the request's payload schema before it is
/// decoded; both failure modes map to `ConcordError::SchemaValidation`, the
/// one error class the environment's retry loop recovers from.
pub async fn request_object<T: DeserializeOwned>(
    gateway: &dyn ModelGateway,
    request: &ModelRequest,
) -> ConcordResult<(T, TokenUsage)> {
    let kind = request.payload.ok_or_else(|| ConcordError::Gateway {
        reason: "request_object requires a payload kind".to_string(),
    })?;

    let (value, usage) = gateway.generate_value(request).await?;

    validate_payload(kind, &value).map_err(|reason| {
        debug!(schema_id = kind.schema_id(), %reason, "payload rejected");
        ConcordError::SchemaValidation { reason }
    })?;

    let object: T = serde_json::from_value(value).map_err(|e| ConcordError::SchemaValidation {
        reason: format!("payload passed schema '{}' but failed to decode: {e}", kind.schema_id()),
    })?;

    Ok((object, usage))
}
