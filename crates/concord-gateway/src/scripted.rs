//! A deterministic, in-memory gateway implementation.
//!
//! `ScriptedGateway` serves pre-loaded responses per payload kind, in FIFO
//! order. It lets the full pipeline — episodes, epochs, mutation, creation —
//! run end-to-end with zero network access and byte-for-byte reproducible
//! output, which is what the demo scenarios and most of the test suite use.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use concord_contracts::error::{ConcordError, ConcordResult};

use crate::gateway::{ModelGateway, ModelRequest, TokenUsage};
use crate::schemas::PayloadKind;

struct Script {
    queues: HashMap<PayloadKind, VecDeque<Value>>,
    /// Last value served per kind, replayed when a queue runs dry and
    /// `repeat_when_dry` is set.
    last_served: HashMap<PayloadKind, Value>,
    text_queue: VecDeque<String>,
    last_text: Option<String>,
}

/// A gateway that replays canned responses.
pub struct ScriptedGateway {
    script: Mutex<Script>,
    usage_per_call: TokenUsage,
    repeat_when_dry: bool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                queues: HashMap::new(),
                last_served: HashMap::new(),
                text_queue: VecDeque::new(),
                last_text: None,
            }),
            usage_per_call: TokenUsage::new(120, 80),
            repeat_when_dry: false,
        }
    }

    /// Fix the token usage reported for every call.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = usage;
        self
    }

    /// Keep replaying the last response of a kind once its queue is empty.
    ///
    /// Long generation loops need unbounded turns; scripting every single
    /// one is pointless when the tail is repetitive.
    pub fn repeating(mut self) -> Self {
        self.repeat_when_dry = true;
        self
    }

    /// Queue one structured response for `kind`.
    pub fn enqueue(&self, kind: PayloadKind, value: Value) {
        let mut script = self.script.lock().expect("script lock poisoned");
        script.queues.entry(kind).or_default().push_back(value);
    }

    /// Queue one free-text response.
    pub fn enqueue_text(&self, text: impl Into<String>) {
        let mut script = self.script.lock().expect("script lock poisoned");
        script.text_queue.push_back(text.into());
    }
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn generate_value(&self, request: &ModelRequest) -> ConcordResult<(Value, TokenUsage)> {
        let kind = request.payload.ok_or_else(|| ConcordError::Gateway {
            reason: "scripted gateway asked for a value without a payload kind".to_string(),
        })?;

        let mut script = self.script.lock().expect("script lock poisoned");
        let next = script.queues.get_mut(&kind).and_then(VecDeque::pop_front);

        let value = match next {
            Some(value) => {
                script.last_served.insert(kind, value.clone());
                value
            }
            None if self.repeat_when_dry => script
                .last_served
                .get(&kind)
                .cloned()
                .ok_or_else(|| ConcordError::Gateway {
                    reason: format!("script exhausted for '{}'", kind.schema_id()),
                })?,
            None => {
                return Err(ConcordError::Gateway {
                    reason: format!("script exhausted for '{}'", kind.schema_id()),
                })
            }
        };

        Ok((value, self.usage_per_call))
    }

    async fn generate_text(&self, _request: &ModelRequest) -> ConcordResult<(String, TokenUsage)> {
        let mut script = self.script.lock().expect("script lock poisoned");
        let text = match script.text_queue.pop_front() {
            Some(text) => {
                script.last_text = Some(text.clone());
                text
            }
            None if self.repeat_when_dry => {
                script.last_text.clone().ok_or_else(|| ConcordError::Gateway {
                    reason: "text script exhausted".to_string(),
                })?
            }
            None => {
                return Err(ConcordError::Gateway {
                    reason: "text script exhausted".to_string(),
                })
            }
        };
        Ok((text, self.usage_per_call))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
