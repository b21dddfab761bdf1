//! Transport seam for model providers
//!
//! The engine never talks to a provider SDK directly: it issues
//! `TransportRequest`s through the `LlmTransport` trait. A scripted
//! in-memory transport backs tests and offline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use veridex_contracts::ModelTier;
use veridex_resilience::ProviderFailure;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRequest {
    pub prompt_key: String,
    pub prompt: String,
    pub tier: ModelTier,
    pub temperature: f64,
    pub max_output_tokens: u64,
    pub deterministic: bool,
}

/// A completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResponse {
    pub text: String,
    pub tokens_used: u64,
}

/// Pluggable model transport. Implementations map provider SDK errors
/// into the duck-typed `ProviderFailure` shape.
#[async_trait]
pub trait LlmTransport: Send + Sync + std::fmt::Debug {
    async fn complete(&self, request: TransportRequest) -> Result<TransportResponse, ProviderFailure>;
}

/// One scripted reply for the scripted transport.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Failure(ProviderFailure),
}

impl ScriptedReply {
    pub fn json(value: serde_json::Value) -> Self {
        ScriptedReply::Text(value.to_string())
    }
}

/// In-memory transport replaying queued replies per prompt key.
///
/// Replies are consumed in FIFO order; the last reply for a key is
/// repeated when the queue drains, so loops over many claims can share
/// one canned response.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, prompt_key: &str, reply: ScriptedReply) {
        self.replies
            .lock()
            .entry(prompt_key.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn enqueue_json(&self, prompt_key: &str, value: serde_json::Value) {
        self.enqueue(prompt_key, ScriptedReply::json(value));
    }

    /// Requests seen so far, for assertions.
    pub fn recorded_requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, prompt_key: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.prompt_key == prompt_key)
            .count()
    }
}

#[async_trait]
impl LlmTransport for ScriptedTransport {
    async fn complete(&self, request: TransportRequest) -> Result<TransportResponse, ProviderFailure> {
        self.requests.lock().push(request.clone());
        let mut replies = self.replies.lock();
        let queue = replies.get_mut(&request.prompt_key);
        let reply = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(TransportResponse {
                tokens_used: (text.len() / 4) as u64,
                text,
            }),
            Some(ScriptedReply::Failure(failure)) => Err(failure),
            None => Err(ProviderFailure {
                provider: Some(veridex_contracts::ProviderKind::Llm),
                message: format!("no scripted reply for {}", request.prompt_key),
                ..Default::default()
            }),
        }
    }
}
