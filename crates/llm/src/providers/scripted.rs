//! Scripted LLM provider.
//!
//! Replies from a fixed queue or a closure and records every request it
//! receives. Used for offline runs and tests that need deterministic model
//! behaviour.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk};
use relay_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::Mutex;

type ResponderFn = dyn Fn(&LlmRequest) -> AppResult<LlmResponse> + Send + Sync;

enum Responder {
    Queue(Mutex<VecDeque<LlmResponse>>),
    Func(Box<ResponderFn>),
}

/// Deterministic LLM client.
pub struct ScriptedClient {
    responder: Responder,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    /// Reply with `responses` in order, then fail.
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responder: Responder::Queue(Mutex::new(responses.into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply with plain text responses in order.
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::new(texts.iter().map(|t| LlmResponse::text(t.as_ref())).collect())
    }

    /// Reply by calling `f` with each request.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&LlmRequest) -> AppResult<LlmResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Responder::Func(Box::new(f)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn respond(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        match &self.responder {
            Responder::Queue(queue) => queue
                .lock()
                .map_err(|_| AppError::Llm("Scripted response queue poisoned".to_string()))?
                .pop_front()
                .ok_or_else(|| AppError::Llm("Scripted client has no more responses".to_string())),
            Responder::Func(f) => f(request),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.respond(request)
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let response = self.respond(request)?;
        let model = response.model.clone();

        let mut chunks: Vec<AppResult<LlmStreamChunk>> = response
            .content
            .split_inclusive(' ')
            .map(|piece| {
                Ok(LlmStreamChunk {
                    content: piece.to_string(),
                    model: model.clone(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        chunks.push(Ok(LlmStreamChunk {
            content: String::new(),
            model,
            done: true,
            usage: Some(response.usage),
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
