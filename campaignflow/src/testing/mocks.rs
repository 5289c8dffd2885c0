//! Scripted generation provider for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::generation::{GenerationError, GenerationProvider, GenerationRequest, GenerationResponse};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Delayed(Duration, String),
    Transient(String),
    Permanent(String),
}

/// A provider that replays per-stage scripts and records every request.
///
/// Each stage has a queue of replies consumed in order, plus an optional
/// fallback used once the queue is empty. A stage with neither gets a
/// permanent error, so unexpected invocations show up as failures.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    queues: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallbacks: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    released: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, stage: &str, reply: Reply) -> Self {
        self.queues
            .lock()
            .entry(stage.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn fallback(self, stage: &str, reply: Reply) -> Self {
        self.fallbacks.lock().insert(stage.to_string(), reply);
        self
    }

    /// Queues a text reply.
    #[must_use]
    pub fn respond(self, stage: &str, text: impl Into<String>) -> Self {
        self.push(stage, Reply::Text(text.into()))
    }

    /// Queues a JSON reply.
    #[must_use]
    pub fn respond_json(self, stage: &str, value: &serde_json::Value) -> Self {
        self.push(stage, Reply::Text(value.to_string()))
    }

    /// Queues a text reply delivered after a delay.
    #[must_use]
    pub fn respond_after(self, stage: &str, delay: Duration, text: impl Into<String>) -> Self {
        self.push(stage, Reply::Delayed(delay, text.into()))
    }

    /// Queues a transient failure.
    #[must_use]
    pub fn fail_transient(self, stage: &str, message: impl Into<String>) -> Self {
        self.push(stage, Reply::Transient(message.into()))
    }

    /// Queues a permanent failure.
    #[must_use]
    pub fn fail_permanent(self, stage: &str, message: impl Into<String>) -> Self {
        self.push(stage, Reply::Permanent(message.into()))
    }

    /// Replies with the same text whenever the queue is empty.
    #[must_use]
    pub fn respond_always(self, stage: &str, text: impl Into<String>) -> Self {
        self.fallback(stage, Reply::Text(text.into()))
    }

    /// Fails transiently whenever the queue is empty.
    #[must_use]
    pub fn fail_transient_always(self, stage: &str, message: impl Into<String>) -> Self {
        self.fallback(stage, Reply::Transient(message.into()))
    }

    /// Returns how often a stage was invoked.
    #[must_use]
    pub fn call_count(&self, stage: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.stage_id == stage)
            .count()
    }

    /// Returns the requests made for a stage, in order.
    #[must_use]
    pub fn requests_for(&self, stage: &str) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.stage_id == stage)
            .cloned()
            .collect()
    }

    /// Returns the stages invoked, in order of first invocation.
    #[must_use]
    pub fn invoked_stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = Vec::new();
        for request in self.requests.lock().iter() {
            if !stages.contains(&request.stage_id) {
                stages.push(request.stage_id.clone());
            }
        }
        stages
    }

    /// Returns the total number of requests.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the sessions released so far.
    #[must_use]
    pub fn released_sessions(&self) -> Vec<String> {
        self.released.lock().clone()
    }

    fn next_reply(&self, stage: &str) -> Option<Reply> {
        let queued = self
            .queues
            .lock()
            .get_mut(stage)
            .and_then(VecDeque::pop_front);
        queued.or_else(|| self.fallbacks.lock().get(stage).cloned())
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        let stage = request.stage_id.clone();
        self.requests.lock().push(request);

        match self.next_reply(&stage) {
            Some(Reply::Text(text)) => Ok(GenerationResponse::text(text)),
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(GenerationResponse::text(text))
            }
            Some(Reply::Transient(message)) => Err(GenerationError::Transient(message)),
            Some(Reply::Permanent(message)) => Err(GenerationError::Permanent(message)),
            None => Err(GenerationError::Permanent(format!(
                "no scripted response for stage '{stage}'"
            ))),
        }
    }

    async fn release_session(&self, session_id: &str) {
        self.released.lock().push(session_id.to_string());
    }
}
