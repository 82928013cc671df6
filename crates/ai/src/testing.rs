//! Test doubles for [`ReasoningService`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::reasoning::{ReasoningError, ReasoningService, Result};

/// One recorded `complete` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Prompt text
    pub prompt: String,
    /// Temperature
    pub temperature: f32,
    /// Output cap
    pub max_tokens: u32,
}

/// Replays queued responses in order and records every call.
///
/// Once the queue is drained every call fails with
/// [`ReasoningError::EmptyResponse`].
#[derive(Default)]
pub struct ScriptedReasoning {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedReasoning {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script that answers `text` once.
    pub fn replying(text: impl Into<String>) -> Self {
        let script = Self::new();
        script.push_ok(text);
        script
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful response.
    pub fn push_ok(&self, text: impl Into<String>) {
        self.lock_responses().push_back(Ok(text.into()));
    }

    /// Queue a failure.
    pub fn push_err(&self, err: ReasoningError) {
        self.lock_responses().push_back(Err(err));
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                temperature,
                max_tokens,
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.lock_responses()
            .pop_front()
            .unwrap_or(Err(ReasoningError::EmptyResponse))
    }
}
