//! Scripted LLM that replies from a rule table
//!
//! Used by tests and for running the server without a model.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::llm::{ChatRequest, LlmProvider};

/// Reply chosen by the first rule whose needle occurs in the system prompt
pub struct ScriptedLlm {
    rules: Vec<(String, Reply)>,
    fallback: Option<String>,
    calls: Mutex<Vec<ChatRequest>>,
}

enum Reply {
    Text(String),
    Fail(String),
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `reply` when the system prompt contains `needle`
    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(reply.into())));
        self
    }

    /// Fail with an LLM error when the system prompt contains `needle`
    pub fn fail_on(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail(message.into())));
        self
    }

    /// Reply used when no rule matches
    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Requests received so far
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests whose system prompt contains `needle`
    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.system_prompt().contains(needle))
            .count()
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        self.calls.lock().push(request.clone());
        let system = request.system_prompt();

        for (needle, reply) in &self.rules {
            if system.contains(needle.as_str()) {
                return match reply {
                    Reply::Text(text) => Ok(text.clone()),
                    Reply::Fail(message) => Err(Error::llm(message.clone())),
                };
            }
        }

        self.fallback
            .clone()
            .ok_or_else(|| Error::llm("no scripted reply for request"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
