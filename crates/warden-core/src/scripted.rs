//! A deterministic provider that replays a fixed list of responses.
//!
//! Used by tests and by `warden replay` to drive the loop without a model.
//! Two orchestrators fed the same script and the same workspace produce the
//! same history, which is what the execution tracker checks.

use std::{collections::VecDeque, path::Path, sync::Mutex};

use async_trait::async_trait;
use tracing::debug;

use warden_contracts::{
    error::{WardenError, WardenResult},
    message::Message,
    tool::{ToolDefinition, ToolMode},
};

use crate::traits::{Provider, ProviderResponse};

pub struct ScriptedProvider {
    model: String,
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<Vec<Message>>>,
    streaming: bool,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            model: "scripted".to_string(),
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            streaming: false,
        }
    }

    /// Parse a script: a JSON array of `{ "text": ..., "tool_calls": [...] }`.
    pub fn from_json(s: &str) -> WardenResult<Self> {
        let responses: Vec<ProviderResponse> =
            serde_json::from_str(s).map_err(|e| WardenError::ConfigError {
                reason: format!("failed to parse provider script: {e}"),
            })?;
        Ok(Self::new(responses))
    }

    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read provider script '{}': {e}", path.display()),
        })?;
        Self::from_json(&contents)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Stream response text word by word through `generate_stream`.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Message lists seen so far, one per request.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next(&self, messages: &[Message]) -> WardenResult<ProviderResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let mut responses = self.responses.lock().map_err(|_| WardenError::ProviderFailed {
            reason: "provider script lock poisoned".to_string(),
        })?;
        let response = responses.pop_front().ok_or_else(|| WardenError::ProviderFailed {
            reason: "provider script exhausted".to_string(),
        })?;
        debug!(
            remaining = responses.len(),
            tool_calls = response.tool_calls.len(),
            "scripted response"
        );
        Ok(response)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _mode: ToolMode,
    ) -> WardenResult<ProviderResponse> {
        self.next(messages)
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _mode: ToolMode,
        on_token: &(dyn for<'t> Fn(&'t str) + Send + Sync),
    ) -> WardenResult<ProviderResponse> {
        let response = self.next(messages)?;
        for piece in response.text.split_inclusive(' ') {
            on_token(piece);
        }
        Ok(response)
    }
}
