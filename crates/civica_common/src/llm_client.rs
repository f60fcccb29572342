//! LLM client abstraction.
//!
//! A generic trait over chat-completion backends plus the real HTTP
//! implementation for OpenAI-compatible endpoints with tool calling.
//! Tests script a fake implementation instead of hitting the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chat_protocol::{ChatMessage, ChatOutcome, ToolCallRequest, ToolSchema};

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// LLM errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM is disabled in configuration")]
    Disabled,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Generic chat-completion client
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One completion over the full transcript, with the tool catalog the
    /// model may draw on. Returns either plain content or tool-call requests.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatOutcome, LlmError>;
}

/// Real client for OpenAI-compatible `/v1/chat/completions` endpoints
pub struct HttpChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpChatModel {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatOutcome, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let url = format!("{}/v1/chat/completions", self.config.endpoint);

        let mut request_body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            request_body["tools"] = serde_json::Value::Array(tool_defs);
        }

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout_secs)
            } else {
                LlmError::HttpError(format!("Request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(LlmError::HttpError(format!(
                "HTTP {} from completion endpoint",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        Ok(ChatOutcome {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}

/// Fake chat model for testing: replays a fixed script of outcomes.
///
/// Once the script runs out the last outcome repeats, which makes it easy to
/// exercise the iteration bound with a model that never stops calling tools.
pub struct FakeChatModel {
    script: Vec<ChatOutcome>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl FakeChatModel {
    pub fn new(script: Vec<ChatOutcome>) -> Self {
        Self {
            script,
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// How many completions have been requested
    pub fn calls(&self) -> usize {
        self.cursor.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSchema],
    ) -> Result<ChatOutcome, LlmError> {
        let index = self
            .cursor
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.script.get(index.min(self.script.len().saturating_sub(1))) {
            Some(outcome) => Ok(outcome.clone()),
            None => Err(LlmError::EmptyResponse),
        }
    }
}
