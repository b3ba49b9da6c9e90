//! Importance-weighted conversation memory and non-blocking sub-agent
//! delegation for LLM agents.
//!
//! `handoff-rs` pairs two pieces that every recursive agent tree needs:
//!
//! - a [`ConversationBuffer`](context::ConversationBuffer) that keeps an
//!   agent's context under a token budget. Every message carries an
//!   importance score that decays by one on each insertion; messages that
//!   decay below zero expire, and when the buffer crosses its clean threshold
//!   the least important (then oldest) messages are evicted. Pinned
//!   directives are never decayed or evicted.
//!
//! - a [`DelegationManager`](delegation::DelegationManager) that pulls
//!   `{"handoff": {...}}` annotations out of an agent's free-form output,
//!   launches each one on a subordinate agent as a background Tokio task,
//!   and folds the results back into the delegating agent's buffer at the
//!   start of its next turn.
//!
//! The [`Agent`](agent::Agent) ties both together around an opaque
//! [`AgentRuntime`](agent::AgentRuntime). The bundled runtime talks to the
//! [OpenRouter](https://openrouter.ai/) chat completions API through
//! [`OpenRouterClient`].
//!
//! # Getting started
//!
//! ```ignore
//! use handoff_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY").unwrap())?;
//!     let runtime: Arc<dyn AgentRuntime> = Arc::new(OpenRouterRuntime::new(client));
//!
//!     let researcher = Arc::new(Agent::new(
//!         AgentSettings::new("researcher").with_system_prompt("You research topics."),
//!         Arc::clone(&runtime),
//!     ));
//!     let lead = Agent::new(
//!         AgentSettings::new("lead").with_system_prompt("You coordinate work."),
//!         runtime,
//!     )
//!     .with_subordinates(vec![researcher]);
//!
//!     let reply = lead.run_turn(TurnRequest::user("Survey Rust web frameworks")).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | [`Message`](context::Message), token estimation, [`ConversationBuffer`](context::ConversationBuffer) with decay and eviction |
//! | [`delegation`] | Handoff annotation scanner, [`DelegationManager`](delegation::DelegationManager) and its task table |
//! | [`agent`] | [`Agent`](agent::Agent), [`AgentRuntime`](agent::AgentRuntime), [`Session`](agent::Session) driver |
//! | [`api`] | Retry with backoff for runtime calls |
//! | [`config`] | TOML loader for agent trees and sessions |
//! | [`io`] | Input sources and output sinks for the session loop |

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod delegation;
pub mod io;
pub mod prelude;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for agents that don't name one.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Role of a message sent to the chat completions API.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// A message in a chat completion request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat()`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://crates.io/crates/handoff-rs", "handoff-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("handoff-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        parse_chat_response(&text)
    }
}

/// Decode a raw chat completions body into a [`ChatCompletion`].
fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(c) => Ok(ChatCompletion {
            content: c.message.content,
            usage: parsed.usage,
            finish_reason: c.finish_reason,
        }),
        None => Ok(ChatCompletion {
            content: None,
            usage: parsed.usage,
            finish_reason: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_constructors() {
        let sys = ChatMessage::system("context");
        assert_eq!(sys.role, ChatRole::System);
        assert_eq!(sys.content, "context");

        let user = ChatMessage::user("hello");
        assert_eq!(user.role, ChatRole::User);
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn parse_response_extracts_first_choice() {
        let body = r#"{
            "choices": [{"message": {"content": "hi there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        let completion = parse_chat_response(body).unwrap();
        assert_eq!(completion.content.as_deref(), Some("hi there"));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, Some(13));
    }

    #[test]
    fn parse_response_surfaces_api_error() {
        let body = r#"{"error": {"message": "no credits"}}"#;
        let err = parse_chat_response(body).unwrap_err();
        assert!(err.contains("no credits"));
    }

    #[test]
    fn parse_response_without_choices_is_empty() {
        let completion = parse_chat_response(r#"{"choices": []}"#).unwrap();
        assert!(completion.content.is_none());
    }
}
