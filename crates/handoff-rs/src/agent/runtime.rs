//! The model call behind every agent turn.
//!
//! [`AgentRuntime`] is the seam between an [`Agent`](super::Agent) and
//! whatever produces its next response. [`OpenRouterRuntime`] is the bundled
//! implementation; tests plug in scripted runtimes.

use std::future::Future;
use std::pin::Pin;
use tracing::{debug, trace};

use crate::api::retry::{RetryConfig, retry_api_call};
use crate::{ChatMessage, ChatRequest, OpenRouterClient};

/// Boxed future returned by [`AgentRuntime::respond`].
pub type RuntimeFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Everything a runtime sees for one turn.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeRequest<'a> {
    /// Name of the agent taking the turn.
    pub agent: &'a str,
    pub model: &'a str,
    /// The agent's serialized buffer, taken before the input was added.
    pub context: &'a str,
    pub input: &'a str,
}

/// Produces an agent's next response.
pub trait AgentRuntime: Send + Sync {
    fn respond<'a>(&'a self, request: RuntimeRequest<'a>) -> RuntimeFuture<'a>;
}

/// Runtime backed by the OpenRouter chat completions API.
///
/// The serialized context is sent as the system message and the turn input as
/// the user message. Transient HTTP and network errors are retried.
pub struct OpenRouterRuntime {
    client: OpenRouterClient,
    retry: RetryConfig,
    max_tokens: u32,
    temperature: f32,
}

impl OpenRouterRuntime {
    pub fn new(client: OpenRouterClient) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, request: &RuntimeRequest<'_>) -> ChatRequest {
        ChatRequest {
            model: request.model.to_string(),
            messages: vec![
                ChatMessage::system(request.context),
                ChatMessage::user(request.input),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..Default::default()
        }
    }
}

impl AgentRuntime for OpenRouterRuntime {
    fn respond<'a>(&'a self, request: RuntimeRequest<'a>) -> RuntimeFuture<'a> {
        Box::pin(async move {
            let body = self.build_request(&request);
            debug!(
                "{}: calling {} with {} context bytes",
                request.agent,
                request.model,
                request.context.len()
            );
            let completion = retry_api_call(&self.retry, || self.client.chat(&body)).await?;
            trace!(
                "{}: finish_reason={:?}",
                request.agent, completion.finish_reason
            );
            completion
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| "Empty LLM response".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatRole;

    #[test]
    fn request_carries_context_as_system_and_input_as_user() {
        let runtime = OpenRouterRuntime::new(OpenRouterClient::new("test-key").unwrap())
            .with_max_tokens(256)
            .with_temperature(0.2);
        let request = RuntimeRequest {
            agent: "lead",
            model: "openai/gpt-4o-mini",
            context: "{\"role\":\"developer\",\"message\":\"be brief\"}",
            input: "hello",
        };

        let body = runtime.build_request(&request);
        assert_eq!(body.model, "openai/gpt-4o-mini");
        assert_eq!(body.max_tokens, 256);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, ChatRole::System);
        assert_eq!(body.messages[0].content, request.context);
        assert_eq!(body.messages[1].role, ChatRole::User);
        assert_eq!(body.messages[1].content, "hello");
    }

    #[test]
    fn retry_defaults_can_be_replaced() {
        let runtime = OpenRouterRuntime::new(OpenRouterClient::new("k").unwrap())
            .with_retry(RetryConfig::none());
        assert_eq!(runtime.retry.max_retries, 0);
    }
}
