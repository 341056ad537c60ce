//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait, the capability the agent loop talks to
//! - [`sse`] framing and the [`StreamDecoder`] that normalizes wire events
//! - [`OpenAiOAuthClient`], the ChatGPT-subscription Responses API client
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient`
//! 3. Construct it from `main.rs` based on configuration

pub mod openai_oauth;
pub mod request;
pub mod sse;
pub mod stream;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolDefinition;
use crate::Result;

use super::events::AgentEvent;
use super::message::{ContentBlock, Message};

pub use openai_oauth::{HttpTransport, OpenAiOAuthClient, Transport};
pub use sse::{SseParser, WireEvent};
pub use stream::StreamDecoder;

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Lightweight progress event delivered while a response streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaEvent {
    TextDelta { text: String },
    ThinkingDelta { text: String },
}

impl From<DeltaEvent> for AgentEvent {
    fn from(delta: DeltaEvent) -> Self {
        match delta {
            DeltaEvent::TextDelta { text } => AgentEvent::TextDelta { text },
            DeltaEvent::ThinkingDelta { text } => AgentEvent::ThinkingDelta { text },
        }
    }
}

/// Finalized model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

/// LLM client trait, the swappable provider abstraction.
///
/// `chat` returns only after the response has been fully consumed; deltas
/// are handed to `on_event` in arrival order while it runs. Implementations
/// must report a rejected credential as
/// [`Error::AuthenticationFailure`](crate::Error::AuthenticationFailure).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        system: &str,
        on_event: &mut (dyn FnMut(DeltaEvent) + Send),
    ) -> Result<ChatResponse>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    replies: std::sync::Mutex<std::collections::VecDeque<Result<Vec<ContentBlock>>>>,
    requests: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Scripted replies, one per call.
    pub fn new(replies: Vec<Vec<ContentBlock>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with predefined text responses.
    pub fn text(responses: Vec<&str>) -> Self {
        Self::new(
            responses
                .into_iter()
                .map(|s| vec![ContentBlock::text(s)])
                .collect(),
        )
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, input: serde_json::Value, final_response: &str) -> Self {
        Self::new(vec![
            vec![ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: name.to_string(),
                input,
            }],
            vec![ContentBlock::text(final_response)],
        ])
    }

    /// Queue a failing call after the scripted replies.
    pub fn then_fail(self, error: crate::Error) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Messages sent with each call
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _system: &str,
        on_event: &mut (dyn FnMut(DeltaEvent) + Send),
    ) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(crate::Error::Llm("No more fake responses".to_string())))?;

        for block in &reply {
            match block {
                ContentBlock::Text { text } => on_event(DeltaEvent::TextDelta { text: text.clone() }),
                ContentBlock::Thinking { text } => {
                    on_event(DeltaEvent::ThinkingDelta { text: text.clone() })
                }
                _ => {}
            }
        }

        Ok(ChatResponse {
            content: reply,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
            ..Default::default()
        })
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_llm_client() {
        let client = FakeLlmClient::text(vec!["Hello!", "World!"]);
        let mut deltas = Vec::new();

        let resp1 = client
            .chat(&[], &[], "", &mut |d| deltas.push(d))
            .await
            .unwrap();
        assert_eq!(resp1.content, vec![ContentBlock::text("Hello!")]);

        let resp2 = client.chat(&[], &[], "", &mut |_| {}).await.unwrap();
        assert_eq!(resp2.content, vec![ContentBlock::text("World!")]);

        assert_eq!(deltas, vec![DeltaEvent::TextDelta { text: "Hello!".into() }]);
        assert!(client.chat(&[], &[], "", &mut |_| {}).await.is_err());
    }

    #[test]
    fn test_delta_into_agent_event() {
        let event: AgentEvent = DeltaEvent::ThinkingDelta { text: "hm".into() }.into();
        assert_eq!(event, AgentEvent::ThinkingDelta { text: "hm".into() });
    }
}
