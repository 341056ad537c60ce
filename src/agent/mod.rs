//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message and transcript types
//! - Observer events emitted while a run progresses
//! - LLM client trait, stream decoding and the OpenAI OAuth provider
//! - Agent loop driving model turns and tool execution

mod events;
mod loop_impl;
mod message;
mod transcript;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use events::AgentEvent;
pub use llm::{ChatResponse, DeltaEvent, LlmClient, OpenAiOAuthClient, StreamDecoder, Usage};
pub use loop_impl::AgentLoop;
pub use message::{ContentBlock, Message, Role, ToolCallRequest};
pub use transcript::Transcript;
