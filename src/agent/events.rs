//! Observer events emitted while a run progresses

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Progress of one agent run.
///
/// Consumers should pass through variants they do not recognize; the
/// vocabulary may grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AgentEvent {
    TextDelta { text: String },
    ThinkingDelta { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
    Done,
    Error { message: String },
}

impl AgentEvent {
    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::TextDelta { .. } => "text_delta",
            AgentEvent::ThinkingDelta { .. } => "thinking_delta",
            AgentEvent::ToolUse { .. } => "tool_use",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Done => "done",
            AgentEvent::Error { .. } => "error",
        }
    }
}
