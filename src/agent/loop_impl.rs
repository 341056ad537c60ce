//! Agent loop - core message processing
//!
//! One `run` alternates between waiting for the model and running the tools
//! it asked for, until a response arrives with no tool-use blocks.

use tracing::{debug, info, warn};
use crate::Result;
use crate::tools::ToolRegistry;
use super::events::AgentEvent;
use super::llm::LlmClient;
use super::message::{ContentBlock, Message, ToolCallRequest};
use super::transcript::Transcript;

/// The agent loop processes messages through LLM and tool execution
pub struct AgentLoop<C: LlmClient> {
    client: C,
    tools: ToolRegistry,
    system_prompt: String,
    transcript: Transcript,
}

impl<C: LlmClient> AgentLoop<C> {
    /// Create a new agent loop
    pub fn new(client: C, tools: ToolRegistry, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            tools,
            system_prompt: system_prompt.into(),
            transcript: Transcript::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one user request to completion.
    ///
    /// Progress goes to `on_event`. A failure is reported as
    /// [`AgentEvent::Error`] and then returned; messages appended before the
    /// failure stay in the transcript.
    pub async fn run(
        &mut self,
        input: &str,
        on_event: &mut (dyn FnMut(AgentEvent) + Send),
    ) -> Result<()> {
        info!("Starting agent run: {} chars of input", input.len());
        self.transcript.push(Message::user(input));

        match self.turns(on_event).await {
            Ok(()) => {
                on_event(AgentEvent::Done);
                Ok(())
            }
            Err(e) => {
                warn!("Agent run failed: {}", e);
                on_event(AgentEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn turns(&mut self, on_event: &mut (dyn FnMut(AgentEvent) + Send)) -> Result<()> {
        let definitions = self.tools.definitions();
        let mut turn = 0usize;

        loop {
            turn += 1;
            debug!("Turn {}: {} messages", turn, self.transcript.len());

            let response = {
                let mut forward = |delta: super::llm::DeltaEvent| on_event(delta.into());
                self.client
                    .chat(
                        self.transcript.messages(),
                        &definitions,
                        &self.system_prompt,
                        &mut forward,
                    )
                    .await?
            };

            let assistant = Message::assistant(response.content, response.usage);
            let calls = assistant.tool_calls();
            self.transcript.push(assistant);

            if calls.is_empty() {
                info!("Agent completed after {} turn(s)", turn);
                return Ok(());
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute_tool(call, on_event).await);
            }
            self.transcript.push(Message::tool_results(results));
        }
    }

    async fn execute_tool(
        &self,
        call: ToolCallRequest,
        on_event: &mut (dyn FnMut(AgentEvent) + Send),
    ) -> ContentBlock {
        on_event(AgentEvent::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });

        let content = self.tools.dispatch(&call.name, call.input).await;

        on_event(AgentEvent::ToolResult {
            tool_use_id: call.id.clone(),
            content: content.clone(),
        });
        ContentBlock::tool_result(call.id, content)
    }
}
