//! Responses API request bodies

use serde_json::{json, Value};

use crate::agent::message::{ContentBlock, Message, Role};
use crate::tools::ToolDefinition;

/// Instructions sent when the caller supplies none
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// Build the streaming request body for one provider call.
///
/// System messages in the transcript are folded into `instructions`;
/// thinking blocks are never sent back.
pub fn build_body(
    model: &str,
    system: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> Value {
    let mut instructions: Vec<String> = Vec::new();
    if !system.trim().is_empty() {
        instructions.push(system.to_string());
    }

    let mut input = Vec::new();
    for message in messages {
        if message.role == Role::System {
            let text = message.text();
            if !text.trim().is_empty() {
                instructions.push(text);
            }
            continue;
        }
        push_input_items(message, &mut input);
    }

    let instructions = if instructions.is_empty() {
        DEFAULT_INSTRUCTIONS.to_string()
    } else {
        instructions.join("\n\n")
    };

    let mut body = json!({
        "model": model,
        "instructions": instructions,
        "input": input,
        "tool_choice": "auto",
        "parallel_tool_calls": false,
        "store": false,
        "stream": true,
    });

    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(tool_spec).collect());
    }

    body
}

fn push_input_items(message: &Message, input: &mut Vec<Value>) {
    let text_type = match message.role {
        Role::Assistant => "output_text",
        _ => "input_text",
    };
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };

    // Consecutive text blocks share one message item
    let mut parts: Vec<Value> = Vec::new();

    for block in &message.content {
        match block {
            ContentBlock::Text { text } => {
                parts.push(json!({"type": text_type, "text": text}));
            }
            ContentBlock::Thinking { .. } => {}
            ContentBlock::ToolUse { id, name, input: args } => {
                flush(role, &mut parts, input);
                input.push(json!({
                    "type": "function_call",
                    "call_id": id,
                    "name": name,
                    "arguments": args.to_string(),
                }));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                flush(role, &mut parts, input);
                input.push(json!({
                    "type": "function_call_output",
                    "call_id": tool_use_id,
                    "output": content,
                }));
            }
        }
    }
    flush(role, &mut parts, input);
}

fn flush(role: &str, parts: &mut Vec<Value>, input: &mut Vec<Value>) {
    if !parts.is_empty() {
        input.push(json!({
            "type": "message",
            "role": role,
            "content": std::mem::take(parts),
        }));
    }
}

fn tool_spec(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}
