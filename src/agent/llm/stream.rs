//! StreamDecoder - turns Responses API stream events into normalized content.
//!
//! Responses API event types handled:
//!   response.created                       : response id / model
//!   response.output_item.added             : new item (message, function_call, reasoning)
//!   response.output_text.delta             : text delta
//!   response.reasoning_summary_text.delta  : reasoning delta
//!   response.function_call_arguments.delta : tool call arguments delta
//!   response.output_item.done              : item completed
//!   response.completed / response.done     : usage, terminal
//!   response.failed / error                : provider-side failure
//!
//! Anything else is ignored so new event kinds never break decoding.

use serde_json::{json, Value};
use tracing::{debug, trace};
use crate::Result;
use crate::error::Error;
use super::{ChatResponse, DeltaEvent, Usage, WireEvent};
use crate::agent::message::ContentBlock;

/// Content block under construction
#[derive(Debug, Clone)]
enum PartialBlock {
    Text(String),
    Thinking(String),
    ToolUse {
        id: String,
        name: String,
        /// Raw argument text assembled from deltas
        input_json: String,
        /// Parsed once the item closes
        input: Option<Value>,
    },
}

/// Accumulates one provider response. Create a fresh decoder per call.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    response_id: Option<String>,
    model: Option<String>,
    blocks: Vec<PartialBlock>,
    current_tool: Option<usize>,
    usage: Usage,
    completed: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal `response.completed` event has been seen
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Apply one wire event, returning the delta to show the user, if any.
    pub fn apply(&mut self, event: &WireEvent) -> Result<Option<DeltaEvent>> {
        let data = &event.data;

        match event.event.as_str() {
            "response.created" => {
                self.capture_response(response_of(data));
                Ok(None)
            }
            "response.output_item.added" => {
                self.open_item(item_of(data));
                Ok(None)
            }
            "response.output_text.delta" => Ok(delta_of(data).map(|text| self.push_text(text))),
            "response.reasoning_summary_text.delta" => {
                Ok(delta_of(data).map(|text| self.push_thinking(text)))
            }
            "response.function_call_arguments.delta" => {
                if let Some(text) = delta_of(data) {
                    self.push_arguments(text);
                }
                Ok(None)
            }
            "response.output_item.done" => {
                self.close_item(item_of(data));
                Ok(None)
            }
            "response.completed" | "response.done" => {
                self.complete(response_of(data));
                Ok(None)
            }
            "response.failed" => {
                let message = response_of(data)
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("response failed");
                Err(Error::Stream(message.to_string()))
            }
            "error" => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| data.get("code").and_then(Value::as_str))
                    .unwrap_or("unknown stream error");
                Err(Error::Stream(message.to_string()))
            }
            other => {
                trace!("Ignoring stream event: {}", other);
                Ok(None)
            }
        }
    }

    /// Produce the final response. Open tool blocks are parsed as they stand.
    pub fn finish(self) -> ChatResponse {
        let content = self
            .blocks
            .into_iter()
            .map(|block| match block {
                PartialBlock::Text(text) => ContentBlock::Text { text },
                PartialBlock::Thinking(text) => ContentBlock::Thinking { text },
                PartialBlock::ToolUse {
                    id,
                    name,
                    input_json,
                    input,
                } => ContentBlock::ToolUse {
                    id,
                    name,
                    input: input.unwrap_or_else(|| parse_arguments(&input_json)),
                },
            })
            .collect();

        ChatResponse {
            id: self.response_id,
            model: self.model,
            content,
            usage: self.usage,
        }
    }

    fn capture_response(&mut self, response: &Value) {
        if let Some(id) = response.get("id").and_then(Value::as_str) {
            self.response_id = Some(id.to_string());
        }
        if let Some(model) = response.get("model").and_then(Value::as_str) {
            self.model = Some(model.to_string());
        }
    }

    fn open_item(&mut self, item: &Value) {
        match item.get("type").and_then(Value::as_str) {
            Some("message") => {
                self.ensure_text_block();
            }
            Some("function_call") => {
                let id = item
                    .get("call_id")
                    .or_else(|| item.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                self.blocks.push(PartialBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input_json: String::new(),
                    input: None,
                });
                self.current_tool = Some(self.blocks.len() - 1);
            }
            Some("reasoning") => {
                self.blocks.push(PartialBlock::Thinking(String::new()));
            }
            other => {
                trace!("Ignoring output item of type {:?}", other);
            }
        }
    }

    fn close_item(&mut self, item: &Value) {
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return;
        }

        let Some(index) = self.current_tool.take() else {
            return;
        };

        if let Some(PartialBlock::ToolUse {
            input_json, input, ..
        }) = self.blocks.get_mut(index)
        {
            if input_json.trim().is_empty() {
                if let Some(arguments) = item.get("arguments").and_then(Value::as_str) {
                    input_json.push_str(arguments);
                }
            }
            *input = Some(parse_arguments(input_json));
        }
    }

    fn push_text(&mut self, text: &str) -> DeltaEvent {
        if let PartialBlock::Text(buffer) = self.ensure_text_block() {
            buffer.push_str(text);
        }
        DeltaEvent::TextDelta {
            text: text.to_string(),
        }
    }

    fn push_thinking(&mut self, text: &str) -> DeltaEvent {
        let position = self
            .blocks
            .iter()
            .rposition(|block| matches!(block, PartialBlock::Thinking(_)));
        let index = match position {
            Some(index) => index,
            None => {
                self.blocks.push(PartialBlock::Thinking(String::new()));
                self.blocks.len() - 1
            }
        };

        if let PartialBlock::Thinking(buffer) = &mut self.blocks[index] {
            buffer.push_str(text);
        }
        DeltaEvent::ThinkingDelta {
            text: text.to_string(),
        }
    }

    fn push_arguments(&mut self, text: &str) {
        let Some(index) = self.current_tool else {
            debug!("Arguments delta with no open function call");
            return;
        };
        if let Some(PartialBlock::ToolUse { input_json, .. }) = self.blocks.get_mut(index) {
            input_json.push_str(text);
        }
    }

    fn complete(&mut self, response: &Value) {
        if let Some(usage) = response.get("usage") {
            let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
            self.usage = Usage {
                input_tokens: count("input_tokens"),
                output_tokens: count("output_tokens"),
                total_tokens: count("total_tokens"),
            };
        }
        if self.response_id.is_none() {
            self.response_id = response.get("id").and_then(Value::as_str).map(str::to_string);
        }
        if self.model.is_none() {
            self.model = response.get("model").and_then(Value::as_str).map(str::to_string);
        }
        self.completed = true;
    }

    /// Trailing text block, created when the last block is something else.
    fn ensure_text_block(&mut self) -> &mut PartialBlock {
        if !matches!(self.blocks.last(), Some(PartialBlock::Text(_))) {
            self.blocks.push(PartialBlock::Text(String::new()));
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }
}

fn item_of(data: &Value) -> &Value {
    data.get("item").unwrap_or(data)
}

fn response_of(data: &Value) -> &Value {
    data.get("response").unwrap_or(data)
}

fn delta_of(data: &Value) -> Option<&str> {
    data.get("delta").and_then(Value::as_str)
}

/// Malformed or empty arguments become an empty object.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("Tool arguments are not valid JSON ({}), using {{}}", e);
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(name: &str, data: Value) -> WireEvent {
        WireEvent::new(name, data)
    }

    fn function_call(call_id: &str, name: &str) -> WireEvent {
        ev(
            "response.output_item.added",
            json!({"item": {"type": "function_call", "id": format!("fc_{call_id}"), "call_id": call_id, "name": name}}),
        )
    }

    fn function_done() -> WireEvent {
        ev("response.output_item.done", json!({"item": {"type": "function_call"}}))
    }

    fn args(delta: &str) -> WireEvent {
        ev("response.function_call_arguments.delta", json!({"delta": delta}))
    }

    fn decode(events: &[WireEvent]) -> (Vec<DeltaEvent>, ChatResponse) {
        let mut decoder = StreamDecoder::new();
        let deltas = events
            .iter()
            .filter_map(|e| decoder.apply(e).unwrap())
            .collect();
        (deltas, decoder.finish())
    }

    #[test]
    fn test_text_stream() {
        let (deltas, response) = decode(&[
            ev("response.created", json!({"response": {"id": "resp_1", "model": "gpt"}})),
            ev("response.output_item.added", json!({"item": {"type": "message"}})),
            ev("response.content_part.added", json!({})),
            ev("response.output_text.delta", json!({"delta": "Hel"})),
            ev("response.output_text.delta", json!({"delta": "lo"})),
            ev(
                "response.completed",
                json!({"response": {"usage": {"input_tokens": 3, "output_tokens": 2, "total_tokens": 5}}}),
            ),
        ]);

        assert_eq!(
            deltas,
            vec![
                DeltaEvent::TextDelta { text: "Hel".into() },
                DeltaEvent::TextDelta { text: "lo".into() },
            ]
        );
        assert_eq!(response.content, vec![ContentBlock::text("Hello")]);
        assert_eq!(response.id.as_deref(), Some("resp_1"));
        assert_eq!(response.model.as_deref(), Some("gpt"));
        assert_eq!(
            response.usage,
            Usage { input_tokens: 3, output_tokens: 2, total_tokens: 5 }
        );
    }

    #[test]
    fn test_chunking_invariance() {
        let raw = r#"{"file_path": "/tmp/a b.rs", "old_string": "fn main() {}", "n": [1, 2.5, null], "nested": {"k": "välue"}}"#;
        let expected: Value = serde_json::from_str(raw).unwrap();
        let chars: Vec<char> = raw.chars().collect();

        for chunk_len in [1, 2, 3, 7, 16, raw.len()] {
            let mut events = vec![function_call("call_1", "Edit")];
            for chunk in chars.chunks(chunk_len) {
                events.push(args(&chunk.iter().collect::<String>()));
            }
            events.push(function_done());

            let (deltas, response) = decode(&events);
            assert!(deltas.is_empty(), "arguments are never streamed to the user");
            assert_eq!(
                response.content,
                vec![ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "Edit".into(),
                    input: expected.clone(),
                }],
                "chunk length {chunk_len}"
            );
        }
    }

    #[test]
    fn test_malformed_arguments_become_empty_object() {
        for raw in ["{\"a\": ", "not json", "}{"] {
            let (_, response) = decode(&[function_call("c", "Bash"), args(raw), function_done()]);
            assert_eq!(response.content[0], ContentBlock::ToolUse {
                id: "c".into(),
                name: "Bash".into(),
                input: json!({}),
            });
        }
    }

    #[test]
    fn test_empty_buffer_uses_item_arguments() {
        let (_, response) = decode(&[
            function_call("c", "Read"),
            ev(
                "response.output_item.done",
                json!({"item": {"type": "function_call", "arguments": "{\"file_path\":\"x\"}"}}),
            ),
        ]);
        assert_eq!(
            response.tool_inputs(),
            vec![json!({"file_path": "x"})]
        );
    }

    #[test]
    fn test_unclosed_tool_block_parsed_at_finish() {
        let (_, response) = decode(&[function_call("c", "Read"), args("{\"a\":1}")]);
        assert_eq!(response.tool_inputs(), vec![json!({"a": 1})]);
    }

    #[test]
    fn test_call_id_falls_back_to_item_id() {
        let (_, response) = decode(&[ev(
            "response.output_item.added",
            json!({"item": {"type": "function_call", "id": "fc_9", "name": "Grep"}}),
        )]);
        assert!(matches!(&response.content[0], ContentBlock::ToolUse { id, .. } if id == "fc_9"));
    }

    #[test]
    fn test_mixed_items_keep_creation_order() {
        let (deltas, response) = decode(&[
            ev("response.output_item.added", json!({"item": {"type": "reasoning"}})),
            ev("response.reasoning_summary_text.delta", json!({"delta": "plan"})),
            ev("response.output_item.added", json!({"item": {"type": "message"}})),
            ev("response.output_text.delta", json!({"delta": "Reading"})),
            function_call("c1", "Read"),
            args("{}"),
            function_done(),
            function_call("c2", "Grep"),
            args("{\"pattern\":\"x\"}"),
            function_done(),
            ev("response.output_text.delta", json!({"delta": "after"})),
        ]);

        assert_eq!(
            deltas,
            vec![
                DeltaEvent::ThinkingDelta { text: "plan".into() },
                DeltaEvent::TextDelta { text: "Reading".into() },
                DeltaEvent::TextDelta { text: "after".into() },
            ]
        );
        assert_eq!(response.content.len(), 5);
        assert_eq!(response.content[0], ContentBlock::Thinking { text: "plan".into() });
        assert_eq!(response.content[1], ContentBlock::text("Reading"));
        assert!(matches!(&response.content[2], ContentBlock::ToolUse { id, .. } if id == "c1"));
        assert!(matches!(&response.content[3], ContentBlock::ToolUse { id, .. } if id == "c2"));
        assert_eq!(response.content[4], ContentBlock::text("after"));
    }

    #[test]
    fn test_message_item_reuses_trailing_text_block() {
        let (_, response) = decode(&[
            ev("response.output_text.delta", json!({"delta": "a"})),
            ev("response.output_item.added", json!({"item": {"type": "message"}})),
            ev("response.output_text.delta", json!({"delta": "b"})),
        ]);
        assert_eq!(response.content, vec![ContentBlock::text("ab")]);
    }

    #[test]
    fn test_reasoning_delta_without_item_opens_block() {
        let (deltas, response) = decode(&[ev(
            "response.reasoning_summary_text.delta",
            json!({"delta": "hm"}),
        )]);
        assert_eq!(deltas.len(), 1);
        assert_eq!(response.content, vec![ContentBlock::Thinking { text: "hm".into() }]);
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder
            .apply(&ev("response.brand_new_kind", json!({"anything": true})))
            .unwrap()
            .is_none());
        assert!(decoder.apply(&args("{\"orphan\":1}")).unwrap().is_none());
        assert!(decoder.finish().content.is_empty());
    }

    #[test]
    fn test_completed_marks_terminal_and_fills_missing_id() {
        let mut decoder = StreamDecoder::new();
        decoder
            .apply(&ev("response.completed", json!({"response": {"id": "resp_2", "model": "m"}})))
            .unwrap();
        assert!(decoder.is_completed());
        let response = decoder.finish();
        assert_eq!(response.id.as_deref(), Some("resp_2"));
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn test_failure_events_surface() {
        let mut decoder = StreamDecoder::new();
        let err = decoder
            .apply(&ev("response.failed", json!({"response": {"error": {"message": "boom"}}})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Stream error: boom");

        let err = decoder
            .apply(&ev("error", json!({"code": "rate_limit_exceeded"})))
            .unwrap_err();
        assert!(err.to_string().contains("rate_limit_exceeded"));
    }

    impl ChatResponse {
        fn tool_inputs(&self) -> Vec<Value> {
            self.content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { input, .. } => Some(input.clone()),
                    _ => None,
                })
                .collect()
        }
    }
}
