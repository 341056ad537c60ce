//! Incremental Server-Sent Events framing.
//!
//! Bytes go in as they arrive from the network; complete frames come out as
//! [`WireEvent`]s. Frames are split on a blank line and only decoded once
//! complete, so multi-byte characters split across chunks survive.

use serde_json::Value;
use tracing::debug;

/// One named event from the provider stream.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    pub event: String,
    pub data: Value,
}

impl WireEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Incremental parser for SSE byte streams.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<WireEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some((end, separator_len)) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
            if let Some(event) = parse_frame(&String::from_utf8_lossy(&frame)) {
                events.push(event);
            }
        }

        events
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<WireEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }

    /// Parse a complete SSE payload in one shot.
    pub fn parse_all(input: &str) -> Vec<WireEvent> {
        let mut parser = Self::new();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

/// Position and length of the first blank-line separator.
fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buffer, b"\n\n").map(|i| (i, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_frame(frame: &str) -> Option<WireEvent> {
    let mut event_name: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event_name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    let payload = data_lines.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let data: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping malformed SSE frame: {}", e);
            return None;
        }
    };

    let name = event_name
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| data.get("type").and_then(Value::as_str).map(str::to_string))?;

    Some(WireEvent::new(name, data))
}
