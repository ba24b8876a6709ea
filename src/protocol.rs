//! Wire definitions for the agent runtime (LangGraph HTTP API)
//!
//! Only the subset the client needs: thread/run requests, the message JSON
//! carried in `values` frames, the interrupt list, and SSE framing.

use crate::conversation::{Content, ConversationTurn, Role, TurnId};
use crate::resume::ResumeCommand;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// SSE event names sent by the runtime
pub mod events {
    pub const METADATA: &str = "metadata";
    pub const VALUES: &str = "values";
    pub const UPDATES: &str = "updates";
    pub const ERROR: &str = "error";
    pub const END: &str = "end";
}

/// Key under which the runtime reports pending interrupts
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// One message as serialized by the runtime
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    /// Convert to a turn. `system`, `function`, `remove` and unknown types
    /// are not conversation turns.
    pub fn into_turn(self, index: usize) -> Option<ConversationTurn> {
        let role = match self.kind.as_str() {
            "human" => Role::Human,
            "ai" => Role::Assistant,
            "tool" => Role::Tool {
                name: self.name.unwrap_or_else(|| "tool".to_string()),
            },
            other => {
                debug!("Skipping {} message", other);
                return None;
            }
        };
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("remote-{index}"));
        Some(ConversationTurn::new(
            TurnId::Remote(id),
            role,
            Content::from_value(self.content),
        ))
    }
}

/// Decode a message list. Entries that are not messages are skipped.
pub fn decode_messages(messages: &Value) -> Vec<ConversationTurn> {
    let Some(items) = messages.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            match serde_json::from_value::<WireMessage>(item.clone()) {
                Ok(message) => message.into_turn(index),
                Err(e) => {
                    debug!("Skipping malformed message at {}: {}", index, e);
                    None
                }
            }
        })
        .collect()
}

/// The interrupt list in a state / update frame, if any is pending
pub fn extract_interrupt(frame: &Value) -> Option<Value> {
    match frame.get(INTERRUPT_KEY)? {
        Value::Null => None,
        Value::Array(items) if items.is_empty() => None,
        value => Some(value.clone()),
    }
}

/// What a run carries to the agent
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// A new human message
    Message(String),
    /// The decision for a pending interrupt
    Resume(ResumeCommand),
}

/// Body of `POST /threads/{thread_id}/runs/stream`
///
/// `updates` is streamed next to `values` because some servers report an
/// interrupt only as a node update. The server cancels the run when the
/// client disconnects, which covers a stop issued before `metadata` names
/// the run.
pub fn run_body(assistant_id: &str, input: &RunInput) -> Value {
    let mut body = json!({
        "assistant_id": assistant_id,
        "stream_mode": ["values", "updates"],
        "on_disconnect": "cancel",
    });
    match input {
        RunInput::Message(text) => {
            body["input"] = json!({ "messages": [{ "type": "human", "content": text }] });
        }
        RunInput::Resume(command) => {
            body["command"] = json!({ "resume": command.to_resume_value() });
        }
    }
    body
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental SSE parser. Feed it chunks as they arrive; complete frames
/// come out once their terminating blank line has been seen.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of a UTF-8 sequence split across chunks
    pending: Vec<u8>,
    line_buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like `push`, for raw network chunks that may split a character
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let chunk: Vec<u8> = self.pending.drain(..valid).collect();
        self.push(&String::from_utf8_lossy(&chunk))
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.line_buffer.push_str(chunk);
        let mut frames = Vec::new();
        while let Some(newline_pos) = self.line_buffer.find('\n') {
            let line = self.line_buffer[..newline_pos].to_string();
            self.line_buffer = self.line_buffer[newline_pos + 1..].to_string();
            if let Some(frame) = self.line(line.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that was not followed by a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.line_buffer);
        let mut frame = None;
        if !rest.is_empty() {
            frame = self.line(rest.trim_end_matches('\r'));
        }
        frame.or_else(|| self.dispatch())
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// A decoded run stream frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Metadata { run_id: Option<String> },
    /// Full state: the message list and any pending interrupt
    Values {
        messages: Option<Vec<ConversationTurn>>,
        interrupt: Option<Value>,
    },
    /// Node update; only the interrupt is of interest
    Updates { interrupt: Option<Value> },
    Error(String),
    End,
    Other(String),
}

impl StreamFrame {
    pub fn decode(frame: &SseFrame) -> crate::Result<Self> {
        let event = frame.event.as_str();
        if event == events::END {
            return Ok(StreamFrame::End);
        }
        let data: Value = serde_json::from_str(&frame.data)?;
        Ok(match event {
            events::METADATA => StreamFrame::Metadata {
                run_id: data.get("run_id").and_then(Value::as_str).map(str::to_string),
            },
            events::VALUES => StreamFrame::Values {
                messages: data.get("messages").map(decode_messages),
                interrupt: extract_interrupt(&data),
            },
            events::UPDATES => StreamFrame::Updates {
                interrupt: extract_interrupt(&data),
            },
            events::ERROR => StreamFrame::Error(error_detail(&data)),
            other => StreamFrame::Other(other.to_string()),
        })
    }
}

/// Best human-readable message from an error body
pub fn error_detail(value: &Value) -> String {
    const PATHS: [&[&str]; 4] = [&["message"], &["detail"], &["error", "message"], &["error"]];
    for path in PATHS {
        let mut current = value;
        let mut found = true;
        for key in path {
            match current.get(*key) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(text) = current.as_str() {
                return text.to_string();
            }
        }
    }
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
