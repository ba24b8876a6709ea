//! Interrupt decoding
//!
//! The runtime reports an opaque interrupt value when the agent suspends
//! itself. The decoder turns it into a `PendingInterrupt` when it is a tool
//! call we have a schema for; anything else is an unrecognized interrupt,
//! which blocks the conversation without offering a decision surface.

mod schema;

pub use schema::{parse_date, BookTimeEntry, BookTimeEntrySchema, SchemaError, ToolArgs, ToolSchema};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// A tool call awaiting the human's decision
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInterrupt {
    pub tool_call_id: String,
    pub tool_name: String,
    pub proposed_args: ToolArgs,
}

/// Outcome of decoding the runtime's interrupt value
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedInterrupt {
    /// No interrupt is pending
    None,
    /// An approval interrupt for a known tool
    Pending(PendingInterrupt),
    /// The agent is suspended on something we cannot offer a decision for
    Unrecognized { reason: String },
}

/// `{ name, id, type: "tool_call", args }`
#[derive(Debug, Deserialize)]
struct ToolCallEnvelope {
    name: String,
    id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    args: Value,
}

/// Validates interrupt values against a closed set of tool schemas
pub struct InterruptDecoder {
    schemas: Vec<Box<dyn ToolSchema>>,
}

impl Default for InterruptDecoder {
    fn default() -> Self {
        Self::empty().with_schema(BookTimeEntrySchema)
    }
}

impl InterruptDecoder {
    /// A decoder that recognizes nothing
    pub fn empty() -> Self {
        Self {
            schemas: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl ToolSchema + 'static) -> Self {
        self.schemas.push(Box::new(schema));
        self
    }

    pub fn knows(&self, tool_name: &str) -> bool {
        self.schemas.iter().any(|s| s.name() == tool_name)
    }

    pub fn decode(&self, value: Option<&Value>) -> DecodedInterrupt {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return DecodedInterrupt::None;
        };

        let decoded = match self.try_decode(value) {
            Ok(pending) => DecodedInterrupt::Pending(pending),
            Err(reason) => DecodedInterrupt::Unrecognized { reason },
        };
        if let DecodedInterrupt::Unrecognized { reason } = &decoded {
            warn!("Unrecognized interrupt: {}", reason);
        }
        decoded
    }

    fn try_decode(&self, value: &Value) -> std::result::Result<PendingInterrupt, String> {
        let call = Self::locate_tool_call(value)
            .ok_or_else(|| "interrupt value carries no tool call".to_string())?;
        let envelope: ToolCallEnvelope =
            serde_json::from_value(call.clone()).map_err(|e| format!("malformed tool call: {e}"))?;

        if let Some(kind) = envelope.kind.as_deref() {
            if kind != "tool_call" {
                return Err(format!("unexpected tool call type {kind}"));
            }
        }

        let schema = self
            .schemas
            .iter()
            .find(|s| s.name() == envelope.name)
            .ok_or_else(|| format!("no schema for tool {}", envelope.name))?;
        let proposed_args = schema
            .parse(&envelope.args)
            .map_err(|e| format!("{}: {e}", envelope.name))?;

        Ok(PendingInterrupt {
            tool_call_id: envelope.id,
            tool_name: envelope.name,
            proposed_args,
        })
    }

    /// Accepts the raw interrupt list (`[{value: ...}]`), a single
    /// `{value: ...}` wrapper, `{tool_call: ...}`, or a bare tool call.
    fn locate_tool_call(value: &Value) -> Option<&Value> {
        match value {
            Value::Array(items) => items.first().and_then(Self::locate_tool_call),
            Value::Object(map) => {
                if let Some(call) = map.get("tool_call") {
                    Some(call)
                } else if map.contains_key("name") {
                    Some(value)
                } else if let Some(inner) = map.get("value") {
                    Self::locate_tool_call(inner)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
