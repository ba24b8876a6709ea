//! Resume commands
//!
//! Translates the human's decision on a pending interrupt into the payload
//! that un-suspends the agent:
//!
//! ```json
//! { "command": { "resume": { "action": "update", "data": { ...full args... } } } }
//! ```

mod form;

pub use form::{FieldError, FormField, TimeEntryForm};

use crate::interrupt::{PendingInterrupt, ToolArgs};
use serde_json::{json, Value};

/// What the human decided on the decision surface
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue,
    Approve,
    /// Approve with the full edited argument set
    Edit(ToolArgs),
    Cancel,
    Feedback(String),
}

/// The single command sent per interrupt
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeCommand {
    Continue,
    Approve,
    ApproveWithEdits(ToolArgs),
    Cancel,
    Feedback(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResumeError {
    #[error("no interrupt is pending")]
    NoPendingInterrupt,

    #[error("edited arguments are for {edited}, pending call is {pending}")]
    ToolMismatch { pending: String, edited: String },

    #[error("feedback text is empty")]
    EmptyFeedback,
}

impl ResumeCommand {
    /// Wire action name
    pub fn action(&self) -> &'static str {
        match self {
            ResumeCommand::Continue => "continue",
            ResumeCommand::Approve => "approve",
            ResumeCommand::ApproveWithEdits(_) => "update",
            ResumeCommand::Cancel => "cancel",
            ResumeCommand::Feedback(_) => "feedback",
        }
    }

    pub fn data(&self) -> Option<Value> {
        match self {
            ResumeCommand::ApproveWithEdits(args) => Some(args.to_value()),
            ResumeCommand::Feedback(text) => Some(Value::String(text.clone())),
            _ => None,
        }
    }

    /// `{ "action": ..., "data"?: ... }`
    pub fn to_resume_value(&self) -> Value {
        let mut resume = json!({ "action": self.action() });
        if let Some(data) = self.data() {
            resume["data"] = data;
        }
        resume
    }

    /// `{ "command": { "resume": ... } }`
    pub fn to_payload(&self) -> Value {
        json!({ "command": { "resume": self.to_resume_value() } })
    }
}

/// Builds resume commands and clears the pending interrupt they answer.
pub struct ResumeBuilder;

impl ResumeBuilder {
    /// Consume the pending interrupt in `slot` and produce the command for
    /// `decision`.
    ///
    /// The slot is only cleared when a command is produced, so a rejected
    /// decision leaves the decision surface in place.
    pub fn build(
        slot: &mut Option<PendingInterrupt>,
        decision: Decision,
    ) -> Result<(PendingInterrupt, ResumeCommand), ResumeError> {
        let pending = slot.as_ref().ok_or(ResumeError::NoPendingInterrupt)?;

        let command = match decision {
            Decision::Continue => ResumeCommand::Continue,
            Decision::Approve => ResumeCommand::Approve,
            Decision::Cancel => ResumeCommand::Cancel,
            Decision::Edit(args) => {
                if args.tool_name() != pending.tool_name {
                    return Err(ResumeError::ToolMismatch {
                        pending: pending.tool_name.clone(),
                        edited: args.tool_name().to_string(),
                    });
                }
                ResumeCommand::ApproveWithEdits(args)
            }
            Decision::Feedback(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ResumeError::EmptyFeedback);
                }
                ResumeCommand::Feedback(text.to_string())
            }
        };

        let pending = slot.take().ok_or(ResumeError::NoPendingInterrupt)?;
        Ok((pending, command))
    }
}
