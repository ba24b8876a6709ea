//! Rendering boundary: every turn maps to exactly one `TurnView`.

use super::turn::{ConversationTurn, Role};
use crate::projects::{ProjectCatalog, ProjectsList};
use tracing::debug;

pub const GET_PROJECTS_TOOL: &str = "get_projects";
pub const BOOK_TIME_ENTRY_TOOL: &str = "book_time_entry";

/// How a front end should draw a turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnView {
    Human(String),
    Assistant(String),
    /// `get_projects` result, grouped by client
    ProjectList(ProjectCatalog),
    /// Result of a tool we know how to describe
    ToolResult { name: String, text: String },
    /// Tool we have no renderer for
    Unrecognized { name: String },
}

impl TurnView {
    pub fn classify(turn: &ConversationTurn, pinned_client: Option<&str>) -> Self {
        match &turn.role {
            Role::Human => TurnView::Human(turn.text()),
            Role::Assistant => TurnView::Assistant(turn.text()),
            Role::Tool { name } => match name.as_str() {
                GET_PROJECTS_TOOL => match ProjectsList::parse(&turn.text()) {
                    Ok(list) => TurnView::ProjectList(ProjectCatalog::new(
                        list,
                        pinned_client.map(str::to_string),
                    )),
                    Err(e) => {
                        debug!("get_projects turn did not parse as a project list: {}", e);
                        TurnView::ToolResult {
                            name: name.clone(),
                            text: turn.text(),
                        }
                    }
                },
                BOOK_TIME_ENTRY_TOOL => TurnView::ToolResult {
                    name: name.clone(),
                    text: turn.text(),
                },
                _ => TurnView::Unrecognized { name: name.clone() },
            },
        }
    }
}
