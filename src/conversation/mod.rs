//! Conversation history
//!
//! Turns, their content, the reconciler that merges local echoes with the
//! authoritative stream, and the rendering classification.

mod reconciler;
mod turn;
mod view;

pub use reconciler::{LocalEcho, MessageReconciler, RenderedTurn};
pub use turn::{Content, ContentBlock, ConversationTurn, ImageRef, Role, TurnId};
pub use view::{TurnView, BOOK_TIME_ENTRY_TOOL, GET_PROJECTS_TOOL};
