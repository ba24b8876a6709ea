//! Timebook - human-in-the-loop chat client for the time entry agent
//!
//! A client-side controller that talks to a remote agent runtime which may
//! suspend itself before committing a time entry:
//! - Reconciles optimistic local echoes with the authoritative message stream
//! - Decodes interrupts against the known tool-call schemas
//! - Builds resume commands from the human's decision
//! - Serializes typed and voice input into a single submission path

pub mod config;
pub mod controller;
pub mod conversation;
pub mod input;
pub mod interrupt;
pub mod projects;
pub mod protocol;
pub mod resume;
pub mod session;
pub mod transport;
pub mod tui;
pub mod voice;

pub use config::TimebookConfig;
pub use controller::{Controller, Effect, Event, RunId, Status, ViewState};
pub use conversation::{Content, ContentBlock, ConversationTurn, MessageReconciler, Role, TurnId};
pub use interrupt::{DecodedInterrupt, InterruptDecoder, PendingInterrupt};
pub use resume::{Decision, ResumeCommand};
pub use session::{Session, SessionHandle};
pub use transport::{LangGraphTransport, Transport, TransportEvent};

/// Result type for Timebook operations
pub type Result<T> = std::result::Result<T, TimebookError>;

/// Errors that can occur in Timebook
#[derive(Debug, thiserror::Error)]
pub enum TimebookError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
