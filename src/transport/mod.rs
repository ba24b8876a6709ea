//! Transport to the agent runtime
//!
//! The controller never speaks the wire protocol. A transport runs one
//! submission or resume at a time and reports what it sees as
//! `TransportEvent`s tagged with the run they belong to.

mod langgraph;

pub use langgraph::LangGraphTransport;

use crate::controller::RunId;
use crate::conversation::ConversationTurn;
use crate::protocol::RunInput;
use crate::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

/// Progress of a run as seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The stream is open; turns will follow
    Opened,
    /// The full authoritative message list
    Messages(Vec<ConversationTurn>),
    /// Current interrupt value; `None` when nothing is pending
    Interrupt(Option<Value>),
    /// The run finished
    Completed,
    /// The run failed; history received so far stands
    Failed(String),
}

/// Where a running transport delivers its events
#[derive(Debug, Clone)]
pub struct EventSink {
    run: RunId,
    tx: mpsc::Sender<(RunId, TransportEvent)>,
}

impl EventSink {
    pub fn new(run: RunId, tx: mpsc::Sender<(RunId, TransportEvent)>) -> Self {
        Self { run, tx }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Returns `false` once nobody is listening.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.run, event)).await.is_ok()
    }
}

/// The streaming client the session drives.
///
/// `run` resolves when the stream ends. It does not emit `Completed` or
/// `Failed` itself; the caller reports the outcome from the returned result.
pub trait Transport: Send + Sync {
    fn run(&self, input: RunInput, sink: EventSink) -> BoxFuture<'static, Result<()>>;

    /// Best-effort cancellation of the in-flight run
    fn cancel(&self) -> BoxFuture<'static, Result<()>>;
}
