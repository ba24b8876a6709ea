//! Session driver
//!
//! Owns one `Controller` and runs it on a single task. User intents,
//! transport events and voice events are funnelled into one `select!` loop,
//! so every state change happens in order on the same timeline. Effects
//! returned by the controller are carried out here.

use crate::controller::{Controller, Effect, Event, RunId, ViewState};
use crate::protocol::RunInput;
use crate::transport::{EventSink, Transport, TransportEvent};
use crate::voice::{JsonlVoiceSource, VoiceCommand, VoiceEvent};
use crate::{Result, TimebookError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Front-end side of a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Event>,
}

impl SessionHandle {
    pub async fn send(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TimebookError::Transport("session has ended".to_string()))
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<()> {
        self.send(Event::Submit(text.into())).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Event::Stop).await
    }
}

pub struct Session {
    controller: Controller,
    transport: Arc<dyn Transport>,
    voice: Option<JsonlVoiceSource>,
    events_rx: mpsc::Receiver<Event>,
    transport_tx: mpsc::Sender<(RunId, TransportEvent)>,
    transport_rx: mpsc::Receiver<(RunId, TransportEvent)>,
    view_tx: mpsc::Sender<ViewState>,
    running: Option<(RunId, JoinHandle<()>)>,
}

impl Session {
    /// Returns the session, the handle front ends send intents through, and
    /// the stream of view snapshots (one per processed event).
    pub fn new(
        controller: Controller,
        transport: Arc<dyn Transport>,
    ) -> (Self, SessionHandle, mpsc::Receiver<ViewState>) {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (view_tx, view_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let session = Self {
            controller,
            transport,
            voice: None,
            events_rx,
            transport_tx,
            transport_rx,
            view_tx,
            running: None,
        };
        (session, SessionHandle { tx: events_tx }, view_rx)
    }

    pub fn with_voice(mut self, source: Option<JsonlVoiceSource>) -> Self {
        self.voice = source;
        self
    }

    /// Run until every `SessionHandle` is dropped.
    pub async fn run(mut self) -> Result<()> {
        let mut voice_rx = self.spawn_voice();
        self.publish().await;

        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
                Some((run, event)) = self.transport_rx.recv() => {
                    self.dispatch(Event::Transport { run, event }).await;
                }
                Some(event) = recv_voice(&mut voice_rx) => {
                    self.dispatch(Event::Voice(event)).await;
                }
            }
        }

        if let Some((run, handle)) = self.running.take() {
            debug!("Session ended, aborting {}", run);
            handle.abort();
        }
        Ok(())
    }

    fn spawn_voice(&self) -> Option<mpsc::Receiver<VoiceEvent>> {
        let source = self.voice.clone()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let path = source.events_path().display().to_string();
            if let Err(e) = source.run(tx).await {
                warn!("Voice source {} stopped: {}", path, e);
            }
        });
        Some(rx)
    }

    async fn dispatch(&mut self, event: Event) {
        for effect in self.controller.handle(event) {
            self.execute(effect);
        }
        self.publish().await;
    }

    async fn publish(&self) {
        if self.view_tx.send(self.controller.view()).await.is_err() {
            debug!("View receiver dropped");
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Submit { run, text } => self.start_run(run, RunInput::Message(text)),
            Effect::Resume { run, command } => self.start_run(run, RunInput::Resume(command)),
            Effect::Abort { run } => self.abort_run(run),
            Effect::FocusInput => {}
            Effect::StartListening => self.voice_command(VoiceCommand::Start),
            Effect::StopListening => self.voice_command(VoiceCommand::Stop),
            Effect::ResetTranscript => self.voice_command(VoiceCommand::Reset),
        }
    }

    fn start_run(&mut self, run: RunId, input: RunInput) {
        if let Some((previous, handle)) = self.running.take() {
            debug!("Replacing {} with {}", previous, run);
            handle.abort();
        }

        let sink = EventSink::new(run, self.transport_tx.clone());
        let future = self.transport.run(input, sink.clone());
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => TransportEvent::Completed,
                Ok(Err(e)) => TransportEvent::Failed(e.to_string()),
                Err(_) => TransportEvent::Failed("transport panicked".to_string()),
            };
            sink.emit(outcome).await;
        });
        self.running = Some((run, handle));
    }

    fn abort_run(&mut self, run: RunId) {
        match self.running.take() {
            Some((current, handle)) if current == run => {
                let cancel = self.transport.cancel();
                tokio::spawn(async move {
                    if let Err(e) = cancel.await {
                        debug!("Cancel request failed: {}", e);
                    }
                });
                handle.abort();
            }
            other => self.running = other,
        }
    }

    fn voice_command(&self, command: VoiceCommand) {
        let Some(source) = self.voice.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = source.send_command(command).await {
                warn!("Voice command {:?} failed: {}", command, e);
            }
        });
    }
}

async fn recv_voice(rx: &mut Option<mpsc::Receiver<VoiceEvent>>) -> Option<VoiceEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
