//! Bridge to an external speech engine over JSON lines
//!
//! The engine appends `{"transcript": "...", "listening": true}` lines to an
//! events file (or FIFO). Commands go the other way as
//! `{"command": "start" | "stop" | "reset"}` lines in a control file.

use super::VoiceEvent;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Debug, Deserialize)]
struct VoiceLine {
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    listening: Option<bool>,
}

/// Commands the controller sends to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    Start,
    Stop,
    Reset,
}

#[derive(Debug, Clone)]
pub struct JsonlVoiceSource {
    events: PathBuf,
    control: Option<PathBuf>,
    /// Keep polling at end of file instead of stopping
    follow: bool,
}

impl JsonlVoiceSource {
    pub fn new(events: impl Into<PathBuf>) -> Self {
        Self {
            events: events.into(),
            control: None,
            follow: true,
        }
    }

    pub fn with_control(mut self, control: Option<PathBuf>) -> Self {
        self.control = control;
        self
    }

    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn events_path(&self) -> &Path {
        &self.events
    }

    /// Decode one line. The transcript is reported before the listening flag
    /// so a final transcript lands in the buffer before the utterance ends.
    pub fn parse_line(line: &str) -> Vec<VoiceEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<VoiceLine>(line) {
            Ok(parsed) => {
                let mut events = Vec::new();
                if let Some(transcript) = parsed.transcript {
                    events.push(VoiceEvent::Transcript(transcript));
                }
                if let Some(listening) = parsed.listening {
                    events.push(VoiceEvent::Listening(listening));
                }
                events
            }
            Err(e) => {
                warn!("Skipping malformed voice event line: {}", e);
                Vec::new()
            }
        }
    }

    /// Read events until the file ends (when not following) or the receiver
    /// goes away.
    pub async fn run(self, tx: mpsc::Sender<VoiceEvent>) -> Result<()> {
        let file = tokio::fs::File::open(&self.events).await?;
        let mut lines = BufReader::new(file).lines();
        debug!("Reading voice events from {}", self.events.display());

        loop {
            match lines.next_line().await? {
                Some(line) => {
                    for event in Self::parse_line(&line) {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                None if self.follow => {
                    if tx.is_closed() {
                        return Ok(());
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                None => return Ok(()),
            }
        }
    }

    /// Append a command to the control file. No control file, no-op.
    pub async fn send_command(&self, command: VoiceCommand) -> Result<()> {
        let Some(path) = &self.control else {
            debug!("No voice control file, dropping {:?}", command);
            return Ok(());
        };
        let mut line = serde_json::to_string(&serde_json::json!({ "command": command }))?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
