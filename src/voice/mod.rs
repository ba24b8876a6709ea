//! Voice input
//!
//! The speech engine is external. It reports a live transcript and a
//! `listening` flag; the end of an utterance is `listening` going from true
//! to false. The adapter mirrors the transcript into the shared input buffer
//! and asks for a submission at the end of an utterance, at most once per
//! buffer generation.

mod source;

pub use source::{JsonlVoiceSource, VoiceCommand};

use crate::input::InputBuffer;
use tracing::debug;

/// Signals from the speech engine
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Transcript(String),
    Listening(bool),
}

/// What the controller should do with the input buffer
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceAction {
    None,
    /// Show this transcript in the input buffer
    Mirror(String),
    /// The utterance ended; submit the buffer
    SubmitBuffer,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceAdapter {
    listening: bool,
    /// Buffer generation when the current utterance started
    utterance_generation: Option<u64>,
    /// Last transcript mirrored into the buffer
    transcript: String,
    /// Text already submitted. The engine may keep reporting it until the
    /// reset takes effect.
    submitted: Option<String>,
}

impl VoiceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn on_event(&mut self, event: VoiceEvent, buffer: &InputBuffer) -> VoiceAction {
        match event {
            VoiceEvent::Transcript(text) => self.on_transcript(text),
            VoiceEvent::Listening(true) => {
                if !self.listening {
                    self.listening = true;
                    self.utterance_generation = Some(buffer.generation());
                }
                VoiceAction::None
            }
            VoiceEvent::Listening(false) => {
                if !self.listening {
                    return VoiceAction::None;
                }
                self.listening = false;
                if self.utterance_generation.take() != Some(buffer.generation()) {
                    debug!("End of utterance for an already submitted buffer, ignoring");
                    return VoiceAction::None;
                }
                if buffer.is_blank() {
                    return VoiceAction::None;
                }
                VoiceAction::SubmitBuffer
            }
        }
    }

    fn on_transcript(&mut self, text: String) -> VoiceAction {
        let trimmed = text.trim();
        if let Some(submitted) = &self.submitted {
            if trimmed == submitted.as_str() {
                return VoiceAction::None;
            }
            self.submitted = None;
        }
        if trimmed.is_empty() {
            self.transcript.clear();
            return VoiceAction::None;
        }
        if text == self.transcript {
            return VoiceAction::None;
        }
        self.transcript = text.clone();
        VoiceAction::Mirror(text)
    }

    /// The buffer was submitted. Returns whether the engine's transcript
    /// should be reset.
    pub fn on_submitted(&mut self, text: &str) -> bool {
        if self.transcript.is_empty() && !self.listening {
            return false;
        }
        self.transcript.clear();
        self.submitted = Some(text.trim().to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputEdit;

    /// Apply adapter actions to a buffer the way the controller does
    fn drive(adapter: &mut VoiceAdapter, buffer: &mut InputBuffer, event: VoiceEvent) -> Vec<String> {
        let mut submitted = Vec::new();
        match adapter.on_event(event, buffer) {
            VoiceAction::None => {}
            VoiceAction::Mirror(text) => buffer.apply(InputEdit::Replace(text)),
            VoiceAction::SubmitBuffer => {
                if let Some(text) = buffer.take() {
                    adapter.on_submitted(&text);
                    submitted.push(text);
                }
            }
        }
        submitted
    }

    #[test]
    fn test_utterance_submits_once() {
        let mut adapter = VoiceAdapter::new();
        let mut buffer = InputBuffer::new();
        let mut submitted = Vec::new();
        for event in [
            VoiceEvent::Listening(true),
            VoiceEvent::Transcript("book 8".into()),
            VoiceEvent::Transcript("book 8 hours PTO".into()),
            VoiceEvent::Listening(false),
            VoiceEvent::Transcript("book 8 hours PTO".into()),
            VoiceEvent::Listening(false),
        ] {
            submitted.extend(drive(&mut adapter, &mut buffer, event));
        }
        assert_eq!(submitted, vec!["book 8 hours PTO"]);
        assert_eq!(buffer.text(), "");
    }

    #[test]
    fn test_manual_submit_makes_end_signal_stale() {
        let mut adapter = VoiceAdapter::new();
        let mut buffer = InputBuffer::new();
        drive(&mut adapter, &mut buffer, VoiceEvent::Listening(true));
        drive(&mut adapter, &mut buffer, VoiceEvent::Transcript("log it".into()));

        let text = buffer.take().unwrap();
        assert!(adapter.on_submitted(&text));

        buffer.apply(InputEdit::Insert('x'));
        let submitted = drive(&mut adapter, &mut buffer, VoiceEvent::Listening(false));
        assert!(submitted.is_empty());
        assert_eq!(buffer.text(), "x");
    }

    #[test]
    fn test_silent_utterance_is_noop() {
        let mut adapter = VoiceAdapter::new();
        let buffer = InputBuffer::new();
        adapter.on_event(VoiceEvent::Listening(true), &buffer);
        assert_eq!(
            adapter.on_event(VoiceEvent::Listening(false), &buffer),
            VoiceAction::None
        );
    }

    #[test]
    fn test_guard_lifts_on_new_transcript() {
        let mut adapter = VoiceAdapter::new();
        let mut buffer = InputBuffer::new();
        drive(&mut adapter, &mut buffer, VoiceEvent::Listening(true));
        drive(&mut adapter, &mut buffer, VoiceEvent::Transcript("same".into()));
        drive(&mut adapter, &mut buffer, VoiceEvent::Listening(false));

        assert_eq!(
            adapter.on_event(VoiceEvent::Transcript("".into()), &buffer),
            VoiceAction::None
        );
        assert_eq!(
            adapter.on_event(VoiceEvent::Transcript("same".into()), &buffer),
            VoiceAction::Mirror("same".into())
        );
    }
}
