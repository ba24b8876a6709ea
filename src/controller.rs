//! Submission coordinator
//!
//! A reducer over one conversation: every input (user intent, transport
//! event, voice signal) goes through `Controller::handle`, which mutates
//! state and returns the side effects to perform. Nothing here blocks or
//! performs I/O, so the whole state machine is testable without a network.
//!
//! ```text
//! Idle --submit--> Submitting --opened--> Streaming --completed--> Idle
//!                                         Streaming --interrupt--> Interrupted
//! Interrupted --decision--> ResumePending --opened--> Streaming
//! any --stop--> Idle
//! ```

use crate::conversation::{MessageReconciler, RenderedTurn};
use crate::input::{InputBuffer, InputEdit};
use crate::interrupt::{DecodedInterrupt, InterruptDecoder, PendingInterrupt};
use crate::resume::{Decision, ResumeBuilder, ResumeCommand};
use crate::transport::TransportEvent;
use crate::voice::{VoiceAction, VoiceAdapter, VoiceEvent};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Identity of one submission or resume round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Submitting,
    Streaming,
    Interrupted,
    ResumePending,
}

impl Status {
    /// Awaiting the agent
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            Status::Submitting | Status::Streaming | Status::ResumePending
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Submitting => "submitting",
            Status::Streaming => "streaming",
            Status::Interrupted => "awaiting decision",
            Status::ResumePending => "resuming",
        }
    }
}

/// Inputs to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Submit this text as a new human turn
    Submit(String),
    /// Submit the contents of the input buffer
    SubmitInput,
    /// Edit the input buffer
    Input(InputEdit),
    /// Decision on the pending interrupt
    Decide(Decision),
    Stop,
    Voice(VoiceEvent),
    /// Start or stop listening
    ToggleVoice,
    Transport { run: RunId, event: TransportEvent },
}

/// Work for the session to carry out
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Submit { run: RunId, text: String },
    Resume { run: RunId, command: ResumeCommand },
    Abort { run: RunId },
    FocusInput,
    StartListening,
    StopListening,
    ResetTranscript,
}

/// Read-only snapshot for front ends
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub status: Status,
    pub turns: Vec<RenderedTurn>,
    /// Present only while `Interrupted` with a recognized interrupt
    pub pending: Option<PendingInterrupt>,
    /// Why the conversation is blocked on an interrupt we cannot act on
    pub blocked: Option<String>,
    pub input: InputBuffer,
    pub listening: bool,
    pub last_error: Option<String>,
}

impl ViewState {
    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    /// Free-text input is accepted
    pub fn input_enabled(&self) -> bool {
        self.status == Status::Idle
    }
}

pub struct Controller {
    status: Status,
    reconciler: MessageReconciler,
    decoder: InterruptDecoder,
    pending: Option<PendingInterrupt>,
    blocked: Option<String>,
    /// Tool calls already answered; their interrupt value may linger in the
    /// runtime's state after the resume is sent.
    resolved: HashSet<String>,
    input: InputBuffer,
    voice: VoiceAdapter,
    next_run: u64,
    active_run: Option<RunId>,
    last_error: Option<String>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(InterruptDecoder::default())
    }
}

impl Controller {
    pub fn new(decoder: InterruptDecoder) -> Self {
        Self {
            status: Status::Idle,
            reconciler: MessageReconciler::new(),
            decoder,
            pending: None,
            blocked: None,
            resolved: HashSet::new(),
            input: InputBuffer::new(),
            voice: VoiceAdapter::new(),
            next_run: 0,
            active_run: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn pending(&self) -> Option<&PendingInterrupt> {
        self.pending.as_ref()
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.active_run
    }

    pub fn reconciler(&self) -> &MessageReconciler {
        &self.reconciler
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn view(&self) -> ViewState {
        ViewState {
            status: self.status,
            turns: self.reconciler.reconciled(),
            pending: self.pending.clone(),
            blocked: self.blocked.clone(),
            input: self.input.clone(),
            listening: self.voice.is_listening(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Submit(text) => self.submit(text),
            Event::SubmitInput => self.submit_input(),
            Event::Input(edit) => {
                if self.status == Status::Idle {
                    self.input.apply(edit);
                } else {
                    debug!("Input disabled while {}", self.status.label());
                }
                Vec::new()
            }
            Event::Decide(decision) => self.decide(decision),
            Event::Stop => self.stop(),
            Event::Voice(event) => self.on_voice(event),
            Event::ToggleVoice => {
                if self.voice.is_listening() {
                    vec![Effect::StopListening]
                } else if self.status == Status::Idle {
                    vec![Effect::StartListening]
                } else {
                    Vec::new()
                }
            }
            Event::Transport { run, event } => {
                if self.active_run != Some(run) {
                    debug!("Dropping {:?} from stale {}", event, run);
                    return Vec::new();
                }
                self.on_transport(run, event)
            }
        }
    }

    fn next_run_id(&mut self) -> RunId {
        self.next_run += 1;
        let run = RunId(self.next_run);
        self.active_run = Some(run);
        run
    }

    fn submit(&mut self, text: String) -> Vec<Effect> {
        if self.status != Status::Idle {
            info!("Submission rejected while {}", self.status.label());
            return Vec::new();
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return Vec::new();
        }

        self.reconciler.push_local_echo(text.as_str());
        self.last_error = None;
        self.status = Status::Submitting;
        let run = self.next_run_id();
        info!("Submitting {}", run);

        let mut effects = vec![Effect::Submit { run, text: text.clone() }];
        if self.voice.on_submitted(&text) {
            effects.push(Effect::ResetTranscript);
        }
        effects
    }

    fn submit_input(&mut self) -> Vec<Effect> {
        if self.status != Status::Idle {
            info!("Submission rejected while {}", self.status.label());
            return Vec::new();
        }
        match self.input.take() {
            Some(text) => self.submit(text),
            None => Vec::new(),
        }
    }

    fn decide(&mut self, decision: Decision) -> Vec<Effect> {
        if self.status != Status::Interrupted {
            warn!("Decision ignored while {}", self.status.label());
            return Vec::new();
        }
        match ResumeBuilder::build(&mut self.pending, decision) {
            Ok((resolved, command)) => {
                self.resolved.insert(resolved.tool_call_id.clone());
                self.status = Status::ResumePending;
                let run = self.next_run_id();
                info!(
                    "Resuming {} ({}) with {}",
                    resolved.tool_name,
                    resolved.tool_call_id,
                    command.action()
                );
                vec![Effect::Resume { run, command }]
            }
            Err(e) => {
                warn!("Decision rejected: {}", e);
                Vec::new()
            }
        }
    }

    fn stop(&mut self) -> Vec<Effect> {
        if self.status == Status::Idle {
            return Vec::new();
        }
        info!("Stopped while {}", self.status.label());
        let mut effects = Vec::new();
        if let Some(run) = self.active_run.take() {
            effects.push(Effect::Abort { run });
        }
        self.reconciler.fail_outstanding();
        self.status = Status::Idle;
        self.pending = None;
        self.blocked = None;
        effects.push(Effect::FocusInput);
        effects
    }

    fn on_voice(&mut self, event: VoiceEvent) -> Vec<Effect> {
        match self.voice.on_event(event, &self.input) {
            VoiceAction::None => Vec::new(),
            _ if self.status != Status::Idle => {
                debug!("Voice input ignored while {}", self.status.label());
                Vec::new()
            }
            VoiceAction::Mirror(text) => {
                self.input.apply(InputEdit::Replace(text));
                Vec::new()
            }
            VoiceAction::SubmitBuffer => self.submit_input(),
        }
    }

    fn on_transport(&mut self, run: RunId, event: TransportEvent) -> Vec<Effect> {
        match event {
            TransportEvent::Opened => {
                if matches!(self.status, Status::Submitting | Status::ResumePending) {
                    self.status = Status::Streaming;
                }
                Vec::new()
            }
            TransportEvent::Messages(turns) => {
                self.reconciler.apply_snapshot(turns);
                if matches!(self.status, Status::Submitting | Status::ResumePending) {
                    self.status = Status::Streaming;
                }
                Vec::new()
            }
            TransportEvent::Interrupt(value) => {
                self.on_interrupt(value.as_ref());
                Vec::new()
            }
            TransportEvent::Completed => {
                self.active_run = None;
                if self.status == Status::Interrupted {
                    debug!("{} completed awaiting a decision", run);
                    return Vec::new();
                }
                debug!("{} completed", run);
                self.status = Status::Idle;
                vec![Effect::FocusInput]
            }
            TransportEvent::Failed(message) => {
                warn!("{} failed: {}", run, message);
                self.active_run = None;
                self.last_error = Some(message);
                self.reconciler.fail_outstanding();
                self.status = Status::Idle;
                self.pending = None;
                self.blocked = None;
                vec![Effect::FocusInput]
            }
        }
    }

    fn on_interrupt(&mut self, value: Option<&Value>) {
        if self.status == Status::Interrupted {
            return;
        }
        match self.decoder.decode(value) {
            DecodedInterrupt::None => {}
            DecodedInterrupt::Pending(pending) => {
                if self.resolved.contains(&pending.tool_call_id) {
                    debug!("Interrupt {} already answered", pending.tool_call_id);
                    return;
                }
                info!(
                    "Interrupt for {} ({})",
                    pending.tool_name, pending.tool_call_id
                );
                self.pending = Some(pending);
                self.blocked = None;
                self.status = Status::Interrupted;
            }
            DecodedInterrupt::Unrecognized { reason } => {
                self.pending = None;
                self.blocked = Some(reason);
                self.status = Status::Interrupted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationTurn;
    use serde_json::json;

    fn interrupt(id: &str) -> Value {
        json!([{"value": {"tool_call": {
            "name": "book_time_entry",
            "id": id,
            "type": "tool_call",
            "args": {
                "clientName": "Acme",
                "projectName": "PTO",
                "projectId": "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e",
                "date": "2024-05-01",
                "hours": 8
            }
        }}}])
    }

    fn run_of(effects: &[Effect]) -> RunId {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Submit { run, .. } | Effect::Resume { run, .. } => Some(*run),
                _ => None,
            })
            .expect("no run started")
    }

    fn transport(controller: &mut Controller, run: RunId, event: TransportEvent) -> Vec<Effect> {
        controller.handle(Event::Transport { run, event })
    }

    #[test]
    fn test_submit_creates_echo_and_run() {
        let mut controller = Controller::default();
        let effects = controller.handle(Event::Submit("  log 8 hours ".into()));
        assert_eq!(
            effects,
            vec![Effect::Submit {
                run: RunId(1),
                text: "log 8 hours".into()
            }]
        );
        assert_eq!(controller.status(), Status::Submitting);
        let view = controller.view();
        assert_eq!(view.turns.len(), 1);
        assert!(view.turns[0].pending);
        assert!(!view.input_enabled());
    }

    #[test]
    fn test_blank_submission_ignored() {
        let mut controller = Controller::default();
        assert!(controller.handle(Event::Submit("   ".into())).is_empty());
        assert!(controller.handle(Event::SubmitInput).is_empty());
        assert_eq!(controller.status(), Status::Idle);
    }

    #[test]
    fn test_input_disabled_while_busy() {
        let mut controller = Controller::default();
        controller.handle(Event::Submit("hi".into()));
        controller.handle(Event::Input(InputEdit::Insert('x')));
        assert_eq!(controller.input().text(), "");
    }

    #[test]
    fn test_stale_run_events_dropped() {
        let mut controller = Controller::default();
        let first = run_of(&controller.handle(Event::Submit("first".into())));
        controller.handle(Event::Stop);
        let second = run_of(&controller.handle(Event::Submit("second".into())));
        assert_ne!(first, second);

        transport(
            &mut controller,
            first,
            TransportEvent::Messages(vec![ConversationTurn::assistant("late", "late reply")]),
        );
        transport(&mut controller, first, TransportEvent::Completed);
        assert_eq!(controller.status(), Status::Submitting);
        assert!(controller.reconciler().history().is_empty());
    }

    #[test]
    fn test_answered_interrupt_not_recognized_again() {
        let mut controller = Controller::default();
        let run = run_of(&controller.handle(Event::Submit("book".into())));
        transport(&mut controller, run, TransportEvent::Opened);
        transport(&mut controller, run, TransportEvent::Interrupt(Some(interrupt("call-1"))));
        transport(&mut controller, run, TransportEvent::Completed);
        assert_eq!(controller.status(), Status::Interrupted);

        let resume = run_of(&controller.handle(Event::Decide(Decision::Approve)));
        assert!(controller.pending().is_none());

        transport(&mut controller, resume, TransportEvent::Interrupt(Some(interrupt("call-1"))));
        assert_eq!(controller.status(), Status::ResumePending);

        transport(&mut controller, resume, TransportEvent::Interrupt(Some(interrupt("call-2"))));
        assert_eq!(controller.status(), Status::Interrupted);
        assert_eq!(controller.pending().unwrap().tool_call_id, "call-2");
    }

    #[test]
    fn test_unrecognized_interrupt_blocks_without_decision() {
        let mut controller = Controller::default();
        let run = run_of(&controller.handle(Event::Submit("query".into())));
        transport(
            &mut controller,
            run,
            TransportEvent::Interrupt(Some(json!([{"value": {"question": "sure?"}}]))),
        );
        let view = controller.view();
        assert_eq!(view.status, Status::Interrupted);
        assert!(view.pending.is_none());
        assert!(view.blocked.is_some());

        assert!(controller.handle(Event::Decide(Decision::Approve)).is_empty());
        assert_eq!(controller.status(), Status::Interrupted);

        controller.handle(Event::Stop);
        assert_eq!(controller.status(), Status::Idle);
        assert!(controller.view().blocked.is_none());
    }

    #[test]
    fn test_failure_returns_to_idle_keeping_history() {
        let mut controller = Controller::default();
        let run = run_of(&controller.handle(Event::Submit("hi".into())));
        transport(
            &mut controller,
            run,
            TransportEvent::Messages(vec![ConversationTurn::human("h1", "hi")]),
        );
        let effects = transport(&mut controller, run, TransportEvent::Failed("network".into()));
        assert_eq!(effects, vec![Effect::FocusInput]);

        let view = controller.view();
        assert_eq!(view.status, Status::Idle);
        assert_eq!(view.last_error.as_deref(), Some("network"));
        assert_eq!(view.turns.len(), 1);
    }

    #[test]
    fn test_unconfirmed_echo_marked_failed_on_stop() {
        let mut controller = Controller::default();
        controller.handle(Event::Submit("hi".into()));
        controller.handle(Event::Stop);

        let view = controller.view();
        assert_eq!(view.turns.len(), 1);
        assert!(!view.turns[0].pending);
        assert!(view.turns[0].failed);
        assert_eq!(controller.reconciler().outstanding_echoes(), 0);
    }

    #[test]
    fn test_toggle_voice() {
        let mut controller = Controller::default();
        assert_eq!(controller.handle(Event::ToggleVoice), vec![Effect::StartListening]);
        controller.handle(Event::Voice(VoiceEvent::Listening(true)));
        assert_eq!(controller.handle(Event::ToggleVoice), vec![Effect::StopListening]);
    }

    #[test]
    fn test_typed_submit_resets_live_transcript() {
        let mut controller = Controller::default();
        controller.handle(Event::Voice(VoiceEvent::Listening(true)));
        controller.handle(Event::Voice(VoiceEvent::Transcript("log 8".into())));
        let effects = controller.handle(Event::SubmitInput);
        assert!(effects.contains(&Effect::ResetTranscript));

        // The end of the same utterance must not submit again
        assert!(controller
            .handle(Event::Voice(VoiceEvent::Listening(false)))
            .is_empty());
    }
}
