//! Integration tests for the conversation controller
//!
//! Runs the reducer against stream frames decoded from raw SSE text, with no
//! network involved.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use timebook::conversation::{ConversationTurn, MessageReconciler, TurnId};
use timebook::interrupt::ToolArgs;
use timebook::projects::ProjectCatalog;
use timebook::protocol::{SseDecoder, StreamFrame};
use timebook::resume::TimeEntryForm;
use timebook::voice::VoiceEvent;
use timebook::{Controller, Decision, Effect, Event, RunId, Status, TransportEvent};

const PROMPT: &str = "log 8 hours for Acme PTO yesterday";

fn tool_call(id: &str) -> Value {
    json!({
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
    })
}

/// `values` frame carrying `messages` and, optionally, a pending tool call
fn values_frame(messages: Value, interrupt: Option<&str>) -> String {
    let mut data = json!({ "messages": messages });
    if let Some(id) = interrupt {
        data["__interrupt__"] = json!([{ "value": { "tool_call": tool_call(id) } }]);
    }
    format!("event: values\ndata: {data}\n\n")
}

fn proposal_messages() -> Value {
    json!([
        {"type": "human", "id": "h1", "content": PROMPT},
        {"type": "ai", "id": "a1", "content": [
            {"type": "text", "text": "Booking 8 hours of PTO for Acme."},
            {"type": "tool_use", "id": "call_1", "name": "book_time_entry", "input": tool_call("call_1")["args"]}
        ]}
    ])
}

/// Decode SSE text and hand the frames to the controller the way the
/// transport does.
fn stream(controller: &mut Controller, run: RunId, sse: &str) -> Vec<Effect> {
    let mut decoder = SseDecoder::new();
    let mut effects = Vec::new();
    for frame in decoder.push(sse) {
        let events = match StreamFrame::decode(&frame).unwrap() {
            StreamFrame::Values {
                messages,
                interrupt,
            } => {
                let mut events = Vec::new();
                if let Some(messages) = messages {
                    events.push(TransportEvent::Messages(messages));
                }
                events.push(TransportEvent::Interrupt(interrupt));
                events
            }
            StreamFrame::Updates {
                interrupt: Some(interrupt),
            } => vec![TransportEvent::Interrupt(Some(interrupt))],
            _ => Vec::new(),
        };
        for event in events {
            effects.extend(controller.handle(Event::Transport { run, event }));
        }
    }
    effects
}

fn send(controller: &mut Controller, run: RunId, event: TransportEvent) -> Vec<Effect> {
    controller.handle(Event::Transport { run, event })
}

fn started_run(effects: &[Effect]) -> RunId {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::Submit { run, .. } | Effect::Resume { run, .. } => Some(*run),
            _ => None,
        })
        .expect("no run started")
}

fn resume_value(effects: &[Effect]) -> Value {
    effects
        .iter()
        .find_map(|e| match e {
            Effect::Resume { command, .. } => Some(command.to_payload()),
            _ => None,
        })
        .expect("no resume command")
}

/// Submit the prompt and stream a proposal up to the decision surface
fn interrupted() -> (Controller, RunId) {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit(PROMPT.to_string())));
    send(&mut controller, run, TransportEvent::Opened);
    stream(&mut controller, run, &values_frame(proposal_messages(), Some("call_1")));
    (controller, run)
}

#[test]
fn test_proposal_reaches_decision_surface() {
    let mut controller = Controller::default();
    let effects = controller.handle(Event::Submit(PROMPT.to_string()));
    assert_eq!(controller.status(), Status::Submitting);

    let view = controller.view();
    assert_eq!(view.turns.len(), 1);
    assert!(view.turns[0].pending);
    assert_eq!(view.turns[0].turn.text(), PROMPT);

    let run = started_run(&effects);
    send(&mut controller, run, TransportEvent::Opened);
    assert_eq!(controller.status(), Status::Streaming);
    stream(&mut controller, run, &values_frame(proposal_messages(), Some("call_1")));

    assert_eq!(controller.status(), Status::Interrupted);
    let view = controller.view();
    assert_eq!(view.turns.len(), 2);
    assert!(view.turns.iter().all(|t| !t.pending));

    let pending = view.pending.expect("pending interrupt");
    assert_eq!(pending.tool_call_id, "call_1");
    let ToolArgs::BookTimeEntry(args) = pending.proposed_args;
    assert_eq!(args.client_name, "Acme");
    assert_eq!(args.project_name, "PTO");
    assert_eq!(args.project_id.to_string(), "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e");
    assert_eq!(args.date.to_string(), "2024-05-01");
    assert_eq!(args.hours, 8.0);
}

#[test]
fn test_approve_then_confirmation() {
    let (mut controller, run) = interrupted();
    send(&mut controller, run, TransportEvent::Completed);
    assert_eq!(controller.status(), Status::Interrupted);

    let effects = controller.handle(Event::Decide(Decision::Approve));
    assert_eq!(
        resume_value(&effects),
        json!({"command": {"resume": {"action": "approve"}}})
    );
    assert!(controller.pending().is_none());
    assert_eq!(controller.status(), Status::ResumePending);

    let resume = started_run(&effects);
    send(&mut controller, resume, TransportEvent::Opened);
    let mut messages = proposal_messages();
    messages.as_array_mut().unwrap().push(json!({
        "type": "tool", "id": "t1", "name": "book_time_entry",
        "tool_call_id": "call_1", "content": "Booked 8 hours"
    }));
    // The answered interrupt may still be reported in state
    stream(&mut controller, resume, &values_frame(messages, Some("call_1")));
    assert!(controller.pending().is_none());

    send(&mut controller, resume, TransportEvent::Completed);
    assert_eq!(controller.status(), Status::Idle);
    let view = controller.view();
    assert_eq!(view.turns.last().unwrap().turn.text(), "Booked 8 hours");
    assert!(view.input_enabled());
}

#[test]
fn test_continue_resumes_without_verdict() {
    let (mut controller, _) = interrupted();
    let effects = controller.handle(Event::Decide(Decision::Continue));
    assert_eq!(
        resume_value(&effects),
        json!({"command": {"resume": {"action": "continue"}}})
    );
    assert_eq!(controller.status(), Status::ResumePending);
}

#[test]
fn test_edited_hours_sent_in_full() {
    let (mut controller, _) = interrupted();
    let ToolArgs::BookTimeEntry(proposed) = controller.pending().unwrap().proposed_args.clone();

    let mut form = TimeEntryForm::new(&proposed, ProjectCatalog::default());
    form.set_hours("4");
    let edited = form.submit().unwrap();

    let effects = controller.handle(Event::Decide(Decision::Edit(ToolArgs::BookTimeEntry(edited))));
    let payload = resume_value(&effects);
    assert_eq!(payload["command"]["resume"]["action"], "update");
    assert_eq!(
        payload["command"]["resume"]["data"],
        json!({
            "clientName": "Acme",
            "projectName": "PTO",
            "projectId": "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e",
            "date": "2024-05-01",
            "hours": 4.0
        })
    );
}

#[test]
fn test_cancel_returns_to_idle() {
    let (mut controller, _) = interrupted();
    let effects = controller.handle(Event::Decide(Decision::Cancel));
    assert_eq!(
        resume_value(&effects),
        json!({"command": {"resume": {"action": "cancel"}}})
    );

    let resume = started_run(&effects);
    send(&mut controller, resume, TransportEvent::Opened);
    stream(&mut controller, resume, &values_frame(proposal_messages(), None));
    send(&mut controller, resume, TransportEvent::Completed);
    assert_eq!(controller.status(), Status::Idle);
    assert!(controller.pending().is_none());

    let next = controller.handle(Event::Submit("log 2 hours".to_string()));
    assert_eq!(started_run(&next), RunId(3));
}

#[test]
fn test_stop_mid_stream_keeps_history() {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit(PROMPT.to_string())));
    send(&mut controller, run, TransportEvent::Opened);
    stream(&mut controller, run, &values_frame(json!([
        {"type": "human", "id": "h1", "content": PROMPT},
        {"type": "ai", "id": "a1", "content": "Let me look up your projects"}
    ]), None));

    let effects = controller.handle(Event::Stop);
    assert_eq!(effects, vec![Effect::Abort { run }, Effect::FocusInput]);
    assert_eq!(controller.status(), Status::Idle);

    let view = controller.view();
    assert_eq!(view.turns.len(), 2);
    assert!(view.input_enabled());

    // Late frames from the aborted run change nothing
    stream(&mut controller, run, &values_frame(proposal_messages(), Some("call_1")));
    send(&mut controller, run, TransportEvent::Completed);
    assert_eq!(controller.view(), view);
}

#[test]
fn test_stream_order_preserved() {
    let orders: [&[&str]; 3] = [&["a", "b", "c", "d"], &["d", "c", "b", "a"], &["b", "d", "a", "c"]];
    for order in orders {
        let mut reconciler = MessageReconciler::new();
        let turns: Vec<ConversationTurn> = order
            .iter()
            .map(|id| ConversationTurn::assistant(*id, format!("turn {id}")))
            .collect();
        reconciler.apply_snapshot(turns.clone());
        let ids: Vec<String> = reconciler.reconciled().into_iter().map(|t| t.key).collect();
        assert_eq!(ids, order.iter().map(|s| s.to_string()).collect::<Vec<_>>());

        let mut incremental = MessageReconciler::new();
        for turn in turns {
            incremental.apply_turn(turn);
        }
        assert_eq!(incremental.history(), reconciler.history());
    }
}

#[test]
fn test_echo_not_duplicated() {
    let mut reconciler = MessageReconciler::new();
    let local = reconciler.push_local_echo("book 8 hours PTO");
    assert_eq!(reconciler.reconciled().len(), 1);

    reconciler.apply_turn(ConversationTurn::human("h1", "book 8 hours PTO"));
    let rendered = reconciler.reconciled();
    assert_eq!(rendered.len(), 1);
    assert!(!rendered[0].pending);
    // Replaced in place
    assert_eq!(rendered[0].key, local.to_string());
    assert_eq!(rendered[0].turn.id, TurnId::Remote("h1".to_string()));
}

#[test]
fn test_single_pending_interrupt() {
    let (mut controller, run) = interrupted();

    // A second proposal while one is pending is not recognized
    stream(&mut controller, run, &values_frame(proposal_messages(), Some("call_2")));
    assert_eq!(controller.pending().unwrap().tool_call_id, "call_1");

    let effects = controller.handle(Event::Decide(Decision::Approve));
    assert!(controller.pending().is_none());

    let resume = started_run(&effects);
    stream(&mut controller, resume, &values_frame(proposal_messages(), Some("call_1")));
    assert!(controller.pending().is_none());

    stream(&mut controller, resume, &values_frame(proposal_messages(), Some("call_2")));
    assert_eq!(controller.pending().unwrap().tool_call_id, "call_2");
}

#[test]
fn test_voice_submits_once() {
    let mut controller = Controller::default();
    let mut submits = 0;
    let events = [
        VoiceEvent::Listening(true),
        VoiceEvent::Transcript("book 8".to_string()),
        VoiceEvent::Transcript("book 8 hours PTO".to_string()),
        VoiceEvent::Listening(false),
        // The engine echoes the final transcript again and repeats the end
        VoiceEvent::Transcript("book 8 hours PTO".to_string()),
        VoiceEvent::Listening(false),
    ];
    for event in events {
        let effects = controller.handle(Event::Voice(event));
        submits += effects
            .iter()
            .filter(|e| matches!(e, Effect::Submit { .. }))
            .count();
    }
    assert_eq!(submits, 1);
    assert_eq!(controller.status(), Status::Submitting);
    assert_eq!(controller.view().turns[0].turn.text(), "book 8 hours PTO");
}

#[test]
fn test_one_request_in_flight() {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit(PROMPT.to_string())));
    assert!(controller.handle(Event::Submit("again".into())).is_empty());

    send(&mut controller, run, TransportEvent::Opened);
    assert!(controller.handle(Event::Submit("again".into())).is_empty());

    stream(&mut controller, run, &values_frame(proposal_messages(), Some("call_1")));
    assert_eq!(controller.status(), Status::Interrupted);
    assert!(controller.handle(Event::Submit("again".into())).is_empty());

    controller.handle(Event::Decide(Decision::Approve));
    assert_eq!(controller.status(), Status::ResumePending);
    assert!(controller.handle(Event::Submit("again".into())).is_empty());
    assert!(controller.handle(Event::SubmitInput).is_empty());
}

#[test]
fn test_unrecognized_interrupt_needs_stop() {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit(PROMPT.to_string())));
    let sse = "event: updates\ndata: {\"__interrupt__\": [{\"value\": {\"question\": \"which timezone?\"}}]}\n\n";
    stream(&mut controller, run, sse);

    let view = controller.view();
    assert_eq!(view.status, Status::Interrupted);
    assert!(view.pending.is_none());
    assert!(view.blocked.is_some());
    assert!(controller.handle(Event::Decide(Decision::Approve)).is_empty());

    controller.handle(Event::Stop);
    assert_eq!(controller.status(), Status::Idle);
    assert!(controller.view().blocked.is_none());
}

#[test]
fn test_failure_reports_and_recovers() {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit(PROMPT.to_string())));
    send(&mut controller, run, TransportEvent::Failed("API error 500".into()));

    let view = controller.view();
    assert_eq!(view.status, Status::Idle);
    assert_eq!(view.last_error.as_deref(), Some("API error 500"));
    assert_eq!(view.turns.len(), 1);

    controller.handle(Event::Submit("retry".into()));
    assert_eq!(controller.view().last_error, None);
}

fn confirm_second(controller: &mut Controller) {
    let run = started_run(&controller.handle(Event::Submit("second".into())));
    send(controller, run, TransportEvent::Opened);
    stream(controller, run, &values_frame(json!([
        {"type": "human", "id": "h1", "content": "second"},
        {"type": "ai", "id": "a1", "content": "reply to second"}
    ]), None));
    send(controller, run, TransportEvent::Completed);
}

#[test]
fn test_resubmit_after_failure_leaves_nothing_pending() {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit("first".into())));
    send(&mut controller, run, TransportEvent::Failed("connection refused".into()));
    confirm_second(&mut controller);

    let view = controller.view();
    assert_eq!(view.status, Status::Idle);
    assert!(view.turns.iter().all(|t| !t.pending));
    let texts: Vec<String> = view.turns.iter().map(|t| t.turn.text()).collect();
    assert_eq!(texts, vec!["first", "second", "reply to second"]);
    assert!(view.turns[0].failed);
    assert!(!view.turns[1].failed);
}

#[test]
fn test_resubmit_after_stop_leaves_nothing_pending() {
    let mut controller = Controller::default();
    let run = started_run(&controller.handle(Event::Submit("first".into())));
    controller.handle(Event::Stop);
    confirm_second(&mut controller);

    let view = controller.view();
    assert!(view.turns.iter().all(|t| !t.pending));
    let keys: Vec<&str> = view.turns.iter().map(|t| t.key.as_str()).collect();
    assert_eq!(keys, vec!["local-1", "local-2", "a1"]);

    // Late frames from the stopped run are ignored
    send(&mut controller, run, TransportEvent::Completed);
    assert_eq!(controller.view(), view);
}
