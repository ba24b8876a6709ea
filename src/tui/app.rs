//! Main TUI application

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event as TermEvent, KeyEventKind, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    widgets::Paragraph,
    Terminal,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::keys::{map_key, KeyAction, Mode};
use super::widgets::{
    history_lines, BlockedPanel, DecisionPanel, FormPopup, HeaderBar, HelpBar, InputBox,
    StatusBar,
};
use crate::controller::{Event, ViewState};
use crate::input::InputBuffer;
use crate::interrupt::ToolArgs;
use crate::projects::ProjectCatalog;
use crate::resume::{Decision, FieldError, TimeEntryForm};
use crate::session::SessionHandle;

const QUIT_WINDOW: Duration = Duration::from_secs(2);
const SPINNER_INTERVAL: Duration = Duration::from_millis(80);
const POLL_TIMEOUT: Duration = Duration::from_millis(16);

pub struct App {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    session: SessionHandle,
    views: mpsc::Receiver<ViewState>,
    view: ViewState,
    endpoint: String,
    pinned_client: Option<String>,
    catalog: Option<ProjectCatalog>,
    catalog_rx: Option<oneshot::Receiver<ProjectCatalog>>,
    /// Edit form for the pending interrupt
    form: Option<TimeEntryForm>,
    form_errors: Vec<FieldError>,
    /// Feedback line for the pending interrupt
    feedback: Option<InputBuffer>,
    /// Tool call the form or feedback line belongs to
    decision_for: Option<String>,
    /// Lines scrolled up from the bottom
    scroll_offset: u16,
    spinner_frame: usize,
    quit_armed_at: Option<Instant>,
    session_closed: bool,
    should_quit: bool,
}

impl App {
    pub fn new(
        session: SessionHandle,
        views: mpsc::Receiver<ViewState>,
        initial: ViewState,
        endpoint: String,
        pinned_client: Option<String>,
    ) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, crossterm::event::EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            session,
            views,
            view: initial,
            endpoint,
            pinned_client,
            catalog: None,
            catalog_rx: None,
            form: None,
            form_errors: Vec::new(),
            feedback: None,
            decision_for: None,
            scroll_offset: 0,
            spinner_frame: 0,
            quit_armed_at: None,
            session_closed: false,
            should_quit: false,
        })
    }

    /// Project catalog for the edit form, delivered once fetched
    pub fn with_catalog(mut self, rx: oneshot::Receiver<ProjectCatalog>) -> Self {
        self.catalog_rx = Some(rx);
        self
    }

    /// Run the main event loop
    pub async fn run(&mut self) -> io::Result<()> {
        let mut last_spinner_update = Instant::now();

        while !self.should_quit {
            self.drain_views();
            self.poll_catalog();

            if last_spinner_update.elapsed() >= SPINNER_INTERVAL {
                self.spinner_frame = self.spinner_frame.wrapping_add(1);
                last_spinner_update = Instant::now();
            }
            if self
                .quit_armed_at
                .is_some_and(|armed| armed.elapsed() > QUIT_WINDOW)
            {
                self.quit_armed_at = None;
            }

            self.draw()?;

            if event::poll(POLL_TIMEOUT)? {
                match event::read()? {
                    TermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                        let action = map_key(self.mode(), key);
                        self.handle_action(action).await;
                    }
                    TermEvent::Mouse(mouse) => match mouse.kind {
                        MouseEventKind::ScrollUp => self.scroll_up(3),
                        MouseEventKind::ScrollDown => self.scroll_down(3),
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn drain_views(&mut self) {
        loop {
            match self.views.try_recv() {
                Ok(view) => self.apply_view(view),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if !self.session_closed {
                        warn!("Session ended");
                        self.session_closed = true;
                    }
                    break;
                }
            }
        }
    }

    fn apply_view(&mut self, view: ViewState) {
        let pending_id = view.pending.as_ref().map(|p| p.tool_call_id.clone());
        if pending_id.is_none() || pending_id != self.decision_for {
            self.form = None;
            self.form_errors.clear();
            self.feedback = None;
            self.decision_for = pending_id;
        }
        if view.turns.len() != self.view.turns.len() {
            self.scroll_offset = 0;
        }
        self.view = view;
    }

    fn poll_catalog(&mut self) {
        let Some(rx) = self.catalog_rx.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(catalog) => {
                debug!("Project catalog loaded with {} clients", catalog.clients().len());
                self.catalog = Some(catalog);
                self.catalog_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => self.catalog_rx = None,
        }
    }

    fn mode(&self) -> Mode {
        if self.form.is_some() {
            Mode::Form
        } else if self.feedback.is_some() {
            Mode::Feedback
        } else if self.view.pending.is_some() {
            Mode::Decision
        } else {
            Mode::Chat
        }
    }

    async fn send(&mut self, event: Event) {
        if let Err(e) = self.session.send(event).await {
            warn!("Dropping input: {}", e);
            self.session_closed = true;
        }
    }

    fn busy(&self) -> bool {
        self.view.is_loading() || self.view.blocked.is_some()
    }

    async fn handle_action(&mut self, action: KeyAction) {
        match action {
            KeyAction::None => {}
            KeyAction::Quit => {
                if self.session_closed {
                    self.should_quit = true;
                } else if self.busy() {
                    self.send(Event::Stop).await;
                } else if self.quit_armed_at.is_some() {
                    self.should_quit = true;
                } else {
                    self.quit_armed_at = Some(Instant::now());
                }
            }
            KeyAction::Stop => {
                if self.busy() {
                    self.send(Event::Stop).await;
                }
            }
            KeyAction::ScrollUp(n) => self.scroll_up(n),
            KeyAction::ScrollDown(n) => self.scroll_down(n),
            KeyAction::ToggleVoice => self.send(Event::ToggleVoice).await,
            KeyAction::Approve => self.send(Event::Decide(Decision::Approve)).await,
            KeyAction::Continue => self.send(Event::Decide(Decision::Continue)).await,
            KeyAction::Cancel => self.send(Event::Decide(Decision::Cancel)).await,
            KeyAction::OpenForm => self.open_form(),
            KeyAction::OpenFeedback => self.feedback = Some(InputBuffer::new()),
            KeyAction::Close => {
                self.form = None;
                self.form_errors.clear();
                self.feedback = None;
            }
            KeyAction::Edit(edit) => match self.feedback.as_mut() {
                Some(buffer) => buffer.apply(edit),
                None => self.send(Event::Input(edit)).await,
            },
            KeyAction::Submit => self.submit().await,
            KeyAction::NextField => self.with_form(TimeEntryForm::focus_next),
            KeyAction::PrevField => self.with_form(TimeEntryForm::focus_prev),
            KeyAction::Cycle(forward) => self.with_form(|f| f.cycle_focused(forward)),
            KeyAction::FormChar(c) => self.with_form(|f| f.insert_char(c)),
            KeyAction::FormBackspace => self.with_form(TimeEntryForm::backspace),
        }
    }

    fn with_form(&mut self, op: impl FnOnce(&mut TimeEntryForm)) {
        if let Some(form) = self.form.as_mut() {
            op(form);
            self.form_errors.clear();
        }
    }

    fn open_form(&mut self) {
        let Some(pending) = &self.view.pending else {
            return;
        };
        match &pending.proposed_args {
            ToolArgs::BookTimeEntry(args) => {
                let catalog = self.catalog.clone().unwrap_or_default();
                self.form = Some(TimeEntryForm::new(args, catalog));
                self.form_errors.clear();
            }
        }
    }

    async fn submit(&mut self) {
        match self.mode() {
            Mode::Chat => self.send(Event::SubmitInput).await,
            Mode::Decision => self.send(Event::Decide(Decision::Approve)).await,
            Mode::Form => {
                let Some(form) = self.form.as_mut() else {
                    return;
                };
                match form.submit() {
                    Ok(entry) => {
                        self.form = None;
                        self.send(Event::Decide(Decision::Edit(ToolArgs::BookTimeEntry(entry))))
                            .await;
                    }
                    Err(errors) => self.form_errors = errors,
                }
            }
            Mode::Feedback => {
                let text = self.feedback.as_mut().and_then(InputBuffer::take);
                if let Some(text) = text {
                    self.feedback = None;
                    self.send(Event::Decide(Decision::Feedback(text))).await;
                }
            }
        }
    }

    fn scroll_up(&mut self, n: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(n);
    }

    fn scroll_down(&mut self, n: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }

    fn help_bindings(&self) -> Vec<(&'static str, &'static str)> {
        if self.quit_armed_at.is_some() {
            return vec![("Ctrl+C", "again to quit")];
        }
        match self.mode() {
            Mode::Chat if self.busy() => vec![("Esc", "stop"), ("PgUp/PgDn", "scroll")],
            Mode::Chat => vec![
                ("Enter", "send"),
                ("Ctrl+V", "voice"),
                ("PgUp/PgDn", "scroll"),
                ("Ctrl+C", "quit"),
            ],
            Mode::Decision => vec![
                ("y", "approve"),
                ("e", "edit"),
                ("f", "feedback"),
                ("c", "continue"),
                ("n", "cancel"),
            ],
            Mode::Form => vec![("Enter", "approve"), ("Esc", "back")],
            Mode::Feedback => vec![("Enter", "send feedback"), ("Esc", "back")],
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        let mode = self.mode();
        let bindings = self.help_bindings();
        let view = &self.view;
        let form = self.form.as_ref();
        let form_errors = &self.form_errors;
        let feedback = self.feedback.as_ref();
        let endpoint = self.endpoint.as_str();
        let pinned = self.pinned_client.as_deref();
        let spinner_frame = self.spinner_frame;
        let scroll_offset = &mut self.scroll_offset;

        self.terminal.draw(|frame| {
            let area = frame.area();
            let panel_height = match (&view.pending, &view.blocked) {
                (Some(_), _) => DecisionPanel::HEIGHT,
                (None, Some(_)) => 4,
                (None, None) => 0,
            };
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Min(3),
                    Constraint::Length(panel_height),
                    Constraint::Length(3),
                    Constraint::Length(1),
                ])
                .split(area);

            frame.render_widget(
                HeaderBar {
                    title: "Timebook",
                    endpoint,
                },
                chunks[0],
            );
            frame.render_widget(
                StatusBar {
                    status: view.status,
                    spinner_frame,
                    listening: view.listening,
                    last_error: view.last_error.as_deref(),
                },
                chunks[1],
            );

            let history = chunks[2];
            let lines = history_lines(
                &view.turns,
                pinned,
                history.width.saturating_sub(2) as usize,
                view.is_loading(),
                spinner_frame,
            );
            let top = scroll_top(lines.len(), history.height, scroll_offset);
            frame.render_widget(Paragraph::new(lines).scroll((top, 0)), history);

            if let Some(pending) = &view.pending {
                frame.render_widget(DecisionPanel { pending }, chunks[3]);
            } else if let Some(reason) = &view.blocked {
                frame.render_widget(BlockedPanel { reason }, chunks[3]);
            }

            let input_area = chunks[4];
            let (title, buffer, enabled) = match feedback {
                Some(buffer) => ("Feedback", buffer, true),
                None => ("Message", &view.input, view.input_enabled()),
            };
            let placeholder = if feedback.is_some() {
                "Tell the assistant what to change…"
            } else if enabled {
                "Describe the time you worked…"
            } else if view.pending.is_some() {
                "Decide on the proposed entry above"
            } else {
                "Waiting for the assistant…"
            };
            frame.render_widget(
                InputBox {
                    title,
                    text: buffer.text(),
                    placeholder,
                    enabled,
                },
                input_area,
            );
            if enabled && matches!(mode, Mode::Chat | Mode::Feedback) {
                let cursor = u16::try_from(buffer.cursor_display_width()).unwrap_or(u16::MAX);
                let x = input_area.x.saturating_add(1).saturating_add(cursor);
                frame.set_cursor_position((
                    x.min(input_area.right().saturating_sub(2)),
                    input_area.y + 1,
                ));
            }

            frame.render_widget(HelpBar { bindings: &bindings }, chunks[5]);

            if let Some(form) = form {
                frame.render_widget(
                    FormPopup {
                        form,
                        errors: form_errors,
                    },
                    area,
                );
            }
        })?;
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            crossterm::event::DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = self.terminal.show_cursor();
    }
}

/// First visible history line. Clamps `offset`, counted up from the bottom,
/// to what the history can scroll.
fn scroll_top(line_count: usize, height: u16, offset: &mut u16) -> u16 {
    let max_scroll = u16::try_from(line_count)
        .unwrap_or(u16::MAX)
        .saturating_sub(height);
    *offset = (*offset).min(max_scroll);
    max_scroll - *offset
}
