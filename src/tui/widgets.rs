//! Custom widgets for the TUI

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::theme::Theme;
use crate::controller::Status;
use crate::conversation::{RenderedTurn, TurnView};
use crate::interrupt::{PendingInterrupt, ToolArgs};
use crate::projects::ProjectCatalog;
use crate::resume::{FieldError, FormField, TimeEntryForm};

const INDENT: &str = "  ";

/// Braille spinner
pub struct Spinner;

impl Spinner {
    const FRAMES: &'static [&'static str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

    pub fn frame(n: usize) -> &'static str {
        Self::FRAMES[n % Self::FRAMES.len()]
    }
}

/// Wrap text to `max_width` columns, honoring embedded newlines and unicode width
pub fn wrap_text(text: &str, max_width: usize, indent: &str) -> Vec<String> {
    let content_width = max_width.saturating_sub(indent.width());
    let mut lines = Vec::new();

    for raw in text.lines() {
        if content_width == 0 || raw.width() <= content_width {
            lines.push(raw.to_string());
            continue;
        }

        let mut current = String::new();
        let mut current_width = 0;
        for c in raw.chars() {
            let char_width = unicode_width::UnicodeWidthChar::width(c).unwrap_or(1);
            if current_width + char_width > content_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            current.push(c);
            current_width += char_width;
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

fn push_wrapped(lines: &mut Vec<Line<'static>>, text: &str, width: usize, style: ratatui::style::Style) {
    for chunk in wrap_text(text, width, INDENT) {
        lines.push(Line::from(vec![
            Span::raw(INDENT),
            Span::styled(chunk, style),
        ]));
    }
}

fn project_list_lines(lines: &mut Vec<Line<'static>>, catalog: &ProjectCatalog) {
    if catalog.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{INDENT}No projects available"),
            Theme::muted(),
        )));
        return;
    }
    for group in catalog.groups() {
        lines.push(Line::from(vec![
            Span::raw(INDENT),
            Span::styled(group.client.clone(), Theme::bold()),
        ]));
        for project in &group.projects {
            lines.push(Line::from(vec![
                Span::raw(INDENT),
                Span::styled("  • ", Theme::muted()),
                Span::styled(project.project_name.clone(), Theme::text()),
            ]));
        }
    }
}

/// Lines for the conversation pane
pub fn history_lines(
    turns: &[RenderedTurn],
    pinned_client: Option<&str>,
    width: usize,
    loading: bool,
    spinner_frame: usize,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for rendered in turns {
        let text_style = if rendered.pending || rendered.failed {
            Theme::pending()
        } else {
            Theme::text()
        };

        match TurnView::classify(&rendered.turn, pinned_client) {
            TurnView::Human(text) => {
                let mut badge = vec![Span::styled(" You ", Theme::user_badge())];
                if rendered.pending {
                    badge.push(Span::styled(" sending", Theme::muted()));
                } else if rendered.failed {
                    badge.push(Span::styled(" not sent", Theme::error()));
                }
                lines.push(Line::from(badge));
                push_wrapped(&mut lines, &text, width, text_style);
            }
            TurnView::Assistant(text) => {
                lines.push(Line::from(Span::styled(" Assistant ", Theme::assistant_badge())));
                if !text.trim().is_empty() {
                    push_wrapped(&mut lines, &text, width, text_style);
                }
                for (_, name, _) in rendered.turn.content.tool_uses() {
                    lines.push(Line::from(Span::styled(
                        format!("{INDENT}→ calling {name}"),
                        Theme::muted(),
                    )));
                }
            }
            TurnView::ProjectList(catalog) => {
                lines.push(Line::from(Span::styled(" Projects ", Theme::tool_badge())));
                project_list_lines(&mut lines, &catalog);
            }
            TurnView::ToolResult { name, text } => {
                lines.push(Line::from(Span::styled(format!(" {name} "), Theme::tool_badge())));
                push_wrapped(&mut lines, &text, width, Theme::dim());
            }
            // Nothing to show for tools without a renderer
            TurnView::Unrecognized { .. } => continue,
        }
        lines.push(Line::from(""));
    }

    if loading {
        lines.push(Line::from(vec![
            Span::styled(format!("{} ", Spinner::frame(spinner_frame)), Theme::accent()),
            Span::styled("Assistant is typing…", Theme::muted()),
        ]));
    }

    lines
}

/// Header bar with title and endpoint
pub struct HeaderBar<'a> {
    pub title: &'a str,
    pub endpoint: &'a str,
}

impl Widget for HeaderBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height < 1 {
            return;
        }
        let title = Line::from(vec![
            Span::styled("◆ ", Theme::accent()),
            Span::styled(self.title, Theme::title()),
        ]);
        buf.set_line(area.x + 1, area.y, &title, area.width.saturating_sub(2));

        let endpoint = format!("{} ", self.endpoint);
        let len = u16::try_from(endpoint.width()).unwrap_or(u16::MAX).saturating_add(1);
        let x = area.x + area.width.saturating_sub(len);
        buf.set_span(x, area.y, &Span::styled(endpoint, Theme::muted()), len);
    }
}

/// Status line: conversation state, voice, last error
pub struct StatusBar<'a> {
    pub status: Status,
    pub spinner_frame: usize,
    pub listening: bool,
    pub last_error: Option<&'a str>,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = if self.status.is_loading() {
            vec![
                Span::styled(format!("{} ", Spinner::frame(self.spinner_frame)), Theme::accent()),
                Span::styled(self.status.label(), Theme::accent()),
            ]
        } else if self.status == Status::Interrupted {
            vec![
                Span::styled("◆ ", Theme::warning()),
                Span::styled(self.status.label(), Theme::warning()),
            ]
        } else {
            vec![
                Span::styled("● ", Theme::success()),
                Span::styled("Ready", Theme::dim()),
            ]
        };

        if self.listening {
            spans.push(Span::styled("  🎙 listening", Theme::accent()));
        }
        if let Some(error) = self.last_error {
            spans.push(Span::styled(format!("  ✗ {error}"), Theme::error()));
        }

        buf.set_line(area.x + 1, area.y, &Line::from(spans), area.width.saturating_sub(2));
    }
}

/// Bordered single-line input
pub struct InputBox<'a> {
    pub title: &'a str,
    pub text: &'a str,
    pub placeholder: &'a str,
    pub enabled: bool,
}

impl Widget for InputBox<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border = if self.enabled {
            Theme::border_focused()
        } else {
            Theme::border()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(Span::styled(format!(" {} ", self.title), Theme::muted()));

        let line = if self.text.is_empty() {
            Line::from(Span::styled(self.placeholder, Theme::muted()))
        } else {
            Line::from(Span::styled(self.text, Theme::text()))
        };

        Paragraph::new(line)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

/// Key hints
pub struct HelpBar<'a> {
    pub bindings: &'a [(&'a str, &'a str)],
}

impl Widget for HelpBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = Vec::new();
        for (i, (key, desc)) in self.bindings.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" │ ", Theme::muted()));
            }
            spans.push(Span::styled(*key, Theme::key()));
            spans.push(Span::styled(format!(" {desc}"), Theme::key_desc()));
        }
        buf.set_line(area.x + 1, area.y, &Line::from(spans), area.width.saturating_sub(2));
    }
}

fn field_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:>8}: "), Theme::muted()),
        Span::styled(value, Theme::bold()),
    ])
}

/// Proposed tool call awaiting a decision
pub struct DecisionPanel<'a> {
    pub pending: &'a PendingInterrupt,
}

impl DecisionPanel<'_> {
    pub const HEIGHT: u16 = 9;
}

impl Widget for DecisionPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::decision_border())
            .title(Span::styled(" Approve time entry? ", Theme::warning()));

        let mut lines = match &self.pending.proposed_args {
            ToolArgs::BookTimeEntry(args) => vec![
                field_line("Client", args.client_name.clone()),
                field_line("Project", args.project_name.clone()),
                field_line("Date", args.date.format("%Y-%m-%d").to_string()),
                field_line("Hours", format!("{}", args.hours)),
            ],
        };
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("[y]", Theme::key()),
            Span::styled(" Approve  ", Theme::key_desc()),
            Span::styled("[e]", Theme::key()),
            Span::styled(" Edit  ", Theme::key_desc()),
            Span::styled("[f]", Theme::key()),
            Span::styled(" Feedback  ", Theme::key_desc()),
            Span::styled("[c]", Theme::key()),
            Span::styled(" Continue  ", Theme::key_desc()),
            Span::styled("[n]", Theme::key()),
            Span::styled(" Cancel", Theme::key_desc()),
        ]));

        Paragraph::new(lines).block(block).render(area, buf);
    }
}

/// Interrupt the client cannot act on
pub struct BlockedPanel<'a> {
    pub reason: &'a str,
}

impl Widget for BlockedPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::error())
            .title(Span::styled(" Waiting on an unsupported request ", Theme::error()));
        let lines = vec![
            Line::from(Span::styled(self.reason.to_string(), Theme::text())),
            Line::from(vec![
                Span::styled("Esc", Theme::key()),
                Span::styled(" stop the conversation", Theme::key_desc()),
            ]),
        ];
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true })
            .render(area, buf);
    }
}

/// Centered popup area, clamped to `area`
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Edit-and-approve popup
pub struct FormPopup<'a> {
    pub form: &'a TimeEntryForm,
    /// Shown after a rejected submit
    pub errors: &'a [FieldError],
}

impl FormPopup<'_> {
    pub const WIDTH: u16 = 60;
    pub const HEIGHT: u16 = 14;

    fn value(&self, field: FormField) -> String {
        match field {
            FormField::Client if self.form.client().is_empty() => "(choose)".to_string(),
            FormField::Client => self.form.client().to_string(),
            FormField::Project => self.form.project_name().unwrap_or("(choose)").to_string(),
            FormField::Date => self.form.date().to_string(),
            FormField::Hours => self.form.hours().to_string(),
        }
    }
}

impl Widget for FormPopup<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(Self::WIDTH, Self::HEIGHT, area);
        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::border_focused())
            .title(Span::styled(" Edit time entry ", Theme::title()));

        let mut lines = Vec::new();
        for field in [FormField::Client, FormField::Project, FormField::Date, FormField::Hours] {
            let focused = self.form.focus() == field;
            let choice = matches!(field, FormField::Client | FormField::Project);
            let value = match (focused, choice) {
                (true, true) => format!("◂ {} ▸", self.value(field)),
                (true, false) => format!("{}▏", self.value(field)),
                _ => self.value(field),
            };
            let value_style = if focused { Theme::accent() } else { Theme::text() };
            lines.push(Line::from(vec![
                Span::styled(if focused { "› " } else { "  " }, Theme::accent()),
                Span::styled(format!("{:>8}: ", field.label()), Theme::muted()),
                Span::styled(value, value_style),
            ]));
        }

        lines.push(Line::from(""));
        if self.form.catalog().is_empty() {
            lines.push(Line::from(Span::styled(
                "Project list unavailable; client and project are fixed",
                Theme::muted(),
            )));
        }
        for error in self.errors {
            lines.push(Line::from(Span::styled(format!("✗ {error}"), Theme::error())));
        }

        let submit_style = if self.form.is_complete() {
            Theme::key()
        } else {
            Theme::muted()
        };
        lines.push(Line::from(vec![
            Span::styled("Enter", submit_style),
            Span::styled(" approve  ", Theme::key_desc()),
            Span::styled("Tab", Theme::key()),
            Span::styled(" next  ", Theme::key_desc()),
            Span::styled("←/→", Theme::key()),
            Span::styled(" choose  ", Theme::key_desc()),
            Span::styled("Esc", Theme::key()),
            Span::styled(" back", Theme::key_desc()),
        ]));

        Paragraph::new(lines).block(block).render(popup, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationTurn;

    fn rendered(turn: ConversationTurn, pending: bool) -> RenderedTurn {
        RenderedTurn {
            key: turn.id.to_string(),
            turn,
            pending,
            failed: false,
        }
    }

    fn flatten(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn test_wrap_text_respects_width_and_newlines() {
        assert_eq!(wrap_text("abcdef", 5, "  "), vec!["abc", "def"]);
        assert_eq!(wrap_text("one\ntwo", 20, ""), vec!["one", "two"]);
        assert_eq!(wrap_text("日本語", 6, "  "), vec!["日本", "語"]);
    }

    #[test]
    fn test_history_hides_unrecognized_tools() {
        let turns = vec![
            rendered(ConversationTurn::human("h1", "hi"), false),
            rendered(ConversationTurn::tool("t1", "execute_query", "[]"), false),
        ];
        let text = flatten(&history_lines(&turns, None, 80, false, 0));
        assert!(text.iter().any(|l| l.contains("You")));
        assert!(!text.iter().any(|l| l.contains("execute_query")));
    }

    #[test]
    fn test_history_marks_pending_and_loading() {
        let turns = vec![rendered(ConversationTurn::human("local-1", "book it"), true)];
        let text = flatten(&history_lines(&turns, None, 80, true, 0));
        assert!(text[0].contains("sending"));
        assert!(text.last().is_some_and(|l| l.contains("typing")));
    }

    #[test]
    fn test_history_marks_failed_echo() {
        let mut turn = rendered(ConversationTurn::human("local-1", "book it"), false);
        turn.failed = true;
        let text = flatten(&history_lines(&[turn], None, 80, false, 0));
        assert!(text[0].contains("not sent"));
        assert!(!text[0].contains("sending"));
    }

    #[test]
    fn test_centered_rect_clamps() {
        let area = Rect::new(0, 0, 40, 10);
        let popup = centered_rect(60, 14, area);
        assert_eq!(popup, area);
        let small = centered_rect(20, 4, area);
        assert_eq!((small.x, small.y), (10, 3));
    }
}
