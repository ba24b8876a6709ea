//! Timebook CLI
//!
//! Chat with the time entry agent and approve, edit or reject the time
//! entries it proposes.

use anyhow::Context;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use timebook::controller::Status;
use timebook::interrupt::ToolArgs;
use timebook::projects::{ProjectCatalog, ProjectsClient};
use timebook::resume::{FieldError, TimeEntryForm};
use timebook::tui::App;
use timebook::voice::JsonlVoiceSource;
use timebook::{
    Controller, Decision, Event, LangGraphTransport, PendingInterrupt, Session, SessionHandle,
    TimebookConfig, ViewState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Timebook - log time by chatting with the time entry agent
#[derive(Parser, Debug)]
#[command(name = "timebook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent runtime base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Graph / assistant to run
    #[arg(long)]
    assistant_id: Option<String>,

    /// Project lookup service base URL
    #[arg(long)]
    projects_url: Option<String>,

    /// Client listed first in project choices
    #[arg(long)]
    pinned_client: Option<String>,

    /// JSON-lines file written by a speech engine
    #[arg(long)]
    voice_events: Option<PathBuf>,

    /// File to append start/stop/reset commands for the speech engine
    #[arg(long)]
    voice_control: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable TUI and use plain text mode
    #[arg(long)]
    no_tui: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(TimebookConfig, bool, bool)> {
        let mut config = TimebookConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(url) = self.api_url {
            config = config.with_api_url(url);
        }
        if let Some(id) = self.assistant_id {
            config = config.with_assistant_id(id);
        }
        if let Some(url) = self.projects_url {
            config = config.with_projects_api_url(url);
        }
        if self.pinned_client.is_some() {
            config = config.with_pinned_client(self.pinned_client);
        }
        if let Some(path) = self.voice_events {
            config = config.with_voice_events(path);
        }
        if let Some(path) = self.voice_control {
            config = config.with_voice_control(path);
        }
        if let Some(path) = self.log_file {
            config = config.with_log_file(path);
        }
        Ok((config, self.verbose, self.no_tui))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, verbose, no_tui) = Cli::parse().into_config()?;
    init_logging(&config, verbose, no_tui)?;

    let transport = LangGraphTransport::from_config(&config);
    let controller = Controller::default();
    let initial = controller.view();
    let voice = config.voice_events.as_ref().map(|path| {
        JsonlVoiceSource::new(path)
            .with_control(config.voice_control.clone())
            .with_follow(true)
    });
    let (session, handle, views) = Session::new(controller, Arc::new(transport));
    let session = session.with_voice(voice);
    let session_task = tokio::spawn(async move {
        if let Err(e) = session.run().await {
            error!("Session failed: {}", e);
        }
    });

    info!("Talking to {} ({})", config.api_url, config.assistant_id);
    let result = if no_tui {
        run_plain_mode(&config, handle, views).await
    } else {
        run_tui_mode(&config, handle, views, initial).await
    };

    session_task.abort();
    result
}

fn init_logging(config: &TimebookConfig, verbose: bool, no_tui: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match (&config.log_file, no_tui) {
        (Some(path), _) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        (None, true) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        // The terminal belongs to the TUI
        (None, false) => {}
    }
    Ok(())
}

async fn load_catalog(config: &TimebookConfig) -> Option<ProjectCatalog> {
    let client = ProjectsClient::new(&config.projects_api_url, config.request_timeout);
    match client.fetch_all().await {
        Ok(list) => Some(ProjectCatalog::new(list, config.pinned_client.clone())),
        Err(e) => {
            warn!("Project list unavailable: {}", e);
            None
        }
    }
}

async fn run_tui_mode(
    config: &TimebookConfig,
    handle: SessionHandle,
    views: mpsc::Receiver<ViewState>,
    initial: ViewState,
) -> anyhow::Result<()> {
    let (catalog_tx, catalog_rx) = oneshot::channel();
    let catalog_config = config.clone();
    tokio::spawn(async move {
        if let Some(catalog) = load_catalog(&catalog_config).await {
            let _ = catalog_tx.send(catalog);
        }
    });

    let mut app = App::new(
        handle,
        views,
        initial,
        config.api_url.clone(),
        config.pinned_client.clone(),
    )?
    .with_catalog(catalog_rx);
    app.run().await?;
    Ok(())
}

/// A line typed in plain mode
#[derive(Debug, Clone, PartialEq)]
enum PlainCommand {
    Message(String),
    Approve,
    Continue,
    Cancel,
    Edit(HashMap<String, String>),
    Feedback(String),
    Stop,
    Quit,
    Empty,
}

impl PlainCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));
        match word {
            "" => PlainCommand::Empty,
            "/quit" | "/exit" => PlainCommand::Quit,
            "/stop" => PlainCommand::Stop,
            "approve" | "y" if rest.is_empty() => PlainCommand::Approve,
            "continue" | "c" if rest.is_empty() => PlainCommand::Continue,
            "cancel" | "n" if rest.is_empty() => PlainCommand::Cancel,
            "edit" => PlainCommand::Edit(parse_pairs(rest)),
            "feedback" => PlainCommand::Feedback(rest.to_string()),
            _ => PlainCommand::Message(line.to_string()),
        }
    }
}

/// `hours=4 project=Paid Time Off` - a value runs until the next `key=`
fn parse_pairs(text: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut current: Option<(String, String)> = None;
    for token in text.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                if let Some((k, v)) = current.take() {
                    pairs.insert(k, v);
                }
                current = Some((key.to_lowercase(), value.to_string()));
            }
            _ => {
                if let Some((_, v)) = current.as_mut() {
                    if !v.is_empty() {
                        v.push(' ');
                    }
                    v.push_str(token);
                }
            }
        }
    }
    if let Some((k, v)) = current {
        pairs.insert(k, v);
    }
    pairs
}

/// Apply `edit` pairs to the proposed entry
fn build_edit(
    pending: &PendingInterrupt,
    catalog: ProjectCatalog,
    pairs: &HashMap<String, String>,
) -> Result<ToolArgs, Vec<String>> {
    let ToolArgs::BookTimeEntry(proposed) = &pending.proposed_args;
    let mut form = TimeEntryForm::new(proposed, catalog);

    if let Some(client) = pairs.get("client") {
        form.select_client(client);
    }
    if let Some(name) = pairs.get("project") {
        let client = form.client().to_string();
        let found = form
            .catalog()
            .find_by_name(Some(client.as_str()), name)
            .or_else(|| form.catalog().find_by_name(None, name))
            .map(|p| p.project_id);
        match found {
            Some(id) => {
                form.select_project(id);
            }
            None => return Err(vec![format!("unknown project: {name}")]),
        }
    }
    if let Some(date) = pairs.get("date") {
        form.set_date(date.clone());
    }
    if let Some(hours) = pairs.get("hours") {
        form.set_hours(hours.clone());
    }

    form.submit()
        .map(ToolArgs::BookTimeEntry)
        .map_err(|errors| errors.iter().map(FieldError::to_string).collect())
}

fn describe_pending(pending: &PendingInterrupt) -> String {
    let ToolArgs::BookTimeEntry(args) = &pending.proposed_args;
    format!(
        "Proposed time entry: {} / {} on {} for {}h\n  approve | continue | cancel | edit hours=.. date=.. project=.. | feedback <text>",
        args.client_name,
        args.project_name,
        args.date.format("%Y-%m-%d"),
        args.hours
    )
}

/// Prints what changed between two snapshots
#[derive(Default)]
struct PlainPrinter {
    printed: HashMap<String, String>,
    status: Option<Status>,
    pending: Option<String>,
    blocked: Option<String>,
    last_error: Option<String>,
}

impl PlainPrinter {
    fn show(&mut self, view: &ViewState, pinned_client: Option<&str>) {
        use timebook::conversation::TurnView;

        for rendered in view.turns.iter().filter(|t| !t.pending) {
            let text = rendered.turn.text();
            if self.printed.get(&rendered.key) == Some(&text) {
                continue;
            }
            self.printed.insert(rendered.key.clone(), text);
            match TurnView::classify(&rendered.turn, pinned_client) {
                // Echo of what was typed
                TurnView::Human(_) => {}
                TurnView::Assistant(text) if text.trim().is_empty() => {}
                TurnView::Assistant(text) => println!("assistant> {text}"),
                TurnView::ProjectList(catalog) => {
                    for group in catalog.groups() {
                        let names: Vec<&str> =
                            group.projects.iter().map(|p| p.project_name.as_str()).collect();
                        println!("  {}: {}", group.client, names.join(", "));
                    }
                }
                TurnView::ToolResult { name, text } => println!("[{name}] {text}"),
                TurnView::Unrecognized { .. } => {}
            }
        }

        let pending_id = view.pending.as_ref().map(|p| p.tool_call_id.clone());
        if pending_id != self.pending {
            if let Some(pending) = &view.pending {
                println!("{}", describe_pending(pending));
            }
            self.pending = pending_id;
        }
        if view.blocked != self.blocked {
            if let Some(reason) = &view.blocked {
                println!("! Blocked: {reason} (/stop to end the run)");
            }
            self.blocked = view.blocked.clone();
        }
        if view.last_error != self.last_error {
            if let Some(error) = &view.last_error {
                println!("! Error: {error}");
            }
            self.last_error = view.last_error.clone();
        }
        if self.status != Some(view.status) {
            if view.status.is_loading() && !self.status.is_some_and(|s| s.is_loading()) {
                println!("...");
            }
            self.status = Some(view.status);
        }
    }
}

async fn run_plain_mode(
    config: &TimebookConfig,
    handle: SessionHandle,
    mut views: mpsc::Receiver<ViewState>,
) -> anyhow::Result<()> {
    let catalog = load_catalog(config).await.unwrap_or_default();
    let pinned = config.pinned_client.clone();
    let mut printer = PlainPrinter::default();
    let mut latest: Option<ViewState> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Describe the time you worked. /stop ends a run, /quit exits.");
    loop {
        tokio::select! {
            view = views.recv() => match view {
                Some(view) => {
                    printer.show(&view, pinned.as_deref());
                    latest = Some(view);
                }
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let pending = latest.as_ref().and_then(|v| v.pending.clone());
                let event = match PlainCommand::parse(&line) {
                    PlainCommand::Empty => continue,
                    PlainCommand::Quit => break,
                    PlainCommand::Stop => Event::Stop,
                    PlainCommand::Approve => Event::Decide(Decision::Approve),
                    PlainCommand::Continue => Event::Decide(Decision::Continue),
                    PlainCommand::Cancel => Event::Decide(Decision::Cancel),
                    PlainCommand::Feedback(text) => Event::Decide(Decision::Feedback(text)),
                    PlainCommand::Edit(pairs) => {
                        let Some(pending) = pending else {
                            println!("! Nothing to edit");
                            continue;
                        };
                        match build_edit(&pending, catalog.clone(), &pairs) {
                            Ok(args) => Event::Decide(Decision::Edit(args)),
                            Err(errors) => {
                                for e in errors {
                                    println!("! {e}");
                                }
                                continue;
                            }
                        }
                    }
                    PlainCommand::Message(text) => Event::Submit(text),
                };
                handle.send(event).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebook::interrupt::BookTimeEntry;
    use timebook::projects::ProjectsList;

    fn pending() -> PendingInterrupt {
        PendingInterrupt {
            tool_call_id: "call_1".to_string(),
            tool_name: "book_time_entry".to_string(),
            proposed_args: ToolArgs::BookTimeEntry(BookTimeEntry {
                client_name: "Intertech".to_string(),
                project_name: "Paid Time Off".to_string(),
                project_id: "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e".parse().unwrap(),
                date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                hours: 8.0,
            }),
        }
    }

    fn catalog() -> ProjectCatalog {
        let list = ProjectsList::parse(
            r#"{"projects": [
                {"projectId": "6764b5a9-cd1f-4943-a3a6-65ef492b9d3e", "projectName": "Paid Time Off", "clientName": "Intertech"},
                {"projectId": "2e3f4a5b-6c7d-4e8f-9a0b-1c2d3e4f5a6b", "projectName": "Training", "clientName": "Intertech"}
            ]}"#,
        )
        .unwrap();
        ProjectCatalog::new(list, None)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(PlainCommand::parse("approve"), PlainCommand::Approve);
        assert_eq!(PlainCommand::parse("continue"), PlainCommand::Continue);
        assert_eq!(PlainCommand::parse("c"), PlainCommand::Continue);
        assert_eq!(
            PlainCommand::parse("continue with Friday"),
            PlainCommand::Message("continue with Friday".to_string())
        );
        assert_eq!(PlainCommand::parse("  "), PlainCommand::Empty);
        assert_eq!(PlainCommand::parse("/stop"), PlainCommand::Stop);
        assert_eq!(
            PlainCommand::parse("feedback use Friday"),
            PlainCommand::Feedback("use Friday".to_string())
        );
        assert_eq!(
            PlainCommand::parse("approve my PTO"),
            PlainCommand::Message("approve my PTO".to_string())
        );
    }

    #[test]
    fn test_parse_pairs_multiword_values() {
        let pairs = parse_pairs("hours=4 project=Paid Time Off date=2024-05-02");
        assert_eq!(pairs["hours"], "4");
        assert_eq!(pairs["project"], "Paid Time Off");
        assert_eq!(pairs["date"], "2024-05-02");
    }

    #[test]
    fn test_build_edit_applies_changes() {
        let pairs = parse_pairs("hours=3.9 project=Training");
        let ToolArgs::BookTimeEntry(entry) = build_edit(&pending(), catalog(), &pairs).unwrap();
        assert_eq!(entry.project_name, "Training");
        assert_eq!(entry.hours, 4.0);
        assert_eq!(entry.date.to_string(), "2024-05-01");
    }

    #[test]
    fn test_build_edit_reports_invalid_fields() {
        let pairs = parse_pairs("hours=abc");
        let errors = build_edit(&pending(), catalog(), &pairs).unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("Hours")));

        let unknown = build_edit(&pending(), catalog(), &parse_pairs("project=Nope")).unwrap_err();
        assert_eq!(unknown, vec!["unknown project: Nope".to_string()]);
    }
}
