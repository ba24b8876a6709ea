//! Edit-and-approve form for `book_time_entry`
//!
//! Holds the editable copy of the proposed arguments. Client and project are
//! picked from the project catalog; date and hours are free text validated on
//! submit.

use crate::interrupt::{parse_date, BookTimeEntry};
use crate::projects::ProjectCatalog;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Client,
    Project,
    Date,
    Hours,
}

impl FormField {
    const ORDER: [FormField; 4] = [
        FormField::Client,
        FormField::Project,
        FormField::Date,
        FormField::Hours,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Client => "Client",
            FormField::Project => "Project",
            FormField::Date => "Date",
            FormField::Hours => "Hours",
        }
    }

    fn position(&self) -> usize {
        Self::ORDER.iter().position(|f| f == self).unwrap_or(0)
    }
}

/// A missing or invalid field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: FormField,
    pub message: String,
}

impl FieldError {
    fn new(field: FormField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.label(), self.message)
    }
}

/// Round to the nearest quarter hour
pub fn round_to_quarter(hours: f64) -> f64 {
    (hours * 4.0).round() / 4.0
}

#[derive(Debug, Clone)]
pub struct TimeEntryForm {
    catalog: ProjectCatalog,
    client: String,
    project: Option<(Uuid, String)>,
    date: String,
    hours: String,
    focus: FormField,
}

impl TimeEntryForm {
    /// Pre-fill from the proposed arguments. When the catalog knows the
    /// proposed project its names win over the agent's spelling.
    pub fn new(proposed: &BookTimeEntry, catalog: ProjectCatalog) -> Self {
        let (client, project_name) = match catalog.find(proposed.project_id) {
            Some(p) => (p.client_name.clone(), p.project_name.clone()),
            None => (proposed.client_name.clone(), proposed.project_name.clone()),
        };
        Self {
            catalog,
            client,
            project: Some((proposed.project_id, project_name)),
            date: proposed.date.format("%Y-%m-%d").to_string(),
            hours: format_hours(proposed.hours),
            focus: FormField::Client,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|(_, name)| name.as_str())
    }

    pub fn project_id(&self) -> Option<Uuid> {
        self.project.as_ref().map(|(id, _)| *id)
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn hours(&self) -> &str {
        &self.hours
    }

    pub fn focus(&self) -> FormField {
        self.focus
    }

    pub fn catalog(&self) -> &ProjectCatalog {
        &self.catalog
    }

    pub fn focus_next(&mut self) {
        self.leave_field();
        self.focus = FormField::ORDER[(self.focus.position() + 1) % FormField::ORDER.len()];
    }

    pub fn focus_prev(&mut self) {
        self.leave_field();
        let len = FormField::ORDER.len();
        self.focus = FormField::ORDER[(self.focus.position() + len - 1) % len];
    }

    fn leave_field(&mut self) {
        if self.focus == FormField::Hours {
            self.commit_hours();
        }
    }

    /// Select a client. A client with exactly one project gets that project;
    /// with several, a project belonging to another client is cleared.
    pub fn select_client(&mut self, client: &str) {
        self.client = client.to_string();
        let projects = self.catalog.projects_for(client);
        match projects.as_slice() {
            [only] => self.project = Some((only.project_id, only.project_name.clone())),
            [] => {}
            many => {
                let current = self.project_id();
                if !many.iter().any(|p| Some(p.project_id) == current) {
                    self.project = None;
                }
            }
        }
    }

    /// Select a project by id. Unknown ids are ignored. The client follows
    /// the project.
    pub fn select_project(&mut self, project_id: Uuid) -> bool {
        let Some(project) = self.catalog.find(project_id) else {
            return false;
        };
        self.client = if project.client_name.trim().is_empty() {
            crate::projects::NO_CLIENT.to_string()
        } else {
            project.client_name.clone()
        };
        self.project = Some((project.project_id, project.project_name.clone()));
        true
    }

    /// Step through the client list (←/→ on the client field)
    pub fn cycle_client(&mut self, forward: bool) {
        let clients = self.catalog.clients();
        if let Some(next) = step(&clients, clients.iter().position(|c| *c == self.client), forward) {
            let next = next.clone();
            self.select_client(&next);
        }
    }

    /// Step through the current client's projects
    pub fn cycle_project(&mut self, forward: bool) {
        let ids: Vec<Uuid> = self
            .catalog
            .projects_for(&self.client)
            .iter()
            .map(|p| p.project_id)
            .collect();
        let current = self.project_id();
        if let Some(next) = step(&ids, ids.iter().position(|id| Some(*id) == current), forward) {
            self.select_project(*next);
        }
    }

    /// ←/→ on the focused field
    pub fn cycle_focused(&mut self, forward: bool) {
        match self.focus {
            FormField::Client => self.cycle_client(forward),
            FormField::Project => self.cycle_project(forward),
            FormField::Date | FormField::Hours => {}
        }
    }

    pub fn set_date(&mut self, text: impl Into<String>) {
        self.date = text.into();
    }

    pub fn set_hours(&mut self, text: impl Into<String>) {
        self.hours = text.into();
    }

    /// Type into the focused text field
    pub fn insert_char(&mut self, c: char) {
        match self.focus {
            FormField::Date => self.date.push(c),
            FormField::Hours => self.hours.push(c),
            FormField::Client | FormField::Project => {}
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            FormField::Date => {
                self.date.pop();
            }
            FormField::Hours => {
                self.hours.pop();
            }
            FormField::Client | FormField::Project => {}
        }
    }

    /// Normalize the hours text to the nearest quarter hour when it is a
    /// positive number; anything else is left for `submit` to report.
    pub fn commit_hours(&mut self) {
        if let Ok(hours) = self.hours.trim().parse::<f64>() {
            if hours.is_finite() && hours > 0.0 {
                self.hours = format_hours(round_to_quarter(hours));
            }
        }
    }

    /// Missing or invalid fields, in form order
    pub fn errors(&self) -> Vec<FieldError> {
        match self.validate() {
            Ok(_) => Vec::new(),
            Err(errors) => errors,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    /// The full edited argument set, or every reason it cannot be sent
    pub fn submit(&mut self) -> Result<BookTimeEntry, Vec<FieldError>> {
        self.commit_hours();
        self.validate()
    }

    fn validate(&self) -> Result<BookTimeEntry, Vec<FieldError>> {
        let mut errors = Vec::new();

        let client = self.client.trim();
        if client.is_empty() {
            errors.push(FieldError::new(FormField::Client, "required"));
        }
        if self.project.is_none() {
            errors.push(FieldError::new(FormField::Project, "required"));
        }

        let date = if self.date.trim().is_empty() {
            errors.push(FieldError::new(FormField::Date, "required"));
            None
        } else {
            let parsed = parse_date(&self.date);
            if parsed.is_none() {
                errors.push(FieldError::new(FormField::Date, "expected YYYY-MM-DD"));
            }
            parsed
        };

        let hours = match self.hours.trim() {
            "" => {
                errors.push(FieldError::new(FormField::Hours, "required"));
                None
            }
            text => match text.parse::<f64>() {
                Ok(h) if h.is_finite() && round_to_quarter(h) > 0.0 => Some(round_to_quarter(h)),
                Ok(_) => {
                    errors.push(FieldError::new(FormField::Hours, "must be at least 0.25"));
                    None
                }
                Err(_) => {
                    errors.push(FieldError::new(FormField::Hours, "not a number"));
                    None
                }
            },
        };

        match (&self.project, date, hours) {
            (Some((project_id, project_name)), Some(date), Some(hours)) if errors.is_empty() => {
                Ok(BookTimeEntry {
                    client_name: client.to_string(),
                    project_name: project_name.clone(),
                    project_id: *project_id,
                    date,
                    hours,
                })
            }
            _ => Err(errors),
        }
    }
}

fn step<T>(items: &[T], current: Option<usize>, forward: bool) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    let len = items.len();
    let index = match (current, forward) {
        (None, true) => 0,
        (None, false) => len - 1,
        (Some(i), true) => (i + 1) % len,
        (Some(i), false) => (i + len - 1) % len,
    };
    items.get(index)
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{hours:.0}")
    } else {
        format!("{hours}")
    }
}
