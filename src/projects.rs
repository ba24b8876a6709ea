//! Project / client lookup
//!
//! Read-only view of the booking backend's projects. The edit form uses it to
//! offer client and project choices, and `get_projects` tool turns render
//! through the same catalog.

use crate::{Result, TimebookError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Group label for projects without a client name
pub const NO_CLIENT: &str = "No Client";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: Uuid,
    pub project_name: String,
    pub client_name: String,
}

impl Project {
    fn client_label(&self) -> &str {
        if self.client_name.trim().is_empty() {
            NO_CLIENT
        } else {
            &self.client_name
        }
    }
}

/// `{ "projects": [...] }` as returned by the lookup service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectsList {
    pub projects: Vec<Project>,
}

impl ProjectsList {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Projects of one client, sorted by project name
#[derive(Debug, Clone, PartialEq)]
pub struct ClientGroup {
    pub client: String,
    pub projects: Vec<Project>,
}

fn by_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Client / project index with a stable display order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectCatalog {
    projects: Vec<Project>,
    pinned_client: Option<String>,
}

impl ProjectCatalog {
    pub fn new(list: ProjectsList, pinned_client: Option<String>) -> Self {
        Self {
            projects: list.projects,
            pinned_client,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Client names sorted alphabetically, pinned client first
    pub fn clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = Vec::new();
        for project in &self.projects {
            let label = project.client_label();
            if !clients.iter().any(|c| c == label) {
                clients.push(label.to_string());
            }
        }
        let pinned = self.pinned_client.as_deref();
        clients.sort_by(|a, b| match (Some(a.as_str()) == pinned, Some(b.as_str()) == pinned) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => by_name(a, b),
        });
        clients
    }

    /// Projects of `client`, sorted by project name
    pub fn projects_for(&self, client: &str) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self
            .projects
            .iter()
            .filter(|p| p.client_label() == client)
            .collect();
        projects.sort_by(|a, b| by_name(&a.project_name, &b.project_name));
        projects
    }

    pub fn groups(&self) -> Vec<ClientGroup> {
        self.clients()
            .into_iter()
            .map(|client| {
                let projects = self.projects_for(&client).into_iter().cloned().collect();
                ClientGroup { client, projects }
            })
            .collect()
    }

    pub fn find(&self, project_id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }

    /// Case-insensitive lookup of a project by name, optionally scoped to a client
    pub fn find_by_name(&self, client: Option<&str>, project_name: &str) -> Option<&Project> {
        let wanted = project_name.trim().to_lowercase();
        self.projects.iter().find(|p| {
            p.project_name.to_lowercase() == wanted
                && client.map_or(true, |c| p.client_label().eq_ignore_ascii_case(c))
        })
    }
}

/// HTTP client for `GET {base}/projects`
pub struct ProjectsClient {
    http: Client,
    base_url: String,
}

impl ProjectsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("timebook/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_all(&self) -> Result<ProjectsList> {
        let url = format!("{}/projects", self.base_url);
        debug!("Fetching projects from {}", url);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TimebookError::Transport(format!("projects lookup: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TimebookError::Transport(format!(
                "projects lookup returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TimebookError::Transport(format!("projects lookup: {e}")))?;
        ProjectsList::parse(&body)
    }
}
