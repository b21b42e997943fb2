use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The slice of the GitHub event payload this bot cares about.
///
/// Issues and pull requests share the fields we read, so both resource
/// payloads deserialize into [`IssuePayload`].
#[derive(Debug, Deserialize)]
pub struct EventPayload {
    pub action: Option<String>,
    pub label: Option<Label>,
    pub issue: Option<IssuePayload>,
    pub pull_request: Option<IssuePayload>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuePayload {
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub locked: bool,
    pub active_lock_reason: Option<String>,
    pub user: User,
    pub node_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Issue,
    PullRequest,
}

/// Read-only snapshot of the triggering resource, taken once per invocation.
/// All mutations go through [`crate::github::IssueOps`]; this struct is never
/// updated to reflect them.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    pub kind: ResourceKind,
    pub number: u64,
    pub open: bool,
    pub locked: bool,
    pub lock_reason: Option<String>,
    pub author: String,
    pub node_id: String,
}

impl ResourceContext {
    pub fn new(kind: ResourceKind, payload: &IssuePayload) -> Self {
        ResourceContext {
            kind,
            number: payload.number,
            open: payload.state == "open",
            locked: payload.locked,
            lock_reason: payload.active_lock_reason.clone(),
            author: payload.user.login.clone(),
            node_id: payload.node_id.clone(),
        }
    }
}

impl EventPayload {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read event payload from {}", path.display()))?;
        serde_json::from_str(&raw).context("Failed to parse event payload")
    }

    /// The resource the event fired on, with its kind. The issue payload wins
    /// when both are present (a labeled PR arrives as `pull_request` only).
    pub fn resource(&self) -> Option<(ResourceKind, &IssuePayload)> {
        if let Some(issue) = &self.issue {
            Some((ResourceKind::Issue, issue))
        } else {
            self.pull_request
                .as_ref()
                .map(|pr| (ResourceKind::PullRequest, pr))
        }
    }
}

/// Only `labeled`/`unlabeled` on issues and pull requests trigger any work.
pub fn is_label_event(event_name: &str, payload: &EventPayload) -> bool {
    matches!(event_name, "issues" | "pull_request")
        && matches!(payload.action.as_deref(), Some("labeled") | Some("unlabeled"))
}
