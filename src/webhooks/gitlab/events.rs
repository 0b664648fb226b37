use serde::Deserialize;
use serde_json::Value;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// A classified GitLab webhook event.
///
/// Built once per inbound payload by [`parse`] and never mutated afterwards:
/// every operation downstream reads the same project id, iid and commit ids
/// that were extracted here.
#[derive(Debug, Clone)]
pub enum GitLabEvent {
    MergeRequest(MergeRequestEvent),
    Push(PushEvent),
}

impl GitLabEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GitLabEvent::MergeRequest(_) => "merge_request",
            GitLabEvent::Push(_) => "push",
        }
    }

    pub fn project_name(&self) -> &str {
        match self {
            GitLabEvent::MergeRequest(event) => &event.project_name,
            GitLabEvent::Push(event) => &event.project_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeRequestEvent {
    pub project_id: u64,
    pub project_name: String,
    /// Project-scoped merge request identifier, not the global id.
    pub iid: u64,
    pub action: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PushEvent {
    pub project_id: u64,
    pub project_name: String,
    /// `ref` with its `refs/heads/` prefix stripped.
    pub branch: String,
    /// Commits in delivery order, most recent last.
    pub commits: Vec<Commit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: CommitAuthor,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub url: String,
}

impl Commit {
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
struct MergeRequestPayload {
    #[serde(default)]
    object_attributes: MergeRequestAttributes,
    #[serde(default)]
    project: Project,
}

#[derive(Debug, Default, Deserialize)]
struct MergeRequestAttributes {
    #[serde(default)]
    iid: u64,
    #[serde(default)]
    target_project_id: u64,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Project {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    #[serde(default)]
    project: Project,
    #[serde(default)]
    r#ref: String,
    #[serde(default)]
    commits: Vec<Commit>,
}

/// Classifies a raw webhook payload into a [`GitLabEvent`].
///
/// Merge request hooks carry an `object_kind` discriminator, push hooks an
/// `event_name` one; anything else yields `None`. Extraction itself never
/// fails, absent fields fall back to empty values.
pub fn parse(payload: &Value) -> Option<GitLabEvent> {
    if payload.get("object_kind").and_then(Value::as_str) == Some("merge_request") {
        let raw: MergeRequestPayload = serde_json::from_value(payload.clone()).unwrap_or_default();
        return Some(GitLabEvent::MergeRequest(MergeRequestEvent {
            project_id: raw.object_attributes.target_project_id,
            project_name: raw.project.name,
            iid: raw.object_attributes.iid,
            action: raw.object_attributes.action,
        }));
    }

    if payload.get("event_name").and_then(Value::as_str) == Some("push") {
        let raw: PushPayload = serde_json::from_value(payload.clone()).unwrap_or_default();
        let branch = raw
            .r#ref
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(&raw.r#ref)
            .to_owned();
        return Some(GitLabEvent::Push(PushEvent {
            project_id: raw.project.id,
            project_name: raw.project.name,
            branch,
            commits: raw.commits,
        }));
    }

    None
}
