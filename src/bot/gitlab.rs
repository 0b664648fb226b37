use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::webhooks::GitLabEvent;

const PRIVATE_TOKEN: &str = "Private-Token";

/// How the changes lookup compensates for GitLab's eventual consistency: a
/// just-created merge request can report an empty change set for a few
/// seconds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

/// A file-level diff attached to a merge request or a commit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeRequestCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Serialize)]
struct NoteRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    note: &'a str,
}

/// Client for the GitLab REST API, authenticated with a static token.
///
/// Fetch operations degrade to an empty result on anything the API reports
/// (non-200 status, event kind mismatch); only transport-level failures
/// bubble up to the caller.
pub struct GitLabClient {
    http: Client,
    base_url: String,
    token: String,
    api_version: String,
    retry: RetryPolicy,
}

impl GitLabClient {
    pub fn new(http: Client, base_url: &str, token: &str, api_version: &str) -> Self {
        GitLabClient {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            api_version: api_version.to_owned(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, self.api_version, path)
    }

    /// Fetches the file-level diffs of a merge request.
    ///
    /// GitLab can report an empty change set right after a merge request is
    /// created, so a 200 with no changes is retried a bounded number of
    /// times. A non-200 status is not retried.
    pub async fn merge_request_changes(&self, event: &GitLabEvent) -> anyhow::Result<Vec<Change>> {
        let mr = match event {
            GitLabEvent::MergeRequest(mr) => mr,
            other => {
                warn!(
                    "can't fetch merge request changes for a {} event",
                    other.kind()
                );
                return Ok(Vec::new());
            }
        };

        let url = self.api_url(&format!(
            "projects/{}/merge_requests/{}/changes",
            mr.project_id, mr.iid
        ));

        for attempt in 1..=self.retry.max_attempts {
            let response = self
                .http
                .get(&url)
                .header(PRIVATE_TOKEN, &self.token)
                .send()
                .await?;
            let status = response.status();
            debug!(
                "changes response (attempt {}/{}): {}",
                attempt, self.retry.max_attempts, status
            );

            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                warn!("failed to fetch changes from {}: {} - {}", url, status, body);
                return Ok(Vec::new());
            }

            let parsed: ChangesResponse = response.json().await?;
            if !parsed.changes.is_empty() {
                return Ok(parsed.changes);
            }

            if attempt < self.retry.max_attempts {
                info!(
                    "changes for !{} are empty, retrying in {:?} (attempt {}/{})",
                    mr.iid, self.retry.delay, attempt, self.retry.max_attempts
                );
                sleep(self.retry.delay).await;
            }
        }

        warn!(
            "changes for !{} still empty after {} attempts",
            mr.iid, self.retry.max_attempts
        );
        Ok(Vec::new())
    }

    /// Fetches the commits of a merge request. Single attempt.
    pub async fn merge_request_commits(
        &self,
        event: &GitLabEvent,
    ) -> anyhow::Result<Vec<MergeRequestCommit>> {
        let mr = match event {
            GitLabEvent::MergeRequest(mr) => mr,
            _ => return Ok(Vec::new()),
        };

        let url = self.api_url(&format!(
            "projects/{}/merge_requests/{}/commits",
            mr.project_id, mr.iid
        ));
        let response = self
            .http
            .get(&url)
            .header(PRIVATE_TOKEN, &self.token)
            .send()
            .await?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!("failed to fetch commits from {}: {} - {}", url, status, body);
            return Ok(Vec::new());
        }

        Ok(response.json().await?)
    }

    /// Fetches the diff of the most recent commit delivered with a push
    /// event. Single attempt.
    pub async fn push_changes(&self, event: &GitLabEvent) -> anyhow::Result<Vec<Change>> {
        let push = match event {
            GitLabEvent::Push(push) => push,
            other => {
                warn!("can't fetch push changes for a {} event", other.kind());
                return Ok(Vec::new());
            }
        };

        let last_commit = match push.commits.last() {
            Some(commit) if !commit.id.is_empty() => commit,
            _ => {
                warn!("push event carries no usable commit, nothing to diff");
                return Ok(Vec::new());
            }
        };

        let url = self.api_url(&format!(
            "projects/{}/repository/commits/{}/diff",
            push.project_id, last_commit.id
        ));
        let response = self
            .http
            .get(&url)
            .header(PRIVATE_TOKEN, &self.token)
            .send()
            .await?;
        let status = response.status();

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!("failed to fetch diff from {}: {} - {}", url, status, body);
            return Ok(Vec::new());
        }

        Ok(response.json().await?)
    }

    /// Posts a note on a merge request. Fire-and-forget: failures are logged,
    /// never returned.
    pub async fn add_merge_request_note(
        &self,
        event: &GitLabEvent,
        body: &str,
    ) -> anyhow::Result<()> {
        let mr = match event {
            GitLabEvent::MergeRequest(mr) => mr,
            other => {
                warn!("can't add a merge request note to a {} event", other.kind());
                return Ok(());
            }
        };

        let url = self.api_url(&format!(
            "projects/{}/merge_requests/{}/notes",
            mr.project_id, mr.iid
        ));
        let response = self
            .http
            .post(&url)
            .header(PRIVATE_TOKEN, &self.token)
            .json(&NoteRequest { body })
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::CREATED {
            info!("note added to merge request !{}", mr.iid);
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("failed to add note to !{}: {} - {}", mr.iid, status, body);
        }

        Ok(())
    }

    /// Posts a comment on the most recent commit of a push event.
    /// Fire-and-forget, like [`GitLabClient::add_merge_request_note`].
    pub async fn add_push_note(&self, event: &GitLabEvent, message: &str) -> anyhow::Result<()> {
        let push = match event {
            GitLabEvent::Push(push) => push,
            other => {
                warn!("can't add a commit comment to a {} event", other.kind());
                return Ok(());
            }
        };

        let last_commit = match push.commits.last() {
            Some(commit) if !commit.id.is_empty() => commit,
            _ => {
                warn!("push event carries no usable commit, nothing to comment on");
                return Ok(());
            }
        };

        let url = self.api_url(&format!(
            "projects/{}/repository/commits/{}/comments",
            push.project_id, last_commit.id
        ));
        let response = self
            .http
            .post(&url)
            .header(PRIVATE_TOKEN, &self.token)
            .json(&CommentRequest { note: message })
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::CREATED {
            info!("comment added to commit {}", last_commit.id);
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "failed to comment on commit {}: {} - {}",
                last_commit.id, status, body
            );
        }

        Ok(())
    }
}
