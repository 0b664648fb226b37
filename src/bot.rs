use std::fmt::Write;

use reqwest::Client;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::{
    config::{LabrelayConfig, NotifierSettings},
    webhooks::{
        gitlab::events::{MergeRequestEvent, PushEvent},
        Event, GitLabEvent,
    },
};

pub mod gitlab;
pub mod notifier;
pub(crate) mod utils;

use gitlab::{Change, GitLabClient, MergeRequestCommit};
use notifier::{ChatNotifier, Dispatch, Message};
use utils::{changed_path, short_sha, shorten_content};

pub struct Labrelay {
    http: Client,
    gitlab: GitLabClient,
    notifier: NotifierSettings,
    config: LabrelayConfig,
}

impl Labrelay {
    /// Creates a new [`Labrelay`] relay and builds the HTTP client shared by
    /// the GitLab API calls and the chat webhook.
    pub fn new(config: LabrelayConfig, notifier: NotifierSettings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("labrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let gitlab = GitLabClient::new(
            http.clone(),
            config.gitlab_url.as_str(),
            &config.gitlab_token,
            &config.gitlab_api_version,
        );

        Ok(Labrelay {
            http,
            gitlab,
            notifier,
            config,
        })
    }

    /// Drains webhook events until every sender is gone.
    pub async fn run(&self, mut events: UnboundedReceiver<Event>) {
        debug!("running...");

        loop {
            let event = match events.recv().await {
                Some(event) => event,
                None => {
                    info!("all channel senders were dropped, exiting receive loop");
                    break;
                }
            };
            debug!("received event: {:?}", event);

            if let Err(e) = self.handle_event(event).await {
                warn!("encountered error while handling event: {}", e);
            }
        }
    }

    async fn handle_event(&self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::GitLab(event) => match &event {
                GitLabEvent::MergeRequest(mr) => self.handle_merge_request(&event, mr).await,
                GitLabEvent::Push(push) => self.handle_push(&event, push).await,
            },
        }
    }

    async fn handle_merge_request(
        &self,
        event: &GitLabEvent,
        mr: &MergeRequestEvent,
    ) -> anyhow::Result<()> {
        match mr.action.as_deref() {
            Some("open") | Some("update") | Some("reopen") => {}
            action => {
                debug!("nothing to do for merge request action {:?}", action);
                return Ok(());
            }
        }

        let changes = self.gitlab.merge_request_changes(event).await?;
        if changes.is_empty() {
            warn!("no changes for merge request !{}, skipping summary", mr.iid);
            return Ok(());
        }
        let commits = self.gitlab.merge_request_commits(event).await?;

        let summary = merge_request_summary(mr, &changes, &commits);
        self.gitlab.add_merge_request_note(event, &summary).await?;

        let title = if mr.project_name.is_empty() {
            format!("Merge request !{}", mr.iid)
        } else {
            format!("[{}] merge request !{}", mr.project_name, mr.iid)
        };
        self.notify(
            &mr.project_name,
            &Message::Markdown {
                title: &title,
                content: &summary,
            },
        )
        .await;

        Ok(())
    }

    async fn handle_push(&self, event: &GitLabEvent, push: &PushEvent) -> anyhow::Result<()> {
        if let Some(filter) = &self.config.push_branch_filter {
            if !filter.is_match(&push.branch) {
                debug!("branch '{}' doesn't match the push filter", push.branch);
                return Ok(());
            }
        }
        if push.commits.is_empty() {
            debug!("push to '{}' delivered no commits", push.branch);
            return Ok(());
        }

        let changes = self.gitlab.push_changes(event).await?;
        let summary = push_summary(push, &changes);
        self.gitlab.add_push_note(event, &summary).await?;

        let title = if push.project_name.is_empty() {
            format!("Push to {}", push.branch)
        } else {
            format!("[{}] push to {}", push.project_name, push.branch)
        };
        self.notify(
            &push.project_name,
            &Message::Markdown {
                title: &title,
                content: &summary,
            },
        )
        .await;

        Ok(())
    }

    /// Mirrors a summary to the chat channel. Best-effort: a failed delivery
    /// ends up in the log and nowhere else.
    async fn notify(&self, project_name: &str, message: &Message<'_>) {
        let project_names = if project_name.is_empty() {
            Vec::new()
        } else {
            vec![project_name.to_owned()]
        };
        let config = self
            .notifier
            .resolve(self.config.notify_webhook_url.clone(), &project_names);
        let notifier = ChatNotifier::new(config, self.http.clone());

        match notifier.send(message).await {
            Ok(Dispatch::Sent) => info!("chat notification delivered"),
            Ok(Dispatch::Skipped) => {}
            Err(e) => warn!("couldn't deliver chat notification: {}", e),
        }
    }
}

fn merge_request_summary(
    mr: &MergeRequestEvent,
    changes: &[Change],
    commits: &[MergeRequestCommit],
) -> String {
    let mut summary = format!("### Changes in merge request !{}\n\n", mr.iid);

    writeln!(summary, "{} changed file(s):\n", changes.len()).unwrap();
    for change in changes {
        writeln!(summary, "- {}", changed_path(change)).unwrap();
    }

    if !commits.is_empty() {
        writeln!(summary, "\n{} commit(s):\n", commits.len()).unwrap();
        for commit in commits {
            writeln!(
                summary,
                "- {} {} ({})",
                short_sha(commit),
                shorten_content(&commit.title),
                commit.author_name
            )
            .unwrap();
        }
    }

    summary
}

fn push_summary(push: &PushEvent, changes: &[Change]) -> String {
    let mut summary = format!("### Push to `{}`\n\n", push.branch);

    writeln!(summary, "{} commit(s):\n", push.commits.len()).unwrap();
    for commit in &push.commits {
        let title = shorten_content(commit.title());
        if commit.url.is_empty() {
            writeln!(summary, "- {} ({})", title, commit.author.name).unwrap();
        } else {
            writeln!(summary, "- [{}]({}) ({})", title, commit.url, commit.author.name).unwrap();
        }
    }

    if !changes.is_empty() {
        writeln!(
            summary,
            "\n{} file(s) touched by the last commit:\n",
            changes.len()
        )
        .unwrap();
        for change in changes {
            writeln!(summary, "- {}", changed_path(change)).unwrap();
        }
    }

    summary
}
