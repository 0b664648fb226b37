use tokio::sync::mpsc::UnboundedSender;

pub mod gitlab;
pub use gitlab::events::GitLabEvent;
pub use gitlab::gitlab_webhook;

pub struct EventSender(pub UnboundedSender<Event>);

#[derive(Debug)]
pub enum Event {
    GitLab(GitLabEvent),
}
