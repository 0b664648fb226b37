use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::bot::notifier::NotifierConfig;

const NOTIFY_ENABLED: &str = "NOTIFY_ENABLED";
const NOTIFY_WEBHOOK_URL: &str = "NOTIFY_WEBHOOK_URL";
const NOTIFY_SECRET: &str = "NOTIFY_SECRET";

#[derive(Debug, Deserialize)]
pub struct LabrelayConfig {
    /// The URL of the GitLab instance the relay talks to
    pub gitlab_url: Url,
    /// Token sent as `Private-Token` on every GitLab API call
    pub gitlab_token: String,
    /// GitLab REST API version
    #[serde(default = "default_api_version")]
    pub gitlab_api_version: String,
    /// Only pushes to branches matching this pattern are summarized. All branches when unset.
    #[serde(default, with = "serde_regex")]
    pub push_branch_filter: Option<Regex>,
    /// Chat webhook URL; takes precedence over any environment override.
    #[serde(default)]
    pub notify_webhook_url: Option<String>,
}

fn default_api_version() -> String {
    "v4".to_owned()
}

/// Notifier settings captured from the process environment.
///
/// The environment is read exactly once, at startup; everything downstream
/// works from this snapshot. Per-project overrides use the project name as a
/// verbatim variable suffix (`NOTIFY_WEBHOOK_URL_<name>`,
/// `NOTIFY_SECRET_<name>`).
#[derive(Debug, Clone, Default)]
pub struct NotifierSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub secret: Option<String>,
    pub project_webhook_urls: HashMap<String, String>,
    pub project_secrets: HashMap<String, String>,
}

impl NotifierSettings {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl Iterator<Item = (String, String)>) -> Self {
        let mut settings = Self::default();

        for (key, value) in vars {
            if key == NOTIFY_ENABLED {
                settings.enabled = value == "1";
                continue;
            }

            // empty values count as unset
            if value.is_empty() {
                continue;
            }

            if key == NOTIFY_WEBHOOK_URL {
                settings.webhook_url = Some(value);
            } else if key == NOTIFY_SECRET {
                settings.secret = Some(value);
            } else if let Some(project) = key
                .strip_prefix(NOTIFY_WEBHOOK_URL)
                .and_then(|rest| rest.strip_prefix('_'))
            {
                settings
                    .project_webhook_urls
                    .insert(project.to_owned(), value);
            } else if let Some(project) = key
                .strip_prefix(NOTIFY_SECRET)
                .and_then(|rest| rest.strip_prefix('_'))
            {
                settings.project_secrets.insert(project.to_owned(), value);
            }
        }

        settings
    }

    /// Resolves the configuration for one notifier instance.
    ///
    /// The webhook URL is taken from the explicit argument first, then the
    /// project-specific override, then the global default. The secret has no
    /// explicit tier and falls back from project-specific to global. Only the
    /// first of `project_names` is considered.
    pub fn resolve(
        &self,
        webhook_url: Option<String>,
        project_names: &[String],
    ) -> NotifierConfig {
        let project = project_names.first();

        let webhook_url = webhook_url
            .or_else(|| {
                project.and_then(|name| self.project_webhook_urls.get(name.as_str()).cloned())
            })
            .or_else(|| self.webhook_url.clone());
        let secret = project
            .and_then(|name| self.project_secrets.get(name.as_str()).cloned())
            .or_else(|| self.secret.clone());

        NotifierConfig {
            enabled: self.enabled,
            webhook_url,
            secret,
        }
    }
}
