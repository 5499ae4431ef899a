//! Operational settings read from the process environment.
//!
//! This is the only place that looks at environment variables; everything
//! is handed to the core as plain values.

use std::path::PathBuf;

use prenv_core::store::{DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME, DEFAULT_GIT_ROOT};
use prenv_core::StoreSettings;
use prenv_github::GitHubConfig;
use prenv_state::DEFAULT_STATE_FILE;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Where the environment registry lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryBackend {
    ConfigMap { name: String },
    Git { repo: String, file: PathBuf },
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Web URL of a GitHub Enterprise host; clone URLs resolve against it
    pub github_web_url: Option<String>,
    pub git_root: PathBuf,
    pub base_branch: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub registry: RegistryBackend,
    pub raw_config: Option<String>,
    pub event_path: Option<PathBuf>,
    pub sha: Option<String>,
    pub repository: Option<String>,
    pub aws_region: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let github_web_url = get("PRENV_GITHUB_ENTERPRISE_URL");
        let github_api_url = get("PRENV_GITHUB_BASE_URL").unwrap_or_else(|| {
            match &github_web_url {
                Some(web) => format!("{}/api/v3", web.trim_end_matches('/')),
                None => DEFAULT_API_BASE_URL.to_string(),
            }
        });

        let state_file = get("PRENV_STATE_FILE_PATH").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
        let registry = if let Some(name) = get("PRENV_CONFIGMAP_NAME") {
            RegistryBackend::ConfigMap { name }
        } else if let Some(repo) = get("PRENV_STATE_GIT_REPO_URL") {
            RegistryBackend::Git {
                repo,
                file: PathBuf::from(state_file),
            }
        } else {
            RegistryBackend::File {
                path: PathBuf::from(state_file),
            }
        };

        Self {
            github_token: get("GITHUB_TOKEN").or_else(|| get("PRENV_GITHUB_TOKEN")),
            github_api_url,
            github_web_url,
            git_root: PathBuf::from(get("PRENV_GIT_ROOT").unwrap_or_else(|| DEFAULT_GIT_ROOT.to_string())),
            base_branch: get("PRENV_BASE_BRANCH"),
            author_name: get("PRENV_COMMIT_AUTHOR_USER_NAME")
                .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            author_email: get("PRENV_COMMIT_AUTHOR_EMAIL")
                .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
            registry,
            raw_config: get("PRENV_RAW_CONFIG"),
            event_path: get("GITHUB_EVENT_PATH").map(PathBuf::from),
            sha: get("GITHUB_SHA"),
            repository: get("GITHUB_REPOSITORY"),
            aws_region: get("PRENV_AWS_REGION"),
        }
    }

    pub fn github_config(&self) -> GitHubConfig {
        let mut config = GitHubConfig::new(&self.github_api_url)
            .with_token(self.github_token.as_deref().unwrap_or_default());
        if let Some(web) = &self.github_web_url {
            config = config.with_web_base_url(web);
        }
        config
    }

    pub fn store_settings(&self, work_dir: impl Into<PathBuf>) -> StoreSettings {
        StoreSettings {
            work_dir: work_dir.into(),
            git_root: self.git_root.clone(),
            base_branch: self.base_branch.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            github: self.github_config(),
        }
    }
}
