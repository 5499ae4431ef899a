//! Workspaces provisioners render into, and how their changes are persisted.
//!
//! * [`LocalStore`]: a directory under `<work_dir>/.prenv/<id>`; nothing is
//!   persisted beyond the files themselves.
//! * [`GitStore`]: a cached clone of the delegate's repository; changes are
//!   committed and optionally pushed.
//! * [`PullRequestStore`]: a [`GitStore`] on a fresh feature branch that opens
//!   a pull request once the branch is pushed.

mod git;
mod local;
mod pull_request;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prenv_github::{clone_url, GitHubConfig, PullRequestCreator};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Delegate;
use crate::error::{PrenvError, Result};
use crate::provisioner::RenderResult;

pub use git::{local_clone_path, GitStore, GitStoreOptions};
pub use local::LocalStore;
pub use pull_request::PullRequestStore;

pub const DEFAULT_GIT_ROOT: &str = ".prenv/repositories";
pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_AUTHOR_NAME: &str = "prenv";
pub const DEFAULT_AUTHOR_EMAIL: &str = "prenv@users.noreply.github.com";

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Prepare the workspace and return the directory to render into.
    async fn open(&mut self) -> Result<PathBuf>;

    /// Record the files a render touched, paths relative to the render directory.
    async fn stage(&mut self, rendered: &RenderResult) -> Result<()>;

    /// Persist staged changes. A no-op when there is nothing to persist.
    async fn commit(&mut self, subject: &str, body: &str) -> Result<()>;
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PrenvError::Cancelled);
    }
    Ok(())
}

/// Open the store, run `render` inside its workspace and stage the result.
/// The caller commits.
pub async fn transact<F, Fut>(
    store: &mut dyn ConfigStore,
    cancel: &CancellationToken,
    render: F,
) -> Result<RenderResult>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<RenderResult>>,
{
    check_cancelled(cancel)?;
    let dir = store.open().await?;
    check_cancelled(cancel)?;
    let rendered = render(dir).await?;
    check_cancelled(cancel)?;
    store.stage(&rendered).await?;
    Ok(rendered)
}

/// Operational settings shared by every store of a run.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Directory local workspaces and relative clone roots resolve against
    pub work_dir: PathBuf,
    pub git_root: PathBuf,
    /// Used when the delegate names no branch
    pub base_branch: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub github: GitHubConfig,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            git_root: PathBuf::from(DEFAULT_GIT_ROOT),
            base_branch: None,
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
            github: GitHubConfig::default(),
        }
    }
}

impl StoreSettings {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    fn clone_root(&self) -> PathBuf {
        self.work_dir.join(&self.git_root)
    }
}

/// Picks the store for a provisioner from its delegate.
pub struct StoreFactory {
    settings: StoreSettings,
    pull_requests: Arc<dyn PullRequestCreator>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

impl StoreFactory {
    pub fn new(
        settings: StoreSettings,
        pull_requests: Arc<dyn PullRequestCreator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            pull_requests,
            cancel,
            started_at: Utc::now(),
        }
    }

    /// Fix the run timestamp used for feature branch names and commit dates.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Feature branch for pull request delegation.
    pub fn feature_branch(&self, id: &str) -> String {
        format!("prenv/{id}-{}", self.started_at.format("%Y%m%d%H%M%S"))
    }

    /// The git store for `delegate`, without a feature branch.
    pub fn git(&self, delegate: &crate::config::GitDelegate) -> Result<GitStore> {
        let url = clone_url(&delegate.repo, &self.settings.github.web_base_url)?;
        let base_branch = delegate
            .branch
            .clone()
            .filter(|b| !b.is_empty())
            .or_else(|| self.settings.base_branch.clone())
            .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string());

        Ok(GitStore::new(GitStoreOptions {
            clone_dir: local_clone_path(&self.settings.clone_root(), &url),
            url,
            base_branch,
            new_branch: None,
            path: delegate.path.clone(),
            push: delegate.push,
            author_name: self.settings.author_name.clone(),
            author_email: self.settings.author_email.clone(),
            token: self.settings.github.token.clone(),
            committed_at: self.started_at,
            cancel: self.cancel.clone(),
        }))
    }

    /// Local store without a delegate or a git layer, git store with one,
    /// pull request store when pull requests are requested too.
    pub fn open(&self, id: &str, delegate: Option<&Delegate>) -> Result<Box<dyn ConfigStore>> {
        let Some(git) = delegate.and_then(|d| d.git.as_ref()) else {
            debug!(id, "using local store");
            return Ok(Box::new(LocalStore::new(&self.settings.work_dir, id)));
        };

        let store = self.git(git)?;
        if delegate.is_some_and(|d| d.pull_request.is_some()) {
            let branch = self.feature_branch(id);
            debug!(id, branch = %branch, "using pull request store");
            return Ok(Box::new(PullRequestStore::new(
                store.with_new_branch(branch),
                self.pull_requests.clone(),
            )));
        }

        debug!(id, url = %store.url(), "using git store");
        Ok(Box::new(store))
    }
}
