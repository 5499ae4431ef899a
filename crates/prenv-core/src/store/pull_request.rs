use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use prenv_github::{NewPullRequest, PullRequestCreator, Repository};
use tracing::info;

use super::{ConfigStore, GitStore};
use crate::error::{PrenvError, Result};
use crate::provisioner::RenderResult;

/// Commits to a feature branch, pushes it and opens a pull request against
/// the base branch.
pub struct PullRequestStore {
    git: GitStore,
    pull_requests: Arc<dyn PullRequestCreator>,
}

impl PullRequestStore {
    pub fn new(git: GitStore, pull_requests: Arc<dyn PullRequestCreator>) -> Self {
        Self { git, pull_requests }
    }

    pub fn git(&self) -> &GitStore {
        &self.git
    }
}

#[async_trait]
impl ConfigStore for PullRequestStore {
    async fn open(&mut self) -> Result<PathBuf> {
        self.git.open().await
    }

    async fn stage(&mut self, rendered: &RenderResult) -> Result<()> {
        self.git.stage(rendered).await
    }

    async fn commit(&mut self, subject: &str, body: &str) -> Result<()> {
        if self.git.commit_changes(subject, body).await?.is_none() {
            return Ok(());
        }

        let head = self
            .git
            .new_branch()
            .ok_or_else(|| PrenvError::Git("pull request store needs a feature branch".to_string()))?
            .to_string();
        let repo = Repository::from_url(self.git.url())?;

        let number = self
            .pull_requests
            .create(&NewPullRequest {
                owner: repo.owner.clone(),
                repo: repo.name.clone(),
                title: subject.to_string(),
                head: head.clone(),
                base: self.git.base_branch().to_string(),
                body: body.to_string(),
            })
            .await?;

        info!(repo = %repo, number, head = %head, "opened pull request");
        Ok(())
    }
}
