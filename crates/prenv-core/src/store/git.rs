//! Git-backed store driven through the `git` CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{check_cancelled, ConfigStore};
use crate::error::{PrenvError, Result};
use crate::provisioner::RenderResult;

/// Where the clone of `url` lives under `git_root`: the URL without its
/// scheme, user part and `.git` suffix.
pub fn local_clone_path(git_root: &Path, url: &str) -> PathBuf {
    let mut rel = url;
    for scheme in ["https://", "http://", "file://", "ssh://"] {
        rel = rel.strip_prefix(scheme).unwrap_or(rel);
    }
    rel = rel.strip_prefix("git@").unwrap_or(rel);
    rel = rel.strip_suffix(".git").unwrap_or(rel);
    let rel = rel.replace(':', "/");
    git_root.join(rel.trim_start_matches('/'))
}

#[derive(Debug, Clone)]
pub struct GitStoreOptions {
    pub url: String,
    pub clone_dir: PathBuf,
    pub base_branch: String,
    /// Feature branch to create from the base branch
    pub new_branch: Option<String>,
    /// Directory inside the clone to render into
    pub path: Option<String>,
    pub push: bool,
    pub author_name: String,
    pub author_email: String,
    pub token: Option<String>,
    pub committed_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct GitStore {
    opts: GitStoreOptions,
    render_dir: Option<PathBuf>,
}

impl GitStore {
    pub fn new(opts: GitStoreOptions) -> Self {
        Self {
            opts,
            render_dir: None,
        }
    }

    pub fn with_new_branch(mut self, branch: String) -> Self {
        self.opts.new_branch = Some(branch);
        self
    }

    pub fn url(&self) -> &str {
        &self.opts.url
    }

    pub fn clone_dir(&self) -> &Path {
        &self.opts.clone_dir
    }

    pub fn base_branch(&self) -> &str {
        &self.opts.base_branch
    }

    pub fn new_branch(&self) -> Option<&str> {
        self.opts.new_branch.as_deref()
    }

    /// The branch commits land on.
    pub fn target_branch(&self) -> &str {
        self.new_branch().unwrap_or(&self.opts.base_branch)
    }

    fn auth_args(&self) -> Vec<String> {
        let is_http = self.opts.url.starts_with("https://") || self.opts.url.starts_with("http://");
        match &self.opts.token {
            Some(token) if is_http => {
                let basic = base64::engine::general_purpose::STANDARD
                    .encode(format!("x-access-token:{token}"));
                vec![
                    "-c".to_string(),
                    format!("http.extraheader=AUTHORIZATION: basic {basic}"),
                ]
            }
            _ => Vec::new(),
        }
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(self.auth_args())
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    /// Run git in `dir` and return stdout.
    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        debug!(dir = %dir.display(), "git {}", args.join(" "));
        let output = self.command(dir, args).output().await?;
        if !output.status.success() {
            return Err(PrenvError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn ensure_cloned(&self) -> Result<()> {
        let dir = &self.opts.clone_dir;
        if dir.join(".git").exists() {
            debug!(dir = %dir.display(), "reusing clone");
            return Ok(());
        }

        let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) else {
            return Err(PrenvError::Git(format!("invalid clone dir {}", dir.display())));
        };
        tokio::fs::create_dir_all(parent).await?;

        let name = name.to_string_lossy();
        self.git(parent, &["clone", "-q", &self.opts.url, &name]).await?;
        info!(url = %self.opts.url, dir = %dir.display(), "cloned repository");
        Ok(())
    }

    /// Point the local base branch at the remote one. Local commits that
    /// never made it to `origin` are discarded.
    async fn checkout_base(&self) -> Result<()> {
        let dir = &self.opts.clone_dir;
        let base = self.opts.base_branch.as_str();

        self.git(dir, &["fetch", "-q", "origin", base])
            .await
            .map_err(|e| PrenvError::Git(format!("unable to fetch {base}: {e}")))?;
        let remote = format!("origin/{base}");
        self.git(dir, &["checkout", "-q", "-B", base, &remote]).await?;
        self.git(dir, &["reset", "-q", "--hard", &remote]).await?;
        Ok(())
    }

    /// `git status --porcelain` must list nothing but staged additions,
    /// modifications and deletions.
    async fn verify(&self) -> Result<()> {
        let status = self
            .git(&self.opts.clone_dir, &["status", "--porcelain"])
            .await?;
        for line in status.lines().filter(|l| !l.is_empty()) {
            let mut chars = line.chars();
            let staged = chars.next().unwrap_or(' ');
            let unstaged = chars.next().unwrap_or(' ');
            if !matches!(staged, 'M' | 'A' | 'D') || unstaged != ' ' {
                return Err(PrenvError::Verification(format!(
                    "all changed files should be staged as added, modified or deleted, got {line:?}"
                )));
            }
        }
        Ok(())
    }

    async fn has_staged_changes(&self) -> Result<bool> {
        let status = self
            .command(&self.opts.clone_dir, &["diff", "--cached", "--quiet"])
            .status()
            .await?;
        Ok(!status.success())
    }

    /// Verify, commit and optionally push. Returns the new commit, or `None`
    /// when nothing was staged.
    pub async fn commit_changes(&mut self, subject: &str, body: &str) -> Result<Option<String>> {
        let dir = self.opts.clone_dir.clone();
        check_cancelled(&self.opts.cancel)?;
        self.verify().await?;

        if !self.has_staged_changes().await? {
            info!(repo = %self.opts.url, "nothing to commit");
            return Ok(None);
        }

        let name = format!("user.name={}", self.opts.author_name);
        let email = format!("user.email={}", self.opts.author_email);
        let date = self.opts.committed_at.to_rfc3339();
        let mut cmd = self.command(
            &dir,
            &["-c", &name, "-c", &email, "commit", "-q", "-m", subject, "-m", body],
        );
        cmd.env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date);
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(PrenvError::Git(format!(
                "git commit failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let sha = self.git(&dir, &["rev-parse", "HEAD"]).await?.trim().to_string();
        info!(sha = %sha, branch = self.target_branch(), "committed");

        if self.opts.push {
            check_cancelled(&self.opts.cancel)?;
            let branch = self.target_branch().to_string();
            let refspec = format!("{branch}:{branch}");
            self.git(&dir, &["push", "-q", "origin", &refspec]).await?;
            info!(url = %self.opts.url, branch = %branch, "pushed");
        }

        Ok(Some(sha))
    }
}

#[async_trait]
impl ConfigStore for GitStore {
    /// Clone (or reuse), clean, reset the base branch to `origin`, then
    /// create the feature branch if one is wanted.
    async fn open(&mut self) -> Result<PathBuf> {
        let cancel = self.opts.cancel.clone();
        let dir = self.opts.clone_dir.clone();

        self.ensure_cloned().await?;
        check_cancelled(&cancel)?;

        self.git(&dir, &["reset", "-q", "--hard"]).await?;
        self.git(&dir, &["clean", "-q", "-fd"]).await?;
        self.checkout_base().await?;
        check_cancelled(&cancel)?;

        if let Some(branch) = self.opts.new_branch.clone() {
            self.git(&dir, &["checkout", "-q", "-B", &branch]).await?;
        }

        let render_dir = match &self.opts.path {
            Some(p) if !p.is_empty() => dir.join(p),
            _ => dir,
        };
        tokio::fs::create_dir_all(&render_dir).await?;
        self.render_dir = Some(render_dir.clone());
        Ok(render_dir)
    }

    async fn stage(&mut self, rendered: &RenderResult) -> Result<()> {
        let dir = self
            .render_dir
            .clone()
            .ok_or_else(|| PrenvError::Git("store is not open".to_string()))?;

        if !rendered.added_or_modified.is_empty() {
            let mut args = vec!["add", "--"];
            args.extend(rendered.added_or_modified.iter().map(String::as_str));
            self.git(&dir, &args).await?;
        }
        if !rendered.deleted.is_empty() {
            let mut args = vec!["rm", "-q", "--ignore-unmatch", "--"];
            args.extend(rendered.deleted.iter().map(String::as_str));
            self.git(&dir, &args).await?;
        }
        Ok(())
    }

    async fn commit(&mut self, subject: &str, body: &str) -> Result<()> {
        self.commit_changes(subject, body).await.map(|_| ())
    }
}
