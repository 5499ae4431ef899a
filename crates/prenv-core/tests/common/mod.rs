//! Shared fixtures: local bare git remotes and a chain wired to fakes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use prenv_core::config::PullRequestParams;
use prenv_core::provisioner::kubectl_fakes::RecordingApplier;
use prenv_core::provisioner::queue_fakes::MemoryQueues;
use prenv_core::{Chain, Config, EnvParams, RunInputs, Services, StoreFactory, StoreSettings};
use prenv_github::fakes::{RecordingDispatcher, RecordingPullRequests};
use prenv_github::GitHubConfig;
use prenv_state::fakes::MemoryRegistry;
use tokio_util::sync::CancellationToken;

/// Run git in `dir`, panicking with stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git must be installed");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// A bare repository at `<root>/remotes/<owner>/<repo>.git` with one commit
/// on `main`.
pub fn bare_remote(root: &Path, reference: &str) -> PathBuf {
    let bare = root.join("remotes").join(format!("{reference}.git"));
    std::fs::create_dir_all(&bare).unwrap();
    git(&bare, &["init", "-q", "--bare", "-b", "main"]);

    let seed = root.join("seed").join(reference);
    std::fs::create_dir_all(&seed).unwrap();
    git(&seed, &["init", "-q", "-b", "main"]);
    std::fs::write(seed.join("README.md"), "# ops\n").unwrap();
    git(&seed, &["add", "README.md"]);
    git(&seed, &["commit", "-q", "-m", "initial"]);
    let url = file_url(&bare);
    git(&seed, &["push", "-q", &url, "main:main"]);

    bare
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

pub fn files_on(bare: &Path, branch: &str) -> Vec<String> {
    git(bare, &["ls-tree", "-r", "--name-only", branch])
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn file_on(bare: &Path, branch: &str, file: &str) -> String {
    git(bare, &["show", &format!("{branch}:{file}")])
}

pub fn commit_count(bare: &Path, branch: &str) -> usize {
    git(bare, &["rev-list", "--count", branch])
        .trim()
        .parse()
        .unwrap()
}

pub fn branches(bare: &Path) -> Vec<String> {
    git(bare, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn env(name: &str, number: u64) -> EnvParams {
    EnvParams {
        name: name.to_string(),
        app_name_template: String::new(),
        pull_request: Some(PullRequestParams {
            number,
            head_sha: "0123abcd".to_string(),
            numbers: vec![number],
            repository: "org/app".to_string(),
        }),
    }
}

/// Fakes for every external system plus a scratch directory whose
/// `remotes/` folder stands in for the git host.
pub struct Harness {
    pub root: tempfile::TempDir,
    pub registry: Arc<MemoryRegistry>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub pull_requests: Arc<RecordingPullRequests>,
    pub applier: Arc<RecordingApplier>,
    pub queues: Arc<MemoryQueues>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            registry: Arc::new(MemoryRegistry::new()),
            dispatcher: Arc::new(RecordingDispatcher::new()),
            pull_requests: Arc::new(RecordingPullRequests::new()),
            applier: Arc::new(RecordingApplier::new()),
            queues: Arc::new(MemoryQueues::new()),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Settings resolving `owner/repo` against the local `remotes/` folder.
    pub fn settings(&self) -> StoreSettings {
        let web = format!("{}/", file_url(&self.path().join("remotes")));
        StoreSettings {
            github: GitHubConfig::default().with_web_base_url(&web),
            ..StoreSettings::new(self.path().join("work"))
        }
    }

    pub fn services(&self) -> Services {
        Services {
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            pull_requests: self.pull_requests.clone(),
            kubernetes: self.applier.clone(),
            queues: self.queues.clone(),
        }
    }

    pub fn stores(&self) -> StoreFactory {
        StoreFactory::new(
            self.settings(),
            self.pull_requests.clone(),
            CancellationToken::new(),
        )
        .with_started_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    pub fn chain(&self, config: Config, env: EnvParams, inputs: RunInputs) -> Chain {
        Chain::new(
            config,
            env,
            inputs,
            self.services(),
            self.settings(),
            CancellationToken::new(),
        )
        .unwrap()
        .with_started_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }
}
