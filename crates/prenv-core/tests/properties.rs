//! Chain-wide guarantees: idempotent re-runs, verified commits, one dispatch
//! per target, and the git-backed registry contract.

mod common;

use std::path::Path;

use async_trait::async_trait;
use common::{commit_count, env, file_on, files_on, Harness};
use prenv_core::config::GitDelegate;
use prenv_core::delegatable::DelegatableProvisioner;
use prenv_core::{
    Config, Delegate, GitFileRegistry, Operation, Outputs, PrenvError, Provisioner,
    ProvisionerKind, RenderResult, RunInputs, Stage,
};
use prenv_state::EnvironmentRegistry;

fn gitops_render_config() -> Config {
    Config::parse(
        r#"
dedicated:
  render:
    gitOps:
      git:
        repo: org/ops
        path: envs
        push: true
    files:
      - nameTemplate: "{{ name }}/values.yaml"
        contentTemplate: "sha: {{ pullRequest.headSHA }}"
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn repeated_apply_creates_no_new_commit() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let chain = h.chain(gitops_render_config(), env("pr-42", 42), RunInputs::default());

    chain.apply().await.unwrap();
    assert_eq!(commit_count(&bare, "main"), 2);
    assert_eq!(file_on(&bare, "main", "envs/pr-42/values.yaml"), "sha: 0123abcd");

    chain.apply().await.unwrap();
    assert_eq!(commit_count(&bare, "main"), 2);
    assert_eq!(h.registry.list_names().await.unwrap(), vec!["pr-42"]);
}

/// Installs a `pre-receive` hook that rejects every push.
#[cfg(unix)]
fn reject_pushes(bare: &Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let hook = bare.join("hooks").join("pre-receive");
    std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
    std::fs::write(&hook, "#!/bin/sh\necho rejected >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
    hook
}

#[cfg(unix)]
#[tokio::test]
async fn apply_after_rejected_push_lands_on_remote() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let hook = reject_pushes(&bare);
    let chain = h.chain(gitops_render_config(), env("pr-42", 42), RunInputs::default());

    let err = chain.apply().await.unwrap_err();
    assert!(matches!(err, PrenvError::Git(_)), "{err:?}");
    assert_eq!(commit_count(&bare, "main"), 1);

    std::fs::remove_file(&hook).unwrap();
    chain.apply().await.unwrap();
    assert_eq!(commit_count(&bare, "main"), 2);
    assert_eq!(file_on(&bare, "main", "envs/pr-42/values.yaml"), "sha: 0123abcd");
}

#[cfg(unix)]
#[tokio::test]
async fn apply_recovers_when_remote_moved_after_rejected_push() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let hook = reject_pushes(&bare);
    let chain = h.chain(gitops_render_config(), env("pr-42", 42), RunInputs::default());
    chain.apply().await.unwrap_err();
    std::fs::remove_file(&hook).unwrap();

    // someone else pushes to main in the meantime
    let seed = h.path().join("seed").join("org/ops");
    std::fs::write(seed.join("OWNERS"), "ops\n").unwrap();
    common::git(&seed, &["add", "OWNERS"]);
    common::git(&seed, &["commit", "-q", "-m", "owners"]);
    common::git(&seed, &["push", "-q", &common::file_url(&bare), "main:main"]);

    chain.apply().await.unwrap();
    assert_eq!(commit_count(&bare, "main"), 3);
    let files = files_on(&bare, "main");
    assert!(files.contains(&"OWNERS".to_string()));
    assert!(files.contains(&"envs/pr-42/values.yaml".to_string()));
}

/// Writes a file it does not report.
struct LeakyProvisioner;

#[async_trait]
impl Provisioner for LeakyProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Render
    }

    async fn render(&self, dir: &Path) -> prenv_core::Result<RenderResult> {
        std::fs::write(dir.join("reported.txt"), "ok")?;
        std::fs::write(dir.join("unreported.txt"), "stray")?;
        Ok(RenderResult {
            added_or_modified: vec!["reported.txt".to_string()],
            deleted: Vec::new(),
        })
    }

    async fn apply(&self, _rendered: &RenderResult) -> prenv_core::Result<Outputs> {
        Ok(Outputs::new())
    }

    async fn destroy(&self, _rendered: &RenderResult) -> prenv_core::Result<Outputs> {
        Ok(Outputs::new())
    }
}

#[tokio::test]
async fn unstaged_render_output_fails_verification_without_committing() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let delegate = Delegate {
        git: Some(GitDelegate {
            repo: "org/ops".to_string(),
            branch: None,
            path: Some("out".to_string()),
            push: true,
        }),
        ..Delegate::default()
    };
    let p = DelegatableProvisioner::new("pr-render", Some(delegate), Box::new(LeakyProvisioner));

    let err = p.run(Operation::Apply, &h.stores()).await.unwrap_err();
    assert!(matches!(err, PrenvError::Verification(_)), "{err:?}");
    assert_eq!(commit_count(&bare, "main"), 1);
}

#[tokio::test]
async fn provisioners_sharing_a_target_send_one_dispatch() {
    let h = Harness::new();
    let config = Config::parse(
        r#"
shared:
  namePrefix: svc-
  awsResources:
    gitOps:
      repositoryDispatch: {owner: org, repo: infra}
    sourceQueueURL: src
    destinationQueueURL: dst
dedicated:
  render:
    gitOps:
      repositoryDispatch: {owner: org, repo: infra}
    files:
      - name: a.txt
        contentTemplate: a
  components:
    worker:
      render:
        gitOps:
          repositoryDispatch: {owner: org, repo: other}
        files:
          - name: b.txt
            contentTemplate: b
"#,
    )
    .unwrap();

    let summary = h
        .chain(config, env("pr-42", 42), RunInputs::default())
        .destroy()
        .await
        .unwrap();

    assert!(summary.stages.iter().all(|(_, s)| *s == Stage::Dispatched));
    let sent = h.dispatcher.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].repo, "infra");
    assert_eq!(sent[0].event_type, "prenv-destroy");
    assert_eq!(sent[0].payload.triggered_by, vec!["svc-aws", "pr-render"]);
    assert_eq!(sent[1].repo, "other");
    assert_eq!(sent[1].payload.triggered_by, vec!["pr-worker-render"]);
    assert_eq!(sent[0].payload.raw_config, sent[1].payload.raw_config);

    let downstream = Config::parse(&sent[0].payload.raw_config).unwrap();
    assert_eq!(downstream, downstream.without_repository_dispatch());
    assert!(h.queues.deleted().is_empty());
}

#[tokio::test]
async fn git_file_registry_commits_every_change() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/state");
    let registry =
        GitFileRegistry::for_repository(&h.stores(), "org/state", "prenv.state.yaml").unwrap();

    assert!(registry.list_names().await.unwrap().is_empty());
    registry.add_name("pr-1").await.unwrap();
    registry.add_name("pr-2").await.unwrap();
    registry.add_name("pr-1").await.unwrap();
    registry.delete_name("pr-9").await.unwrap();
    assert_eq!(registry.list_names().await.unwrap(), vec!["pr-1", "pr-2"]);

    registry.delete_name("pr-1").await.unwrap();
    assert_eq!(registry.list_names().await.unwrap(), vec!["pr-2"]);

    // initial + two adds + one delete
    assert_eq!(commit_count(&bare, "main"), 4);
    assert!(files_on(&bare, "main").contains(&"prenv.state.yaml".to_string()));
    let log = common::git(&bare, &["log", "--format=%s", "main"]);
    assert!(log.contains("Add environment name pr-2"));
    assert!(log.contains("Delete environment name pr-1"));
}
