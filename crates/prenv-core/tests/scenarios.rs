//! End-to-end runs of the chain against fakes and local git remotes.

mod common;

use common::{branches, commit_count, env, file_on, files_on, Harness};
use prenv_core::{load_config, Config, ConfigSource, RunInputs, Stage};
use prenv_github::Event;
use prenv_state::EnvironmentRegistry;

const WEBHOOK: &str = r#"
    outgoingWebhook:
      webhookURL: https://hooks.example.com/T000/B000
      channel: deploys
      username: prenv
"#;

#[tokio::test]
async fn local_apply_invokes_kubectl_and_registers_environment() {
    let h = Harness::new();
    let config = Config::parse(&format!("dedicated:\n  kubernetesResources:{WEBHOOK}")).unwrap();

    let summary = h
        .chain(config, env("pr-42", 42), RunInputs::default())
        .apply()
        .await
        .unwrap();

    assert_eq!(summary.stages, vec![("pr-k8s".to_string(), Stage::Applied)]);
    let calls = h.applier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].verb, "apply");
    let (name, manifest) = &calls[0].manifests[0];
    assert_eq!(name, "pr-42-outgoing-webhook.yaml");
    assert!(manifest.contains("name: pr-42-outgoing-webhook"));
    assert!(manifest.contains("https://hooks.example.com/T000/B000"));
    assert_eq!(h.registry.list_names().await.unwrap(), vec!["pr-42"]);
    assert!(h.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn gitops_delegation_pushes_to_base_branch() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let config = Config::parse(&format!(
        r#"
dedicated:
  kubernetesResources:
    gitOps:
      git:
        repo: org/ops
        branch: main
        path: apps
        push: true{WEBHOOK}"#
    ))
    .unwrap();

    let summary = h
        .chain(config, env("pr-42", 42), RunInputs::default())
        .apply()
        .await
        .unwrap();

    assert_eq!(summary.stages, vec![("pr-k8s".to_string(), Stage::Rendered)]);
    assert_eq!(branches(&bare), vec!["main"]);
    assert_eq!(commit_count(&bare, "main"), 2);
    assert!(files_on(&bare, "main").contains(&"apps/pr-42-outgoing-webhook.yaml".to_string()));
    assert!(file_on(&bare, "main", "apps/pr-42-outgoing-webhook.yaml").contains("kind: Deployment"));
    assert!(h.applier.calls().is_empty());
    assert!(h.queues.created().is_empty());
    assert!(h.pull_requests.created().is_empty());
}

#[tokio::test]
async fn gitops_destroy_removes_rendered_files() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let config = Config::parse(&format!(
        r#"
dedicated:
  kubernetesResources:
    gitOps:
      git:
        repo: org/ops
        path: apps
        push: true{WEBHOOK}"#
    ))
    .unwrap();

    let chain = h.chain(config, env("pr-42", 42), RunInputs::default());
    chain.apply().await.unwrap();
    chain.destroy().await.unwrap();

    assert_eq!(commit_count(&bare, "main"), 3);
    assert_eq!(files_on(&bare, "main"), vec!["README.md"]);
    assert!(h.registry.list_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn pull_request_delegation_opens_pull_request_from_feature_branch() {
    let h = Harness::new();
    let bare = common::bare_remote(h.path(), "org/ops");
    let config = Config::parse(
        r#"
dedicated:
  render:
    gitOps:
      git:
        repo: org/ops
        push: true
      pullRequest: {}
    files:
      - nameTemplate: "{{ name }}.txt"
        contentTemplate: "pull request {{ pullRequest.number }}"
"#,
    )
    .unwrap();

    h.chain(config, env("pr-42", 42), RunInputs::default())
        .apply()
        .await
        .unwrap();

    let feature = "prenv/pr-render-20240102030405";
    assert_eq!(branches(&bare), vec!["main".to_string(), feature.to_string()]);
    assert_eq!(commit_count(&bare, "main"), 1);
    assert_eq!(file_on(&bare, feature, "pr-42.txt"), "pull request 42");

    let created = h.pull_requests.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].owner, "org");
    assert_eq!(created[0].repo, "ops");
    assert_eq!(created[0].head, feature);
    assert_eq!(created[0].base, "main");
    assert_eq!(created[0].title, "automated commit");
}

#[tokio::test]
async fn dispatch_round_trip_terminates_after_one_hop() {
    let source = Harness::new();
    let config = Config::parse(&format!(
        r#"
shared:
  namePrefix: svc-
  kubernetesResources:
    gitOps:
      repositoryDispatch:
        owner: org
        repo: target{WEBHOOK}"#
    ))
    .unwrap();

    let first = source
        .chain(config, env("pr-42", 42), RunInputs::default())
        .apply()
        .await
        .unwrap();
    assert_eq!(first.stages, vec![("svc-k8s".to_string(), Stage::Dispatched)]);
    assert!(source.applier.calls().is_empty());

    let sent = source.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!((sent[0].owner.as_str(), sent[0].repo.as_str()), ("org", "target"));
    assert_eq!(sent[0].event_type, "prenv-apply");
    assert_eq!(sent[0].payload.triggered_by, vec!["svc-k8s"]);
    assert!(!sent[0].payload.raw_config.contains("repositoryDispatch"));

    // The target repository's workflow receives the payload as a
    // repository_dispatch event.
    let event = Event::from_json(
        &serde_json::json!({
            "action": sent[0].event_type,
            "client_payload": sent[0].payload,
        })
        .to_string(),
    )
    .unwrap();

    let target = Harness::new();
    let loaded = load_config(None, Some(&event), &target.path().join("prenv.yaml"))
        .await
        .unwrap();
    assert_eq!(loaded.source, ConfigSource::ClientPayload);
    let env = loaded.config.env_args.clone().unwrap();
    assert_eq!(env.name, "pr-42");

    let second = target
        .chain(
            loaded.config,
            env,
            RunInputs {
                action: loaded.action,
                triggered_by: loaded.triggered_by,
            },
        )
        .action()
        .await
        .unwrap();

    assert_eq!(second.stages, vec![("svc-k8s".to_string(), Stage::Applied)]);
    assert!(second.dispatches.is_empty());
    assert!(target.dispatcher.sent().is_empty());
    assert_eq!(target.applier.calls().len(), 1);
}

#[tokio::test]
async fn dispatched_destroy_runs_destroy_on_target() {
    let h = Harness::new();
    let config = Config::parse(&format!("dedicated:\n  kubernetesResources:{WEBHOOK}")).unwrap();
    h.registry.add_name("pr-42").await.unwrap();

    let inputs = RunInputs {
        action: "prenv-destroy".to_string(),
        triggered_by: vec!["pr-k8s".to_string()],
    };
    h.chain(config, env("pr-42", 42), inputs)
        .action()
        .await
        .unwrap();

    let calls = h.applier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].verb, "delete");
    let (name, manifest) = &calls[0].manifests[0];
    assert_eq!(name, "pr-42-outgoing-webhook.yaml");
    assert!(!manifest.contains("kind: Namespace"));
    assert!(h.registry.list_names().await.unwrap().is_empty());
}
