//! The provisioner chain.
//!
//! Builds one [`DelegatableProvisioner`] per declared capability of every
//! component, runs them in order and sends one `repository_dispatch` per
//! distinct target for the provisioners that delegated that way.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use prenv_github::{DispatchPayload, DispatchSender, PullRequestCreator};
use prenv_state::EnvironmentRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{
    Component, Config, Delegate, EnvParams, NamedComponent, RepositoryDispatch,
    DEFAULT_APP_NAME_TEMPLATE,
};
use crate::delegatable::{DelegatableProvisioner, Stage};
use crate::error::{PrenvError, Result};
use crate::provisioner::{
    derive_queue, ArgoCdAppProvisioner, AwsProvisioner, KubernetesApplier,
    KubernetesProvisioner, Operation, Outputs, Provisioner, ProvisionerKind, QueueAdapter,
    RenderProvisioner,
};
use crate::store::{check_cancelled, StoreFactory, StoreSettings};

/// External systems the chain talks to.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<dyn EnvironmentRegistry>,
    pub dispatcher: Arc<dyn DispatchSender>,
    pub pull_requests: Arc<dyn PullRequestCreator>,
    pub kubernetes: Arc<dyn KubernetesApplier>,
    pub queues: Arc<dyn QueueAdapter>,
}

/// What started this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInputs {
    /// Event action, `prenv-apply` or `prenv-destroy` for dispatched runs
    pub action: String,
    /// Provisioners named by the inbound dispatch; empty runs everything
    pub triggered_by: Vec<String>,
}

/// One outbound dispatch and the provisioners it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDispatch {
    pub target: RepositoryDispatch,
    pub provisioner_names: Vec<String>,
}

/// Group `(target, provisioner)` pairs by target, in first-seen order.
///
/// Targets are compared literally: `org/app` and `org/app.git` are two
/// different targets.
pub fn merge_dispatches(requests: &[(RepositoryDispatch, String)]) -> Vec<MergedDispatch> {
    let mut merged: Vec<MergedDispatch> = Vec::new();
    for (target, name) in requests {
        match merged.iter_mut().find(|m| &m.target == target) {
            Some(m) => m.provisioner_names.push(name.clone()),
            None => merged.push(MergedDispatch {
                target: target.clone(),
                provisioner_names: vec![name.clone()],
            }),
        }
    }
    merged
}

/// Outcome of one chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub operation: Operation,
    pub environment: String,
    /// Final stage of every provisioner, in run order
    pub stages: Vec<(String, Stage)>,
    /// Outputs of provisioners that applied locally
    pub outputs: BTreeMap<String, Outputs>,
    pub dispatches: Vec<MergedDispatch>,
}

pub struct Chain {
    /// The configuration with resolved `args`, as it is sent downstream
    config: Config,
    env: EnvParams,
    inputs: RunInputs,
    services: Services,
    stores: StoreFactory,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("environment", &self.env.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl Chain {
    /// Validate the configuration and every provisioner it yields.
    pub fn new(
        mut config: Config,
        mut env: EnvParams,
        inputs: RunInputs,
        services: Services,
        store_settings: StoreSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        if env.name.is_empty() {
            return Err(PrenvError::Config("environment name is required".to_string()));
        }
        if env.app_name_template.is_empty() {
            env.app_name_template = DEFAULT_APP_NAME_TEMPLATE.to_string();
        }
        config.env_args = Some(env.clone());

        let stores = StoreFactory::new(
            store_settings,
            services.pull_requests.clone(),
            cancel.clone(),
        );

        let chain = Self {
            config,
            env,
            inputs,
            services,
            stores,
            cancel,
        };
        chain.build(&[], None)?;
        Ok(chain)
    }

    /// Fix the run timestamp used for feature branches and commit dates.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.stores = self.stores.with_started_at(started_at);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn environment(&self) -> &EnvParams {
        &self.env
    }

    /// Names of the provisioners this run executes, in order.
    pub fn provisioner_names(&self) -> Result<Vec<String>> {
        Ok(self
            .build(&[], None)?
            .iter()
            .map(|p| p.name().to_string())
            .collect())
    }

    /// `active` are the environments that should have per-environment
    /// resources; `retiring` is the one being destroyed.
    fn build(&self, active: &[String], retiring: Option<&str>) -> Result<Vec<DelegatableProvisioner>> {
        let mut out = Vec::new();

        for named in self.config.components() {
            for kind in ProvisionerKind::ALL {
                let name = format!("{}{}", named.prefix, kind.as_str());

                let triggered = !self.inputs.triggered_by.is_empty();
                if triggered && !self.inputs.triggered_by.contains(&name) {
                    continue;
                }

                let Some((delegate, provisioner)) =
                    self.provisioner_for(&named, kind, active, retiring)?
                else {
                    continue;
                };

                out.push(
                    DelegatableProvisioner::new(name, delegate, provisioner)
                        .triggered_via_dispatch(triggered),
                );
            }
        }

        Ok(out)
    }

    fn provisioner_for(
        &self,
        named: &NamedComponent<'_>,
        kind: ProvisionerKind,
        active: &[String],
        retiring: Option<&str>,
    ) -> Result<Option<(Option<Delegate>, Box<dyn Provisioner>)>> {
        let component = named.component;
        let at = if named.shared { "shared" } else { "dedicated" };

        let built: Option<(Option<Delegate>, Box<dyn Provisioner>)> = match kind {
            ProvisionerKind::Render => component.render.as_ref().map(|spec| {
                let p: Box<dyn Provisioner> =
                    Box::new(RenderProvisioner::new(spec.clone(), self.env.clone()));
                (spec.git_ops.clone(), p)
            }),
            ProvisionerKind::Kubernetes => match &component.kubernetes_resources {
                Some(spec) => {
                    let mut spec = spec.clone();
                    if named.shared {
                        wire_forwarder(&mut spec, component, active);
                    }
                    let environment = (!named.shared).then_some(self.env.name.as_str());
                    let p = KubernetesProvisioner::new(
                        &spec,
                        environment,
                        self.services.kubernetes.clone(),
                        &format!("{at}.kubernetesResources"),
                    )?;
                    Some((spec.git_ops.clone(), Box::new(p)))
                }
                None => None,
            },
            ProvisionerKind::Aws => component.aws_resources.as_ref().map(|spec| {
                let p: Box<dyn Provisioner> = Box::new(AwsProvisioner::new(
                    spec.clone(),
                    active.to_vec(),
                    retiring.map(str::to_string),
                    self.services.queues.clone(),
                ));
                (spec.git_ops.clone(), p)
            }),
            ProvisionerKind::ArgoCdApp => match &component.argo_cd {
                Some(spec) => {
                    let p = ArgoCdAppProvisioner::new(
                        spec,
                        &self.env,
                        named.short_name,
                        self.services.kubernetes.clone(),
                        &format!("{at}.argocd"),
                    )?;
                    Some((spec.git_ops.clone(), Box::new(p)))
                }
                None => None,
            },
        };

        Ok(built)
    }

    /// Register the environment, then create or update everything.
    pub async fn apply(&self) -> Result<RunSummary> {
        self.services.registry.add_name(&self.env.name).await?;
        let active = self.services.registry.list_names().await?;
        let provisioners = self.build(&active, None)?;
        self.run(Operation::Apply, &provisioners).await
    }

    /// Tear the environment down and reconfigure shared pieces without it.
    /// The environment is unregistered only when every provisioner succeeded.
    pub async fn destroy(&self) -> Result<RunSummary> {
        let active: Vec<String> = self
            .services
            .registry
            .list_names()
            .await?
            .into_iter()
            .filter(|n| n != &self.env.name)
            .collect();
        let provisioners = self.build(&active, Some(&self.env.name))?;
        let summary = self.run(Operation::Destroy, &provisioners).await?;
        self.services.registry.delete_name(&self.env.name).await?;
        Ok(summary)
    }

    /// Apply or destroy depending on the event action.
    pub async fn action(&self) -> Result<RunSummary> {
        match self.inputs.action.as_str() {
            prenv_github::EVENT_TYPE_APPLY => self.apply().await,
            prenv_github::EVENT_TYPE_DESTROY => self.destroy().await,
            other => Err(PrenvError::UnknownAction(other.to_string())),
        }
    }

    async fn run(&self, op: Operation, provisioners: &[DelegatableProvisioner]) -> Result<RunSummary> {
        info!(
            environment = %self.env.name,
            %op,
            provisioners = provisioners.len(),
            "running chain"
        );

        let mut summary = RunSummary {
            operation: op,
            environment: self.env.name.clone(),
            stages: Vec::new(),
            outputs: BTreeMap::new(),
            dispatches: Vec::new(),
        };
        let mut requests = Vec::new();

        for p in provisioners {
            check_cancelled(&self.cancel)?;
            let result = p.run(op, &self.stores).await?;

            for target in result.dispatches {
                requests.push((target, p.name().to_string()));
            }
            if !result.outputs.is_empty() {
                summary.outputs.insert(p.name().to_string(), result.outputs);
            }
            summary.stages.push((p.name().to_string(), result.stage));
        }

        let merged = merge_dispatches(&requests);
        if !merged.is_empty() {
            self.send_dispatches(op, &merged).await?;
        }
        summary.dispatches = merged;

        Ok(summary)
    }

    async fn send_dispatches(&self, op: Operation, merged: &[MergedDispatch]) -> Result<()> {
        let raw_config = self.config.without_repository_dispatch().to_yaml()?;

        for d in merged {
            check_cancelled(&self.cancel)?;
            let payload = DispatchPayload {
                raw_config: raw_config.clone(),
                triggered_by: d.provisioner_names.clone(),
            };
            debug!(triggered_by = ?payload.triggered_by, "dispatch payload");
            self.services
                .dispatcher
                .send(&d.target.owner, &d.target.repo, op.event_type(), &payload)
                .await?;
            info!(
                owner = %d.target.owner,
                repo = %d.target.repo,
                event_type = op.event_type(),
                provisioners = d.provisioner_names.len(),
                "sent repository dispatch"
            );
        }
        Ok(())
    }
}

/// Point the shared forwarder at the shared queues: source from
/// `awsResources`, destinations are the shared destination plus one queue per
/// active environment.
fn wire_forwarder(
    spec: &mut crate::config::KubernetesResources,
    component: &Component,
    active: &[String],
) {
    let (Some(forwarder), Some(aws)) = (spec.sqs_forwarder.as_mut(), component.aws_resources.as_ref())
    else {
        return;
    };

    if forwarder.source_queue_url.is_empty() {
        forwarder.source_queue_url = aws.source_queue_url.clone();
    }

    let derived = std::iter::once(aws.destination_queue_url.clone())
        .chain(active.iter().map(|env| derive_queue(&aws.destination_queue_url, env)));
    for queue in derived {
        if !forwarder.destination_queue_urls.contains(&queue) {
            forwarder.destination_queue_urls.push(queue);
        }
    }
}

#[cfg(test)]
mod tests {
    use prenv_github::fakes::{RecordingDispatcher, RecordingPullRequests};
    use prenv_state::fakes::MemoryRegistry;

    use super::*;
    use crate::config::PullRequestParams;
    use crate::provisioner::kubectl_fakes::RecordingApplier;
    use crate::provisioner::queue_fakes::MemoryQueues;

    fn target(owner: &str, repo: &str) -> RepositoryDispatch {
        RepositoryDispatch {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        dispatcher: Arc<RecordingDispatcher>,
        applier: Arc<RecordingApplier>,
        queues: Arc<MemoryQueues>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Arc::new(MemoryRegistry::new()),
                dispatcher: Arc::new(RecordingDispatcher::new()),
                applier: Arc::new(RecordingApplier::new()),
                queues: Arc::new(MemoryQueues::new()),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn services(&self) -> Services {
            Services {
                registry: self.registry.clone(),
                dispatcher: self.dispatcher.clone(),
                pull_requests: Arc::new(RecordingPullRequests::new()),
                kubernetes: self.applier.clone(),
                queues: self.queues.clone(),
            }
        }

        fn chain(&self, yaml: &str, inputs: RunInputs) -> Result<Chain> {
            Chain::new(
                Config::parse(yaml)?,
                env("pr-42"),
                inputs,
                self.services(),
                StoreSettings::new(self.dir.path()),
                CancellationToken::new(),
            )
        }
    }

    fn env(name: &str) -> EnvParams {
        EnvParams {
            name: name.to_string(),
            app_name_template: String::new(),
            pull_request: Some(PullRequestParams {
                number: 42,
                head_sha: "abc123".to_string(),
                numbers: vec![42],
                repository: "org/app".to_string(),
            }),
        }
    }

    const WEBHOOK: &str = r#"
    outgoingWebhook:
      webhookURL: https://hooks.example.com/x
      channel: deploys
      username: prenv
"#;

    #[test]
    fn merge_groups_by_literal_target_in_first_seen_order() {
        let merged = merge_dispatches(&[
            (target("org", "b"), "svc-k8s".to_string()),
            (target("org", "a"), "svc-aws".to_string()),
            (target("org", "b"), "pr-argocdapp".to_string()),
            (target("org", "b.git"), "pr-render".to_string()),
        ]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].target, target("org", "b"));
        assert_eq!(merged[0].provisioner_names, vec!["svc-k8s", "pr-argocdapp"]);
        assert_eq!(merged[1].target, target("org", "a"));
        assert_eq!(merged[2].target, target("org", "b.git"));
    }

    #[test]
    fn names_follow_component_and_capability_order() {
        let f = Fixture::new();
        let yaml = format!(
            r#"
shared:
  namePrefix: svc-
  kubernetesResources:{WEBHOOK}
  awsResources:
    sourceQueueURL: src
    destinationQueueURL: dst
dedicated:
  render:
    files:
      - name: a.txt
        contentTemplate: "{{{{ name }}}}"
  components:
    worker:
      render:
        files:
          - name: b.txt
            contentTemplate: b
"#
        );
        let chain = f.chain(&yaml, RunInputs::default()).unwrap();
        assert_eq!(
            chain.provisioner_names().unwrap(),
            vec!["svc-k8s", "svc-aws", "pr-render", "pr-worker-render"]
        );
    }

    #[test]
    fn triggered_by_filters_provisioners() {
        let f = Fixture::new();
        let yaml = format!(
            r#"
shared:
  namePrefix: svc-
  kubernetesResources:{WEBHOOK}
  awsResources:
    sourceQueueURL: src
    destinationQueueURL: dst
"#
        );
        let inputs = RunInputs {
            action: String::new(),
            triggered_by: vec!["svc-aws".to_string()],
        };
        let chain = f.chain(&yaml, inputs).unwrap();
        assert_eq!(chain.provisioner_names().unwrap(), vec!["svc-aws"]);
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let f = Fixture::new();
        let err = f
            .chain("dedicated:\n  argocd: {}\n", RunInputs::default())
            .unwrap_err();
        assert!(matches!(err, PrenvError::Config(_)), "{err:?}");
    }

    #[test]
    fn malformed_git_repository_fails_at_construction() {
        let f = Fixture::new();
        let yaml = r#"
dedicated:
  render:
    gitOps:
      git:
        repo: not-a-repo
    files:
      - name: a.txt
        contentTemplate: a
"#;
        let err = f.chain(yaml, RunInputs::default()).unwrap_err();
        assert!(matches!(err, PrenvError::Config(_)), "{err:?}");
        assert!(err.to_string().contains("not-a-repo"));
    }

    #[test]
    fn args_are_filled_in() {
        let f = Fixture::new();
        let chain = f.chain("dedicated: {}\n", RunInputs::default()).unwrap();
        let args = chain.config().env_args.as_ref().unwrap();
        assert_eq!(args.name, "pr-42");
        assert_eq!(args.app_name_template, DEFAULT_APP_NAME_TEMPLATE);
    }

    #[tokio::test]
    async fn apply_registers_and_applies_locally() {
        let f = Fixture::new();
        let yaml = format!("dedicated:\n  kubernetesResources:{WEBHOOK}");
        let chain = f.chain(&yaml, RunInputs::default()).unwrap();

        let summary = chain.apply().await.unwrap();
        assert_eq!(summary.stages, vec![("pr-k8s".to_string(), Stage::Applied)]);
        assert!(summary.dispatches.is_empty());
        assert_eq!(f.applier.calls().len(), 1);
        assert_eq!(f.registry.list_names().await.unwrap(), vec!["pr-42"]);
    }

    #[tokio::test]
    async fn apply_twice_keeps_one_registration() {
        let f = Fixture::new();
        let chain = f.chain("dedicated: {}\n", RunInputs::default()).unwrap();
        chain.apply().await.unwrap();
        chain.apply().await.unwrap();
        assert_eq!(f.registry.list_names().await.unwrap(), vec!["pr-42"]);
    }

    #[tokio::test]
    async fn destroy_unregisters_after_success() {
        let f = Fixture::new();
        f.registry.add_name("pr-42").await.unwrap();
        f.registry.add_name("pr-7").await.unwrap();
        let chain = f.chain("dedicated: {}\n", RunInputs::default()).unwrap();

        chain.destroy().await.unwrap();
        assert_eq!(f.registry.list_names().await.unwrap(), vec!["pr-7"]);
    }

    #[tokio::test]
    async fn shared_forwarder_gets_one_destination_per_environment() {
        let mut f = Fixture::new();
        f.queues = Arc::new(MemoryQueues::with_existing(["src", "dst"]));
        f.registry.add_name("pr-7").await.unwrap();
        let src = MemoryQueues::url("src");
        let dst = MemoryQueues::url("dst");
        let yaml = format!(
            r#"
shared:
  namePrefix: svc-
  kubernetesResources:
    sqsForwarder: {{}}
  awsResources:
    sourceQueueURL: {src}
    destinationQueueURL: {dst}
    destinationQueuesCreate: true
"#
        );
        let chain = f.chain(&yaml, RunInputs::default()).unwrap();
        let summary = chain.apply().await.unwrap();

        assert_eq!(f.queues.created(), vec!["pr-7", "pr-42"]);
        let env_urls = [MemoryQueues::url("pr-7"), MemoryQueues::url("pr-42")];
        assert_eq!(
            summary.outputs["svc-aws"]["sqsDestinationQueueURLs"].value,
            serde_json::json!(env_urls)
        );

        let calls = f.applier.calls();
        let (_, manifest) = &calls[0].manifests[0];
        assert!(manifest.contains(&src));
        assert!(manifest.contains(&format!("{dst},{},{}", env_urls[0], env_urls[1])));
    }

    #[tokio::test]
    async fn dispatches_are_merged_per_target() {
        let f = Fixture::new();
        let yaml = format!(
            r#"
shared:
  namePrefix: svc-
  kubernetesResources:
    gitOps:
      repositoryDispatch: {{owner: org, repo: target}}{WEBHOOK}
  awsResources:
    gitOps:
      repositoryDispatch: {{owner: org, repo: target}}
    sourceQueueURL: src
    destinationQueueURL: dst
"#
        );
        let chain = f.chain(&yaml, RunInputs::default()).unwrap();
        let summary = chain.apply().await.unwrap();

        let sent = f.dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, "prenv-apply");
        assert_eq!(sent[0].payload.triggered_by, vec!["svc-k8s", "svc-aws"]);
        assert!(!sent[0].payload.raw_config.contains("repositoryDispatch"));
        assert!(sent[0].payload.raw_config.contains("args:"));
        assert_eq!(summary.dispatches.len(), 1);
        assert!(f.applier.calls().is_empty());
        assert!(f.queues.created().is_empty());
    }

    #[tokio::test]
    async fn failing_dispatch_fails_the_run() {
        let mut f = Fixture::new();
        f.dispatcher = Arc::new(RecordingDispatcher::failing());
        let yaml = format!(
            "dedicated:\n  kubernetesResources:\n    gitOps:\n      repositoryDispatch: {{owner: org, repo: target}}{WEBHOOK}"
        );
        let chain = f.chain(&yaml, RunInputs::default()).unwrap();
        assert!(matches!(chain.apply().await, Err(PrenvError::GitHub(_))));
    }

    #[tokio::test]
    async fn unknown_action_is_an_error() {
        let f = Fixture::new();
        let inputs = RunInputs {
            action: "opened".to_string(),
            triggered_by: Vec::new(),
        };
        let chain = f.chain("dedicated: {}\n", inputs).unwrap();
        let err = chain.action().await.unwrap_err();
        assert!(matches!(err, PrenvError::UnknownAction(a) if a == "opened"));
    }

    #[tokio::test]
    async fn cancelled_chain_stops_before_first_provisioner() {
        let f = Fixture::new();
        let cancel = CancellationToken::new();
        let yaml = format!("dedicated:\n  kubernetesResources:{WEBHOOK}");
        let chain = Chain::new(
            Config::parse(&yaml).unwrap(),
            env("pr-42"),
            RunInputs::default(),
            f.services(),
            StoreSettings::new(f.dir.path()),
            cancel.clone(),
        )
        .unwrap();
        cancel.cancel();

        assert!(matches!(chain.apply().await, Err(PrenvError::Cancelled)));
        assert!(f.applier.calls().is_empty());
    }
}
