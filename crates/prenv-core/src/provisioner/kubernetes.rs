//! The forwarder and webhook daemons as Kubernetes deployments.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::kubectl::KubernetesApplier;
use super::{Outputs, Provisioner, ProvisionerKind, RenderResult};
use crate::config::KubernetesResources;
use crate::error::Result;
use crate::template::{render_to_dir, RenderTemplate};

/// Namespace the daemons run in.
pub const DAEMON_NAMESPACE: &str = "prenv";

const DAEMON_COMMAND: &str = "prenv";

/// Optional Namespace, optional Secret, Deployment and optional Service for
/// one daemon.
pub const DEPLOYMENT_TEMPLATE: &str = r#"
{%- if createNamespace %}
apiVersion: v1
kind: Namespace
metadata:
  name: {{ namespace }}
---
{%- endif %}
{%- if secretEnv %}
apiVersion: v1
kind: Secret
metadata:
  name: {{ name }}
  namespace: {{ namespace }}
type: Opaque
data:
{%- for key, value in secretEnv %}
  {{ key }}: {{ value | b64enc }}
{%- endfor %}
---
{%- endif %}
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ name }}
  namespace: {{ namespace }}
spec:
{%- if replicas %}
  replicas: {{ replicas }}
{%- endif %}
  selector:
    matchLabels:
      app: {{ name }}
  template:
    metadata:
      labels:
        app: {{ name }}
    spec:
      containers:
      - name: {{ name }}
        image: {{ image }}
{%- if port %}
        ports:
        - containerPort: {{ port }}
{%- endif %}
        command:
        - {{ command }}
{%- if args %}
        args:
{%- for arg in args %}
        - {{ arg | json_encode() }}
{%- endfor %}
{%- endif %}
{%- if env or secretEnv %}
        env:
{%- for key, value in env %}
        - name: {{ key }}
          value: {{ value | json_encode() }}
{%- endfor %}
{%- for key, value in secretEnv %}
        - name: {{ key }}
          valueFrom:
            secretKeyRef:
              name: {{ name }}
              key: {{ key }}
{%- endfor %}
{%- endif %}
{%- if port %}
---
apiVersion: v1
kind: Service
metadata:
  name: {{ name }}
  namespace: {{ namespace }}
spec:
  selector:
    app: {{ name }}
  ports:
  - protocol: TCP
    port: {{ port }}
    targetPort: {{ port }}
{%- endif %}
"#;

/// Data for [`DEPLOYMENT_TEMPLATE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesApp {
    pub name: String,
    pub namespace: String,
    pub replicas: Option<u32>,
    pub command: String,
    pub image: String,
    pub args: Vec<String>,
    pub port: Option<u16>,
    pub env: BTreeMap<String, String>,
    pub secret_env: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateData<'a> {
    #[serde(flatten)]
    app: &'a KubernetesApp,
    create_namespace: bool,
}

impl KubernetesApp {
    /// The namespace is shared by every environment, so it is only ever
    /// part of an apply.
    fn template(&self, create_namespace: bool) -> Result<RenderTemplate> {
        let data = TemplateData {
            app: self,
            create_namespace,
        };
        RenderTemplate::new(format!("{}.yaml", self.name), DEPLOYMENT_TEMPLATE, &data)
    }
}

/// `daemon` for shared components, `<environment>-daemon` otherwise.
fn daemon_name(daemon: &str, environment: Option<&str>) -> String {
    match environment {
        Some(env) => format!("{env}-{daemon}"),
        None => daemon.to_string(),
    }
}

/// Deploys the daemons declared under `kubernetesResources`.
///
/// On destroy a shared deployment is re-applied rather than deleted: the
/// chain has already dropped the destroyed environment from the forwarder's
/// destinations, so applying again is how the forwarder gets reconfigured.
///
/// Dedicated deployments are named after their environment, so each pull
/// request gets its own and deleting one leaves the others alone.
pub struct KubernetesProvisioner {
    apps: Vec<KubernetesApp>,
    shared: bool,
    applier: Arc<dyn KubernetesApplier>,
}

impl KubernetesProvisioner {
    /// `environment` is `None` for the shared component. `at` locates the
    /// block in the config for error messages.
    pub fn new(
        spec: &KubernetesResources,
        environment: Option<&str>,
        applier: Arc<dyn KubernetesApplier>,
        at: &str,
    ) -> Result<Self> {
        let mut apps = Vec::new();

        if let Some(f) = &spec.sqs_forwarder {
            f.validate(&format!("{at}.sqsForwarder"))?;
            apps.push(KubernetesApp {
                name: daemon_name("sqs-forwarder", environment),
                namespace: DAEMON_NAMESPACE.to_string(),
                replicas: f.replicas,
                command: DAEMON_COMMAND.to_string(),
                image: spec.image().to_string(),
                args: vec![
                    "sqs-forwarder".to_string(),
                    "--source-queue-url".to_string(),
                    f.source_queue_url.clone(),
                    "--destination-queue-urls".to_string(),
                    f.destination_queue_urls.join(","),
                ],
                port: None,
                env: f.env.clone(),
                secret_env: f.secret_env.clone(),
            });
        }

        if let Some(w) = &spec.outgoing_webhook {
            apps.push(KubernetesApp {
                name: daemon_name("outgoing-webhook", environment),
                namespace: DAEMON_NAMESPACE.to_string(),
                replicas: w.replicas,
                command: DAEMON_COMMAND.to_string(),
                image: spec.image().to_string(),
                args: vec![
                    "outgoing-webhook".to_string(),
                    "--webhook-url".to_string(),
                    w.webhook_url.clone(),
                    "--channel".to_string(),
                    w.channel.clone(),
                    "--username".to_string(),
                    w.username.clone(),
                ],
                port: w.port,
                env: w.env.clone(),
                secret_env: w.secret_env.clone(),
            });
        }

        Ok(Self {
            apps,
            shared: environment.is_none(),
            applier,
        })
    }

    pub fn apps(&self) -> &[KubernetesApp] {
        &self.apps
    }

    fn templates(&self, create_namespace: bool) -> Result<Vec<RenderTemplate>> {
        self.apps
            .iter()
            .map(|app| app.template(create_namespace))
            .collect()
    }
}

#[async_trait]
impl Provisioner for KubernetesProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Kubernetes
    }

    async fn render(&self, dir: &Path) -> Result<RenderResult> {
        Ok(RenderResult {
            added_or_modified: render_to_dir(dir, &self.templates(true)?)?,
            deleted: Vec::new(),
        })
    }

    async fn apply(&self, _rendered: &RenderResult) -> Result<Outputs> {
        if self.apps.is_empty() {
            return Ok(Outputs::new());
        }
        self.applier.apply(&self.templates(true)?).await?;
        info!(count = self.apps.len(), "applied kubernetes resources");
        Ok(Outputs::new())
    }

    async fn destroy(&self, _rendered: &RenderResult) -> Result<Outputs> {
        if self.apps.is_empty() {
            return Ok(Outputs::new());
        }
        if self.shared {
            self.applier.apply(&self.templates(true)?).await?;
            info!("reconfigured shared kubernetes resources");
        } else {
            self.applier.delete(&self.templates(false)?).await?;
            info!(count = self.apps.len(), "deleted kubernetes resources");
        }
        Ok(Outputs::new())
    }
}
