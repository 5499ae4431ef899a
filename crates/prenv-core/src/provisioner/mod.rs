//! Provisioners turn one capability of a component into rendered files and,
//! when not delegated, into applied infrastructure.

mod argocd;
mod aws;
mod kubectl;
mod kubernetes;
mod queue;
mod render;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use prenv_github::{EVENT_TYPE_APPLY, EVENT_TYPE_DESTROY};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub use argocd::{AppParams, ArgoCdAppProvisioner, ARGOCD_APP_TEMPLATE};
pub use aws::{derive_queue, AwsProvisioner, TFVARS_FILE};
pub use kubectl::{fakes as kubectl_fakes, Kubectl, KubernetesApplier};
pub use kubernetes::{
    KubernetesApp, KubernetesProvisioner, DAEMON_NAMESPACE, DEPLOYMENT_TEMPLATE,
};
pub use queue::{fakes as queue_fakes, AwsCliQueues, QueueAdapter};
pub use render::RenderProvisioner;

/// Files a render touched, relative to the render directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub added_or_modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl RenderResult {
    pub fn is_empty(&self) -> bool {
        self.added_or_modified.is_empty() && self.deleted.is_empty()
    }
}

/// A value a provisioner publishes after apply, e.g. a queue URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

pub type Outputs = BTreeMap<String, Output>;

/// The capabilities a component can declare, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionerKind {
    Render,
    Kubernetes,
    Aws,
    ArgoCdApp,
}

impl ProvisionerKind {
    pub const ALL: [ProvisionerKind; 4] = [
        ProvisionerKind::Render,
        ProvisionerKind::Kubernetes,
        ProvisionerKind::Aws,
        ProvisionerKind::ArgoCdApp,
    ];

    /// Suffix of provisioner names, e.g. `svc-k8s`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerKind::Render => "render",
            ProvisionerKind::Kubernetes => "k8s",
            ProvisionerKind::Aws => "aws",
            ProvisionerKind::ArgoCdApp => "argocdapp",
        }
    }
}

impl fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a run creates or tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Apply,
    Destroy,
}

impl Operation {
    /// `repository_dispatch` event type that asks the target to do the same.
    pub fn event_type(&self) -> &'static str {
        match self {
            Operation::Apply => EVENT_TYPE_APPLY,
            Operation::Destroy => EVENT_TYPE_DESTROY,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Apply => f.write_str("apply"),
            Operation::Destroy => f.write_str("destroy"),
        }
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    fn kind(&self) -> ProvisionerKind;

    /// Write this provisioner's files under `dir`.
    async fn render(&self, dir: &Path) -> Result<RenderResult>;

    /// Create or update the infrastructure directly.
    async fn apply(&self, rendered: &RenderResult) -> Result<Outputs>;

    /// Tear the infrastructure down (or reconfigure shared pieces).
    async fn destroy(&self, rendered: &RenderResult) -> Result<Outputs>;
}
