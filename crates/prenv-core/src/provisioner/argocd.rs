//! ArgoCD `Application` per pull request environment.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::kubectl::KubernetesApplier;
use super::{Outputs, Provisioner, ProvisionerKind, RenderResult};
use crate::config::{ArgoCd, ArgoCdApp, EnvParams, DEFAULT_APP_NAME_TEMPLATE};
use crate::error::{PrenvError, Result};
use crate::template::{render_str, render_to_dir, RenderTemplate};

pub const ARGOCD_APP_TEMPLATE: &str = r#"apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: {{ name }}
  namespace: {{ namespace }}
spec:
  destination:
    namespace: {{ destinationNamespace }}-{{ environment.pullRequest.number }}
    server: {{ destinationServer }}
  project: default
  source:
    repoURL: {{ repoURL }}
    targetRevision: {{ targetRevision }}
    path: {{ path }}
    kustomize:
      namespace: {{ destinationNamespace }}-{{ environment.pullRequest.number }}
      images:
       - '{{ image }}:{{ environment.pullRequest.headSHA }}'
  syncPolicy:
    automated: {}
    syncOptions:
    - CreateNamespace=true
"#;

/// Data for [`ARGOCD_APP_TEMPLATE`] and the application name template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppParams {
    pub name: String,
    /// Child component key; empty for the top-level dedicated component
    pub short_name: String,
    #[serde(flatten)]
    pub app: ArgoCdApp,
    pub environment: EnvParams,
}

impl AppParams {
    pub fn new(app: ArgoCdApp, environment: EnvParams, short_name: &str) -> Result<Self> {
        environment.validate()?;

        let mut params = Self {
            name: String::new(),
            short_name: short_name.to_string(),
            app,
            environment,
        };
        let template = if params.environment.app_name_template.is_empty() {
            DEFAULT_APP_NAME_TEMPLATE
        } else {
            params.environment.app_name_template.as_str()
        };
        let name = render_str(template, &params)?;
        params.name = name.trim_end_matches('-').to_string();
        Ok(params)
    }

    fn template(&self) -> Result<RenderTemplate> {
        RenderTemplate::new(format!("{}.yaml", self.name), ARGOCD_APP_TEMPLATE, self)
    }
}

pub struct ArgoCdAppProvisioner {
    params: AppParams,
    applier: Arc<dyn KubernetesApplier>,
}

impl ArgoCdAppProvisioner {
    pub fn new(
        spec: &ArgoCd,
        env: &EnvParams,
        short_name: &str,
        applier: Arc<dyn KubernetesApplier>,
        at: &str,
    ) -> Result<Self> {
        let app = spec
            .app
            .clone()
            .ok_or_else(|| PrenvError::Config(format!("{at}: app is required")))?;
        let params = AppParams::new(app, env.clone(), short_name)
            .map_err(|e| PrenvError::Config(format!("{at}: invalid argocd app: {e}")))?;
        Ok(Self { params, applier })
    }

    pub fn params(&self) -> &AppParams {
        &self.params
    }
}

#[async_trait]
impl Provisioner for ArgoCdAppProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::ArgoCdApp
    }

    async fn render(&self, dir: &Path) -> Result<RenderResult> {
        Ok(RenderResult {
            added_or_modified: render_to_dir(dir, &[self.params.template()?])?,
            deleted: Vec::new(),
        })
    }

    async fn apply(&self, _rendered: &RenderResult) -> Result<Outputs> {
        self.applier.apply(&[self.params.template()?]).await?;
        info!(app = %self.params.name, "applied argocd application");
        Ok(Outputs::new())
    }

    async fn destroy(&self, _rendered: &RenderResult) -> Result<Outputs> {
        self.applier.delete(&[self.params.template()?]).await?;
        info!(app = %self.params.name, "deleted argocd application");
        Ok(Outputs::new())
    }
}
