use std::path::Path;

use async_trait::async_trait;

use super::{Outputs, Provisioner, ProvisionerKind, RenderResult};
use crate::config::{EnvParams, RenderSpec};
use crate::error::Result;
use crate::template::{render_str, render_to_dir, RenderTemplate};

/// Renders user-declared files against the environment parameters.
/// There is nothing to apply; the files are only useful when delegated.
#[derive(Debug, Clone)]
pub struct RenderProvisioner {
    spec: RenderSpec,
    env: EnvParams,
}

impl RenderProvisioner {
    pub fn new(spec: RenderSpec, env: EnvParams) -> Self {
        Self { spec, env }
    }

    fn templates(&self) -> Result<Vec<RenderTemplate>> {
        self.spec
            .files
            .iter()
            .map(|f| {
                let name = match (&f.name, &f.name_template) {
                    (_, Some(t)) => render_str(t, &self.env)?,
                    (Some(n), None) => n.clone(),
                    (None, None) => String::new(),
                };
                RenderTemplate::new(name, f.content_template.clone(), &self.env)
            })
            .collect()
    }
}

#[async_trait]
impl Provisioner for RenderProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Render
    }

    async fn render(&self, dir: &Path) -> Result<RenderResult> {
        let added_or_modified = render_to_dir(dir, &self.templates()?)?;
        Ok(RenderResult {
            added_or_modified,
            deleted: Vec::new(),
        })
    }

    async fn apply(&self, _rendered: &RenderResult) -> Result<Outputs> {
        Ok(Outputs::new())
    }

    async fn destroy(&self, _rendered: &RenderResult) -> Result<Outputs> {
        Ok(Outputs::new())
    }
}
