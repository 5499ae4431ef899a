//! A provisioner together with its delegation policy.
//!
//! Each run moves through `Start → Dispatched` (hand off to another
//! repository), or `Start → Rendered` (render and commit through a store),
//! optionally followed by `Rendered → Applied` when nothing was delegated.

use std::path::PathBuf;

use tracing::{info, info_span, Instrument};

use crate::config::{Delegate, RepositoryDispatch};
use crate::error::Result;
use crate::provisioner::{Operation, Outputs, Provisioner, RenderResult};
use crate::store::{transact, StoreFactory};

pub const COMMIT_SUBJECT: &str = "automated commit";
pub const COMMIT_BODY: &str = "n/a";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Dispatched,
    Rendered,
    Applied,
}

/// What one provisioner run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionResult {
    pub stage: Stage,
    pub outputs: Outputs,
    /// Targets this provisioner asked to be dispatched to
    pub dispatches: Vec<RepositoryDispatch>,
}

impl ProvisionResult {
    fn at(stage: Stage) -> Self {
        Self {
            stage,
            outputs: Outputs::new(),
            dispatches: Vec::new(),
        }
    }
}

pub struct DelegatableProvisioner {
    name: String,
    delegate: Option<Delegate>,
    /// This run was started by a dispatch naming this provisioner
    triggered_via_dispatch: bool,
    provisioner: Box<dyn Provisioner>,
}

/// Render, then remove what was rendered so the store records deletions.
async fn render_for_removal(provisioner: &dyn Provisioner, dir: PathBuf) -> Result<RenderResult> {
    let rendered = provisioner.render(&dir).await?;
    for file in &rendered.added_or_modified {
        let path = dir.join(file);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(RenderResult {
        added_or_modified: Vec::new(),
        deleted: rendered.added_or_modified,
    })
}

async fn render_into(provisioner: &dyn Provisioner, dir: PathBuf) -> Result<RenderResult> {
    provisioner.render(&dir).await
}

impl DelegatableProvisioner {
    pub fn new(
        name: impl Into<String>,
        delegate: Option<Delegate>,
        provisioner: Box<dyn Provisioner>,
    ) -> Self {
        Self {
            name: name.into(),
            delegate,
            triggered_via_dispatch: false,
            provisioner,
        }
    }

    pub fn triggered_via_dispatch(mut self, triggered: bool) -> Self {
        self.triggered_via_dispatch = triggered;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_triggered_via_dispatch(&self) -> bool {
        self.triggered_via_dispatch
    }

    fn dispatch_target(&self) -> Option<&RepositoryDispatch> {
        self.delegate
            .as_ref()
            .and_then(|d| d.repository_dispatch.as_ref())
    }

    fn is_gitops(&self) -> bool {
        self.delegate.as_ref().is_some_and(Delegate::is_gitops)
    }

    fn removes_rendered_files(&self, op: Operation) -> bool {
        op == Operation::Destroy && self.delegate.as_ref().is_some_and(|d| d.git.is_some())
    }

    pub async fn run(&self, op: Operation, stores: &StoreFactory) -> Result<ProvisionResult> {
        let span = info_span!("provisioner", name = %self.name, %op);
        self.run_inner(op, stores).instrument(span).await
    }

    async fn run_inner(&self, op: Operation, stores: &StoreFactory) -> Result<ProvisionResult> {
        if let Some(target) = self.dispatch_target() {
            if !self.triggered_via_dispatch {
                info!(owner = %target.owner, repo = %target.repo, "delegating via repository dispatch");
                let mut result = ProvisionResult::at(Stage::Dispatched);
                result.dispatches.push(target.clone());
                return Ok(result);
            }
        }

        let mut store = stores.open(&self.name, self.delegate.as_ref())?;
        let provisioner = self.provisioner.as_ref();
        let rendered = if self.removes_rendered_files(op) {
            transact(store.as_mut(), stores.cancel_token(), |dir| {
                render_for_removal(provisioner, dir)
            })
            .await?
        } else {
            transact(store.as_mut(), stores.cancel_token(), |dir| {
                render_into(provisioner, dir)
            })
            .await?
        };
        store.commit(COMMIT_SUBJECT, COMMIT_BODY).await?;

        if self.is_gitops() {
            info!(
                files = rendered.added_or_modified.len(),
                deleted = rendered.deleted.len(),
                "committed for gitops delegation"
            );
            return Ok(ProvisionResult::at(Stage::Rendered));
        }

        let outputs = match op {
            Operation::Apply => self.provisioner.apply(&rendered).await?,
            Operation::Destroy => self.provisioner.destroy(&rendered).await?,
        };
        info!("{op} complete");

        Ok(ProvisionResult {
            stage: Stage::Applied,
            outputs,
            dispatches: Vec::new(),
        })
    }
}
