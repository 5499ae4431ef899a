use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::ConfigStore;
use crate::error::Result;
use crate::provisioner::RenderResult;

/// A persistent directory keyed by provisioner name.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(work_dir: &Path, id: &str) -> Self {
        Self {
            dir: work_dir.join(".prenv").join(id),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ConfigStore for LocalStore {
    async fn open(&mut self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(self.dir.clone())
    }

    async fn stage(&mut self, _rendered: &RenderResult) -> Result<()> {
        Ok(())
    }

    async fn commit(&mut self, subject: &str, _body: &str) -> Result<()> {
        debug!(dir = %self.dir.display(), subject, "local store has nothing to commit");
        Ok(())
    }
}
