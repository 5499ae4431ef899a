//! Environment registry kept as a YAML file in a git repository.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use prenv_state::{EnvironmentRegistry, RegistryError, RegistryResult, State};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::GitDelegate;
use crate::error::{PrenvError, Result};
use crate::provisioner::RenderResult;
use crate::store::{ConfigStore, GitStore, StoreFactory};

fn backend(err: PrenvError) -> RegistryError {
    RegistryError::Backend(err.to_string())
}

/// Every update is a commit pushed to the repository's base branch.
pub struct GitFileRegistry {
    store: Mutex<GitStore>,
    /// State file, relative to the repository root
    file: PathBuf,
}

impl GitFileRegistry {
    pub fn new(store: GitStore, file: impl Into<PathBuf>) -> Self {
        Self {
            store: Mutex::new(store),
            file: file.into(),
        }
    }

    /// Registry in `repo` (`owner/repo` or a clone URL) on the configured base branch.
    pub fn for_repository(
        stores: &StoreFactory,
        repo: &str,
        file: impl Into<PathBuf>,
    ) -> Result<Self> {
        let store = stores.git(&GitDelegate {
            repo: repo.to_string(),
            branch: None,
            path: None,
            push: true,
        })?;
        Ok(Self::new(store, file))
    }

    async fn read(dir: &Path, file: &Path) -> RegistryResult<State> {
        match tokio::fs::read_to_string(dir.join(file)).await {
            Ok(data) => State::from_yaml(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `change` to a fresh checkout and commit the result if it changed.
    async fn update(&self, subject: String, change: impl FnOnce(&mut State) -> bool) -> RegistryResult<()> {
        let mut store = self.store.lock().await;
        let dir = store.open().await.map_err(backend)?;
        let mut state = Self::read(&dir, &self.file).await?;
        if !change(&mut state) {
            debug!(file = %self.file.display(), "registry unchanged");
            return Ok(());
        }

        let path = dir.join(&self.file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, state.to_yaml()?).await?;

        let rendered = RenderResult {
            added_or_modified: vec![self.file.to_string_lossy().to_string()],
            deleted: Vec::new(),
        };
        store.stage(&rendered).await.map_err(backend)?;
        store
            .commit_changes(&subject, "n/a")
            .await
            .map_err(backend)?;
        info!(url = %store.url(), "{subject}");
        Ok(())
    }
}

#[async_trait]
impl EnvironmentRegistry for GitFileRegistry {
    async fn add_name(&self, name: &str) -> RegistryResult<()> {
        self.update(format!("Add environment name {name}"), |s| s.add(name))
            .await
    }

    async fn delete_name(&self, name: &str) -> RegistryResult<()> {
        self.update(format!("Delete environment name {name}"), |s| s.remove(name))
            .await
    }

    async fn list_names(&self) -> RegistryResult<Vec<String>> {
        let mut store = self.store.lock().await;
        let dir = store.open().await.map_err(backend)?;
        Ok(Self::read(&dir, &self.file).await?.environment_names)
    }
}
