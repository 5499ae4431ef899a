//! Local YAML file backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::registry::{EnvironmentRegistry, RegistryResult};
use crate::state::State;

/// Default location of the state file, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "prenv.state.yaml";

/// Registry stored as a YAML file. A missing file is an empty registry.
#[derive(Debug)]
pub struct YamlFileRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl YamlFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> RegistryResult<State> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => State::from_yaml(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, state: &State) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, state.to_yaml()?).await?;
        Ok(())
    }
}

impl Default for YamlFileRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

#[async_trait]
impl EnvironmentRegistry for YamlFileRegistry {
    async fn add_name(&self, name: &str) -> RegistryResult<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        if state.add(name) {
            debug!(path = %self.path.display(), name, "registering environment");
            self.write(&state).await?;
        }
        Ok(())
    }

    async fn delete_name(&self, name: &str) -> RegistryResult<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        if state.remove(name) {
            debug!(path = %self.path.display(), name, "unregistering environment");
            self.write(&state).await?;
        }
        Ok(())
    }

    async fn list_names(&self) -> RegistryResult<Vec<String>> {
        Ok(self.read().await?.environment_names)
    }
}
