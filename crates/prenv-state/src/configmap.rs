//! Kubernetes ConfigMap backend.
//!
//! The state document is stored as YAML under one key of a ConfigMap and is
//! read and written by shelling out to `kubectl`. The invocation settings are
//! fixed at construction; nothing is resolved lazily.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{EnvironmentRegistry, RegistryResult};
use crate::state::State;

/// How to reach the ConfigMap holding the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubectlConfig {
    /// kubectl executable
    pub binary: String,
    pub namespace: String,
    /// ConfigMap name
    pub name: String,
    /// Data key holding the YAML document
    pub key: String,
    /// Optional kubeconfig context
    pub context: Option<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            namespace: "prenv".to_string(),
            name: "prenv-state".to_string(),
            key: "state".to_string(),
            context: None,
        }
    }
}

impl KubectlConfig {
    /// Default settings with a custom ConfigMap name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args.push("--namespace".to_string());
        args.push(self.namespace.clone());
        args
    }

    /// The ConfigMap manifest carrying `state`.
    pub fn manifest(&self, state: &State) -> RegistryResult<Value> {
        let mut data = serde_json::Map::new();
        data.insert(self.key.clone(), Value::String(state.to_yaml()?));
        Ok(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
            },
            "data": data,
        }))
    }

    /// Extract the state from `kubectl get configmap -o json` output.
    pub fn parse(&self, output: &str) -> RegistryResult<State> {
        let value: Value = serde_json::from_str(output)?;
        match value
            .get("data")
            .and_then(|d| d.get(&self.key))
            .and_then(Value::as_str)
        {
            Some(doc) => State::from_yaml(doc),
            None => Ok(State::default()),
        }
    }
}

/// Registry stored in a ConfigMap. A missing ConfigMap is an empty registry.
#[derive(Debug)]
pub struct ConfigMapRegistry {
    config: KubectlConfig,
    lock: Mutex<()>,
}

impl ConfigMapRegistry {
    pub fn new(config: KubectlConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &KubectlConfig {
        &self.config
    }

    async fn read(&self) -> RegistryResult<State> {
        let mut args = self.config.base_args();
        args.extend([
            "get".to_string(),
            "configmap".to_string(),
            self.config.name.clone(),
            "-o".to_string(),
            "json".to_string(),
        ]);

        let output = Command::new(&self.config.binary)
            .args(&args)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("NotFound") || stderr.contains("not found") {
                debug!(configmap = %self.config.name, "state configmap not found, treating as empty");
                return Ok(State::default());
            }
            return Err(RegistryError::Command {
                command: format!("{} {}", self.config.binary, args.join(" ")),
                stderr,
            });
        }

        self.config.parse(&String::from_utf8_lossy(&output.stdout))
    }

    async fn write(&self, state: &State) -> RegistryResult<()> {
        let manifest = serde_json::to_vec(&self.config.manifest(state)?)?;
        let mut args = self.config.base_args();
        args.extend(["apply".to_string(), "-f".to_string(), "-".to_string()]);

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&manifest).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RegistryError::Command {
                command: format!("{} {}", self.config.binary, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EnvironmentRegistry for ConfigMapRegistry {
    async fn add_name(&self, name: &str) -> RegistryResult<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        if state.add(name) {
            self.write(&state).await?;
        }
        Ok(())
    }

    async fn delete_name(&self, name: &str) -> RegistryResult<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        if state.remove(name) {
            self.write(&state).await?;
        }
        Ok(())
    }

    async fn list_names(&self) -> RegistryResult<Vec<String>> {
        Ok(self.read().await?.environment_names)
    }
}
