//! Applying manifests to a cluster.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{PrenvError, Result};
use crate::template::{render_to_temp_dir, RenderTemplate};

#[async_trait]
pub trait KubernetesApplier: Send + Sync {
    async fn apply(&self, manifests: &[RenderTemplate]) -> Result<()>;
    async fn delete(&self, manifests: &[RenderTemplate]) -> Result<()>;
}

/// Renders manifests into a temporary directory and runs
/// `kubectl apply|delete -f <dir>` on it.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    context: Option<String>,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            context: None,
        }
    }
}

impl Kubectl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context.filter(|c| !c.is_empty());
        self
    }

    async fn run(&self, verb: &str, dir: &Path) -> Result<()> {
        let mut args = Vec::new();
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args.push(verb.to_string());
        args.push("-f".to_string());
        args.push(dir.display().to_string());

        debug!(command = %format!("{} {}", self.binary, args.join(" ")), "running");
        let output = Command::new(&self.binary).args(&args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("error validating data") {
                log_invalid_manifest(&stderr).await;
            }
            return Err(PrenvError::Command {
                command: format!("{} {verb}", self.binary),
                stderr,
            });
        }

        debug!(
            stdout = %String::from_utf8_lossy(&output.stdout),
            "{} {verb} succeeded",
            self.binary
        );
        Ok(())
    }
}

/// Name of the file kubectl complained about, from `error validating "<file>"`.
fn invalid_manifest_path(stderr: &str) -> Option<&str> {
    let marker = "error validating \"";
    let start = stderr.find(marker)? + marker.len();
    let len = stderr[start..].find('"')?;
    Some(&stderr[start..start + len])
}

async fn log_invalid_manifest(stderr: &str) {
    let Some(path) = invalid_manifest_path(stderr) else {
        return;
    };
    match tokio::fs::read_to_string(path).await {
        Ok(content) => info!(
            file = path,
            %content,
            "manifest failed validation; check the config for a missing or invalid field"
        ),
        Err(e) => warn!(file = path, error = %e, "unable to read manifest that failed validation"),
    }
}

#[async_trait]
impl KubernetesApplier for Kubectl {
    async fn apply(&self, manifests: &[RenderTemplate]) -> Result<()> {
        let dir = render_to_temp_dir(manifests)?;
        self.run("apply", dir.path()).await
    }

    async fn delete(&self, manifests: &[RenderTemplate]) -> Result<()> {
        let dir = render_to_temp_dir(manifests)?;
        self.run("delete", dir.path()).await
    }
}

/// Recording applier (testing only)
pub mod fakes {
    use std::sync::Mutex;

    use super::*;

    /// One recorded call: the verb and each manifest as rendered.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct KubectlCall {
        pub verb: &'static str,
        pub manifests: Vec<(String, String)>,
    }

    #[derive(Debug, Default)]
    pub struct RecordingApplier {
        calls: Mutex<Vec<KubectlCall>>,
    }

    impl RecordingApplier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<KubectlCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, verb: &'static str, manifests: &[RenderTemplate]) -> Result<()> {
            let manifests = manifests
                .iter()
                .map(|t| Ok((t.name.clone(), t.execute()?)))
                .collect::<Result<Vec<_>>>()?;
            self.calls.lock().unwrap().push(KubectlCall { verb, manifests });
            Ok(())
        }
    }

    #[async_trait]
    impl KubernetesApplier for RecordingApplier {
        async fn apply(&self, manifests: &[RenderTemplate]) -> Result<()> {
            self.record("apply", manifests)
        }

        async fn delete(&self, manifests: &[RenderTemplate]) -> Result<()> {
            self.record("delete", manifests)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_invalid_manifest_path() {
        let stderr = r#"error: error validating "/tmp/prenvrender123/sqs-forwarder.yaml": error validating data: unknown field"#;
        assert_eq!(
            invalid_manifest_path(stderr),
            Some("/tmp/prenvrender123/sqs-forwarder.yaml")
        );
        assert_eq!(invalid_manifest_path("boom"), None);
    }

    #[tokio::test]
    async fn failing_binary_reports_command_error() {
        let kubectl = Kubectl::new("false");
        let manifests = vec![RenderTemplate::new("a.yaml", "a: 1", &serde_json::json!({})).unwrap()];
        let err = kubectl.apply(&manifests).await.unwrap_err();
        assert!(matches!(err, PrenvError::Command { .. }));
    }
}
