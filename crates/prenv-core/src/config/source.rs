//! Locating the configuration document for a run.

use std::path::Path;

use prenv_github::{DispatchPayload, Event};
use tracing::info;

use super::Config;
use crate::error::{PrenvError, Result};

pub const CONFIG_FILE_NAME: &str = "prenv.yaml";

/// Where the configuration of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// `PRENV_RAW_CONFIG`
    Environment,
    /// `workflow_dispatch` inputs
    WorkflowInputs,
    /// `repository_dispatch` client payload
    ClientPayload,
    File,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
    /// Provisioner names the dispatching run asked this run to execute
    pub triggered_by: Vec<String>,
    /// The event action, empty outside of GitHub Actions
    pub action: String,
}

fn from_payload(payload: DispatchPayload, section: &str) -> Result<(Config, Vec<String>)> {
    if payload.raw_config.is_empty() {
        return Err(PrenvError::Config(format!(
            "missing required input raw_config in {section}"
        )));
    }
    Ok((Config::parse(&payload.raw_config)?, payload.triggered_by))
}

/// Load configuration with precedence: `raw_config` (from the environment),
/// event inputs, event client payload, then the file at `path`.
pub async fn load_config(
    raw_config: Option<&str>,
    event: Option<&Event>,
    path: &Path,
) -> Result<LoadedConfig> {
    let action = event.map(|e| e.action.clone()).unwrap_or_default();

    let (config, source, triggered_by) = match raw_config.filter(|r| !r.is_empty()) {
        Some(raw) => (Config::parse(raw)?, ConfigSource::Environment, Vec::new()),
        None => {
            let inputs = event.map(Event::inputs).transpose()?.flatten();
            let payload = event.map(Event::client_payload).transpose()?.flatten();
            if let Some(p) = inputs {
                let (c, t) = from_payload(p, "workflow_dispatch inputs")?;
                (c, ConfigSource::WorkflowInputs, t)
            } else if let Some(p) = payload {
                let (c, t) = from_payload(p, "repository_dispatch client payload")?;
                (c, ConfigSource::ClientPayload, t)
            } else {
                let data = tokio::fs::read_to_string(path).await.map_err(|e| {
                    PrenvError::Config(format!(
                        "unable to open config file {}: {e}",
                        path.display()
                    ))
                })?;
                (Config::parse(&data)?, ConfigSource::File, Vec::new())
            }
        }
    };

    info!(source = ?source, triggered_by = ?triggered_by, "loaded config");

    Ok(LoadedConfig {
        config,
        source,
        triggered_by,
        action,
    })
}
