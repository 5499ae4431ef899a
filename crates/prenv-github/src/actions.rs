//! GitHub Actions event payloads.
//!
//! A prenv run is started either by a `pull_request` event (source
//! repository) or by a `workflow_dispatch` / `repository_dispatch` event sent
//! by another prenv run (target repository). The latter carry a
//! [`DispatchPayload`] in `inputs` or `client_payload` respectively.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::GitHubError;
use crate::Result;

/// `repository_dispatch` event type asking the target to apply.
pub const EVENT_TYPE_APPLY: &str = "prenv-apply";
/// `repository_dispatch` event type asking the target to destroy.
pub const EVENT_TYPE_DESTROY: &str = "prenv-destroy";

/// What one prenv run hands to the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// The whole configuration, YAML-serialized
    #[serde(default)]
    pub raw_config: String,
    /// Names of the provisioners the receiving run should execute
    #[serde(default, deserialize_with = "list_or_csv")]
    pub triggered_by: Vec<String>,
}

/// `workflow_dispatch` inputs are always strings, so `triggered_by` may arrive
/// either as a JSON list or as a comma-separated string.
fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
        Null(()),
    }

    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(v) => v,
        ListOrCsv::Csv(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        ListOrCsv::Null(()) => Vec::new(),
    })
}

/// The subset of an Actions event payload prenv reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    /// For `repository_dispatch` this is the event type, e.g. `prenv-apply`
    #[serde(default)]
    pub action: String,
    /// `workflow_dispatch` inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    /// `repository_dispatch` client payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<Value>,
}

impl Event {
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Read the event file GitHub Actions points `GITHUB_EVENT_PATH` at.
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            GitHubError::InvalidEvent(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            GitHubError::InvalidEvent(format!("failed to unmarshal {}: {e}", path.display()))
        })
    }

    /// The pull request number of a `pull_request` event.
    pub fn pull_request_number(&self) -> Option<u64> {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.get("number"))
            .and_then(Value::as_u64)
    }

    /// Payload from `workflow_dispatch` inputs, if any.
    pub fn inputs(&self) -> Result<Option<DispatchPayload>> {
        decode_section(self.inputs.as_ref())
    }

    /// Payload from `repository_dispatch` client payload, if any.
    pub fn client_payload(&self) -> Result<Option<DispatchPayload>> {
        decode_section(self.client_payload.as_ref())
    }

    /// Payload from whichever dispatch section carries one, inputs first.
    pub fn dispatch_payload(&self) -> Result<Option<DispatchPayload>> {
        match self.inputs()? {
            Some(p) => Ok(Some(p)),
            None => self.client_payload(),
        }
    }
}

fn decode_section(section: Option<&Value>) -> Result<Option<DispatchPayload>> {
    match section {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
    }
}
