//! The registry document shared by every backend.

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Registered environment names, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default)]
    pub environment_names: Vec<String>,
}

impl State {
    /// Parse a YAML document. Empty input is an empty state.
    pub fn from_yaml(data: &str) -> Result<Self, RegistryError> {
        if data.trim().is_empty() {
            return Ok(State::default());
        }
        Ok(serde_yaml_ng::from_str(data)?)
    }

    pub fn to_yaml(&self) -> Result<String, RegistryError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Add a name. Returns false when it was already registered.
    pub fn add(&mut self, name: &str) -> bool {
        if self.environment_names.iter().any(|n| n == name) {
            return false;
        }
        self.environment_names.push(name.to_string());
        true
    }

    /// Remove a name. Returns false when it was not registered.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.environment_names.len();
        self.environment_names.retain(|n| n != name);
        before != self.environment_names.len()
    }
}
