//! Error types for prenv-state

use thiserror::Error;

/// Errors that can occur while reading or updating the environment registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The state document could not be read or written
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The state document is not a valid YAML state
    #[error("invalid state document: {0}")]
    InvalidState(#[from] serde_yaml_ng::Error),

    /// A ConfigMap payload could not be encoded or decoded
    #[error("invalid ConfigMap payload: {0}")]
    InvalidConfigMap(#[from] serde_json::Error),

    /// An external command exited non-zero
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// Any other backend failure (used by backends living outside this crate)
    #[error("registry backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_names_the_command() {
        let err = RegistryError::Command {
            command: "kubectl get configmap prenv-state".to_string(),
            stderr: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("kubectl get configmap"));
        assert!(msg.contains("connection refused"));
    }
}
