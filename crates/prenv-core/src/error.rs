//! Error types for prenv-core

use prenv_github::GitHubError;
use prenv_state::RegistryError;
use thiserror::Error;

/// Errors that can occur while building or running a provisioner chain
#[derive(Error, Debug)]
pub enum PrenvError {
    /// Missing required field, mutually exclusive fields, invalid delegate
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration document could not be decoded
    #[error("unable to decode yaml: {0}")]
    ConfigParse(#[from] serde_yaml_ng::Error),

    /// A template failed to parse or render
    #[error("template error: {0}")]
    Template(String),

    /// A git invocation failed
    #[error("git error: {0}")]
    Git(String),

    /// An external command (kubectl, aws) exited non-zero
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// Post-render checks failed; signals a provisioner bug or bad template
    #[error("verification failed: {0}")]
    Verification(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tera::Error> for PrenvError {
    fn from(err: tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut msg = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = cause.source();
        }
        PrenvError::Template(msg)
    }
}

/// Result type for prenv-core operations
pub type Result<T> = std::result::Result<T, PrenvError>;
