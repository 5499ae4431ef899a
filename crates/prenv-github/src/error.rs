//! Error types for prenv-github

use thiserror::Error;

/// Errors that can occur while talking to GitHub or reading Actions events
#[derive(Error, Debug)]
pub enum GitHubError {
    /// No token configured for an operation that needs one
    #[error("missing required GitHub token for {operation} to {owner}/{repo}")]
    MissingToken {
        operation: &'static str,
        owner: String,
        repo: String,
    },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// GitHub answered with an unexpected status
    #[error("GitHub API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// A repository reference that is neither owner/repo, host/owner/repo nor a URL
    #[error("invalid repository reference: {0}")]
    InvalidRepository(String),

    /// The Actions event payload is missing or lacks a required section
    #[error("invalid GitHub Actions event: {0}")]
    InvalidEvent(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Http(err.to_string())
    }
}
