//! prenv-github: GitHub integration for prenv
//!
//! - REST client for repository dispatch, pull request creation and listing
//! - GitHub Actions event model (`GITHUB_EVENT_PATH`)
//! - repository reference parsing shared by the git stores

pub mod actions;
pub mod client;
pub mod error;
pub mod fakes;
pub mod repo;

pub use actions::{DispatchPayload, Event, EVENT_TYPE_APPLY, EVENT_TYPE_DESTROY};
pub use client::{
    DispatchSender, GitHubClient, GitHubConfig, NewPullRequest, PullRequestCreator,
    PullRequestLister,
};
pub use error::GitHubError;
pub use repo::{check_reference, clone_url, Repository};

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, GitHubError>;
