//! GitHub REST client
//!
//! Three narrow capabilities, each behind its own trait so the orchestration
//! core can be tested with recording fakes:
//!
//! - [`DispatchSender`]: `POST /repos/{owner}/{repo}/dispatches`
//! - [`PullRequestCreator`]: `POST /repos/{owner}/{repo}/pulls`
//! - [`PullRequestLister`]: `GET /repos/{owner}/{repo}/pulls?state=open`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::actions::DispatchPayload;
use crate::error::GitHubError;
use crate::Result;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const DEFAULT_WEB_BASE_URL: &str = "https://github.com/";

/// Where GitHub lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    /// REST API base URL (overridable for tests and GitHub Enterprise)
    pub api_base_url: String,
    /// Base URL for git clone URLs of `owner/repo` references
    pub web_base_url: String,
    /// Token used for API calls and git pushes
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            web_base_url: DEFAULT_WEB_BASE_URL.to_string(),
            token: None,
        }
    }
}

impl GitHubConfig {
    /// Config for a specific API endpoint
    pub fn new(api_base_url: &str) -> Self {
        GitHubConfig {
            api_base_url: api_base_url.to_string(),
            ..Self::default()
        }
    }

    /// Set authentication token. Empty tokens are treated as absent.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        };
        self
    }

    /// Set the base URL used to build clone URLs
    pub fn with_web_base_url(mut self, url: &str) -> Self {
        self.web_base_url = url.to_string();
        self
    }
}

/// Request to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    #[serde(skip)]
    pub owner: String,
    #[serde(skip)]
    pub repo: String,
    pub title: String,
    /// Branch holding the changes
    pub head: String,
    /// Branch the changes should be merged into
    pub base: String,
    pub body: String,
}

/// Sends `repository_dispatch` events.
#[async_trait]
pub trait DispatchSender: Send + Sync {
    async fn send(
        &self,
        owner: &str,
        repo: &str,
        event_type: &str,
        payload: &DispatchPayload,
    ) -> Result<()>;
}

/// Opens pull requests.
#[async_trait]
pub trait PullRequestCreator: Send + Sync {
    /// Returns the number of the created pull request.
    async fn create(&self, request: &NewPullRequest) -> Result<u64>;
}

/// Lists open pull requests.
#[async_trait]
pub trait PullRequestLister: Send + Sync {
    async fn list_open_numbers(&self, owner: &str, repo: &str) -> Result<Vec<u64>>;
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    number: u64,
}

/// GitHub REST client
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("prenv/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GitHubClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .request(method, self.url(path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn require_token(&self, operation: &'static str, owner: &str, repo: &str) -> Result<()> {
        if self.config.token.is_none() {
            return Err(GitHubError::MissingToken {
                operation,
                owner: owner.to_string(),
                repo: repo.to_string(),
            });
        }
        Ok(())
    }
}

async fn api_error(response: reqwest::Response) -> GitHubError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GitHubError::Api { status, body }
}

#[async_trait]
impl DispatchSender for GitHubClient {
    async fn send(
        &self,
        owner: &str,
        repo: &str,
        event_type: &str,
        payload: &DispatchPayload,
    ) -> Result<()> {
        self.require_token("sending repository_dispatch", owner, repo)?;

        info!(owner, repo, event_type, triggered_by = ?payload.triggered_by, "sending repository_dispatch");

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{owner}/{repo}/dispatches"),
            )
            .json(&json!({
                "event_type": event_type,
                "client_payload": payload,
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            _ => Err(api_error(response).await),
        }
    }
}

#[async_trait]
impl PullRequestCreator for GitHubClient {
    async fn create(&self, request: &NewPullRequest) -> Result<u64> {
        self.require_token("creating a pull request", &request.owner, &request.repo)?;

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", request.owner, request.repo),
            )
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let created: PullRequestRef = response.json().await?;
        info!(
            owner = %request.owner,
            repo = %request.repo,
            number = created.number,
            head = %request.head,
            "opened pull request"
        );
        Ok(created.number)
    }
}

#[async_trait]
impl PullRequestLister for GitHubClient {
    async fn list_open_numbers(&self, owner: &str, repo: &str) -> Result<Vec<u64>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{owner}/{repo}/pulls?state=open&per_page=100"),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let prs: Vec<PullRequestRef> = response.json().await?;
        debug!(owner, repo, count = prs.len(), "listed open pull requests");
        Ok(prs.into_iter().map(|pr| pr.number).collect())
    }
}
