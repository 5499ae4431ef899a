//! Recording fakes for the GitHub traits (testing only)

use std::sync::Mutex;

use async_trait::async_trait;

use crate::actions::DispatchPayload;
use crate::client::{DispatchSender, NewPullRequest, PullRequestCreator, PullRequestLister};
use crate::error::GitHubError;
use crate::Result;

/// One recorded `repository_dispatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDispatch {
    pub owner: String,
    pub repo: String,
    pub event_type: String,
    pub payload: DispatchPayload,
}

/// Records every dispatch instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentDispatch>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose every send fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentDispatch> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DispatchSender for RecordingDispatcher {
    async fn send(
        &self,
        owner: &str,
        repo: &str,
        event_type: &str,
        payload: &DispatchPayload,
    ) -> Result<()> {
        if self.fail {
            return Err(GitHubError::Api {
                status: 500,
                body: "dispatch rejected".to_string(),
            });
        }
        self.sent.lock().unwrap().push(SentDispatch {
            owner: owner.to_string(),
            repo: repo.to_string(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Records created pull requests and serves a fixed list of open ones.
#[derive(Debug, Default)]
pub struct RecordingPullRequests {
    created: Mutex<Vec<NewPullRequest>>,
    open: Vec<u64>,
}

impl RecordingPullRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open(open: Vec<u64>) -> Self {
        Self {
            open,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<NewPullRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestCreator for RecordingPullRequests {
    async fn create(&self, request: &NewPullRequest) -> Result<u64> {
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(created.len() as u64)
    }
}

#[async_trait]
impl PullRequestLister for RecordingPullRequests {
    async fn list_open_numbers(&self, _owner: &str, _repo: &str) -> Result<Vec<u64>> {
        Ok(self.open.clone())
    }
}
