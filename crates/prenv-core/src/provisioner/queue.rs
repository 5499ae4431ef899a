//! SQS queue lifecycle through the AWS CLI.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PrenvError, Result};

#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Make sure the queue named or addressed by `name_or_url` exists and
    /// return its URL. A missing queue given by name is created only when
    /// `create` is set; a missing queue given by URL is always an error.
    async fn ensure_queue_created(&self, name_or_url: &str, create: bool) -> Result<String>;

    /// Delete the queue named `name_or_url` if it exists. Queues given by
    /// URL are never deleted.
    async fn ensure_queue_deleted(&self, name_or_url: &str) -> Result<()>;
}

pub(crate) fn is_queue_url(name_or_url: &str) -> bool {
    name_or_url.starts_with("https://")
}

fn is_missing_queue(stderr: &str) -> bool {
    stderr.contains("NonExistentQueue") || stderr.contains("QueueDoesNotExist")
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueUrlResponse {
    queue_url: String,
}

/// `aws sqs ...` invocations.
#[derive(Debug, Clone)]
pub struct AwsCliQueues {
    binary: String,
    region: Option<String>,
    profile: Option<String>,
}

impl Default for AwsCliQueues {
    fn default() -> Self {
        Self {
            binary: "aws".to_string(),
            region: None,
            profile: None,
        }
    }
}

impl AwsCliQueues {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self {
            region: region.filter(|r| !r.is_empty()),
            profile: profile.filter(|p| !p.is_empty()),
            ..Self::default()
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Run `aws sqs <args>`; `Ok(None)` when the queue does not exist.
    async fn sqs(&self, args: &[&str]) -> Result<Option<String>> {
        let mut cmd = Command::new(&self.binary);
        if let Some(region) = &self.region {
            cmd.args(["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile.as_str()]);
        }
        cmd.args(["--output", "json", "sqs"]).args(args);

        debug!(args = ?args, "running aws sqs");
        let output = cmd.output().await?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if is_missing_queue(&stderr) {
            return Ok(None);
        }
        Err(PrenvError::Command {
            command: format!("{} sqs {}", self.binary, args.join(" ")),
            stderr,
        })
    }

    async fn queue_url(&self, name: &str) -> Result<Option<String>> {
        match self.sqs(&["get-queue-url", "--queue-name", name]).await? {
            Some(out) => Ok(Some(serde_json::from_str::<QueueUrlResponse>(&out)?.queue_url)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueueAdapter for AwsCliQueues {
    async fn ensure_queue_created(&self, name_or_url: &str, create: bool) -> Result<String> {
        if name_or_url.is_empty() {
            return Err(PrenvError::Config(
                "queue name or URL must be specified".to_string(),
            ));
        }

        if is_queue_url(name_or_url) {
            let found = self
                .sqs(&[
                    "get-queue-attributes",
                    "--queue-url",
                    name_or_url,
                    "--attribute-names",
                    "QueueArn",
                ])
                .await?;
            return match found {
                Some(_) => Ok(name_or_url.to_string()),
                None => Err(PrenvError::Config(format!(
                    "queue {name_or_url} does not exist"
                ))),
            };
        }

        if let Some(url) = self.queue_url(name_or_url).await? {
            return Ok(url);
        }
        if !create {
            return Err(PrenvError::Config(format!(
                "queue {name_or_url} does not exist. Specify create=true if you want to create it"
            )));
        }

        let out = self
            .sqs(&["create-queue", "--queue-name", name_or_url])
            .await?
            .ok_or_else(|| {
                PrenvError::Config(format!("queue {name_or_url} could not be created"))
            })?;
        let url = serde_json::from_str::<QueueUrlResponse>(&out)?.queue_url;
        info!(queue = %url, "created queue");
        Ok(url)
    }

    async fn ensure_queue_deleted(&self, name_or_url: &str) -> Result<()> {
        if is_queue_url(name_or_url) {
            debug!(queue = name_or_url, "queue given by URL, leaving it in place");
            return Ok(());
        }
        let Some(url) = self.queue_url(name_or_url).await? else {
            return Ok(());
        };

        if self.sqs(&["delete-queue", "--queue-url", &url]).await?.is_some() {
            info!(queue = %url, "deleted queue");
        }
        Ok(())
    }
}

/// In-memory queues (testing only)
pub mod fakes {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;

    pub const FAKE_QUEUE_BASE_URL: &str = "https://sqs.us-east-1.amazonaws.com/000000000000/";

    #[derive(Debug, Default)]
    struct Queues {
        existing: BTreeSet<String>,
        created: Vec<String>,
        deleted: Vec<String>,
    }

    /// Queues are tracked by name; URLs resolve to their last path segment.
    #[derive(Debug, Default)]
    pub struct MemoryQueues {
        inner: Mutex<Queues>,
    }

    fn queue_name(name_or_url: &str) -> &str {
        name_or_url.rsplit('/').next().unwrap_or(name_or_url)
    }

    impl MemoryQueues {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_existing<I, S>(names: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let q = Self::default();
            q.inner
                .lock()
                .unwrap()
                .existing
                .extend(names.into_iter().map(Into::into));
            q
        }

        pub fn url(name: &str) -> String {
            format!("{FAKE_QUEUE_BASE_URL}{name}")
        }

        pub fn existing(&self) -> Vec<String> {
            self.inner.lock().unwrap().existing.iter().cloned().collect()
        }

        pub fn created(&self) -> Vec<String> {
            self.inner.lock().unwrap().created.clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.inner.lock().unwrap().deleted.clone()
        }
    }

    #[async_trait]
    impl QueueAdapter for MemoryQueues {
        async fn ensure_queue_created(&self, name_or_url: &str, create: bool) -> Result<String> {
            let name = queue_name(name_or_url).to_string();
            let mut q = self.inner.lock().unwrap();
            if q.existing.contains(&name) {
                return Ok(Self::url(&name));
            }
            if is_queue_url(name_or_url) || !create {
                return Err(PrenvError::Config(format!(
                    "queue {name_or_url} does not exist"
                )));
            }
            q.existing.insert(name.clone());
            q.created.push(name.clone());
            Ok(Self::url(&name))
        }

        async fn ensure_queue_deleted(&self, name_or_url: &str) -> Result<()> {
            if is_queue_url(name_or_url) {
                return Ok(());
            }
            let name = queue_name(name_or_url).to_string();
            let mut q = self.inner.lock().unwrap();
            if q.existing.remove(&name) {
                q.deleted.push(name);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::MemoryQueues;
    use super::*;

    #[test]
    fn missing_queue_markers() {
        assert!(is_missing_queue(
            "An error occurred (AWS.SimpleQueueService.NonExistentQueue) when calling the GetQueueUrl operation"
        ));
        assert!(is_missing_queue("QueueDoesNotExist"));
        assert!(!is_missing_queue("AccessDenied"));
    }

    #[test]
    fn parses_queue_url_response() {
        let r: QueueUrlResponse =
            serde_json::from_str(r#"{"QueueUrl": "https://sqs.example/1/q"}"#).unwrap();
        assert_eq!(r.queue_url, "https://sqs.example/1/q");
    }

    #[tokio::test]
    async fn memory_queues_honour_create_flag() {
        let q = MemoryQueues::new();
        assert!(q.ensure_queue_created("pr-1", false).await.is_err());
        let url = q.ensure_queue_created("pr-1", true).await.unwrap();
        assert_eq!(url, MemoryQueues::url("pr-1"));
        assert_eq!(q.created(), vec!["pr-1"]);

        q.ensure_queue_deleted("pr-1").await.unwrap();
        q.ensure_queue_deleted("pr-1").await.unwrap();
        assert_eq!(q.deleted(), vec!["pr-1"]);
    }

    #[tokio::test]
    async fn queues_given_by_url_are_never_deleted() {
        let q = MemoryQueues::with_existing(["shared"]);
        q.ensure_queue_deleted(&MemoryQueues::url("shared")).await.unwrap();
        assert!(q.deleted().is_empty());
        assert_eq!(q.existing(), vec!["shared"]);

        // returns before spawning anything
        AwsCliQueues::default()
            .with_binary("/nonexistent/prenv-aws")
            .ensure_queue_deleted("https://sqs.us-east-1.amazonaws.com/000000000000/shared")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let err = AwsCliQueues::default()
            .ensure_queue_created("", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PrenvError::Config(_)));
    }
}
