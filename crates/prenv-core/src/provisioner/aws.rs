use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::queue::{is_queue_url, QueueAdapter};
use super::{Output, Outputs, Provisioner, ProvisionerKind, RenderResult};
use crate::config::AwsResources;
use crate::error::Result;

/// Terraform variables file written when the capability is delegated.
pub const TFVARS_FILE: &str = "awsresources.auto.tfvars.json";

/// URL the forwarder uses for the queue of environment `env`.
///
/// Environment queues are created by name next to the shared destination
/// queue, so for a destination URL the last path segment is replaced by the
/// environment name. For a bare destination name the environment name is
/// returned as is.
pub fn derive_queue(destination: &str, env: &str) -> String {
    if is_queue_url(destination) {
        match destination.trim_end_matches('/').rsplit_once('/') {
            Some((base, _)) => format!("{base}/{env}"),
            None => env.to_string(),
        }
    } else {
        env.to_string()
    }
}

#[derive(Serialize)]
struct TfVars<'a> {
    sqs_source_queue_url: &'a str,
    sqs_source_queue_create: bool,
    sqs_destination_queue_url: &'a str,
    sqs_destination_queue_create: bool,
    sqs_destination_queues: Vec<String>,
    sqs_destination_queues_create: bool,
}

/// Source, destination and per-environment SQS queues.
pub struct AwsProvisioner {
    spec: AwsResources,
    /// Environments that should have a queue
    environments: Vec<String>,
    /// Environment being destroyed, if any
    retiring: Option<String>,
    queues: Arc<dyn QueueAdapter>,
}

impl AwsProvisioner {
    pub fn new(
        spec: AwsResources,
        environments: Vec<String>,
        retiring: Option<String>,
        queues: Arc<dyn QueueAdapter>,
    ) -> Self {
        Self {
            spec,
            environments,
            retiring,
            queues,
        }
    }

    /// Per-environment queues are always addressed by name so they can be
    /// created and deleted.
    fn environment_queues(&self) -> Vec<String> {
        self.environments.clone()
    }
}

#[async_trait]
impl Provisioner for AwsProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Aws
    }

    async fn render(&self, dir: &Path) -> Result<RenderResult> {
        let vars = TfVars {
            sqs_source_queue_url: &self.spec.source_queue_url,
            sqs_source_queue_create: self.spec.source_queue_create,
            sqs_destination_queue_url: &self.spec.destination_queue_url,
            sqs_destination_queue_create: self.spec.destination_queue_create,
            sqs_destination_queues: self.environment_queues(),
            sqs_destination_queues_create: self.spec.destination_queues_create,
        };
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(TFVARS_FILE), serde_json::to_vec_pretty(&vars)?).await?;
        Ok(RenderResult {
            added_or_modified: vec![TFVARS_FILE.to_string()],
            deleted: Vec::new(),
        })
    }

    async fn apply(&self, _rendered: &RenderResult) -> Result<Outputs> {
        let source = self
            .queues
            .ensure_queue_created(&self.spec.source_queue_url, self.spec.source_queue_create)
            .await?;
        let destination = self
            .queues
            .ensure_queue_created(
                &self.spec.destination_queue_url,
                self.spec.destination_queue_create,
            )
            .await?;

        let mut destinations = Vec::with_capacity(self.environments.len());
        for queue in self.environment_queues() {
            destinations.push(
                self.queues
                    .ensure_queue_created(&queue, self.spec.destination_queues_create)
                    .await?,
            );
        }

        info!(
            source = %source,
            destination = %destination,
            environments = destinations.len(),
            "sqs queues ready"
        );

        let mut outputs = Outputs::new();
        outputs.insert(
            "sqsSourceQueueURL".to_string(),
            Output {
                kind: "sqsQueue".to_string(),
                value: json!(source),
            },
        );
        outputs.insert(
            "sqsDestinationQueueURL".to_string(),
            Output {
                kind: "sqsQueue".to_string(),
                value: json!(destination),
            },
        );
        outputs.insert(
            "sqsDestinationQueueURLs".to_string(),
            Output {
                kind: "[]sqsQueue".to_string(),
                value: json!(destinations),
            },
        );
        Ok(outputs)
    }

    async fn destroy(&self, _rendered: &RenderResult) -> Result<Outputs> {
        if self.spec.source_queue_delete {
            self.queues
                .ensure_queue_deleted(&self.spec.source_queue_url)
                .await?;
        }
        if self.spec.destination_queue_delete {
            self.queues
                .ensure_queue_deleted(&self.spec.destination_queue_url)
                .await?;
        }
        if self.spec.destination_queues_delete {
            if let Some(env) = &self.retiring {
                self.queues.ensure_queue_deleted(env).await?;
                info!(queue = %env, "deleted environment queue");
            }
        }
        Ok(Outputs::new())
    }
}
