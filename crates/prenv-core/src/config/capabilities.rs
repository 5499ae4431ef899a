//! Per-capability configuration blocks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{invalid, Delegate};
use crate::error::Result;

/// Image for the forwarder and webhook daemons when none is configured.
pub const DEFAULT_IMAGE: &str = "mumoshu/prenv:latest";

fn validate_delegate(git_ops: &Option<Delegate>, at: &str) -> Result<()> {
    match git_ops {
        Some(d) => d.validate(&format!("{at}.gitOps")),
        None => Ok(()),
    }
}

/// User-declared files rendered from templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenderSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ops: Option<Delegate>,
    #[serde(default)]
    pub files: Vec<RenderedFile>,
}

/// Exactly one of `name` and `nameTemplate` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenderedFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_template: Option<String>,
    #[serde(default)]
    pub content_template: String,
}

impl RenderSpec {
    pub(crate) fn validate(&self, at: &str) -> Result<()> {
        validate_delegate(&self.git_ops, at)?;
        for (i, f) in self.files.iter().enumerate() {
            let at = format!("{at}.files[{i}]");
            match (&f.name, &f.name_template) {
                (Some(_), Some(_)) => {
                    return Err(invalid(&at, "name and nameTemplate are mutually exclusive"))
                }
                (None, None) => return Err(invalid(&at, "either name or nameTemplate is required")),
                _ => {}
            }
            if f.content_template.is_empty() {
                return Err(invalid(&at, "contentTemplate is required"));
            }
        }
        Ok(())
    }
}

/// Daemons deployed to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KubernetesResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ops: Option<Delegate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqs_forwarder: Option<SqsForwarder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outgoing_webhook: Option<OutgoingWebhook>,
}

impl KubernetesResources {
    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    pub(crate) fn validate(&self, at: &str) -> Result<()> {
        validate_delegate(&self.git_ops, at)?;
        if let Some(w) = &self.outgoing_webhook {
            w.validate(&format!("{at}.outgoingWebhook"))?;
        }
        Ok(())
    }
}

/// Forwards messages from the shared source queue to per-environment queues.
///
/// When the same component also declares `awsResources`, the source and
/// destination queues are filled in from there at chain build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SqsForwarder {
    #[serde(rename = "sourceQueueURL", default, skip_serializing_if = "String::is_empty")]
    pub source_queue_url: String,
    #[serde(rename = "destinationQueueURLs", default, skip_serializing_if = "Vec::is_empty")]
    pub destination_queue_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

impl SqsForwarder {
    pub(crate) fn validate(&self, at: &str) -> Result<()> {
        if self.source_queue_url.is_empty() {
            return Err(invalid(at, "sourceQueueURL is required"));
        }
        if self.destination_queue_urls.is_empty() {
            return Err(invalid(at, "at least one destination queue is required"));
        }
        Ok(())
    }
}

/// Posts notifications about the environment to a chat webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutgoingWebhook {
    #[serde(rename = "webhookURL", default)]
    pub webhook_url: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

impl OutgoingWebhook {
    fn validate(&self, at: &str) -> Result<()> {
        if self.webhook_url.is_empty() {
            return Err(invalid(at, "webhookURL is required"));
        }
        if self.channel.is_empty() {
            return Err(invalid(at, "channel is required"));
        }
        if self.username.is_empty() {
            return Err(invalid(at, "username is required"));
        }
        Ok(())
    }
}

/// SQS queues backing the forwarder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AwsResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ops: Option<Delegate>,

    #[serde(rename = "sourceQueueURL", default)]
    pub source_queue_url: String,
    #[serde(default)]
    pub source_queue_create: bool,
    #[serde(default)]
    pub source_queue_delete: bool,

    #[serde(rename = "destinationQueueURL", default)]
    pub destination_queue_url: String,
    #[serde(default)]
    pub destination_queue_create: bool,
    #[serde(default)]
    pub destination_queue_delete: bool,

    /// Create one queue per active environment
    #[serde(default)]
    pub destination_queues_create: bool,
    /// Delete the queue of the environment being destroyed
    #[serde(default)]
    pub destination_queues_delete: bool,
}

impl AwsResources {
    pub(crate) fn validate(&self, at: &str) -> Result<()> {
        validate_delegate(&self.git_ops, at)?;
        if self.source_queue_url.is_empty() {
            return Err(invalid(at, "sourceQueueURL is required"));
        }
        if self.destination_queue_url.is_empty() {
            return Err(invalid(at, "destinationQueueURL is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArgoCd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ops: Option<Delegate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<ArgoCdApp>,
}

/// Fields of the generated ArgoCD `Application`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArgoCdApp {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub destination_namespace: String,
    #[serde(default)]
    pub destination_server: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "repoURL", default)]
    pub repo_url: String,
    #[serde(default)]
    pub target_revision: String,
    #[serde(default)]
    pub image: String,
}

impl ArgoCd {
    pub(crate) fn validate(&self, at: &str) -> Result<()> {
        validate_delegate(&self.git_ops, at)?;
        let Some(app) = &self.app else {
            return Err(invalid(at, "app is required"));
        };
        let required = [
            ("namespace", &app.namespace),
            ("destinationNamespace", &app.destination_namespace),
            ("destinationServer", &app.destination_server),
            ("path", &app.path),
            ("repoURL", &app.repo_url),
            ("targetRevision", &app.target_revision),
            ("image", &app.image),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(invalid(&format!("{at}.app"), &format!("{field} is required")));
            }
        }
        Ok(())
    }
}
