//! Per-run environment parameters.

use prenv_github::{Event, PullRequestLister, Repository};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::Config;
use crate::error::{PrenvError, Result};
use crate::template::render_str;

/// Name of an ArgoCD application when `appNameTemplate` is not given.
pub const DEFAULT_APP_NAME_TEMPLATE: &str =
    "{{ environment.name }}-{{ environment.pullRequest.number }}-{{ shortName }}";

/// Identity of the environment a run operates on. Templates see these
/// fields under their camelCase names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvParams {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestParams>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequestParams {
    #[serde(default)]
    pub number: u64,
    #[serde(rename = "headSHA", default, skip_serializing_if = "String::is_empty")]
    pub head_sha: String,
    /// Every open pull request of `repository`
    #[serde(rename = "pullRequestNumbers", default, skip_serializing_if = "Vec::is_empty")]
    pub numbers: Vec<u64>,
    /// `owner/repo` the run was originally triggered from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
}

impl EnvParams {
    /// Pull request details needed by provisioners that deploy a specific head.
    pub fn validate(&self) -> Result<()> {
        let Some(pr) = &self.pull_request else {
            return Err(PrenvError::Config(
                "pull request parameters are required".to_string(),
            ));
        };
        if pr.head_sha.is_empty() {
            return Err(PrenvError::Config(
                "head SHA is required. Set GITHUB_SHA".to_string(),
            ));
        }
        if pr.number == 0 {
            return Err(PrenvError::Config(
                "pull request number is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the GitHub Actions runtime tells us about the current run.
#[derive(Debug, Clone, Default)]
pub struct ActionsContext {
    pub event: Option<Event>,
    /// `GITHUB_SHA`
    pub sha: Option<String>,
    /// `GITHUB_REPOSITORY`
    pub repository: Option<String>,
}

/// Template used to derive the environment name.
pub fn default_name_template(config: &Config) -> String {
    match (&config.name_template, &config.name_prefix) {
        (Some(t), _) if !t.is_empty() => t.clone(),
        (_, Some(p)) if !p.is_empty() => "{{ namePrefix }}{{ pullRequest.number }}".to_string(),
        _ => "prenv-{{ pullRequest.number }}".to_string(),
    }
}

/// Work out the environment for this run.
///
/// Parameters carried in `args` (set by the dispatching run) win. Otherwise
/// they come from the Actions context, and the open pull requests of the
/// repository are listed through `lister`.
pub async fn resolve_env_params(
    config: &Config,
    actions: &ActionsContext,
    lister: &dyn PullRequestLister,
) -> Result<EnvParams> {
    if let Some(args) = &config.env_args {
        debug!(name = %args.name, "using environment parameters from config");
        return Ok(args.clone());
    }

    let repository = actions
        .repository
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| PrenvError::Config("repository is required".to_string()))?;
    let repo = Repository::parse(repository)?;

    let number = actions
        .event
        .as_ref()
        .and_then(Event::pull_request_number)
        .unwrap_or_default();

    let numbers = lister.list_open_numbers(&repo.owner, &repo.name).await?;

    let mut params = EnvParams {
        name: String::new(),
        app_name_template: String::new(),
        pull_request: Some(PullRequestParams {
            number,
            head_sha: actions.sha.clone().unwrap_or_default(),
            numbers,
            repository: repository.to_string(),
        }),
    };

    let mut data = serde_json::to_value(&params)?;
    if let Value::Object(map) = &mut data {
        map.insert(
            "namePrefix".to_string(),
            Value::String(config.name_prefix.clone().unwrap_or_default()),
        );
    }
    params.name = render_str(&default_name_template(config), &data)?;

    Ok(params)
}
