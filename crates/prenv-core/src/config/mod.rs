//! Declarative configuration (`prenv.yaml`).
//!
//! The same document travels between runs: a source-repository run serializes
//! it into a dispatch payload and the target-repository run decodes it again,
//! so decoding is strict and serialization uses the same camelCase keys.

mod capabilities;
mod env;
mod source;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PrenvError, Result};

pub use capabilities::{
    ArgoCd, ArgoCdApp, AwsResources, KubernetesResources, OutgoingWebhook, RenderSpec,
    RenderedFile, SqsForwarder, DEFAULT_IMAGE,
};
pub use env::{
    default_name_template, resolve_env_params, ActionsContext, EnvParams, PullRequestParams,
    DEFAULT_APP_NAME_TEMPLATE,
};
pub use source::{load_config, ConfigSource, LoadedConfig, CONFIG_FILE_NAME};

/// Root of `prenv.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Template for the environment name; see [`default_name_template`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    /// Infrastructure shared by every pull request environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<Component>,

    /// Infrastructure created per pull request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedicated: Option<Component>,

    /// Resolved environment parameters, filled in before dispatching so the
    /// receiving run needs no GitHub context of its own
    #[serde(rename = "args", skip_serializing_if = "Option::is_none")]
    pub env_args: Option<EnvParams>,
}

/// A deployable unit. Each declared capability yields one provisioner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Component {
    /// Prefix for the names of this component's provisioners
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_resources: Option<KubernetesResources>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_resources: Option<AwsResources>,

    #[serde(rename = "argocd", skip_serializing_if = "Option::is_none")]
    pub argo_cd: Option<ArgoCd>,

    /// Child services; only meaningful under `dedicated`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, Component>,
}

/// Where a capability's work goes instead of being applied locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Delegate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitDelegate>,

    /// Push to a feature branch and open a pull request (requires `git`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestDelegate>,

    /// Hand the whole run to another repository's workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_dispatch: Option<RepositoryDispatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitDelegate {
    /// `owner/repo`, `host/owner/repo` or a clone URL
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Directory inside the repository to render into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub push: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequestDelegate {}

/// Target of a `repository_dispatch`. Merging compares these literally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryDispatch {
    pub owner: String,
    pub repo: String,
}

impl Delegate {
    /// Work ends with a commit; the target repository's automation applies it.
    pub fn is_gitops(&self) -> bool {
        self.git.is_some() || self.pull_request.is_some()
    }

    fn is_empty(&self) -> bool {
        self.git.is_none() && self.pull_request.is_none() && self.repository_dispatch.is_none()
    }

    pub fn validate(&self, at: &str) -> Result<()> {
        if self.pull_request.is_some() {
            match &self.git {
                None => return Err(invalid(at, "pullRequest requires git")),
                Some(git) if !git.push => {
                    return Err(invalid(at, "pullRequest requires git.push to be true"))
                }
                Some(_) => {}
            }
        }

        if let Some(git) = &self.git {
            if git.repo.is_empty() {
                return Err(invalid(at, "git.repo is required"));
            }
            prenv_github::check_reference(&git.repo)
                .map_err(|e| invalid(at, &format!("git.repo: {e}")))?;
            if let Some(path) = &git.path {
                let p = std::path::Path::new(path);
                if p.is_absolute()
                    || p.components()
                        .any(|c| matches!(c, std::path::Component::ParentDir))
                {
                    return Err(invalid(
                        at,
                        &format!("git.path must be relative and stay inside the repository: {path}"),
                    ));
                }
            }
        }

        if let Some(d) = &self.repository_dispatch {
            if d.owner.is_empty() || d.repo.is_empty() {
                return Err(invalid(at, "repositoryDispatch requires owner and repo"));
            }
        }

        Ok(())
    }
}

pub(crate) fn invalid(at: &str, msg: &str) -> PrenvError {
    PrenvError::Config(format!("{at}: {msg}"))
}

fn strip_dispatch(delegate: &mut Option<Delegate>) {
    if let Some(d) = delegate {
        d.repository_dispatch = None;
        if d.is_empty() {
            *delegate = None;
        }
    }
}

/// A component together with the names it contributes to the chain.
#[derive(Debug, Clone)]
pub struct NamedComponent<'a> {
    /// Prepended to every provisioner name of this component
    pub prefix: String,
    /// Child key under `dedicated.components`, empty otherwise
    pub short_name: &'a str,
    pub shared: bool,
    pub component: &'a Component,
}

impl Component {
    /// Drop every `repositoryDispatch`, recursively.
    fn strip_repository_dispatch(&mut self) {
        if let Some(r) = &mut self.render {
            strip_dispatch(&mut r.git_ops);
        }
        if let Some(k) = &mut self.kubernetes_resources {
            strip_dispatch(&mut k.git_ops);
        }
        if let Some(a) = &mut self.aws_resources {
            strip_dispatch(&mut a.git_ops);
        }
        if let Some(a) = &mut self.argo_cd {
            strip_dispatch(&mut a.git_ops);
        }
        for child in self.components.values_mut() {
            child.strip_repository_dispatch();
        }
    }

    fn validate(&self, at: &str) -> Result<()> {
        if let Some(r) = &self.render {
            r.validate(&format!("{at}.render"))?;
        }
        if let Some(k) = &self.kubernetes_resources {
            k.validate(&format!("{at}.kubernetesResources"))?;
        }
        if let Some(a) = &self.aws_resources {
            a.validate(&format!("{at}.awsResources"))?;
        }
        if let Some(a) = &self.argo_cd {
            a.validate(&format!("{at}.argocd"))?;
        }
        for (name, child) in &self.components {
            child.validate(&format!("{at}.components.{name}"))?;
        }
        Ok(())
    }
}

impl Config {
    /// Strictly decode a YAML document.
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(shared) = &self.shared {
            shared.validate("shared")?;
        }
        if let Some(dedicated) = &self.dedicated {
            dedicated.validate("dedicated")?;
        }
        Ok(())
    }

    /// A copy with every `repositoryDispatch` removed, so that a run started
    /// from it can never dispatch again.
    pub fn without_repository_dispatch(&self) -> Config {
        let mut c = self.clone();
        if let Some(s) = &mut c.shared {
            s.strip_repository_dispatch();
        }
        if let Some(d) = &mut c.dedicated {
            d.strip_repository_dispatch();
        }
        c
    }

    /// Components in chain order: shared, dedicated, then dedicated children
    /// sorted by key. Prefixes are resolved here.
    pub fn components(&self) -> Vec<NamedComponent<'_>> {
        let mut out = Vec::new();

        if let Some(shared) = &self.shared {
            out.push(NamedComponent {
                prefix: shared.name_prefix.clone().unwrap_or_default(),
                short_name: "",
                shared: true,
                component: shared,
            });
        }

        if let Some(dedicated) = &self.dedicated {
            let p1 = dedicated
                .name_prefix
                .clone()
                .unwrap_or_else(|| "pr-".to_string());
            out.push(NamedComponent {
                prefix: p1.clone(),
                short_name: "",
                shared: false,
                component: dedicated,
            });
            for (name, child) in &dedicated.components {
                let p2 = child
                    .name_prefix
                    .clone()
                    .unwrap_or_else(|| format!("{name}-"));
                out.push(NamedComponent {
                    prefix: format!("{p1}{p2}"),
                    short_name: name,
                    shared: false,
                    component: child,
                });
            }
        }

        out
    }
}
