//! prenv Core Library
//!
//! Per-pull-request environments: builds a chain of provisioners from
//! `prenv.yaml`, decides for each whether to apply locally or delegate
//! (git commit, pull request, repository dispatch) and merges outbound
//! dispatches per target repository.

pub mod chain;
pub mod config;
pub mod delegatable;
pub mod error;
pub mod provisioner;
pub mod registry_git;
pub mod store;
pub mod template;

pub use chain::{merge_dispatches, Chain, MergedDispatch, RunInputs, RunSummary, Services};

pub use config::{
    load_config, resolve_env_params, ActionsContext, Config, ConfigSource, Delegate, EnvParams,
    LoadedConfig, RepositoryDispatch, CONFIG_FILE_NAME,
};

pub use delegatable::{DelegatableProvisioner, ProvisionResult, Stage};

pub use error::{PrenvError, Result};

pub use provisioner::{
    AwsCliQueues, Kubectl, KubernetesApplier, Operation, Outputs, Provisioner, ProvisionerKind,
    QueueAdapter, RenderResult,
};

pub use registry_git::GitFileRegistry;

pub use store::{ConfigStore, GitStore, LocalStore, PullRequestStore, StoreFactory, StoreSettings};

