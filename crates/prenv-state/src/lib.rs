//! prenv-state: the environment registry
//!
//! Keeps the up-to-date list of per-pull-request environment names. The list
//! is consulted to derive per-environment resources (one queue per environment)
//! and updated by every apply/destroy run.
//!
//! ## Backends
//!
//! - [`YamlFileRegistry`]: a YAML document on the local filesystem
//! - [`ConfigMapRegistry`]: a YAML document stored under one key of a
//!   Kubernetes ConfigMap, read and written through `kubectl`
//! - [`fakes::MemoryRegistry`]: in-memory, for tests
//!
//! A git-backed registry lives in `prenv-core`, next to the git store it uses.

mod configmap;
mod error;
pub mod fakes;
pub mod registry;
mod state;
mod yaml_file;

pub use configmap::{ConfigMapRegistry, KubectlConfig};
pub use error::RegistryError;
pub use registry::{EnvironmentRegistry, RegistryResult};
pub use state::State;
pub use yaml_file::{YamlFileRegistry, DEFAULT_STATE_FILE};
