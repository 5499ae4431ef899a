//! Registry trait definition
//!
//! `EnvironmentRegistry` is the contract every backend satisfies:
//! - a missing backing document reads as an empty list
//! - `add_name` never registers the same name twice
//! - `delete_name` of an unknown name is a no-op
//! - updates are serialized within one process (last write wins across processes)

use async_trait::async_trait;

use crate::error::RegistryError;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Set of live environment names.
#[async_trait]
pub trait EnvironmentRegistry: Send + Sync {
    /// Register an environment name.
    async fn add_name(&self, name: &str) -> RegistryResult<()>;

    /// Unregister an environment name.
    async fn delete_name(&self, name: &str) -> RegistryResult<()>;

    /// All registered names, in registration order.
    async fn list_names(&self) -> RegistryResult<Vec<String>>;
}
