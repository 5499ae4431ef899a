//! Contract tests every `EnvironmentRegistry` backend must pass.

use prenv_state::fakes::MemoryRegistry;
use prenv_state::{EnvironmentRegistry, YamlFileRegistry};

async fn assert_registry_contract(registry: &dyn EnvironmentRegistry) {
    assert!(registry.list_names().await.unwrap().is_empty());

    registry.add_name("pr-1").await.unwrap();
    registry.add_name("pr-2").await.unwrap();
    registry.add_name("pr-1").await.unwrap();
    assert_eq!(registry.list_names().await.unwrap(), vec!["pr-1", "pr-2"]);

    registry.delete_name("pr-9").await.unwrap();
    assert_eq!(registry.list_names().await.unwrap(), vec!["pr-1", "pr-2"]);

    registry.delete_name("pr-1").await.unwrap();
    assert_eq!(registry.list_names().await.unwrap(), vec!["pr-2"]);
}

#[tokio::test]
async fn memory_registry_satisfies_contract() {
    let registry = MemoryRegistry::new();
    assert_registry_contract(&registry).await;
}

#[tokio::test]
async fn yaml_file_registry_satisfies_contract() {
    let dir = tempfile::tempdir().unwrap();
    let registry = YamlFileRegistry::new(dir.path().join("prenv.state.yaml"));
    assert_registry_contract(&registry).await;
}

#[tokio::test]
async fn yaml_file_registry_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prenv.state.yaml");

    YamlFileRegistry::new(&path).add_name("pr-5").await.unwrap();
    let reopened = YamlFileRegistry::new(&path);
    assert_eq!(reopened.list_names().await.unwrap(), vec!["pr-5"]);
}

#[tokio::test]
async fn yaml_file_registry_reads_handwritten_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.yaml");
    std::fs::write(&path, "environmentNames:\n  - prenv-10\n  - prenv-11\n").unwrap();

    let registry = YamlFileRegistry::new(&path);
    assert_eq!(
        registry.list_names().await.unwrap(),
        vec!["prenv-10", "prenv-11"]
    );
}

#[tokio::test]
async fn memory_registry_with_names_dedups() {
    let registry = MemoryRegistry::with_names(["a", "b", "a"]);
    assert_eq!(registry.list_names().await.unwrap(), vec!["a", "b"]);
}
