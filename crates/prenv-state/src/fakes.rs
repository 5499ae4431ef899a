//! In-memory fakes for the registry trait (testing only)

use std::sync::Mutex;

use async_trait::async_trait;

use crate::registry::{EnvironmentRegistry, RegistryResult};
use crate::state::State;

/// In-memory registry backed by a `State` behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `names`.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = State::default();
        for name in names {
            state.add(name.as_ref());
        }
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl EnvironmentRegistry for MemoryRegistry {
    async fn add_name(&self, name: &str) -> RegistryResult<()> {
        self.state.lock().unwrap().add(name);
        Ok(())
    }

    async fn delete_name(&self, name: &str) -> RegistryResult<()> {
        self.state.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_names(&self) -> RegistryResult<Vec<String>> {
        Ok(self.state.lock().unwrap().environment_names.clone())
    }
}
