//! In-memory implementation of unit state storage for tests and simulation.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;

use async_trait::async_trait;
use microcloud_state::{PersistentState, StateStore};
use tokio::sync::Mutex;

/// In-memory state store. Clones share the same saved state, so a clone can
/// stand in for the same node after a restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateStore {
    saved: Arc<Mutex<Option<PersistentState>>>,
}

impl MemoryStateStore {
    /// Creates a new, empty `MemoryStateStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `state`.
    #[must_use]
    pub fn with_state(state: PersistentState) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Some(state))),
        }
    }

    /// The last saved state, if anything was saved.
    pub async fn snapshot(&self) -> Option<PersistentState> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    type Error = Error;

    async fn load(&self) -> Result<PersistentState, Self::Error> {
        Ok(self.saved.lock().await.clone().unwrap_or_default())
    }

    async fn save(&self, state: &PersistentState) -> Result<(), Self::Error> {
        self.saved.lock().await.replace(state.clone());
        Ok(())
    }
}
