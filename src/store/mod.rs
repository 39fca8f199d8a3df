pub mod disk;
pub mod memory;

use crate::core::engine::PersistedState;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Name of the single record holding the durable engine state.
pub const STATE_KEY: &str = "fund-monitor-storage";

/// Durable home of the watch-list and refresh settings.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedState>>;
    async fn save(&self, state: &PersistedState) -> Result<()>;
}

/// Opens the on-disk store under `data_path`, falling back to memory when
/// the directory cannot be used.
pub fn open_state_store(data_path: &Path) -> Arc<dyn StateStore> {
    match disk::DiskStateStore::open(&data_path.join("state")) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                error = %e,
                path = %data_path.display(),
                "Could not open state store, changes will not be saved"
            );
            Arc::new(memory::MemoryStateStore::new())
        }
    }
}
