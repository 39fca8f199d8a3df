use super::StateStore;
use crate::core::engine::PersistedState;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory state store for tests and runs without a data directory
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<Option<Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        let inner = self.inner.lock().await;
        match inner.as_deref() {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        *self.inner.lock().await = Some(bytes);
        debug!(funds = state.watch_list.len(), "Saved state in memory");
        Ok(())
    }
}
