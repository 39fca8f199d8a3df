use super::{STATE_KEY, StateStore};
use crate::core::engine::PersistedState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

/// Engine state kept in a fjall keyspace.
pub struct DiskStateStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskStateStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        let keyspace = Config::new(path)
            .open()
            .with_context(|| format!("Failed to open keyspace at {}", path.display()))?;
        let partition = keyspace
            .open_partition("engine", PartitionCreateOptions::default())
            .context("Failed to open engine partition")?;
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

#[async_trait]
impl StateStore for DiskStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        let Some(bytes) = self
            .partition
            .get(STATE_KEY)
            .context("Failed to read saved state")?
        else {
            debug!("No saved state");
            return Ok(None);
        };
        let state: PersistedState =
            serde_json::from_slice(&bytes).context("Failed to decode saved state")?;
        debug!(funds = state.watch_list.len(), "Loaded saved state");
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.partition
            .insert(STATE_KEY, bytes)
            .context("Failed to write state")?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to flush state")?;
        debug!(funds = state.watch_list.len(), "Saved state");
        Ok(())
    }
}
