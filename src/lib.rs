pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::cache::TtlCache;
use crate::core::config::AppConfig;
use crate::core::engine::{EngineState, FundStore};
use crate::core::fund::HistoryRange;
use crate::providers::EastmoneyProvider;
use crate::store::StateStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Commands that run against the fund store.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Refresh and print the watch-list
    List { force: bool },
    Add { codes: Vec<String> },
    Remove { codes: Vec<String> },
    Search { keyword: String },
    History { code: String, range: HistoryRange },
    /// Change auto-refresh settings; `None` leaves a setting untouched
    Auto {
        enabled: Option<bool>,
        interval_ms: Option<u64>,
    },
    Watch,
}

impl AppCommand {
    fn mutates_state(&self) -> bool {
        !matches!(self, AppCommand::Search { .. } | AppCommand::History { .. })
    }
}

/// Fund store wired to its provider and durable state.
pub struct App {
    pub store: Arc<FundStore>,
    pub state_store: Arc<dyn StateStore>,
}

impl App {
    /// Builds the provider and caches from `config`, then restores the saved
    /// watch-list, or starts from the configured refresh defaults.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let data_path = config.default_data_path()?;
        debug!("Using data path {}", data_path.display());
        let state_store = store::open_state_store(&data_path);

        let initial = match state_store.load().await {
            Ok(Some(persisted)) => EngineState::from_persisted(persisted),
            Ok(None) => EngineState::new(&config.refresh),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable saved state");
                EngineState::new(&config.refresh)
            }
        };

        let provider = EastmoneyProvider::new(
            config.providers.eastmoney.clone(),
            TtlCache::new("search", config.cache.search_ttl()),
            TtlCache::new("history", config.cache.history_ttl()),
        )
        .context("Failed to create fund provider")?;

        let store = Arc::new(FundStore::new(
            Arc::new(provider),
            TtlCache::new("funds", config.cache.valuation_ttl()),
            initial,
        ));

        Ok(Self { store, state_store })
    }

    pub async fn save(&self) -> Result<()> {
        self.state_store
            .save(&self.store.persisted())
            .await
            .context("Failed to save watch-list")
    }

    pub async fn run(&self, cmd: AppCommand) -> Result<()> {
        let result = match &cmd {
            AppCommand::List { force } => cli::funds::list(&self.store, *force).await,
            AppCommand::Add { codes } => cli::funds::add(&self.store, codes).await,
            AppCommand::Remove { codes } => cli::funds::remove(&self.store, codes),
            AppCommand::Search { keyword } => cli::search::run(&self.store, keyword).await,
            AppCommand::History { code, range } => {
                cli::history::run(&self.store, code, *range).await
            }
            AppCommand::Auto {
                enabled,
                interval_ms,
            } => cli::funds::auto(&self.store, *enabled, *interval_ms),
            // Saves on its own when the user stops watching
            AppCommand::Watch => {
                return cli::watch::run(Arc::clone(&self.store), Arc::clone(&self.state_store))
                    .await;
            }
        };

        // Partial progress is kept even when the command failed
        if cmd.mutates_state() {
            self.save().await?;
        }
        result
    }
}

pub async fn run_command(cmd: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fundwatch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::from_config(&config).await?;
    app.run(cmd).await
}
