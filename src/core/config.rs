use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Refresh interval presets offered to users, in milliseconds.
pub const REFRESH_INTERVAL_PRESETS_MS: [u64; 4] = [30_000, 60_000, 120_000, 300_000];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub referer: Option<String>,
}

impl EndpointConfig {
    fn new(base_url: &str, timeout_ms: u64) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout_ms,
            referer: Some(format!("{base_url}/")),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("fundwatch/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EastmoneyProviderConfig {
    #[serde(default = "default_valuation_endpoint")]
    pub valuation: EndpointConfig,
    #[serde(default = "default_search_endpoint")]
    pub search: EndpointConfig,
    #[serde(default = "default_history_endpoint")]
    pub history: EndpointConfig,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_valuation_endpoint() -> EndpointConfig {
    EndpointConfig::new("http://fundgz.1234567.com.cn", 15_000)
}

fn default_search_endpoint() -> EndpointConfig {
    EndpointConfig::new("https://fund.eastmoney.com", 10_000)
}

fn default_history_endpoint() -> EndpointConfig {
    EndpointConfig::new("https://api.fund.eastmoney.com", 10_000)
}

impl Default for EastmoneyProviderConfig {
    fn default() -> Self {
        Self {
            valuation: default_valuation_endpoint(),
            search: default_search_endpoint(),
            history: default_history_endpoint(),
            user_agent: default_user_agent(),
        }
    }
}

impl EastmoneyProviderConfig {
    /// Points all three endpoints at one host, keeping default timeouts.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let mut config = Self::default();
        for endpoint in [
            &mut config.valuation,
            &mut config.search,
            &mut config.history,
        ] {
            endpoint.base_url = base_url.to_string();
            endpoint.referer = None;
        }
        config
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub eastmoney: EastmoneyProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_valuation_ttl")]
    pub valuation_ttl_secs: u64,
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: u64,
}

fn default_valuation_ttl() -> u64 {
    5 * 60
}

fn default_search_ttl() -> u64 {
    30 * 60
}

fn default_history_ttl() -> u64 {
    60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            valuation_ttl_secs: default_valuation_ttl(),
            search_ttl_secs: default_search_ttl(),
            history_ttl_secs: default_history_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn valuation_ttl(&self) -> Duration {
        Duration::from_secs(self.valuation_ttl_secs)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }
}

/// Settings used when no watch-list has been saved yet.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RefreshConfig {
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_auto_refresh() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    60_000
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            auto_refresh: default_auto_refresh(),
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    /// Loads the config from the default location, or defaults if none exists.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "fundwatch", "fundwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "fundwatch", "fundwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
