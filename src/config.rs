//! `grove.toml` + environment configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use grove_cache::{DEFAULT_TTL, sqlite::CACHE_DB};
use grove_client::HttpSourceConfig;
use grove_explorer::ExplorerConfig;
use grove_live::LiveConfig;
use grove_server::ServerConfig;
use serde::Deserialize;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "grove.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroveConfig {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub live: LiveConfig,
    pub server: ServerConfig,
    pub explorer: ExplorerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Default result cap for `grove search`
    pub search_limit: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let http = HttpSourceConfig::default();
        RemoteConfig {
            base_url: http.base_url,
            timeout_secs: http.timeout_secs,
            search_limit: grove_core::SearchQuery::DEFAULT_LIMIT,
        }
    }
}

impl RemoteConfig {
    pub fn http(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            path: Path::new(".grove").join(CACHE_DB),
            ttl_secs: DEFAULT_TTL.as_secs(),
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl GroveConfig {
    /// Read the config file, then `.env`, then `GROVE_*` variables.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", env_file.display());
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay `GROVE_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(url) = lookup("GROVE_API_URL") {
            self.remote.base_url = url;
        }
        if let Some(url) = lookup("GROVE_WS_URL") {
            self.live.url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(path) = lookup("GROVE_CACHE_PATH") {
            self.cache.path = PathBuf::from(path);
        }
        if let Some(ttl) = lookup("GROVE_CACHE_TTL_SECS") {
            self.cache.ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| format!("GROVE_CACHE_TTL_SECS is not a number: {}", ttl))?;
        }
        if let Some(host) = lookup("GROVE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GROVE_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("GROVE_PORT is not a port number: {}", port))?;
        }
        Ok(())
    }
}
