use hookview_storage::MAX_ENTRIES;
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::middleware::RateLimitConfig;

const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_file: PathBuf,
    pub persist: bool,
    pub max_entries: usize,
    pub rate_limit: RateLimitConfig,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`.
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_file_config(FileConfig::default())
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    storage: StorageSection,
    #[serde(default)]
    rate_limit: RateLimitSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    trust_proxy: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StorageSection {
    #[serde(default = "default_data_file")]
    data_file: PathBuf,
    #[serde(default = "default_persist")]
    persist: bool,
    #[serde(default = "default_max_entries")]
    max_entries: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            persist: default_persist(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitSection {
    #[serde(default = "default_window_secs")]
    window_secs: u64,
    #[serde(default = "default_max_requests")]
    max_requests: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data").join("webhook-data.json")
}

fn default_persist() -> bool {
    true
}

fn default_max_entries() -> usize {
    MAX_ENTRIES
}

fn default_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

fn default_max_requests() -> u32 {
    DEFAULT_RATE_LIMIT_MAX_REQUESTS
}

impl ServerConfig {
    /// Load from `HOOKVIEW_CONFIG` or `./hookview.toml`, falling back to the
    /// environment.
    pub fn load() -> anyhow::Result<Self> {
        match config_file_path() {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path, err))?;
                Self::from_toml(&contents)
                    .map_err(|err| anyhow::anyhow!("Invalid config {}: {}", path, err))
            }
            None => {
                let config = Self::from_env();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let parsed: FileConfig = toml::from_str(contents)
            .map_err(|err| anyhow::anyhow!("Failed to parse config: {}", err))?;
        let config = Self::from_file_config(parsed);
        config.validate()?;
        Ok(config)
    }

    fn from_file_config(file_config: FileConfig) -> Self {
        Self {
            host: file_config.server.host,
            port: file_config.server.port,
            data_file: file_config.storage.data_file,
            persist: file_config.storage.persist,
            max_entries: file_config.storage.max_entries,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(file_config.rate_limit.window_secs),
                max_requests: file_config.rate_limit.max_requests,
            },
            trust_proxy: file_config.server.trust_proxy,
        }
    }

    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|value| value.trim().parse::<T>().ok())
        }

        let host = lookup("HOOKVIEW_HOST").unwrap_or_else(default_host);
        let port = parsed(&lookup, "HOOKVIEW_PORT")
            .or_else(|| parsed(&lookup, "PORT"))
            .unwrap_or_else(default_port);
        let data_file = lookup("HOOKVIEW_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_file);
        let persist = parsed(&lookup, "HOOKVIEW_PERSIST").unwrap_or_else(default_persist);
        let max_entries =
            parsed(&lookup, "HOOKVIEW_MAX_ENTRIES").unwrap_or_else(default_max_entries);
        let window_secs = parsed(&lookup, "HOOKVIEW_RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(default_window_secs);
        let max_requests =
            parsed(&lookup, "HOOKVIEW_RATE_LIMIT_MAX").unwrap_or_else(default_max_requests);
        let trust_proxy = parsed(&lookup, "HOOKVIEW_TRUST_PROXY").unwrap_or(false);

        Self {
            host,
            port,
            data_file,
            persist,
            max_entries,
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(window_secs),
                max_requests,
            },
            trust_proxy,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            return Err(anyhow::anyhow!("Port must be greater than 0"));
        }

        if self.max_entries == 0 {
            return Err(anyhow::anyhow!("max_entries must be at least 1"));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(anyhow::anyhow!("Rate limit must allow at least 1 request"));
        }

        if self.rate_limit.window.is_zero() {
            return Err(anyhow::anyhow!("Rate limit window must be at least 1 second"));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| anyhow::anyhow!("Invalid listen address {}:{}: {}", self.host, self.port, err))
    }
}

fn config_file_path() -> Option<String> {
    if let Ok(path) = env::var("HOOKVIEW_CONFIG") {
        return Some(path);
    }
    Path::new("hookview.toml")
        .exists()
        .then(|| "hookview.toml".to_string())
}
