//! Chat client configuration
//!
//! Defaults come from [`crate::constants`]. A TOML file under the platform
//! config dir may override any field, and `GRIDWATCH_BASE_URL` overrides the
//! backend location last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::chat::retry::RetryConfig;
use crate::constants;

/// Failure to load the config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Configuration for the chat client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatClientConfig {
    /// Backend base URL, without trailing slash
    pub base_url: String,
    /// Thread creation endpoint path
    pub thread_path: String,
    /// Turn submission endpoint path
    pub stream_path: String,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout, including the streamed body
    pub stream_timeout_secs: u64,
    pub user_agent: String,
    /// Retry policy for thread creation
    pub thread_retry: RetryConfig,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: constants::api::DEFAULT_BASE_URL.to_string(),
            thread_path: constants::api::THREAD_PATH.to_string(),
            stream_path: constants::api::STREAM_PATH.to_string(),
            connect_timeout_secs: constants::http::CONNECT_TIMEOUT.as_secs(),
            stream_timeout_secs: constants::http::STREAM_TIMEOUT.as_secs(),
            user_agent: constants::http::USER_AGENT.to_string(),
            thread_retry: RetryConfig::default(),
        }
    }
}

impl ChatClientConfig {
    /// Config pointed at a specific backend, everything else default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn thread_url(&self) -> String {
        join_url(&self.base_url, &self.thread_path)
    }

    pub fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::config::CONFIG_DIR_NAME)
                .join(constants::config::CONFIG_FILE_NAME)
        })
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load the default config file and apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(constants::config::BASE_URL_ENV).filter(|u| !u.trim().is_empty())
        {
            info!("Base URL overridden by {}", constants::config::BASE_URL_ENV);
            self.base_url = url.trim().to_string();
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
