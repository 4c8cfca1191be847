//! Flat key/value configuration
//!
//! A service instance is configured by a flat map such as
//! `grid.broker.queue.limit = 5000`. The map is loaded from a TOML file, whose
//! nested tables are flattened with `.`, and then patched with `-D key=value`
//! overrides from the command line.

use crate::core::error_handling::ContextualError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const KEY_QUEUE_LIMIT: &str = "grid.broker.queue.limit";
pub const KEY_QUEUE_THROTTLING: &str = "grid.broker.queue.throttling";
pub const KEY_AUTO_ACK: &str = "grid.broker.autoAck";
pub const KEY_LAZY: &str = "grid.broker.lazy";
pub const KEY_THREADS: &str = "grid.broker.threads";
pub const KEY_POLL_MS: &str = "grid.broker.poll.ms";
pub const KEY_BACKOFF_MS: &str = "grid.broker.backoff.ms";
pub const KEY_CARETAKER_MS: &str = "grid.broker.caretaker.ms";
pub const KEY_REQUEUE_ON_RETRY: &str = "grid.broker.requeue_on_retry";
pub const KEY_MCP_ADDRESS: &str = "grid.mcp.address";
pub const KEY_STORAGE_PATH: &str = "grid.storage.path";
pub const KEY_STORAGE_LOCAL: &str = "grid.storage.local";
pub const KEY_MEMORY_LIMIT: &str = "grid.memory.limit";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("Invalid override '{0}': expected key=value")]
    InvalidOverride(String),
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ConfigError::Io { .. })
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Broker and listener settings resolved from the flat map
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub queue_limit: usize,
    pub queue_throttling: u64,
    pub auto_ack: bool,
    pub lazy: bool,
    pub threads: usize,
    pub poll_interval: Duration,
    pub backoff: Duration,
    pub caretaker_interval: Duration,
    pub requeue_on_retry: bool,
    pub mcp_addresses: Vec<String>,
    pub storage_path: Option<PathBuf>,
    pub memory_limit: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            queue_limit: 0,
            queue_throttling: 0,
            auto_ack: false,
            lazy: false,
            threads: 1,
            poll_interval: Duration::from_secs(10),
            backoff: Duration::from_secs(10),
            caretaker_interval: Duration::from_secs(60),
            requeue_on_retry: false,
            mcp_addresses: Vec::new(),
            storage_path: None,
            memory_limit: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridConfig {
    values: BTreeMap<String, String>,
}

impl GridConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Default configuration file location, if one exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("crawlgrid").join("crawlgrid.toml"))
            .filter(|p| p.exists())
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let table = contents
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::Parse {
                path: PathBuf::new(),
                message: e.to_string(),
            })?;
        let mut config = Self::new();
        flatten_table("", &table, &mut config.values);
        Ok(config)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply a `key=value` override
    pub fn apply_override(&mut self, assignment: &str) -> ConfigResult<()> {
        let (key, value) = assignment
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidOverride(assignment.to_string()))?;
        self.set(key.trim(), value.trim());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> ConfigResult<bool> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: other.to_string(),
                expected: "true or false".to_string(),
            }),
        }
    }

    pub fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> ConfigResult<T> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                expected: "an unsigned integer".to_string(),
            }),
        }
    }

    fn get_millis(&self, key: &str, default: Duration) -> ConfigResult<Duration> {
        let millis = self.get_parsed::<u64>(key, default.as_millis() as u64)?;
        Ok(Duration::from_millis(millis))
    }

    pub fn broker_settings(&self) -> ConfigResult<BrokerSettings> {
        let defaults = BrokerSettings::default();
        let storage_path = if self.get_bool(KEY_STORAGE_LOCAL, true)? {
            match self.get(KEY_STORAGE_PATH).map(str::trim) {
                Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
                _ => dirs::data_dir().map(|d| d.join("crawlgrid").join("messages")),
            }
        } else {
            None
        };

        Ok(BrokerSettings {
            queue_limit: self.get_parsed(KEY_QUEUE_LIMIT, defaults.queue_limit)?,
            queue_throttling: self.get_parsed(KEY_QUEUE_THROTTLING, defaults.queue_throttling)?,
            auto_ack: self.get_bool(KEY_AUTO_ACK, defaults.auto_ack)?,
            lazy: self.get_bool(KEY_LAZY, defaults.lazy)?,
            threads: self.get_parsed(KEY_THREADS, defaults.threads)?,
            poll_interval: self.get_millis(KEY_POLL_MS, defaults.poll_interval)?,
            backoff: self.get_millis(KEY_BACKOFF_MS, defaults.backoff)?,
            caretaker_interval: self.get_millis(KEY_CARETAKER_MS, defaults.caretaker_interval)?,
            requeue_on_retry: self.get_bool(KEY_REQUEUE_ON_RETRY, defaults.requeue_on_retry)?,
            mcp_addresses: self
                .get_or(KEY_MCP_ADDRESS, "")
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            storage_path,
            memory_limit: self.get_parsed(KEY_MEMORY_LIMIT, defaults.memory_limit)?,
        })
    }

    /// Log every entry at info level, masking password values
    pub fn log_entries(&self) {
        for (key, value) in &self.values {
            let shown = if key.to_lowercase().contains("password") {
                "***"
            } else {
                value.as_str()
            };
            log::info!("CONFIG: {} = {}", key, shown);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(inner) => flatten_table(&full_key, inner, out),
            toml::Value::String(s) => {
                out.insert(full_key, s.clone());
            }
            toml::Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        toml::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                out.insert(full_key, joined);
            }
            other => {
                out.insert(full_key, other.to_string());
            }
        }
    }
}
