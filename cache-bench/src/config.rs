//! Configuration for the web resource cache workload.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub cache: CacheConfig,
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// General run settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// How long to run the measurement phase.
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// How long to warm up before recording metrics.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub warmup: Duration,
    /// Number of worker threads.
    pub threads: usize,
}

/// Cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Total size budget (e.g., "10MB").
    #[serde(deserialize_with = "deserialize_size")]
    pub max_size: u64,
    /// Purge after every put that adds an entry.
    #[serde(default = "CacheConfig::default_auto_purge")]
    pub auto_purge: bool,
    /// Write a JSON snapshot of the cache here when the run ends.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl CacheConfig {
    fn default_auto_purge() -> bool {
        true
    }
}

/// Workload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    /// Whether to load every resource once before warmup.
    #[serde(default)]
    pub prefill: bool,
    /// How long a reader keeps a resource pinned after a hit.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub hold: Duration,
    /// Keyspace parameters.
    pub keyspace: KeyspaceConfig,
    /// Command mix (must sum to 100).
    pub commands: CommandsConfig,
    /// Resource sizes.
    pub resources: ResourcesConfig,
}

/// Keyspace configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyspaceConfig {
    /// Number of distinct resources.
    pub count: usize,
    /// URI prefix every resource name is appended to.
    #[serde(default = "KeyspaceConfig::default_base_uri")]
    pub base_uri: String,
}

impl KeyspaceConfig {
    fn default_base_uri() -> String {
        "http://codeperspective.net/dummypath".to_string()
    }
}

/// Command mix (percentages, must sum to 100).
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsConfig {
    /// Look a resource up, downloading it on a miss.
    pub get: u8,
    /// Download a resource unconditionally.
    pub put: u8,
    /// Drop a resource if nobody is using it.
    pub purge: u8,
}

/// Size range of downloaded resources.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    /// Smallest size on disk (e.g., "1KB").
    #[serde(deserialize_with = "deserialize_size")]
    pub min_size: u64,
    /// Largest size on disk (e.g., "2MB").
    #[serde(deserialize_with = "deserialize_size")]
    pub max_size: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Log format: "pretty", "json", or "compact".
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_format() -> String {
        "pretty".to_string()
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let commands = &self.workload.commands;
        let total = commands.get as u16 + commands.put as u16 + commands.purge as u16;
        if total != 100 {
            return Err(ConfigError::Invalid(format!(
                "command mix must sum to 100 (got {}): get={} put={} purge={}",
                total, commands.get, commands.put, commands.purge,
            )));
        }

        if self.general.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }

        if self.workload.keyspace.count == 0 {
            return Err(ConfigError::Invalid("keyspace count must be at least 1".into()));
        }

        let resources = &self.workload.resources;
        if resources.min_size > resources.max_size {
            return Err(ConfigError::Invalid(format!(
                "resource min_size ({}) exceeds max_size ({})",
                resources.min_size, resources.max_size,
            )));
        }

        if self.cache.max_size == 0 {
            return Err(ConfigError::Invalid("cache max_size must be greater than zero".into()));
        }

        Ok(())
    }
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Deserialize a duration from a human-readable string (e.g., "60s", "5m").
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a size from a human-readable string (e.g., "10MB", "2MB").
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_size(&s).map_err(serde::de::Error::custom)
}

/// Parse a size string like "10MB", "512KB", "4096" into bytes.
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    // Find where the numeric part ends
    let num_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());

    let (num_str, suffix) = s.split_at(num_end);
    let num: f64 = num_str
        .parse()
        .map_err(|e| format!("invalid number '{}': {}", num_str, e))?;

    let multiplier: u64 = match suffix.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix '{}'", other)),
    };

    Ok((num * multiplier as f64) as u64)
}
