//! Configuration system for the streamroster feed server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/streamroster-feed/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading feed configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the feed server.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FeedConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the feed config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    heartbeat_interval_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the feed server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Streamroster feed server")]
pub struct FeedCliArgs {
    /// Address to bind the feed server to.
    #[arg(short, long, env = "FEED_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/streamroster-feed/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Heartbeat ping interval in seconds.
    #[arg(long)]
    pub heartbeat_interval_secs: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "FEED_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved feed server configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Address to bind the server to (e.g. `0.0.0.0:8080`).
    pub bind_addr: String,
    /// Interval between heartbeat pings to the push client.
    pub heartbeat_interval: Duration,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            log_level: "info".to_string(),
        }
    }
}

impl FeedConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &FeedCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `FeedConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &FeedCliArgs, file: &FeedConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            heartbeat_interval: cli
                .heartbeat_interval_secs
                .or(file.server.heartbeat_interval_secs)
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the feed server.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<FeedConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(FeedConfigFile::default());
        };
        config_dir.join("streamroster-feed").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FeedConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
