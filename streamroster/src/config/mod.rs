//! Configuration system for the streamroster client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/streamroster/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendConfig;
use crate::engine::EngineConfig;
use crate::roster::DisplayPolicy;

/// Errors that can occur when loading configuration.
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

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    backend: BackendFileConfig,
    display: DisplayFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    feed_url: Option<String>,
    port: Option<u16>,
    connect_timeout_secs: Option<u64>,
    keepalive_interval_secs: Option<u64>,
    keepalive_timeout_secs: Option<u64>,
    retry_cooldown_ms: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[backend]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    command: Option<String>,
    health_timeout_secs: Option<u64>,
    health_poll_interval_ms: Option<u64>,
}

/// `[display]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DisplayFileConfig {
    policy: Option<DisplayPolicy>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Feed server port; used for the backend spawn and, when no explicit
    /// feed URL is configured, for the WebSocket URL.
    pub port: u16,
    /// Feed server WebSocket URL.
    pub feed_url: String,
    /// Timeout for the initial connect; `None` disables it.
    pub connect_timeout: Option<Duration>,
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Window for a pong before the link is declared dead.
    pub keepalive_timeout: Duration,
    /// Cooldown between the halves of a retry.
    pub retry_cooldown: Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,

    // -- Backend --
    /// Command to spawn the companion server; `None` means an externally
    /// managed server.
    pub backend_command: Option<String>,
    /// How long to wait for the backend health check.
    pub health_timeout: Duration,
    /// Pause between health-check attempts.
    pub health_poll_interval: Duration,

    // -- Display --
    /// Starting display policy.
    pub policy: DisplayPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            feed_url: "ws://127.0.0.1:8080".to_string(),
            connect_timeout: Some(Duration::from_secs(10)),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
            retry_cooldown: Duration::from_secs(1),
            channel_capacity: 256,
            backend_command: None,
            health_timeout: Duration::from_secs(10),
            health_poll_interval: Duration::from_millis(500),
            policy: DisplayPolicy::Unsanitized,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. If no `--config` is given, the default path
    /// (`~/.config/streamroster/config.toml`) is tried and silently ignored
    /// if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        let port = cli.port.or(file.network.port).unwrap_or(defaults.port);
        let feed_url = cli
            .feed_url
            .clone()
            .or_else(|| file.network.feed_url.clone())
            .unwrap_or_else(|| format!("ws://127.0.0.1:{port}"));

        Self {
            port,
            feed_url,
            // A configured value of 0 disables the connect timeout.
            connect_timeout: file.network.connect_timeout_secs.map_or(
                defaults.connect_timeout,
                |secs| {
                    if secs == 0 {
                        None
                    } else {
                        Some(Duration::from_secs(secs))
                    }
                },
            ),
            keepalive_interval: file
                .network
                .keepalive_interval_secs
                .map_or(defaults.keepalive_interval, Duration::from_secs),
            keepalive_timeout: file
                .network
                .keepalive_timeout_secs
                .map_or(defaults.keepalive_timeout, Duration::from_secs),
            retry_cooldown: file
                .network
                .retry_cooldown_ms
                .map_or(defaults.retry_cooldown, Duration::from_millis),
            channel_capacity: file
                .network
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            backend_command: cli
                .backend
                .clone()
                .or_else(|| file.backend.command.clone()),
            health_timeout: file
                .backend
                .health_timeout_secs
                .map_or(defaults.health_timeout, Duration::from_secs),
            health_poll_interval: file
                .backend
                .health_poll_interval_ms
                .map_or(defaults.health_poll_interval, Duration::from_millis),
            policy: cli
                .policy
                .or(file.display.policy)
                .unwrap_or(defaults.policy),
        }
    }

    /// Build the engine configuration from this configuration.
    #[must_use]
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::for_url(self.feed_url.clone());
        config.connect_timeout = self.connect_timeout;
        config.keepalive_interval = self.keepalive_interval;
        config.keepalive_timeout = self.keepalive_timeout;
        config.retry_cooldown = self.retry_cooldown;
        config.channel_capacity = self.channel_capacity;
        config.policy = self.policy;
        config
    }

    /// Build the backend configuration, if a backend command is configured.
    #[must_use]
    pub fn to_backend_config(&self) -> Option<BackendConfig> {
        let command = self.backend_command.clone()?;
        Some(BackendConfig {
            command,
            health_timeout: self.health_timeout,
            health_poll_interval: self.health_poll_interval,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Live-stream viewer roster collector")]
pub struct CliArgs {
    /// Feed server port.
    #[arg(short, long, env = "FEED_PORT")]
    pub port: Option<u16>,

    /// Feed server WebSocket URL (overrides --port for the connection).
    #[arg(long, env = "FEED_URL")]
    pub feed_url: Option<String>,

    /// Command to spawn the companion server, e.g. `node server.js`.
    #[arg(long, env = "BACKEND_CMD")]
    pub backend: Option<String>,

    /// Starting display policy.
    #[arg(long, value_enum)]
    pub policy: Option<DisplayPolicy>,

    /// Path to config file (default: `~/.config/streamroster/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "STREAMROSTER_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("streamroster").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
