//! Companion feed-server process lifecycle.
//!
//! The engine does not talk to the platforms itself; a companion server
//! does, and pushes normalized frames over the feed WebSocket. This module
//! spawns that server as a child process, polls its `/health` endpoint
//! until it is ready to accept the supervisor's connection, and kills it on
//! shutdown.

use std::time::Duration;

use tokio::process::{Child, Command};

/// How long to wait for the backend to answer its health check.
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between health-check attempts.
const DEFAULT_HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors that can occur while launching the companion server.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The configured backend command was empty.
    #[error("backend command is empty")]
    EmptyCommand,

    /// Spawning the child process failed.
    #[error("failed to spawn backend `{command}`: {source}")]
    Spawn {
        /// The command that was attempted.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The backend never answered its health check.
    #[error("backend did not become healthy within {timeout:?}")]
    Unhealthy {
        /// The health-check window that elapsed.
        timeout: Duration,
    },
}

/// Configuration for launching the companion server.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// The command to run, whitespace-separated; the feed port is appended
    /// as the final argument (e.g. `node server.js` becomes
    /// `node server.js 8080`).
    pub command: String,
    /// How long to wait for `/health` to answer.
    pub health_timeout: Duration,
    /// Pause between health-check attempts.
    pub health_poll_interval: Duration,
}

impl BackendConfig {
    /// Create a config for the given command with default health timings.
    pub fn for_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            health_poll_interval: DEFAULT_HEALTH_POLL_INTERVAL,
        }
    }
}

/// A running companion-server process.
pub struct BackendHandle {
    child: Child,
    port: u16,
}

impl BackendHandle {
    /// The feed port the backend was started on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Kill the backend process and reap it.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(err = %e, "failed to kill backend process");
        }
    }
}

/// Spawn the companion server and wait for it to become healthy.
///
/// The child is killed again if the health check never succeeds, so a
/// half-started backend does not linger.
///
/// # Errors
///
/// Returns [`BackendError`] when the command is empty, the spawn fails, or
/// `/health` does not answer within the configured window.
pub async fn launch(config: &BackendConfig, port: u16) -> Result<BackendHandle, BackendError> {
    let mut parts = config.command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(BackendError::EmptyCommand);
    };

    let mut command = Command::new(program);
    command.args(parts).arg(port.to_string()).kill_on_drop(true);

    tracing::info!(command = %config.command, port = port, "starting backend");
    let child = command.spawn().map_err(|source| BackendError::Spawn {
        command: config.command.clone(),
        source,
    })?;

    let mut handle = BackendHandle { child, port };
    if wait_until_healthy(port, config.health_timeout, config.health_poll_interval).await {
        tracing::info!(port = port, "backend is healthy");
        Ok(handle)
    } else {
        tracing::warn!(port = port, "backend failed its health check, killing it");
        if let Err(e) = handle.child.kill().await {
            tracing::warn!(err = %e, "failed to kill unhealthy backend");
        }
        Err(BackendError::Unhealthy {
            timeout: config.health_timeout,
        })
    }
}

/// Poll `GET /health` until it answers or the window elapses.
async fn wait_until_healthy(port: u16, timeout: Duration, interval: Duration) -> bool {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/health");
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        match client
            .get(&url)
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => return true,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "health check not ready");
            }
            Err(e) => {
                tracing::debug!(err = %e, "health check not reachable yet");
            }
        }
        tokio::time::sleep(interval).await;
    }
    false
}
