//! Engine facade wiring the supervisor to the roster store.
//!
//! This is the only surface the presentation layer talks to. It owns the
//! [`RosterStore`] and the [`ConnectionSupervisor`] exclusively and funnels
//! every mutation through a single background task, so roster state never
//! sees concurrent writers.
//!
//! ```text
//! UI / CLI  <-- EngineEvent ---  engine task  <-- frames --  feed server
//!           --- EngineCommand ->
//! ```

use std::time::Duration;

use tokio::sync::mpsc;

use streamroster_proto::frame::{ControlFrame, DataFrame, Frame};
use streamroster_proto::platform::Platform;

use crate::roster::{DisplayPolicy, Identity, RosterLine, RosterStore};
use crate::supervisor::{ConnectionSupervisor, Severity, SupervisorConfig, SupervisorEvent};

/// Default channel capacity for command/event mpsc channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Commands sent from the presentation layer to the engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Open the feed connection (no-op when already connected).
    Connect,
    /// Close the feed connection.
    Disconnect,
    /// Tear down and reconnect after a short cooldown.
    Retry,
    /// Switch the active display policy and recompute the roster.
    SetPolicy(DisplayPolicy),
    /// Drop the collected roster. Leaves the connection alone.
    ClearRoster,
    /// Stop the engine task and close the connection.
    Shutdown,
}

/// Events emitted by the engine for the presentation layer.
///
/// This is the single upward taxonomy: consumers never touch the
/// supervisor or the roster store directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A human-readable status line with a severity tag.
    Status {
        /// The message text.
        text: String,
        /// Severity for presentation (color, log level).
        severity: Severity,
    },
    /// The visible roster changed; carries the full re-rendered sequence.
    RosterChanged {
        /// The ordered, deduplicated, policy-formatted roster.
        roster: Vec<RosterLine>,
    },
    /// A live viewer-count update from the feed.
    ViewerCount {
        /// The platform being counted.
        platform: Platform,
        /// Current concurrent viewer count.
        count: u64,
    },
}

/// Configuration for the engine and its supervised connection.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// WebSocket URL of the feed server.
    pub feed_url: String,
    /// Timeout for the initial connect; `None` disables it.
    pub connect_timeout: Option<Duration>,
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Window for a pong before the link is declared dead.
    pub keepalive_timeout: Duration,
    /// Cooldown between the halves of a retry.
    pub retry_cooldown: Duration,
    /// Starting display policy.
    pub policy: DisplayPolicy,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
}

impl EngineConfig {
    /// Create a config for the given feed URL with default timings.
    pub fn for_url(feed_url: impl Into<String>) -> Self {
        let supervisor = SupervisorConfig::for_url(feed_url);
        Self {
            feed_url: supervisor.feed_url,
            connect_timeout: supervisor.connect_timeout,
            keepalive_interval: supervisor.keepalive_interval,
            keepalive_timeout: supervisor.keepalive_timeout,
            retry_cooldown: supervisor.retry_cooldown,
            policy: DisplayPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create a config for a feed server on a local port.
    #[must_use]
    pub fn for_port(port: u16) -> Self {
        Self::for_url(format!("ws://127.0.0.1:{port}"))
    }

    /// Extract the supervisor's slice of this configuration.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            feed_url: self.feed_url.clone(),
            connect_timeout: self.connect_timeout,
            keepalive_interval: self.keepalive_interval,
            keepalive_timeout: self.keepalive_timeout,
            retry_cooldown: self.retry_cooldown,
        }
    }
}

/// The roster-mutating half of the engine.
///
/// Owns the [`RosterStore`]; every method runs on the single engine task.
/// Kept separate from the wiring so the frame-handling semantics are
/// testable without a network.
pub struct Engine {
    roster: RosterStore,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Engine {
    /// Create an engine emitting [`EngineEvent`]s on the given channel.
    #[must_use]
    pub fn new(policy: DisplayPolicy, event_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            roster: RosterStore::with_policy(policy),
            event_tx,
        }
    }

    /// Dispatch a classified inbound frame.
    ///
    /// Chat events go through admission; control sentinels reset the
    /// roster; viewer counts are forwarded; the structured JSON control
    /// shape is recognized but does not act (only the sentinels do).
    pub async fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Control(ControlFrame::ClearViewers) => {
                self.roster.clear();
                self.emit_status("Viewer list cleared by feed", Severity::Info)
                    .await;
                self.emit_roster().await;
            }
            Frame::Control(ControlFrame::Disconnect) => {
                self.roster.clear();
                self.emit_status("Upstream watch ended, viewer list cleared", Severity::Warning)
                    .await;
                self.emit_roster().await;
            }
            Frame::Data(DataFrame::Chat(event)) => {
                // Names arrive with stray whitespace from some platforms.
                let identity = Identity::new(event.viewer_name.trim(), event.platform);
                if self.roster.try_admit(identity).is_admitted() {
                    self.emit_roster().await;
                }
            }
            Frame::Data(DataFrame::ViewerCount { platform, count }) => {
                let _ = self
                    .event_tx
                    .send(EngineEvent::ViewerCount { platform, count })
                    .await;
            }
            Frame::Data(DataFrame::Control { action }) => {
                tracing::debug!(action = %action, "structured control frame ignored");
            }
        }
    }

    /// Switch the display policy and re-render.
    pub async fn set_policy(&mut self, policy: DisplayPolicy) {
        self.roster.set_policy(policy);
        self.emit_status(&format!("Display policy: {policy}"), Severity::Info)
            .await;
        self.emit_roster().await;
    }

    /// Drop the collected roster (the connection is untouched).
    pub async fn clear_all(&mut self) {
        self.roster.clear();
        self.emit_status("Viewer list cleared", Severity::Info).await;
        self.emit_roster().await;
    }

    /// The current visible roster.
    #[must_use]
    pub fn rendered_roster(&self) -> Vec<RosterLine> {
        self.roster.render()
    }

    async fn emit_roster(&self) {
        let _ = self
            .event_tx
            .send(EngineEvent::RosterChanged {
                roster: self.roster.render(),
            })
            .await;
    }

    async fn emit_status(&self, text: &str, severity: Severity) {
        let _ = self
            .event_tx
            .send(EngineEvent::Status {
                text: text.to_string(),
                severity,
            })
            .await;
    }
}

/// Spawn the engine task and return its channel handles.
///
/// Creates the supervisor, connects immediately, and serializes supervisor
/// events and presentation commands onto one task. Dropping the command
/// sender (or sending [`EngineCommand::Shutdown`]) stops the task and
/// closes the connection.
#[must_use]
pub fn spawn_engine(
    config: EngineConfig,
) -> (mpsc::Sender<EngineCommand>, mpsc::Receiver<EngineEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity);
    let (evt_tx, evt_rx) = mpsc::channel(config.channel_capacity);

    let (supervisor, sup_rx) =
        ConnectionSupervisor::new(config.supervisor_config(), config.channel_capacity);
    let engine = Engine::new(config.policy, evt_tx);

    tokio::spawn(run_engine(engine, supervisor, sup_rx, cmd_rx));

    (cmd_tx, evt_rx)
}

/// The single-writer engine loop.
async fn run_engine(
    mut engine: Engine,
    supervisor: ConnectionSupervisor,
    mut sup_rx: mpsc::Receiver<SupervisorEvent>,
    mut cmd_rx: mpsc::Receiver<EngineCommand>,
) {
    supervisor.connect();

    loop {
        tokio::select! {
            event = sup_rx.recv() => match event {
                Some(SupervisorEvent::Status { text, severity, .. }) => {
                    engine.emit_status(&text, severity).await;
                }
                Some(SupervisorEvent::Frame(frame)) => {
                    engine.handle_frame(frame).await;
                }
                None => {
                    tracing::warn!("supervisor event channel closed");
                    break;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(EngineCommand::Connect) => supervisor.connect(),
                Some(EngineCommand::Disconnect) => supervisor.disconnect(),
                Some(EngineCommand::Retry) => supervisor.retry(),
                Some(EngineCommand::SetPolicy(policy)) => engine.set_policy(policy).await,
                Some(EngineCommand::ClearRoster) => engine.clear_all().await,
                Some(EngineCommand::Shutdown) | None => {
                    tracing::info!("engine shutting down");
                    supervisor.disconnect();
                    break;
                }
            },
        }
    }
}
