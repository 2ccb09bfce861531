//! WebSocket connection supervision for the feed server link.
//!
//! The supervisor owns one logical connection to the feed server and walks
//! it through an explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected | Failed
//! Failed -> Connecting   (only via an explicit retry)
//! ```
//!
//! Every state transition is reported on the event channel as a
//! [`SupervisorEvent::Status`]; inbound frames are classified through
//! [`streamroster_proto::frame`] and forwarded as
//! [`SupervisorEvent::Frame`]. Malformed frames are logged and dropped,
//! never fatal.
//!
//! Cancellation is epoch-guarded: `disconnect()` bumps a connection epoch,
//! so a connect attempt that was already in flight can never mutate state
//! after it was cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use streamroster_proto::frame::{self, Frame};

/// Default timeout for the initial WebSocket connect.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between keepalive pings once connected.
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default window for a pong to arrive before the link is declared dead.
const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cooldown between the disconnect and connect halves of a retry.
const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(1);

/// Severity tag attached to status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Routine progress, e.g. a connect attempt starting.
    Info,
    /// The connection came up.
    Success,
    /// The connection went away without a hard error.
    Warning,
    /// The connection failed and needs a retry.
    Error,
}

/// Connection state of the supervised link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; nothing in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The WebSocket is open and frames are flowing.
    Connected,
    /// The transport failed; a retry is required to leave this state.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Events delivered to the supervisor's consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A state transition occurred.
    Status {
        /// The state entered.
        state: ConnectionState,
        /// Human-readable message for the presentation layer.
        text: String,
        /// Severity tag for the message.
        severity: Severity,
    },
    /// A classified inbound frame.
    Frame(Frame),
}

/// Configuration for a [`ConnectionSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// WebSocket URL of the feed server (e.g. `ws://127.0.0.1:8080`).
    pub feed_url: String,
    /// Timeout for the initial connect; `None` lets the attempt run until
    /// the transport gives up on its own.
    pub connect_timeout: Option<Duration>,
    /// Interval between keepalive pings once connected.
    pub keepalive_interval: Duration,
    /// How long to wait for a pong before declaring the link dead.
    pub keepalive_timeout: Duration,
    /// Cooldown between the disconnect and connect halves of a retry.
    pub retry_cooldown: Duration,
}

impl SupervisorConfig {
    /// Create a config for the given feed URL with default timings.
    pub fn for_url(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
        }
    }
}

/// State shared between the supervisor handle and its connection tasks.
///
/// The epoch counter is the cancellation token: `connect()` and
/// `disconnect()` bump it, and a connection task may only transition state
/// while its captured epoch is still current.
struct Shared {
    epoch: u64,
    state: ConnectionState,
}

struct Inner {
    config: SupervisorConfig,
    shared: Mutex<Shared>,
    event_tx: mpsc::Sender<SupervisorEvent>,
    retry_pending: AtomicBool,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Handle to a supervised feed connection.
///
/// Cheap to clone; all clones drive the same underlying connection.
/// `connect` and `retry` return immediately and report outcomes through
/// the event channel, never as return values.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    /// Create a supervisor in the `Disconnected` state.
    ///
    /// Returns the handle and the receiver for [`SupervisorEvent`]s.
    #[must_use]
    pub fn new(
        config: SupervisorConfig,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        let inner = Arc::new(Inner {
            config,
            shared: Mutex::new(Shared {
                epoch: 0,
                state: ConnectionState::Disconnected,
            }),
            event_tx,
            retry_pending: AtomicBool::new(false),
            task: Mutex::new(None),
        });
        (Self { inner }, event_rx)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state.clone()
    }

    /// Open the feed connection.
    ///
    /// No-op when already `Connected`. Otherwise any existing transport is
    /// torn down, the state moves to `Connecting`, and the WebSocket is
    /// opened on a background task. The outcome arrives as a status event.
    pub fn connect(&self) {
        let my_epoch = {
            let mut shared = self.inner.shared.lock();
            if shared.state == ConnectionState::Connected {
                tracing::debug!("connect ignored, already connected");
                return;
            }
            shared.epoch += 1;
            shared.state = ConnectionState::Connecting;
            shared.epoch
        };

        let mut task = self.inner.task.lock();
        if let Some(old) = task.take() {
            old.abort();
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run_connection(inner, my_epoch)));
    }

    /// Close the feed connection.
    ///
    /// Idempotent and safe to call at any time, including mid-connect: the
    /// epoch bump prevents an in-flight open from transitioning state after
    /// this call.
    pub fn disconnect(&self) {
        let changed = {
            let mut shared = self.inner.shared.lock();
            shared.epoch += 1;
            let changed = shared.state != ConnectionState::Disconnected;
            shared.state = ConnectionState::Disconnected;
            changed
        };

        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        if changed {
            self.inner.emit_now(
                ConnectionState::Disconnected,
                "Feed disconnected",
                Severity::Warning,
            );
        }
    }

    /// Tear the connection down, wait a short cooldown, and reconnect.
    ///
    /// At most one retry sequence is active at a time; calls made while one
    /// is in flight are ignored.
    pub fn retry(&self) {
        if self
            .inner
            .retry_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("retry already in flight, ignoring");
            return;
        }

        let sup = self.clone();
        tokio::spawn(async move {
            sup.disconnect();
            tokio::time::sleep(sup.inner.config.retry_cooldown).await;
            sup.connect();
            sup.inner.retry_pending.store(false, Ordering::SeqCst);
        });
    }
}

impl Inner {
    /// Whether the given epoch is still the live one.
    fn is_current(&self, epoch: u64) -> bool {
        self.shared.lock().epoch == epoch
    }

    /// Transition to `state` if `epoch` is still current.
    ///
    /// Returns `false` when the attempt was cancelled in the meantime, in
    /// which case the caller must not emit anything.
    fn transition(&self, epoch: u64, state: ConnectionState) -> bool {
        let mut shared = self.shared.lock();
        if shared.epoch != epoch {
            return false;
        }
        shared.state = state;
        true
    }

    /// Emit a status event from a synchronous context.
    fn emit_now(&self, state: ConnectionState, text: &str, severity: Severity) {
        let event = SupervisorEvent::Status {
            state,
            text: text.to_string(),
            severity,
        };
        if self.event_tx.try_send(event).is_err() {
            tracing::warn!("status channel full, dropping status event");
        }
    }

    /// Emit a status event, awaiting channel capacity.
    async fn emit(&self, state: ConnectionState, text: &str, severity: Severity) {
        let event = SupervisorEvent::Status {
            state,
            text: text.to_string(),
            severity,
        };
        let _ = self.event_tx.send(event).await;
    }

    /// Transition to `Failed` with a reason and report it, unless the
    /// attempt was cancelled.
    async fn fail(&self, epoch: u64, reason: &str) {
        let state = ConnectionState::Failed {
            reason: reason.to_string(),
        };
        if self.transition(epoch, state.clone()) {
            tracing::warn!(reason = %reason, "feed connection failed");
            self.emit(state, &format!("Feed connection failed: {reason}"), Severity::Error)
                .await;
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection task: dial the feed, then pump frames until the link dies.
async fn run_connection(inner: Arc<Inner>, epoch: u64) {
    if inner.is_current(epoch) {
        inner
            .emit(
                ConnectionState::Connecting,
                "Attempting to connect...",
                Severity::Info,
            )
            .await;
    }

    let connect_fut = connect_async(&inner.config.feed_url);
    let dialed = match inner.config.connect_timeout {
        Some(limit) => match tokio::time::timeout(limit, connect_fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(url = %inner.config.feed_url, "feed connect timed out");
                inner.fail(epoch, "connect timed out").await;
                return;
            }
        },
        None => connect_fut.await,
    };

    let ws_stream = match dialed {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(url = %inner.config.feed_url, err = %e, "feed connect failed");
            inner.fail(epoch, &format!("connect failed: {e}")).await;
            return;
        }
    };

    if !inner.transition(epoch, ConnectionState::Connected) {
        // Cancelled while the handshake was in flight; close quietly.
        let mut ws_stream = ws_stream;
        let _ = ws_stream.close(None).await;
        return;
    }

    tracing::info!(url = %inner.config.feed_url, "feed connected");
    inner
        .emit(ConnectionState::Connected, "Feed connected", Severity::Success)
        .await;

    read_loop(&inner, epoch, ws_stream).await;
}

/// Pump inbound frames and keepalives until the connection ends.
async fn read_loop(inner: &Arc<Inner>, epoch: u64, mut ws_stream: WsStream) {
    let start = tokio::time::Instant::now() + inner.config.keepalive_interval;
    let mut ping_timer = tokio::time::interval_at(start, inner.config.keepalive_interval);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The deadline is only polled while a pong is outstanding.
    let mut pong_deadline = Box::pin(tokio::time::sleep(inner.config.keepalive_timeout));
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            inbound = ws_stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    forward_frame(inner, text.as_str()).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    awaiting_pong = false;
                }
                Some(Ok(Message::Ping(_) | Message::Binary(_) | Message::Frame(_))) => {
                    // Pings are answered by the protocol layer; the feed
                    // never sends binary frames.
                }
                Some(Ok(Message::Close(_))) | None => {
                    if inner.transition(epoch, ConnectionState::Disconnected) {
                        tracing::info!("feed closed the connection");
                        inner
                            .emit(
                                ConnectionState::Disconnected,
                                "Feed connection closed",
                                Severity::Warning,
                            )
                            .await;
                    }
                    return;
                }
                Some(Err(e)) => {
                    inner.fail(epoch, &format!("read error: {e}")).await;
                    return;
                }
            },
            _ = ping_timer.tick() => {
                if ws_stream.send(Message::Ping(Vec::new().into())).await.is_err() {
                    inner.fail(epoch, "keepalive send failed").await;
                    return;
                }
                if !awaiting_pong {
                    awaiting_pong = true;
                    pong_deadline
                        .as_mut()
                        .reset(tokio::time::Instant::now() + inner.config.keepalive_timeout);
                }
            },
            () = &mut pong_deadline, if awaiting_pong => {
                inner.fail(epoch, "keepalive timeout").await;
                let _ = ws_stream.close(None).await;
                return;
            }
        }
    }
}

/// Classify a text frame and forward it; malformed frames are dropped.
async fn forward_frame(inner: &Arc<Inner>, raw: &str) {
    match frame::classify(raw) {
        Ok(parsed) => {
            let _ = inner.event_tx.send(SupervisorEvent::Frame(parsed)).await;
        }
        Err(e) => {
            tracing::warn!(err = %e, frame = raw, "malformed feed frame, dropping");
        }
    }
}
