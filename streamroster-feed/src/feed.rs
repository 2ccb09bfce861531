//! Feed server core: shared state, WebSocket push, and control routes.
//!
//! The server pushes text frames to a single connected client (the roster
//! engine) and exposes the HTTP control surface the surrounding app uses:
//! `/health`, `/start`, `/disconnect`, `/keyword`, `/clearKeyword`. A new
//! WebSocket client replaces the previous one; the old connection is
//! closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

use streamroster_proto::frame::{self, ControlFrame, DataFrame};
use streamroster_proto::platform::Platform;

/// Interval between server-side heartbeat pings.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A registered push client.
struct Client {
    /// Identifies this connection so a later unregister cannot evict a
    /// replacement that registered in the meantime.
    id: u64,
    sender: mpsc::UnboundedSender<Message>,
}

/// Shared feed server state.
pub struct FeedState {
    client: RwLock<Option<Client>>,
    next_client_id: AtomicU64,
    keyword: RwLock<Option<String>>,
    watches: RwLock<HashMap<Platform, String>>,
    heartbeat_interval: Duration,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// Create feed state with the default heartbeat interval.
    #[must_use]
    pub fn new() -> Self {
        Self::with_heartbeat(DEFAULT_HEARTBEAT_INTERVAL)
    }

    /// Create feed state with a custom heartbeat interval.
    #[must_use]
    pub fn with_heartbeat(heartbeat_interval: Duration) -> Self {
        Self {
            client: RwLock::new(None),
            next_client_id: AtomicU64::new(0),
            keyword: RwLock::new(None),
            watches: RwLock::new(HashMap::new()),
            heartbeat_interval,
        }
    }

    /// Push a raw text frame to the connected client, if any.
    ///
    /// Returns `true` when a client was connected and the frame was queued.
    pub async fn broadcast_text(&self, text: &str) -> bool {
        let guard = self.client.read().await;
        guard.as_ref().is_some_and(|client| {
            client
                .sender
                .send(Message::Text(text.to_string().into()))
                .is_ok()
        })
    }

    /// Encode and push a data frame.
    pub async fn broadcast_data(&self, data: &DataFrame) -> bool {
        match frame::encode(data) {
            Ok(text) => self.broadcast_text(&text).await,
            Err(e) => {
                tracing::error!(err = %e, "failed to encode data frame");
                false
            }
        }
    }

    /// Push a plain-text control sentinel.
    pub async fn broadcast_control(&self, control: ControlFrame) -> bool {
        self.broadcast_text(control.as_sentinel()).await
    }

    /// The active keyword filter, if any.
    pub async fn keyword(&self) -> Option<String> {
        self.keyword.read().await.clone()
    }

    /// The username currently watched on a platform, if any.
    pub async fn watch(&self, platform: Platform) -> Option<String> {
        self.watches.read().await.get(&platform).cloned()
    }

    /// Register a client, replacing (and thereby closing) any previous one.
    async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.client.write().await;
        if let Some(old) = guard.replace(Client { id, sender }) {
            tracing::info!(old_id = old.id, "replacing existing push client");
            let _ = old.sender.send(Message::Close(None));
        }
        id
    }

    /// Unregister a client if it is still the registered one.
    async fn unregister(&self, id: u64) {
        let mut guard = self.client.write().await;
        if guard.as_ref().is_some_and(|client| client.id == id) {
            *guard = None;
        }
    }
}

/// Standard JSON body for the control endpoints.
#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            error: None,
        })
    }

    fn err(message: &str) -> (StatusCode, Json<Self>) {
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                success: false,
                error: Some(message.to_string()),
            }),
        )
    }
}

/// Body of `POST /start`.
#[derive(Debug, Deserialize)]
struct StartRequest {
    username: Option<String>,
    platform: Option<Platform>,
}

/// Body of `POST /disconnect`. `platform` may also be `"all"`.
#[derive(Debug, Deserialize)]
struct DisconnectRequest {
    platform: Option<String>,
}

/// Body of `POST /keyword`.
#[derive(Debug, Deserialize)]
struct KeywordRequest {
    keyword: Option<String>,
}

/// Build the feed router.
fn router(state: Arc<FeedState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health))
        .route("/start", post(start_watch))
        .route("/disconnect", post(disconnect_watch))
        .route("/keyword", post(set_keyword))
        .route("/clearKeyword", post(clear_keyword))
        .with_state(state)
}

/// `GET /health` — readiness probe polled before the engine connects.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /start` — begin watching a username on a platform.
async fn start_watch(
    State(state): State<Arc<FeedState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)> {
    let (Some(username), Some(platform)) = (request.username, request.platform) else {
        return Err(ApiResponse::err("Missing username or platform"));
    };
    if username.trim().is_empty() {
        return Err(ApiResponse::err("Missing username or platform"));
    }

    tracing::info!(username = %username, platform = %platform, "watch started");
    state.watches.write().await.insert(platform, username);
    Ok(ApiResponse::ok())
}

/// `POST /disconnect` — stop watching one platform, or everything.
async fn disconnect_watch(
    State(state): State<Arc<FeedState>>,
    Json(request): Json<DisconnectRequest>,
) -> Json<ApiResponse> {
    match request.platform.as_deref() {
        Some("all") => {
            state.watches.write().await.clear();
            *state.keyword.write().await = None;
            // The structured control shape; the engine ignores it, plain
            // sentinels are what act.
            state
                .broadcast_data(&DataFrame::Control {
                    action: "clearViewers".to_string(),
                })
                .await;
            tracing::info!("all watches disconnected");
        }
        Some("tiktok") => {
            state.watches.write().await.remove(&Platform::Tiktok);
            tracing::info!("tiktok watch disconnected");
        }
        Some("twitch") => {
            state.watches.write().await.remove(&Platform::Twitch);
            tracing::info!("twitch watch disconnected");
        }
        other => {
            tracing::debug!(platform = ?other, "disconnect for unknown platform ignored");
        }
    }
    ApiResponse::ok()
}

/// `POST /keyword` — set the keyword filter and reset tracked viewers.
async fn set_keyword(
    State(state): State<Arc<FeedState>>,
    Json(request): Json<KeywordRequest>,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)> {
    let keyword = request
        .keyword
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    let Some(keyword) = keyword else {
        return Err(ApiResponse::err("Missing keyword"));
    };

    tracing::info!(keyword = %keyword, "keyword set");
    *state.keyword.write().await = Some(keyword);
    state
        .broadcast_data(&DataFrame::Control {
            action: "clearViewers".to_string(),
        })
        .await;
    Ok(ApiResponse::ok())
}

/// `POST /clearKeyword` — drop the keyword filter and clear the roster.
async fn clear_keyword(State(state): State<Arc<FeedState>>) -> &'static str {
    *state.keyword.write().await = None;
    state.broadcast_control(ControlFrame::ClearViewers).await;
    tracing::info!("keyword cleared");
    "Keyword cleared"
}

/// axum handler that upgrades an HTTP request to the push WebSocket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<FeedState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles the push connection for a single client.
///
/// The connection lifecycle:
/// 1. Register a channel sender (replacing any previous client).
/// 2. Spawn a writer task forwarding queued frames to the socket.
/// 3. Spawn a heartbeat task that pings and terminates unresponsive clients.
/// 4. Drain the reader until the client goes away, then unregister.
async fn handle_socket(socket: WebSocket, state: Arc<FeedState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let id = state.register(tx.clone()).await;
    tracing::info!(client_id = id, "push client connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    // Heartbeat: ping on an interval, drop the client when a whole interval
    // passes without a pong.
    let alive = Arc::new(AtomicBool::new(true));
    let heartbeat_alive = Arc::clone(&alive);
    let heartbeat_tx = tx.clone();
    let heartbeat_interval = state.heartbeat_interval;
    let mut heartbeat_task = tokio::spawn(async move {
        let mut timer = tokio::time::interval(heartbeat_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        timer.tick().await;
        loop {
            timer.tick().await;
            if !heartbeat_alive.swap(false, Ordering::SeqCst) {
                tracing::warn!("terminating unresponsive push client");
                let _ = heartbeat_tx.send(Message::Close(None));
                break;
            }
            if heartbeat_tx.send(Message::Ping(Vec::new().into())).is_err() {
                break;
            }
        }
    });

    let reader_alive = Arc::clone(&alive);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    reader_alive.store(true, Ordering::SeqCst);
                }
                Message::Close(_) => break,
                _ => {
                    // The engine never sends data frames upstream.
                }
            }
        }
    });

    // Wait for any task to finish, then stop the others.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
            heartbeat_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
            heartbeat_task.abort();
        }
        _ = &mut heartbeat_task => {
            read_task.abort();
            write_task.abort();
        }
    }

    state.unregister(id).await;
    tracing::info!(client_id = id, "push client disconnected");
}

/// Start the feed server on the given address.
///
/// Returns the bound address, the shared state (for injecting frames), and
/// a join handle for the serve task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, Arc<FeedState>, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(FeedState::new())).await
}

/// Start the feed server with pre-configured [`FeedState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<FeedState>,
) -> Result<
    (std::net::SocketAddr, Arc<FeedState>, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "feed server error");
        }
    });

    Ok((bound_addr, state, handle))
}
