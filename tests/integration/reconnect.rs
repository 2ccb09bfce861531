// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for connection failure detection and explicit retry.
//!
//! ## Partition simulation
//!
//! Aborting the feed server's `JoinHandle` does not close WebSocket
//! connections already handed to independently-spawned tasks. Instead a
//! **TCP proxy** sits between the engine and the real feed; killing the
//! proxy aborts every proxied connection task, which drops both TCP ends
//! and lets the client's WebSocket layer observe the partition.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use streamroster::engine::{self, EngineCommand, EngineConfig, EngineEvent};
use streamroster::supervisor::Severity;
use streamroster_feed::feed::FeedState;

// =============================================================================
// TCP Proxy helper
// =============================================================================

/// A simple TCP proxy forwarding traffic between a client-facing port and a
/// backend (the real feed server). Calling `kill()` aborts all tracked
/// connection tasks, severing every proxied stream at once.
struct TcpProxy {
    /// Address clients should connect to (`127.0.0.1:<proxy_port>`).
    client_addr: String,
    /// The acceptor task handle.
    accept_handle: tokio::task::JoinHandle<()>,
    /// All per-connection task handles. Aborting these kills the streams.
    conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl TcpProxy {
    /// Create a new TCP proxy from `proxy_port` to `backend_addr`.
    async fn new(proxy_port: u16, backend_addr: &str) -> Self {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{proxy_port}"))
            .await
            .unwrap_or_else(|e| panic!("proxy: failed to bind to port {proxy_port}: {e}"));
        let bound_addr = listener.local_addr().unwrap();
        let client_addr = format!("127.0.0.1:{}", bound_addr.port());
        let backend = backend_addr.to_string();
        let conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let conn_handles_clone = Arc::clone(&conn_handles);

        let accept_handle = tokio::spawn(async move {
            loop {
                let Ok((mut client_stream, _)) = listener.accept().await else {
                    break;
                };

                let backend = backend.clone();
                let conn_handle = tokio::spawn(async move {
                    let Ok(mut backend_stream) = tokio::net::TcpStream::connect(&backend).await
                    else {
                        return;
                    };

                    // When this task is aborted both streams drop at once,
                    // producing an immediate RST on both ends.
                    let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut backend_stream)
                        .await;
                });

                conn_handles_clone.lock().push(conn_handle);
            }
        });

        Self {
            client_addr,
            accept_handle,
            conn_handles,
        }
    }

    /// Kill the proxy, severing all connections immediately.
    fn kill(self) {
        self.accept_handle.abort();
        let handles = self.conn_handles.lock();
        for h in handles.iter() {
            h.abort();
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Find a free port by binding to 0 and recording the port.
async fn find_free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to port 0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    // Brief pause to let the OS release the port.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

/// Start the real feed server, returning its address string and state.
async fn start_feed() -> (String, Arc<FeedState>) {
    let (addr, state, _handle) = streamroster_feed::feed::start_server("127.0.0.1:0")
        .await
        .expect("failed to start feed server");
    (addr.to_string(), state)
}

/// Engine config with fast timings pointed at the proxy.
fn make_config(proxy_addr: &str) -> EngineConfig {
    let mut config = EngineConfig::for_url(format!("ws://{proxy_addr}"));
    config.connect_timeout = Some(Duration::from_secs(5));
    config.keepalive_interval = Duration::from_millis(200);
    config.keepalive_timeout = Duration::from_millis(200);
    config.retry_cooldown = Duration::from_millis(100);
    config
}

/// Wait for an engine event matching a predicate, skipping others.
async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<EngineEvent>,
    description: &str,
    pred: F,
) -> EngineEvent
where
    F: Fn(&EngineEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(evt)) if pred(&evt) => return evt,
            Ok(Some(_other)) => continue,
            Ok(None) => panic!("channel closed while waiting for {description}"),
            Err(_) => break,
        }
    }
    panic!("timeout waiting for {description}");
}

/// Wait for the success status that reports the feed connection came up.
async fn wait_for_connected(rx: &mut mpsc::Receiver<EngineEvent>) {
    wait_for_event(rx, "connected status", |evt| {
        matches!(
            evt,
            EngineEvent::Status {
                severity: Severity::Success,
                ..
            }
        )
    })
    .await;
}

/// Wait for a failure status (the partition was observed).
async fn wait_for_failure(rx: &mut mpsc::Receiver<EngineEvent>) {
    wait_for_event(rx, "failure status", |evt| {
        matches!(
            evt,
            EngineEvent::Status {
                severity: Severity::Error | Severity::Warning,
                ..
            }
        )
    })
    .await;
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn partition_is_detected_and_reported() {
    let (feed_addr, _state) = start_feed().await;
    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &feed_addr).await;

    let (_cmd_tx, mut evt_rx) = engine::spawn_engine(make_config(&proxy.client_addr));
    wait_for_connected(&mut evt_rx).await;

    proxy.kill();

    // Either the read loop or the keepalive notices; both surface a
    // non-success status.
    wait_for_failure(&mut evt_rx).await;
}

#[tokio::test]
async fn retry_reconnects_after_partition() {
    let (feed_addr, state) = start_feed().await;
    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &feed_addr).await;
    let proxy_addr = proxy.client_addr.clone();

    let (cmd_tx, mut evt_rx) = engine::spawn_engine(make_config(&proxy_addr));
    wait_for_connected(&mut evt_rx).await;

    proxy.kill();
    wait_for_failure(&mut evt_rx).await;

    // Restore the path on the same port, then ask for a retry.
    let _proxy2 = TcpProxy::new(proxy_port, &feed_addr).await;
    cmd_tx.send(EngineCommand::Retry).await.unwrap();

    wait_for_connected(&mut evt_rx).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Frames flow again after the retry.
    assert!(
        state
            .broadcast_text(r#"{"type":"chat","viewerName":"back","platform":"tiktok"}"#)
            .await
    );
    wait_for_event(&mut evt_rx, "roster after retry", |evt| {
        matches!(evt, EngineEvent::RosterChanged { roster } if roster.len() == 1)
    })
    .await;
}

#[tokio::test]
async fn roster_survives_a_partition() {
    let (feed_addr, state) = start_feed().await;
    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &feed_addr).await;
    let proxy_addr = proxy.client_addr.clone();

    let (cmd_tx, mut evt_rx) = engine::spawn_engine(make_config(&proxy_addr));
    wait_for_connected(&mut evt_rx).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(
        state
            .broadcast_text(r#"{"type":"chat","viewerName":"keeper","platform":"twitch"}"#)
            .await
    );
    wait_for_event(&mut evt_rx, "roster before partition", |evt| {
        matches!(evt, EngineEvent::RosterChanged { roster } if roster.len() == 1)
    })
    .await;

    proxy.kill();
    wait_for_failure(&mut evt_rx).await;

    let _proxy2 = TcpProxy::new(proxy_port, &feed_addr).await;
    cmd_tx.send(EngineCommand::Retry).await.unwrap();
    wait_for_connected(&mut evt_rx).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Transport failures never reset the roster: the next admission
    // extends what was collected before the partition.
    assert!(
        state
            .broadcast_text(r#"{"type":"chat","viewerName":"newcomer","platform":"tiktok"}"#)
            .await
    );
    wait_for_event(&mut evt_rx, "roster after partition", |evt| {
        matches!(
            evt,
            EngineEvent::RosterChanged { roster }
                if roster.iter().map(|l| l.text.as_str()).collect::<Vec<_>>()
                    == ["keeper", "newcomer"]
        )
    })
    .await;
}

#[tokio::test]
async fn shutdown_during_partition_closes_cleanly() {
    let (feed_addr, _state) = start_feed().await;
    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &feed_addr).await;

    let (cmd_tx, mut evt_rx) = engine::spawn_engine(make_config(&proxy.client_addr));
    wait_for_connected(&mut evt_rx).await;

    proxy.kill();
    wait_for_failure(&mut evt_rx).await;

    cmd_tx.send(EngineCommand::Shutdown).await.unwrap();

    // The engine task exits and drops its event sender.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "event channel never closed after shutdown"
        );
        match tokio::time::timeout(Duration::from_secs(2), evt_rx.recv()).await {
            Ok(None) => break,
            Ok(Some(_)) => continue,
            Err(_) => panic!("event channel idle but not closed"),
        }
    }
}
