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

//! End-to-end tests for the engine against an in-process feed server.
//!
//! These tests validate the full path: feed broadcast → supervisor →
//! frame classification → roster admission → `EngineEvent` emission.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use streamroster::engine::{self, EngineCommand, EngineConfig, EngineEvent};
use streamroster::roster::DisplayPolicy;
use streamroster::supervisor::Severity;
use streamroster_feed::feed::FeedState;
use streamroster_proto::platform::Platform;

// =============================================================================
// Helpers
// =============================================================================

/// Start a feed server and an engine connected to it with fast timings.
async fn start_stack() -> (
    Arc<FeedState>,
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineEvent>,
) {
    let (addr, state, _handle) = streamroster_feed::feed::start_server("127.0.0.1:0")
        .await
        .expect("failed to start feed server");

    let mut config = EngineConfig::for_url(format!("ws://{addr}"));
    config.keepalive_interval = Duration::from_secs(5);
    config.keepalive_timeout = Duration::from_secs(5);
    config.retry_cooldown = Duration::from_millis(50);

    let (cmd_tx, mut evt_rx) = engine::spawn_engine(config);
    wait_for_connected(&mut evt_rx).await;
    // Let the feed register the client after the upgrade completes.
    tokio::time::sleep(Duration::from_millis(100)).await;

    (state, cmd_tx, evt_rx)
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

/// Wait for a roster snapshot whose texts equal `expected`.
async fn wait_for_roster(rx: &mut mpsc::Receiver<EngineEvent>, expected: &[&str]) {
    let description = format!("roster {expected:?}");
    wait_for_event(rx, &description, |evt| {
        matches!(
            evt,
            EngineEvent::RosterChanged { roster }
                if roster.iter().map(|l| l.text.as_str()).collect::<Vec<_>>() == expected
        )
    })
    .await;
}

/// Broadcast a chat event and panic if no client was connected.
async fn send_chat(state: &FeedState, name: &str, platform: &str) {
    let raw = format!(r#"{{"type":"chat","viewerName":"{name}","platform":"{platform}"}}"#);
    assert!(
        state.broadcast_text(&raw).await,
        "no push client connected for chat broadcast"
    );
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn chat_events_build_deduplicated_roster() {
    let (state, _cmd_tx, mut evt_rx) = start_stack().await;

    send_chat(&state, "Jenny_92", "tiktok").await;
    send_chat(&state, "Jenny_92", "tiktok").await;
    send_chat(&state, "bob", "twitch").await;

    wait_for_roster(&mut evt_rx, &["Jenny_92", "bob"]).await;
}

#[tokio::test]
async fn roster_lines_carry_platform_tags() {
    let (state, _cmd_tx, mut evt_rx) = start_stack().await;

    send_chat(&state, "Jenny_92", "tiktok").await;
    send_chat(&state, "bob", "twitch").await;

    let event = wait_for_event(&mut evt_rx, "two-entry roster", |evt| {
        matches!(evt, EngineEvent::RosterChanged { roster } if roster.len() == 2)
    })
    .await;
    let EngineEvent::RosterChanged { roster } = event else {
        unreachable!()
    };
    assert_eq!(roster[0].platform, Platform::Tiktok);
    assert_eq!(roster[1].platform, Platform::Twitch);
}

#[tokio::test]
async fn policy_switch_rerenders_existing_roster() {
    let (state, cmd_tx, mut evt_rx) = start_stack().await;

    send_chat(&state, "Bob The Builder", "twitch").await;
    wait_for_roster(&mut evt_rx, &["Bob The Builder"]).await;

    cmd_tx
        .send(EngineCommand::SetPolicy(DisplayPolicy::FirstWord))
        .await
        .unwrap();

    wait_for_roster(&mut evt_rx, &["Bob"]).await;
}

#[tokio::test]
async fn clear_viewers_sentinel_starts_a_fresh_roster() {
    let (state, _cmd_tx, mut evt_rx) = start_stack().await;

    send_chat(&state, "first", "tiktok").await;
    wait_for_roster(&mut evt_rx, &["first"]).await;

    assert!(state.broadcast_text("clearViewers").await);
    wait_for_roster(&mut evt_rx, &[]).await;

    // Previously seen names are admitted again after the reset.
    send_chat(&state, "first", "tiktok").await;
    wait_for_roster(&mut evt_rx, &["first"]).await;
}

#[tokio::test]
async fn malformed_frames_do_not_break_the_stream() {
    let (state, _cmd_tx, mut evt_rx) = start_stack().await;

    assert!(state.broadcast_text("{{{ definitely not json").await);
    assert!(
        state
            .broadcast_text(r#"{"type":"gift","viewerName":"x","platform":"tiktok"}"#)
            .await
    );
    send_chat(&state, "survivor", "twitch").await;

    wait_for_roster(&mut evt_rx, &["survivor"]).await;
}

#[tokio::test]
async fn viewer_count_updates_are_forwarded() {
    let (state, _cmd_tx, mut evt_rx) = start_stack().await;

    assert!(
        state
            .broadcast_text(r#"{"type":"viewerCount","platform":"tiktok","count":321}"#)
            .await
    );

    let event = wait_for_event(&mut evt_rx, "viewer count", |evt| {
        matches!(evt, EngineEvent::ViewerCount { .. })
    })
    .await;
    let EngineEvent::ViewerCount { platform, count } = event else {
        unreachable!()
    };
    assert_eq!(platform, Platform::Tiktok);
    assert_eq!(count, 321);
}

#[tokio::test]
async fn disconnect_and_connect_commands_cycle_the_link() {
    let (state, cmd_tx, mut evt_rx) = start_stack().await;

    send_chat(&state, "early", "tiktok").await;
    wait_for_roster(&mut evt_rx, &["early"]).await;

    cmd_tx.send(EngineCommand::Disconnect).await.unwrap();
    wait_for_event(&mut evt_rx, "disconnected status", |evt| {
        matches!(
            evt,
            EngineEvent::Status {
                severity: Severity::Warning,
                ..
            }
        )
    })
    .await;

    cmd_tx.send(EngineCommand::Connect).await.unwrap();
    wait_for_connected(&mut evt_rx).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The roster survived the connection cycle; only the link restarted.
    send_chat(&state, "late", "twitch").await;
    wait_for_roster(&mut evt_rx, &["early", "late"]).await;
}

#[tokio::test]
async fn clear_roster_command_does_not_touch_the_connection() {
    let (state, cmd_tx, mut evt_rx) = start_stack().await;

    send_chat(&state, "someone", "tiktok").await;
    wait_for_roster(&mut evt_rx, &["someone"]).await;

    cmd_tx.send(EngineCommand::ClearRoster).await.unwrap();
    wait_for_roster(&mut evt_rx, &[]).await;

    // Still connected: a new broadcast lands without any reconnect.
    send_chat(&state, "someone", "tiktok").await;
    wait_for_roster(&mut evt_rx, &["someone"]).await;
}
