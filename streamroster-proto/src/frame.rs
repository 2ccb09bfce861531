//! Frame classification for the feed WebSocket protocol.
//!
//! The feed server sends two kinds of text frames:
//!
//! - **Control sentinels** — the literal strings `clearViewers` and
//!   `disconnect`, matched exactly, never parsed as JSON.
//! - **Data frames** — JSON objects discriminated by their `type` field
//!   (`chat`, `viewerCount`, `control`).
//!
//! [`classify`] fails closed: any frame that is neither a sentinel nor a
//! recognized JSON shape yields [`FrameError`], which callers log and drop.
//! Unknown JSON fields are ignored so the feed can grow its payloads
//! without breaking older clients.

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Plain-text control sentinels instructing a state reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Reset the collected viewer roster.
    ClearViewers,
    /// The upstream platform watch ended.
    Disconnect,
}

impl ControlFrame {
    /// Match a raw frame body against the control sentinels.
    ///
    /// The match is exact: no trimming, no case folding. `"clearviewers"`
    /// is not a control frame.
    #[must_use]
    pub fn from_sentinel(raw: &str) -> Option<Self> {
        match raw {
            "clearViewers" => Some(Self::ClearViewers),
            "disconnect" => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Return the exact wire sentinel for this control frame.
    #[must_use]
    pub const fn as_sentinel(self) -> &'static str {
        match self {
            Self::ClearViewers => "clearViewers",
            Self::Disconnect => "disconnect",
        }
    }
}

/// A chat event carried in a `{"type":"chat",...}` data frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// The viewer's display name as reported by the platform.
    #[serde(rename = "viewerName")]
    pub viewer_name: String,
    /// The platform the event originated from.
    pub platform: Platform,
    /// The chat message text, when the feed includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// JSON data frames, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataFrame {
    /// A viewer chat event.
    #[serde(rename = "chat")]
    Chat(ChatEvent),

    /// A live viewer-count update for a platform.
    #[serde(rename = "viewerCount")]
    ViewerCount {
        /// The platform being counted.
        platform: Platform,
        /// Current concurrent viewer count.
        count: u64,
    },

    /// A structured control message.
    ///
    /// The feed emits this shape alongside the plain-text sentinels.
    /// Only the sentinels act as control; this form is recognized so it
    /// is not mistaken for a malformed frame.
    #[serde(rename = "control")]
    Control {
        /// The requested control action, e.g. `clearViewers`.
        action: String,
    },
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A plain-text control sentinel.
    Control(ControlFrame),
    /// A decoded JSON data frame.
    Data(DataFrame),
}

/// Errors produced when a frame cannot be classified.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is neither a control sentinel nor valid JSON of a
    /// recognized shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Classify a raw text frame into a typed [`Frame`].
///
/// Control sentinels are checked first with an exact string match; anything
/// else must decode as a tagged [`DataFrame`].
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] for invalid JSON, an unknown `type`
/// tag, or a recognized tag with missing/ill-typed fields. Callers drop the
/// frame; classification failure is never fatal.
pub fn classify(raw: &str) -> Result<Frame, FrameError> {
    if let Some(control) = ControlFrame::from_sentinel(raw) {
        return Ok(Frame::Control(control));
    }
    let data: DataFrame = serde_json::from_str(raw)?;
    Ok(Frame::Data(data))
}

/// Encode a [`DataFrame`] into its JSON wire form.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if serialization fails (not expected
/// for these types).
pub fn encode(frame: &DataFrame) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}
