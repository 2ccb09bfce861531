//! Platform tags for identities arriving from the feed.

use serde::{Deserialize, Serialize};

/// The live-streaming platform a chat event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// TikTok Live.
    Tiktok,
    /// Twitch.
    Twitch,
}

impl Platform {
    /// Return the lowercase wire tag for this platform.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tiktok => "tiktok",
            Self::Twitch => "twitch",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
