//! Deduplicating, order-preserving registry of admitted viewer identities.
//!
//! The store keeps two things side by side: the full ordered history of
//! every admitted identity, and the set of dedup keys occupied under the
//! active [`DisplayPolicy`]. Switching policy never mutates history; it
//! replays it under the new key function, so the visible roster is always
//! exactly what a fresh store fed the same history would show.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use streamroster_proto::platform::Platform;

use crate::normalize::{capitalize, first_word, sanitize};

/// The active name-formatting and dedup-key strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayPolicy {
    /// Raw names exactly as the platform reported them.
    #[default]
    Unsanitized,
    /// Letters-and-spaces names, first letter capitalized.
    Sanitized,
    /// Only the first word of the sanitized name.
    FirstWord,
}

impl DisplayPolicy {
    /// Compute the dedup key a raw name occupies under this policy.
    ///
    /// The key is identical to the string the policy renders, so two
    /// identities collide exactly when they would display the same.
    /// An empty key means the name is not displayable under this policy.
    #[must_use]
    pub fn key(self, raw: &str) -> String {
        match self {
            Self::Unsanitized => raw.to_string(),
            Self::Sanitized => capitalize(&sanitize(raw)),
            Self::FirstWord => capitalize(first_word(&sanitize(raw))),
        }
    }
}

impl std::fmt::Display for DisplayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsanitized => write!(f, "unsanitized"),
            Self::Sanitized => write!(f, "sanitized"),
            Self::FirstWord => write!(f, "first-word"),
        }
    }
}

/// A raw viewer name plus its originating platform. Immutable once admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The display name exactly as received.
    pub name: String,
    /// The platform the chat event came from.
    pub platform: Platform,
}

impl Identity {
    /// Create an identity from a raw name and platform tag.
    pub fn new(name: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            platform,
        }
    }
}

/// An admitted identity together with its insertion sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// The admitted identity.
    pub identity: Identity,
    /// Position in the admission order, starting at 0 after each clear.
    pub seq: u64,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The identity was appended to the roster.
    Admitted,
    /// Another identity already occupies this key under the active policy.
    Duplicate,
    /// The trimmed name or its computed key is empty.
    Empty,
}

impl Admission {
    /// Whether the store changed as a result of the attempt.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// One rendered roster line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterLine {
    /// The policy-formatted display string.
    pub text: String,
    /// The platform tag, for presentation-layer coloring.
    pub platform: Platform,
}

/// The deduplicating viewer registry.
///
/// Entries are append-only within a policy epoch: no reordering, no removal
/// short of [`RosterStore::clear`]. The visible list holds indexes into
/// history so original insertion order survives every policy switch.
#[derive(Debug, Default)]
pub struct RosterStore {
    policy: DisplayPolicy,
    history: Vec<RosterEntry>,
    occupied: HashSet<String>,
    visible: Vec<usize>,
    next_seq: u64,
}

impl RosterStore {
    /// Create an empty store with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given starting policy.
    #[must_use]
    pub fn with_policy(policy: DisplayPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The active display policy.
    #[must_use]
    pub const fn policy(&self) -> DisplayPolicy {
        self.policy
    }

    /// Number of identities retained in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The full admitted history in insertion order, pre-policy.
    #[must_use]
    pub fn history(&self) -> &[RosterEntry] {
        &self.history
    }

    /// Try to admit an identity under the active policy.
    ///
    /// The first arrival wins: a later identity whose key is already
    /// occupied is dropped without touching the store, even if it differs
    /// in raw casing or platform.
    pub fn try_admit(&mut self, identity: Identity) -> Admission {
        if identity.name.trim().is_empty() {
            return Admission::Empty;
        }
        let key = self.policy.key(&identity.name);
        if key.is_empty() {
            return Admission::Empty;
        }
        if self.occupied.contains(&key) {
            return Admission::Duplicate;
        }
        self.occupied.insert(key);
        self.visible.push(self.history.len());
        self.history.push(RosterEntry {
            identity,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        Admission::Admitted
    }

    /// Switch the active policy and recompute visibility from history.
    ///
    /// History replays in original insertion order under the new key
    /// function; entries whose recomputed key is empty or collides with an
    /// earlier entry are excluded from rendering but stay in history for
    /// future switches.
    pub fn set_policy(&mut self, policy: DisplayPolicy) {
        self.policy = policy;
        self.occupied.clear();
        self.visible.clear();
        for (idx, entry) in self.history.iter().enumerate() {
            let key = policy.key(&entry.identity.name);
            if key.is_empty() || self.occupied.contains(&key) {
                continue;
            }
            self.occupied.insert(key);
            self.visible.push(idx);
        }
    }

    /// Drop all history and occupied keys and restart the sequence counter.
    /// The active policy is unchanged.
    pub fn clear(&mut self) {
        self.history.clear();
        self.occupied.clear();
        self.visible.clear();
        self.next_seq = 0;
    }

    /// Render the visible roster in insertion order under the active policy.
    ///
    /// Entries whose formatted string comes out empty are skipped.
    #[must_use]
    pub fn render(&self) -> Vec<RosterLine> {
        self.visible
            .iter()
            .filter_map(|&idx| {
                let entry = &self.history[idx];
                let text = self.policy.key(&entry.identity.name);
                if text.is_empty() {
                    return None;
                }
                Some(RosterLine {
                    text,
                    platform: entry.identity.platform,
                })
            })
            .collect()
    }
}
