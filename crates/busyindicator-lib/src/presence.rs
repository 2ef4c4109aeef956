//! Presence states and normalization of raw availability strings.

use std::fmt;

use serde::Serialize;

/// A user's availability as shown on the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Available,
    Busy,
    DoNotDisturb,
    Away,
    Offline,
    Unknown,
}

impl PresenceState {
    pub const ALL: [PresenceState; 6] = [
        PresenceState::Available,
        PresenceState::Busy,
        PresenceState::DoNotDisturb,
        PresenceState::Away,
        PresenceState::Offline,
        PresenceState::Unknown,
    ];

    /// Normalize a Graph `availability` value.
    ///
    /// Idle variants fold into their base state, `BeRightBack` counts as
    /// away, and anything unrecognized (including empty) is `Unknown`.
    pub fn from_availability(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "available" | "availableidle" => PresenceState::Available,
            "busy" | "busyidle" => PresenceState::Busy,
            "donotdisturb" => PresenceState::DoNotDisturb,
            "away" | "berightback" => PresenceState::Away,
            "offline" => PresenceState::Offline,
            _ => PresenceState::Unknown,
        }
    }

    /// Config key for this state (`[colors]` table).
    pub fn key(self) -> &'static str {
        match self {
            PresenceState::Available => "available",
            PresenceState::Busy => "busy",
            PresenceState::DoNotDisturb => "do_not_disturb",
            PresenceState::Away => "away",
            PresenceState::Offline => "offline",
            PresenceState::Unknown => "unknown",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key.trim())
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PresenceState::Available => "Available",
            PresenceState::Busy => "Busy",
            PresenceState::DoNotDisturb => "Do not disturb",
            PresenceState::Away => "Away",
            PresenceState::Offline => "Offline",
            PresenceState::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}
