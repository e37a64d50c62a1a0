//! Mode and Playback State
//!
//! Two independent axes describe what the character is showing:
//! - [`Mode`]: which visual skin is active (armored or normal)
//! - [`PlaybackState`]: why the visible surface is playing its current clip
//!
//! Any (Mode, PlaybackState) pair is valid. The one-shot mode-transition
//! replies are the only clips keyed by transition direction rather than by
//! state, see [`Mode::transition_role`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Visual skin of the character
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Armored skin (startup default)
    #[default]
    Armored,
    /// Normal skin
    Normal,
}

impl Mode {
    /// The other mode
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Armored => Self::Normal,
            Self::Normal => Self::Armored,
        }
    }

    /// Directory name used for this mode's clips on disk
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Armored => "armor",
            Self::Normal => "normal",
        }
    }

    /// Clip role played when leaving this mode
    #[must_use]
    pub fn transition_role(self) -> ClipRole {
        match self {
            Self::Normal => ClipRole::ChangeReply,
            Self::Armored => ClipRole::CastoffReply,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armored => write!(f, "armored"),
            Self::Normal => write!(f, "normal"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "armored" | "armor" => Ok(Self::Armored),
            "normal" => Ok(Self::Normal),
            other => Err(format!("unknown mode '{other}' (expected armored or normal)")),
        }
    }
}

/// Why the active surface is playing what it is playing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Looping idle clip
    #[default]
    Idle,
    /// Looping speaking clip
    Speaking,
    /// One-shot clip (idle action or mode-transition reply)
    Action,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Speaking => write!(f, "speaking"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Semantic role of a clip within a mode's clip set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipRole {
    /// Looping idle
    Idle,
    /// Looping speech
    Speaking,
    /// First idle action variant
    IdleAction1,
    /// Second idle action variant
    IdleAction2,
    /// Reply played when leaving Normal for Armored
    ChangeReply,
    /// Reply played when leaving Armored for Normal
    CastoffReply,
}

impl fmt::Display for ClipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Speaking => "speaking",
            Self::IdleAction1 => "idle_action_1",
            Self::IdleAction2 => "idle_action_2",
            Self::ChangeReply => "change_reply",
            Self::CastoffReply => "castoff_reply",
        };
        f.write_str(name)
    }
}

/// Which of the two idle action variants to play
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleAction {
    /// First variant
    First,
    /// Second variant
    Second,
}

impl IdleAction {
    /// Pick a variant from a uniform sample in `[0, 1)`: below 0.5 is the first
    #[must_use]
    pub fn from_sample(sample: f64) -> Self {
        if sample < 0.5 {
            Self::First
        } else {
            Self::Second
        }
    }

    /// Clip role for this variant
    #[must_use]
    pub fn role(self) -> ClipRole {
        match self {
            Self::First => ClipRole::IdleAction1,
            Self::Second => ClipRole::IdleAction2,
        }
    }
}
