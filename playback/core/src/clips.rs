//! Clip Sets
//!
//! Static per-mode mapping from [`ClipRole`] to a playable clip identifier.
//! Built once at startup from file names and a base directory, immutable
//! afterwards.
//!
//! Paths resolve as `<base_dir>/<mode dir>/<file>`, where the mode
//! directory is `normal` or `armor`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mode::{ClipRole, Mode};

/// Opaque identifier of a playable clip (path or URL)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    /// Create a clip identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// File names for one mode, as they appear in configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFiles {
    /// Looping idle clip
    pub idle: String,
    /// Looping speaking clip
    pub speaking: String,
    /// First idle action
    pub idle_action_1: String,
    /// Second idle action
    pub idle_action_2: String,
    /// One-shot reply played when leaving this mode
    pub transition_reply: String,
}

impl ClipFiles {
    /// Default file names for the normal skin
    #[must_use]
    pub fn normal_defaults() -> Self {
        Self {
            idle: "通常.mp4".to_string(),
            speaking: "喋り.mp4".to_string(),
            idle_action_1: "腕組み.mp4".to_string(),
            idle_action_2: "キョロ.mp4".to_string(),
            transition_reply: "チェンジ.mp4".to_string(),
        }
    }

    /// Default file names for the armored skin
    ///
    /// The armored skin has no separate speaking clip; it reuses idle.
    #[must_use]
    pub fn armored_defaults() -> Self {
        Self {
            idle: "装甲通常.mp4".to_string(),
            speaking: "装甲通常.mp4".to_string(),
            idle_action_1: "装甲腕組み.mp4".to_string(),
            idle_action_2: "装甲キョロ.mp4".to_string(),
            transition_reply: "キャストオフ.mp4".to_string(),
        }
    }

    /// Reject empty file names
    ///
    /// # Errors
    ///
    /// Returns the name of the first empty field.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("idle", &self.idle),
            ("speaking", &self.speaking),
            ("idle_action_1", &self.idle_action_1),
            ("idle_action_2", &self.idle_action_2),
            ("transition_reply", &self.transition_reply),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(format!("clip file name '{name}' is empty"));
            }
        }
        Ok(())
    }
}

/// Resolved clips for a single mode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeClips {
    /// Looping idle clip
    pub idle: ClipId,
    /// Looping speaking clip
    pub speaking: ClipId,
    /// First idle action
    pub idle_action_1: ClipId,
    /// Second idle action
    pub idle_action_2: ClipId,
    /// One-shot reply played when leaving this mode
    pub transition_reply: ClipId,
}

impl ModeClips {
    /// Resolve file names under `<base_dir>/<mode dir>/`
    #[must_use]
    pub fn resolve(base_dir: &str, mode: Mode, files: &ClipFiles) -> Self {
        let base = base_dir.trim_end_matches('/');
        let path = |file: &str| ClipId(format!("{base}/{}/{file}", mode.dir_name()));
        Self {
            idle: path(&files.idle),
            speaking: path(&files.speaking),
            idle_action_1: path(&files.idle_action_1),
            idle_action_2: path(&files.idle_action_2),
            transition_reply: path(&files.transition_reply),
        }
    }
}

/// Clip configuration for both modes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSet {
    armored: ModeClips,
    normal: ModeClips,
}

impl ClipSet {
    /// Build from already-resolved per-mode clips
    #[must_use]
    pub fn new(armored: ModeClips, normal: ModeClips) -> Self {
        Self { armored, normal }
    }

    /// Resolve both modes' file names under a base directory
    #[must_use]
    pub fn from_files(base_dir: &str, armored: &ClipFiles, normal: &ClipFiles) -> Self {
        Self {
            armored: ModeClips::resolve(base_dir, Mode::Armored, armored),
            normal: ModeClips::resolve(base_dir, Mode::Normal, normal),
        }
    }

    /// Clips for one mode
    #[must_use]
    pub fn for_mode(&self, mode: Mode) -> &ModeClips {
        match mode {
            Mode::Armored => &self.armored,
            Mode::Normal => &self.normal,
        }
    }

    /// Look up a clip by mode and role
    ///
    /// Transition replies only exist on the mode being left, so
    /// `ChangeReply` resolves under Normal and `CastoffReply` under Armored.
    #[must_use]
    pub fn clip(&self, mode: Mode, role: ClipRole) -> Option<&ClipId> {
        let clips = self.for_mode(mode);
        match role {
            ClipRole::Idle => Some(&clips.idle),
            ClipRole::Speaking => Some(&clips.speaking),
            ClipRole::IdleAction1 => Some(&clips.idle_action_1),
            ClipRole::IdleAction2 => Some(&clips.idle_action_2),
            ClipRole::ChangeReply | ClipRole::CastoffReply => {
                (mode.transition_role() == role).then_some(&clips.transition_reply)
            }
        }
    }

    /// Every (mode, role, clip) triple, for diagnostics
    #[must_use]
    pub fn all_paths(&self) -> Vec<(Mode, ClipRole, ClipId)> {
        let mut out = Vec::with_capacity(10);
        for mode in [Mode::Normal, Mode::Armored] {
            for role in [
                ClipRole::Idle,
                ClipRole::Speaking,
                ClipRole::IdleAction1,
                ClipRole::IdleAction2,
                mode.transition_role(),
            ] {
                if let Some(clip) = self.clip(mode, role) {
                    out.push((mode, role, clip.clone()));
                }
            }
        }
        out
    }
}

impl Default for ClipSet {
    fn default() -> Self {
        Self::from_files(
            "/videos",
            &ClipFiles::armored_defaults(),
            &ClipFiles::normal_defaults(),
        )
    }
}
