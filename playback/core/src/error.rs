//! Playback error taxonomy
//!
//! Steady-state playback failures are recovered inside the controller and
//! only logged. These types travel upward in two cases: `initialize`
//! reporting its load failure, and handle calls made after the controller
//! task has stopped.

use std::time::Duration;

use thiserror::Error;

use crate::clips::ClipId;

/// Errors produced by the playback controller
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// A requested clip failed to become ready
    #[error("Failed to load clip {clip}: {reason}")]
    MediaLoad {
        /// Clip that failed
        clip: ClipId,
        /// Reason reported by the surface
        reason: String,
    },

    /// A preload did not signal ready within the bounded window
    #[error("Clip {clip} was not ready after {waited:?}")]
    TransitionTimeout {
        /// Clip that was being preloaded
        clip: ClipId,
        /// How long the controller waited
        waited: Duration,
    },

    /// An operation arrived before `initialize`
    #[error("Playback controller is not initialized")]
    NotInitialized,

    /// The controller task has exited
    #[error("Playback controller has stopped")]
    ControllerStopped,
}

impl PlaybackError {
    /// Whether this error came from the media layer (load or timeout)
    #[must_use]
    pub fn is_media_failure(&self) -> bool {
        matches!(self, Self::MediaLoad { .. } | Self::TransitionTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlaybackError::MediaLoad {
            clip: ClipId::new("/videos/normal/idle.mp4"),
            reason: "404".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/videos/normal/idle.mp4"));
        assert!(msg.contains("404"));

        let err = PlaybackError::TransitionTimeout {
            clip: ClipId::new("a.mp4"),
            waited: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_media_failure_classification() {
        assert!(PlaybackError::TransitionTimeout {
            clip: ClipId::new("x"),
            waited: Duration::ZERO,
        }
        .is_media_failure());
        assert!(!PlaybackError::NotInitialized.is_media_failure());
        assert!(!PlaybackError::ControllerStopped.is_media_failure());
    }
}
