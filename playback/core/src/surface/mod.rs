//! Media Surfaces
//!
//! A [`MediaSurface`] is one playable media sink: a video element, a frame
//! buffer, a terminal sprite, or the in-memory [`simulated::SimulatedSurface`].
//! The controller only relies on the capability set below and never on how
//! a surface renders.
//!
//! # Events
//!
//! Surfaces report asynchronous progress through a broadcast channel.
//! Every event carries the clip it refers to, so a waiter can discard
//! late events from a previous load. Dropping the receiver returned by
//! [`MediaSurface::subscribe`] is how a subscription is removed.

pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::clips::ClipId;

pub use simulated::{SimulatedSurface, SurfaceProbe};

/// Capacity of each surface's event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Asynchronous notifications from a surface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    /// The clip can start playing
    Ready {
        /// Clip that became ready
        source: ClipId,
    },
    /// A non-looping clip reached its end
    Ended {
        /// Clip that ended
        source: ClipId,
    },
    /// The clip could not be loaded
    LoadError {
        /// Clip that failed
        source: ClipId,
        /// Reason reported by the media layer
        reason: String,
    },
}

impl MediaEvent {
    /// Clip this event refers to
    #[must_use]
    pub fn source(&self) -> &ClipId {
        match self {
            Self::Ready { source } | Self::Ended { source } | Self::LoadError { source, .. } => {
                source
            }
        }
    }
}

/// Synchronous failures reported by a surface
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    /// `play` was called with no source set
    #[error("No source loaded")]
    NoSource,

    /// The media layer refused to start playback
    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),
}

/// Capabilities the controller needs from a playable media sink
///
/// Mutating methods take `&mut self`: a surface has exactly one owner, the
/// controller's [`SurfacePair`](crate::pair::SurfacePair).
#[async_trait]
pub trait MediaSurface: Send + 'static {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Set the clip to load next
    fn set_source(&mut self, clip: &ClipId);

    /// Forget the current source, stopping any load or playback of it
    fn clear_source(&mut self);

    /// Begin loading the current source; readiness arrives as [`MediaEvent::Ready`]
    fn load(&mut self);

    /// Start or resume playback
    async fn play(&mut self) -> Result<(), SurfaceError>;

    /// Pause playback, keeping the last frame
    fn pause(&mut self);

    /// Clip currently set on this surface
    fn current_source(&self) -> Option<ClipId>;

    /// Set whether playback loops at the end
    fn set_looping(&mut self, looping: bool);

    /// Whether playback loops
    fn is_looping(&self) -> bool;

    /// Mute or unmute audio
    fn set_muted(&mut self, muted: bool);

    /// Show or hide this surface
    fn set_visible(&mut self, visible: bool);

    /// Whether this surface is shown
    fn is_visible(&self) -> bool;

    /// Playback position within the current clip
    fn position(&self) -> Duration;

    /// Subscribe to this surface's events
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}
