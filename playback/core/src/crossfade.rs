//! Seamless Crossfade
//!
//! Moves visible playback to a new clip without a blank frame:
//!
//! ```text
//! same clip on active? ──yes──▶ update loop flag, keep playing      (Reused)
//!        │no
//!        ▼
//! preload into inactive (muted) ──▶ await Ready ──timeout/error──▶ (Abandoned)
//!        │
//!        ▼
//! play inactive ──▶ settle delay ──▶ swap active/inactive           (Swapped)
//! ```
//!
//! Abandoning leaves the active surface untouched, so the character keeps
//! its last good frame. The caller always gets an outcome; nothing here
//! waits longer than `ready_timeout + settle_delay`.
//!
//! A shown clip comes with a subscription to its surface opened before
//! playback started, so an `Ended` that fires during the settle delay is
//! still delivered.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::clips::ClipId;
use crate::error::PlaybackError;
use crate::pair::SurfacePair;
use crate::surface::{MediaEvent, MediaSurface};

/// Timing parameters for a crossfade
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrossfadeTiming {
    /// Longest wait for the preloaded clip to report ready
    pub ready_timeout: Duration,
    /// Pause between the preloaded clip starting and the visible swap,
    /// absorbing first-frame decode latency
    pub settle_delay: Duration,
}

impl Default for CrossfadeTiming {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(50),
        }
    }
}

/// Result of a crossfade request
#[derive(Debug)]
pub enum CrossfadeOutcome {
    /// The active surface already had the clip; only the loop flag changed
    Reused {
        /// Active surface events from before the resume
        events: broadcast::Receiver<MediaEvent>,
    },
    /// The inactive surface took over
    Swapped {
        /// Events of the now-active surface from before its load
        events: broadcast::Receiver<MediaEvent>,
    },
    /// The transition was dropped; the active surface is unchanged
    Abandoned(PlaybackError),
}

impl CrossfadeOutcome {
    /// Whether the requested clip is now on the active surface
    #[must_use]
    pub fn is_showing(&self) -> bool {
        !matches!(self, Self::Abandoned(_))
    }

    /// Events of the surface showing the clip, `None` when abandoned
    #[must_use]
    pub fn into_events(self) -> Option<broadcast::Receiver<MediaEvent>> {
        match self {
            Self::Reused { events } | Self::Swapped { events } => Some(events),
            Self::Abandoned(_) => None,
        }
    }
}

/// Why a wait for the end of a clip finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The clip played to its end
    Ended,
    /// The bounded wait ran out first
    TimedOut,
    /// The surface stopped publishing events
    SurfaceClosed,
}

/// Load `clip` into `surface`, muted, returning a subscription opened
/// before the load so the ready event cannot be missed
pub fn preload<S: MediaSurface>(
    surface: &mut S,
    clip: &ClipId,
    looping: bool,
) -> broadcast::Receiver<MediaEvent> {
    let events = surface.subscribe();
    surface.set_muted(true);
    surface.set_source(clip);
    surface.set_looping(looping);
    surface.load();
    events
}

/// Wait until `clip` reports ready, failing on load error or after `timeout`
///
/// # Errors
///
/// [`PlaybackError::MediaLoad`] when the surface reports a load error or
/// closes, [`PlaybackError::TransitionTimeout`] when `timeout` elapses.
pub async fn await_ready(
    events: &mut broadcast::Receiver<MediaEvent>,
    clip: &ClipId,
    timeout: Duration,
) -> Result<(), PlaybackError> {
    match tokio::time::timeout(timeout, wait_for_ready(events, clip)).await {
        Ok(result) => result,
        Err(_) => Err(PlaybackError::TransitionTimeout {
            clip: clip.clone(),
            waited: timeout,
        }),
    }
}

async fn wait_for_ready(
    events: &mut broadcast::Receiver<MediaEvent>,
    clip: &ClipId,
) -> Result<(), PlaybackError> {
    loop {
        match events.recv().await {
            Ok(MediaEvent::Ready { source }) if &source == clip => return Ok(()),
            Ok(MediaEvent::LoadError { source, reason }) if &source == clip => {
                return Err(PlaybackError::MediaLoad { clip: source, reason });
            }
            // Late event from an earlier load
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, clip = %clip, "Surface events lagged while preloading");
            }
            Err(RecvError::Closed) => {
                return Err(PlaybackError::MediaLoad {
                    clip: clip.clone(),
                    reason: "surface event channel closed".to_string(),
                });
            }
        }
    }
}

/// Wait for `clip` to finish, bounded by `timeout` when one is given
pub async fn await_ended(
    mut events: broadcast::Receiver<MediaEvent>,
    clip: &ClipId,
    timeout: Option<Duration>,
) -> EndReason {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(MediaEvent::Ended { source }) if &source == clip => return EndReason::Ended,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return EndReason::SurfaceClosed,
            }
        }
    };
    match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .unwrap_or(EndReason::TimedOut),
        None => wait.await,
    }
}

/// Make `clip` the visible clip of `pair`
pub async fn crossfade<S: MediaSurface>(
    pair: &mut SurfacePair<S>,
    clip: &ClipId,
    looping: bool,
    timing: &CrossfadeTiming,
) -> CrossfadeOutcome {
    if pair.active().current_source().as_ref() == Some(clip) {
        let active = pair.active_mut();
        let events = active.subscribe();
        active.set_looping(looping);
        // Resumes a clip that already ran out; no-op while playing
        if let Err(e) = active.play().await {
            tracing::debug!(clip = %clip, error = %e, "Resume of reused clip refused");
        }
        return CrossfadeOutcome::Reused { events };
    }

    let mut events = preload(pair.inactive_mut(), clip, looping);
    if let Err(err) = await_ready(&mut events, clip, timing.ready_timeout).await {
        pair.inactive_mut().clear_source();
        return CrossfadeOutcome::Abandoned(err);
    }

    if let Err(e) = pair.inactive_mut().play().await {
        pair.inactive_mut().clear_source();
        return CrossfadeOutcome::Abandoned(PlaybackError::MediaLoad {
            clip: clip.clone(),
            reason: e.to_string(),
        });
    }

    tokio::time::sleep(timing.settle_delay).await;
    pair.swap();
    CrossfadeOutcome::Swapped { events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::Slot;
    use crate::surface::simulated::SimulatedBehavior;
    use crate::surface::{SimulatedSurface, SurfaceProbe};
    use tokio::time::Instant;

    fn clip(name: &str) -> ClipId {
        ClipId::new(name)
    }

    fn pair_with(
        behavior: SimulatedBehavior,
    ) -> (SurfacePair<SimulatedSurface>, SurfaceProbe, SurfaceProbe) {
        let a = SimulatedSurface::with_behavior("a", behavior.clone());
        let b = SimulatedSurface::with_behavior("b", behavior);
        let (pa, pb) = (a.probe(), b.probe());
        (SurfacePair::new(a, b), pa, pb)
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_after_ready_and_settle() {
        let (mut pair, pa, pb) = pair_with(SimulatedBehavior::default());
        let timing = CrossfadeTiming::default();

        let start = Instant::now();
        let outcome = crossfade(&mut pair, &clip("speak.mp4"), true, &timing).await;

        assert!(matches!(outcome, CrossfadeOutcome::Swapped { .. }));
        assert_eq!(pair.active_slot(), Slot::Secondary);
        assert_eq!(pb.source(), Some(clip("speak.mp4")));
        assert!(pb.is_visible() && pb.is_playing() && pb.is_looping());
        assert!(!pa.is_visible() && !pa.is_playing());
        // 20ms ready latency + 50ms settle
        assert_eq!(start.elapsed(), Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_clip_only_updates_loop_flag() {
        let (mut pair, pa, pb) = pair_with(SimulatedBehavior::default());
        let timing = CrossfadeTiming::default();
        crossfade(&mut pair, &clip("idle.mp4"), true, &timing).await;
        let loads = (pa.load_count(), pb.load_count());

        let outcome = crossfade(&mut pair, &clip("idle.mp4"), false, &timing).await;

        assert!(matches!(outcome, CrossfadeOutcome::Reused { .. }));
        assert_eq!((pa.load_count(), pb.load_count()), loads);
        assert_eq!(pair.active_slot(), Slot::Secondary);
        assert!(!pb.is_looping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_preload_is_abandoned_within_timeout() {
        let mut behavior = SimulatedBehavior::default();
        behavior.never_ready.insert(clip("stuck.mp4"));
        let (mut pair, _pa, _pb) = pair_with(behavior);
        let timing = CrossfadeTiming::default();
        crossfade(&mut pair, &clip("idle.mp4"), true, &timing).await;
        let active_before = pair.active_slot();

        let start = Instant::now();
        let outcome = crossfade(&mut pair, &clip("stuck.mp4"), true, &timing).await;

        assert!(matches!(
            outcome,
            CrossfadeOutcome::Abandoned(PlaybackError::TransitionTimeout { .. })
        ));
        assert_eq!(start.elapsed(), timing.ready_timeout);
        assert_eq!(pair.active_slot(), active_before);
        assert!(pair.is_consistent());
        // The idle clip is still the one shown
        assert_eq!(pair.active().current_source(), Some(clip("idle.mp4")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_error_is_abandoned() {
        let mut behavior = SimulatedBehavior::default();
        behavior.failing.insert(clip("broken.mp4"));
        let (mut pair, _pa, _pb) = pair_with(behavior);

        let outcome = crossfade(
            &mut pair,
            &clip("broken.mp4"),
            true,
            &CrossfadeTiming::default(),
        )
        .await;

        assert!(matches!(
            outcome,
            CrossfadeOutcome::Abandoned(PlaybackError::MediaLoad { .. })
        ));
        assert_eq!(pair.active_slot(), Slot::Primary);
        assert!(pair.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_play_is_abandoned() {
        let behavior = SimulatedBehavior {
            reject_play: true,
            ..SimulatedBehavior::default()
        };
        let (mut pair, _pa, pb) = pair_with(behavior);

        let outcome =
            crossfade(&mut pair, &clip("a.mp4"), true, &CrossfadeTiming::default()).await;

        assert!(!outcome.is_showing());
        assert!(!pb.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_during_settle_delay_is_delivered() {
        let mut behavior = SimulatedBehavior::default();
        behavior
            .clip_durations
            .insert(clip("blink.mp4"), Duration::from_millis(10));
        let (mut pair, _pa, pb) = pair_with(behavior);

        let outcome =
            crossfade(&mut pair, &clip("blink.mp4"), false, &CrossfadeTiming::default()).await;
        // The clip ran out before the swap
        assert!(!pb.is_playing());

        let events = outcome.into_events().unwrap();
        let reason = await_ended(events, &clip("blink.mp4"), Some(Duration::from_secs(1))).await;
        assert_eq!(reason, EndReason::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_preload_clears_inactive_source() {
        let mut behavior = SimulatedBehavior::default();
        behavior.failing.insert(clip("broken.mp4"));
        let (mut pair, _pa, pb) = pair_with(behavior);

        crossfade(&mut pair, &clip("broken.mp4"), true, &CrossfadeTiming::default()).await;

        assert_eq!(pb.source(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_ended_times_out() {
        let surface = SimulatedSurface::new("a");
        let events = surface.subscribe();

        let reason = await_ended(events, &clip("x"), Some(Duration::from_secs(1))).await;
        assert_eq!(reason, EndReason::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_ended_ignores_other_clips() {
        let mut surface = SimulatedSurface::new("a");
        let probe = surface.probe();
        let events = surface.subscribe();

        surface.set_source(&clip("old.mp4"));
        probe.emit_ended();
        surface.set_source(&clip("new.mp4"));
        probe.emit_ended();

        let reason = await_ended(events, &clip("new.mp4"), Some(Duration::from_secs(1))).await;
        assert_eq!(reason, EndReason::Ended);
    }
}
