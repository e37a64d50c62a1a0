//! Simulated Surface
//!
//! In-memory [`MediaSurface`] that behaves like a browser video element on
//! a tokio clock: `load` reports ready after a configurable latency, and a
//! non-looping clip with a known duration reports ended when it runs out.
//!
//! A [`SurfaceProbe`] shares state with the surface so tests and the daemon
//! can observe it (load counts, visibility) and inject events after the
//! surface itself has been moved into the controller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::clips::ClipId;

use super::{MediaEvent, MediaSurface, SurfaceError, EVENT_CHANNEL_CAPACITY};

/// How a simulated surface responds to loads and playback
#[derive(Clone, Debug)]
pub struct SimulatedBehavior {
    /// Delay between `load` and the `Ready` event
    pub ready_latency: Duration,
    /// Known clip lengths; non-looping clips end after this long
    pub clip_durations: HashMap<ClipId, Duration>,
    /// Clips that never report ready
    pub never_ready: HashSet<ClipId>,
    /// Clips that report a load error instead of ready
    pub failing: HashSet<ClipId>,
    /// Whether `play` is refused
    pub reject_play: bool,
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self {
            ready_latency: Duration::from_millis(20),
            clip_durations: HashMap::new(),
            never_ready: HashSet::new(),
            failing: HashSet::new(),
            reject_play: false,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    source: Option<ClipId>,
    looping: bool,
    muted: bool,
    visible: bool,
    playing: bool,
    load_count: usize,
    play_count: usize,
    played_before: Duration,
    started_at: Option<Instant>,
    ready_task: Option<JoinHandle<()>>,
    end_task: Option<JoinHandle<()>>,
}

impl Shared {
    fn elapsed(&self) -> Duration {
        let running = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        self.played_before + running
    }

    fn cancel_ready(&mut self) {
        if let Some(task) = self.ready_task.take() {
            task.abort();
        }
    }

    fn cancel_end(&mut self) {
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }
}

struct Inner {
    shared: Mutex<Shared>,
    behavior: Mutex<SimulatedBehavior>,
    events: broadcast::Sender<MediaEvent>,
}

impl Inner {
    fn emit(&self, event: MediaEvent) {
        // No receivers is fine: nobody is waiting on this surface
        let _ = self.events.send(event);
    }

    /// Schedule the `Ended` event for the remainder of a non-looping clip
    fn schedule_end(self: &Arc<Self>, shared: &mut Shared) {
        shared.cancel_end();
        if shared.looping || !shared.playing {
            return;
        }
        let Some(source) = shared.source.clone() else {
            return;
        };
        let Some(duration) = self.behavior.lock().clip_durations.get(&source).copied() else {
            return;
        };

        let elapsed = shared.elapsed();
        let remaining = if duration.is_zero() {
            Duration::ZERO
        } else {
            let into_cycle = elapsed.as_nanos() % duration.as_nanos();
            duration - Duration::from_nanos(u64::try_from(into_cycle).unwrap_or(0))
        };

        let inner = Arc::clone(self);
        shared.end_task = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            {
                let mut shared = inner.shared.lock();
                shared.played_before = shared.elapsed();
                shared.started_at = None;
                shared.playing = false;
                shared.end_task = None;
            }
            inner.emit(MediaEvent::Ended { source });
        }));
    }
}

/// In-memory media surface driven by the tokio clock
pub struct SimulatedSurface {
    name: String,
    inner: Arc<Inner>,
}

impl SimulatedSurface {
    /// Create a surface with default behavior
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_behavior(name, SimulatedBehavior::default())
    }

    /// Create a surface with explicit behavior
    pub fn with_behavior(name: impl Into<String>, behavior: SimulatedBehavior) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared::default()),
                behavior: Mutex::new(behavior),
                events,
            }),
        }
    }

    /// Observer sharing this surface's state
    #[must_use]
    pub fn probe(&self) -> SurfaceProbe {
        SurfaceProbe {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for SimulatedSurface {
    fn drop(&mut self) {
        let mut shared = self.inner.shared.lock();
        shared.cancel_ready();
        shared.cancel_end();
    }
}

#[async_trait]
impl MediaSurface for SimulatedSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_source(&mut self, clip: &ClipId) {
        let mut shared = self.inner.shared.lock();
        shared.source = Some(clip.clone());
    }

    fn clear_source(&mut self) {
        let mut shared = self.inner.shared.lock();
        shared.cancel_ready();
        shared.cancel_end();
        shared.source = None;
        shared.playing = false;
        shared.started_at = None;
        shared.played_before = Duration::ZERO;
    }

    fn load(&mut self) {
        let mut shared = self.inner.shared.lock();
        shared.cancel_ready();
        shared.cancel_end();
        shared.load_count += 1;
        shared.playing = false;
        shared.started_at = None;
        shared.played_before = Duration::ZERO;

        let Some(source) = shared.source.clone() else {
            return;
        };

        let (latency, never_ready, failing) = {
            let behavior = self.inner.behavior.lock();
            (
                behavior.ready_latency,
                behavior.never_ready.contains(&source),
                behavior.failing.contains(&source),
            )
        };
        if never_ready {
            tracing::trace!(surface = %self.name, clip = %source, "Simulated load stalls");
            return;
        }

        let inner = Arc::clone(&self.inner);
        shared.ready_task = Some(tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            inner.shared.lock().ready_task = None;
            if failing {
                inner.emit(MediaEvent::LoadError {
                    source,
                    reason: "simulated load failure".to_string(),
                });
            } else {
                inner.emit(MediaEvent::Ready { source });
            }
        }));
    }

    async fn play(&mut self) -> Result<(), SurfaceError> {
        if self.inner.behavior.lock().reject_play {
            return Err(SurfaceError::PlaybackRejected(
                "simulated autoplay block".to_string(),
            ));
        }
        let mut shared = self.inner.shared.lock();
        if shared.source.is_none() {
            return Err(SurfaceError::NoSource);
        }
        if !shared.playing {
            shared.playing = true;
            shared.play_count += 1;
            shared.started_at = Some(Instant::now());
        }
        self.inner.schedule_end(&mut shared);
        Ok(())
    }

    fn pause(&mut self) {
        let mut shared = self.inner.shared.lock();
        shared.cancel_end();
        shared.played_before = shared.elapsed();
        shared.started_at = None;
        shared.playing = false;
    }

    fn current_source(&self) -> Option<ClipId> {
        self.inner.shared.lock().source.clone()
    }

    fn set_looping(&mut self, looping: bool) {
        let mut shared = self.inner.shared.lock();
        shared.looping = looping;
        self.inner.schedule_end(&mut shared);
    }

    fn is_looping(&self) -> bool {
        self.inner.shared.lock().looping
    }

    fn set_muted(&mut self, muted: bool) {
        self.inner.shared.lock().muted = muted;
    }

    fn set_visible(&mut self, visible: bool) {
        self.inner.shared.lock().visible = visible;
    }

    fn is_visible(&self) -> bool {
        self.inner.shared.lock().visible
    }

    fn position(&self) -> Duration {
        let shared = self.inner.shared.lock();
        let elapsed = shared.elapsed();
        let duration = shared
            .source
            .as_ref()
            .and_then(|s| self.inner.behavior.lock().clip_durations.get(s).copied());
        match duration {
            Some(d) if shared.looping && !d.is_zero() => {
                let nanos = elapsed.as_nanos() % d.as_nanos();
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
            }
            Some(d) => elapsed.min(d),
            None => elapsed,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.inner.events.subscribe()
    }
}

/// Read and poke access to a [`SimulatedSurface`] after it has been handed off
#[derive(Clone)]
pub struct SurfaceProbe {
    name: String,
    inner: Arc<Inner>,
}

impl SurfaceProbe {
    /// Surface name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of `load` calls so far
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.inner.shared.lock().load_count
    }

    /// Number of times playback started from a paused state
    #[must_use]
    pub fn play_count(&self) -> usize {
        self.inner.shared.lock().play_count
    }

    /// Current source
    #[must_use]
    pub fn source(&self) -> Option<ClipId> {
        self.inner.shared.lock().source.clone()
    }

    /// Whether the surface is shown
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.inner.shared.lock().visible
    }

    /// Whether the surface is playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.inner.shared.lock().playing
    }

    /// Whether the surface loops
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.inner.shared.lock().looping
    }

    /// Whether the surface is muted
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.inner.shared.lock().muted
    }

    /// Replace the behavior used by future loads
    pub fn set_behavior(&self, behavior: SimulatedBehavior) {
        *self.inner.behavior.lock() = behavior;
    }

    /// Edit the behavior used by future loads
    pub fn update_behavior(&self, f: impl FnOnce(&mut SimulatedBehavior)) {
        f(&mut self.inner.behavior.lock());
    }

    /// Report the current clip as ended, as if it ran out
    pub fn emit_ended(&self) {
        let source = {
            let mut shared = self.inner.shared.lock();
            shared.cancel_end();
            if !shared.looping {
                shared.played_before = shared.elapsed();
                shared.started_at = None;
                shared.playing = false;
            }
            shared.source.clone()
        };
        if let Some(source) = source {
            self.inner.emit(MediaEvent::Ended { source });
        }
    }

    /// Report the current clip as ready
    pub fn emit_ready(&self) {
        if let Some(source) = self.source() {
            self.inner.emit(MediaEvent::Ready { source });
        }
    }
}
