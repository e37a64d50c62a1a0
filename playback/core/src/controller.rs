//! Playback Controller - The Character State Machine
//!
//! Owns the two playback surfaces and decides which clip is visible. It
//! reacts to three kinds of trigger:
//! - speech start/stop from the command source
//! - mode changes, either immediate or via a one-shot transition reply
//! - idle timeout, which plays a random idle action
//!
//! # State Machine
//!
//! ```text
//!            start_speaking              idle timeout / reply request
//!   Speaking ◀─────────────── Idle ───────────────────────────▶ Action
//!            ───────────────▶      ◀───────────────────────────
//!      stop_speaking / clip end          one-shot clip ends
//! ```
//!
//! Mode is orthogonal to these states. A transition reply commits the new
//! mode only after its clip ends, so observers see the old mode throughout.
//!
//! # Driving the controller
//!
//! Asynchronous completions (idle expiry, one-shot clip end) arrive as
//! [`ControllerSignal`]s on the receiver returned by
//! [`PlaybackController::new`] and must be fed back through
//! [`PlaybackController::handle_signal`]. [`ControllerHandle`](crate::actor::ControllerHandle)
//! does this in a serial actor loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::clips::{ClipId, ClipSet};
use crate::crossfade::{self, await_ended, CrossfadeOutcome, CrossfadeTiming, EndReason};
use crate::error::PlaybackError;
use crate::idle_timer::IdleTimer;
use crate::mode::{ClipRole, IdleAction, Mode, PlaybackState};
use crate::pair::{Slot, SurfacePair};
use crate::random::{StdRandom, UnitRandom};
use crate::surface::{MediaEvent, MediaSurface};

/// Controller tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Crossfade ready timeout and settle delay
    pub timing: CrossfadeTiming,
    /// Inactivity before a random idle action plays
    pub idle_timeout: Duration,
    /// Longest wait for a one-shot clip to end before moving on
    pub one_shot_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timing: CrossfadeTiming::default(),
            idle_timeout: Duration::from_secs(3),
            one_shot_timeout: Duration::from_secs(60),
        }
    }
}

/// Asynchronous completions fed back into the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerSignal {
    /// The idle timer ran out
    IdleExpired {
        /// Arming generation that produced this expiry
        generation: u64,
    },
    /// A watched clip finished (or its wait gave up)
    ClipFinished {
        /// Ticket issued when the watch started
        ticket: u64,
        /// How the wait ended
        reason: EndReason,
    },
}

/// What [`PlaybackController::handle_signal`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal was stale or suppressed
    Ignored,
    /// An idle action started
    IdleActionStarted(IdleAction),
    /// A one-shot idle action finished and the character is idle again
    ReturnedToIdle,
    /// The speaking clip ran out; speech ended
    SpeechEnded,
    /// A mode-transition reply finished and the new mode is committed
    ReplyCompleted {
        /// Ticket of the finished reply
        ticket: u64,
        /// Mode now in effect
        mode: Mode,
    },
}

/// Result of starting a mode-transition reply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStart {
    /// The reply is playing; completion arrives as [`SignalOutcome::ReplyCompleted`]
    Playing {
        /// Ticket identifying this reply
        ticket: u64,
    },
    /// The reply clip could not be shown; the mode was committed at once
    Completed,
}

/// Observable controller state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    /// Whether `initialize` has run
    pub initialized: bool,
    /// Current mode
    pub mode: Mode,
    /// Current playback state
    pub state: PlaybackState,
    /// Whether speech is in progress
    pub speaking: bool,
    /// Slot of the visible surface
    pub active_slot: Slot,
    /// Clip on the visible surface
    pub active_clip: Option<ClipId>,
    /// Whether the visible surface loops
    pub looping: bool,
    /// Whether a clip is being preloaded into the hidden surface
    pub preloading: bool,
    /// Whether the idle timer is armed
    pub idle_timer_armed: bool,
    /// Whether a mode-transition reply is playing
    pub reply_in_flight: bool,
}

/// Why a clip end is being watched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndWatch {
    Speech,
    IdleAction,
    ModeReply { to: Mode },
}

struct PendingEnd {
    ticket: u64,
    kind: EndWatch,
    watcher: JoinHandle<()>,
}

/// The dual-surface playback state machine
pub struct PlaybackController<S: MediaSurface> {
    clips: ClipSet,
    config: ControllerConfig,
    pair: SurfacePair<S>,
    mode: Mode,
    state: PlaybackState,
    speaking: bool,
    initialized: bool,
    preloading: bool,
    idle_timer: IdleTimer,
    random: Box<dyn UnitRandom>,
    signals: mpsc::UnboundedSender<ControllerSignal>,
    pending_end: Option<PendingEnd>,
    next_ticket: u64,
    snapshot: watch::Sender<ControllerSnapshot>,
}

impl<S: MediaSurface> PlaybackController<S> {
    /// Create a controller owning `primary` and `secondary`
    ///
    /// Returns the receiver on which the controller's timers and clip
    /// watchers report back.
    pub fn new(
        clips: ClipSet,
        config: ControllerConfig,
        primary: S,
        secondary: S,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerSignal>) {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let pair = SurfacePair::new(primary, secondary);
        let initial = ControllerSnapshot {
            initialized: false,
            mode: Mode::default(),
            state: PlaybackState::Idle,
            speaking: false,
            active_slot: pair.active_slot(),
            active_clip: None,
            looping: false,
            preloading: false,
            idle_timer_armed: false,
            reply_in_flight: false,
        };
        let (snapshot, _) = watch::channel(initial);

        let controller = Self {
            clips,
            config,
            pair,
            mode: Mode::default(),
            state: PlaybackState::Idle,
            speaking: false,
            initialized: false,
            preloading: false,
            idle_timer: IdleTimer::new(config.idle_timeout, signals.clone()),
            random: Box::new(StdRandom::from_entropy()),
            signals,
            pending_end: None,
            next_ticket: 0,
            snapshot,
        };
        (controller, signal_rx)
    }

    /// Replace the idle action random source
    #[must_use]
    pub fn with_random(mut self, random: impl UnitRandom + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether speech is in progress
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Whether `initialize` has run
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a mode-transition reply is playing
    pub fn reply_in_flight(&self) -> bool {
        matches!(
            self.pending_end,
            Some(PendingEnd {
                kind: EndWatch::ModeReply { .. },
                ..
            })
        )
    }

    /// Whether the idle timer is armed
    pub fn idle_timer_armed(&self) -> bool {
        self.idle_timer.is_armed()
    }

    /// The owned surface pair
    pub fn surfaces(&self) -> &SurfacePair<S> {
        &self.pair
    }

    /// Configured clips
    pub fn clips(&self) -> &ClipSet {
        &self.clips
    }

    /// Current observable state
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel that receives a snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.subscribe()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Show `mode`'s idle clip on the primary surface and arm the idle timer
    ///
    /// The controller enters Idle even when the clip fails to load; the
    /// failure is returned so the caller can report it.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::MediaLoad`] or [`PlaybackError::TransitionTimeout`]
    /// when the initial clip cannot be shown.
    pub async fn initialize(&mut self, mode: Mode) -> Result<(), PlaybackError> {
        if self.initialized {
            tracing::warn!(mode = %mode, "Playback controller already initialized");
            return Ok(());
        }

        tracing::info!(mode = %mode, "Initializing playback controller");
        self.mode = mode;
        self.state = PlaybackState::Idle;
        self.speaking = false;

        let clip = self.clip_for(ClipRole::Idle);
        self.preloading = true;
        self.publish();
        let result = self.load_active(&clip).await;
        self.preloading = false;

        self.initialized = true;
        self.idle_timer.arm();
        self.publish();

        match result {
            Ok(()) => {
                tracing::info!(clip = %clip, "Playback controller ready");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(clip = %clip, error = %err, "Initial clip failed; idle with no picture");
                Err(err)
            }
        }
    }

    /// Switch skins, re-deriving the clip for the current state
    ///
    /// A one-shot idle action in progress is dropped in favour of the new
    /// mode's idle clip.
    pub async fn set_mode(&mut self, mode: Mode) {
        if !self.ensure_initialized("set_mode") {
            return;
        }
        if mode == self.mode {
            tracing::debug!(mode = %mode, "Mode unchanged");
        } else {
            tracing::info!(from = %self.mode, to = %mode, "Mode change");
        }
        self.mode = mode;

        if self.speaking {
            self.show_speaking().await;
        } else {
            self.enter_idle().await;
        }
    }

    /// Begin the speaking loop; a no-op while already speaking
    pub async fn start_speaking(&mut self) {
        if !self.ensure_initialized("start_speaking") || self.speaking {
            return;
        }
        tracing::info!(mode = %self.mode, "Speaking started");
        self.speaking = true;
        self.idle_timer.disarm();
        self.show_speaking().await;
    }

    /// End the speaking loop and return to idle; a no-op when not speaking
    pub async fn stop_speaking(&mut self) {
        if !self.ensure_initialized("stop_speaking") || !self.speaking {
            return;
        }
        tracing::info!(mode = %self.mode, "Speaking stopped");
        self.speaking = false;
        self.enter_idle().await;
    }

    /// Start the one-shot reply for leaving `from`, committing `to` when it ends
    ///
    /// The idle timer stays disarmed and the state stays Action until the
    /// clip ends, reported through [`Self::handle_signal`]. If the clip cannot
    /// be shown the mode is committed immediately.
    pub async fn begin_mode_change_reply(&mut self, from: Mode, to: Mode) -> ReplyStart {
        if !self.ensure_initialized("mode_change_reply") {
            return ReplyStart::Completed;
        }
        if from != self.mode {
            tracing::warn!(from = %from, current = %self.mode, "Transition reply requested from a mode that is not current");
        }

        tracing::info!(from = %from, to = %to, "Playing mode transition reply");
        self.idle_timer.disarm();
        self.cancel_end_watch();
        self.state = PlaybackState::Action;

        let clip = self.clips.for_mode(from).transition_reply.clone();
        if let Some(events) = self.switch_to(&clip, false).await.into_events() {
            let ticket = self.watch_end(EndWatch::ModeReply { to }, events);
            ReplyStart::Playing { ticket }
        } else {
            self.commit_mode(to).await;
            ReplyStart::Completed
        }
    }

    /// Play one of the current mode's idle actions once
    ///
    /// Suppressed while speaking and outside Idle. Returns the variant played.
    pub async fn play_random_idle_action(&mut self) -> Option<IdleAction> {
        if !self.initialized {
            return None;
        }
        if self.speaking {
            tracing::debug!("Idle action suppressed while speaking");
            return None;
        }
        if self.state != PlaybackState::Idle {
            tracing::debug!(state = %self.state, "Idle action suppressed outside idle");
            return None;
        }

        let action = IdleAction::from_sample(self.random.next_unit());
        tracing::info!(mode = %self.mode, action = ?action, "Playing idle action");
        self.idle_timer.disarm();
        self.state = PlaybackState::Action;

        let clip = self.clip_for(action.role());
        if let Some(events) = self.switch_to(&clip, false).await.into_events() {
            self.watch_end(EndWatch::IdleAction, events);
        } else {
            self.enter_idle().await;
        }
        Some(action)
    }

    /// Note a user interaction; re-arms the idle timer while idle
    pub fn user_activity(&mut self) {
        if self.initialized && self.state == PlaybackState::Idle && !self.speaking {
            self.idle_timer.arm();
            self.publish();
        }
    }

    /// Apply an asynchronous completion
    pub async fn handle_signal(&mut self, signal: ControllerSignal) -> SignalOutcome {
        match signal {
            ControllerSignal::IdleExpired { generation } => {
                if !self.idle_timer.take_expiry(generation) {
                    return SignalOutcome::Ignored;
                }
                self.publish();
                match self.play_random_idle_action().await {
                    Some(action) => SignalOutcome::IdleActionStarted(action),
                    None => SignalOutcome::Ignored,
                }
            }
            ControllerSignal::ClipFinished { ticket, reason } => {
                let pending = match self.pending_end.take() {
                    Some(p) if p.ticket == ticket => p,
                    other => {
                        self.pending_end = other;
                        return SignalOutcome::Ignored;
                    }
                };
                if reason != EndReason::Ended {
                    tracing::warn!(ticket, ?reason, kind = ?pending.kind, "Clip end never arrived; moving on");
                }
                self.on_clip_finished(pending.kind, ticket).await
            }
        }
    }

    /// Stop background work (idle timer, clip watchers)
    pub fn shutdown(&mut self) {
        self.idle_timer.disarm();
        self.cancel_end_watch();
        self.publish();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn on_clip_finished(&mut self, kind: EndWatch, ticket: u64) -> SignalOutcome {
        match kind {
            EndWatch::Speech => {
                if self.speaking {
                    tracing::info!("Speaking clip ended");
                    self.speaking = false;
                    self.enter_idle().await;
                }
                SignalOutcome::SpeechEnded
            }
            EndWatch::IdleAction => {
                tracing::debug!("Idle action finished");
                self.enter_idle().await;
                SignalOutcome::ReturnedToIdle
            }
            EndWatch::ModeReply { to } => {
                self.commit_mode(to).await;
                SignalOutcome::ReplyCompleted { ticket, mode: to }
            }
        }
    }

    async fn commit_mode(&mut self, mode: Mode) {
        tracing::info!(from = %self.mode, to = %mode, "Mode committed after transition reply");
        self.mode = mode;
        if self.speaking {
            self.show_speaking().await;
        } else {
            self.enter_idle().await;
        }
    }

    async fn show_speaking(&mut self) {
        self.cancel_end_watch();
        self.state = PlaybackState::Speaking;
        let clip = self.clip_for(ClipRole::Speaking);
        if let Some(events) = self.switch_to(&clip, true).await.into_events() {
            self.watch_end(EndWatch::Speech, events);
        }
    }

    async fn enter_idle(&mut self) {
        self.cancel_end_watch();
        self.state = PlaybackState::Idle;
        let clip = self.clip_for(ClipRole::Idle);
        self.switch_to(&clip, true).await;
        if !self.speaking {
            self.idle_timer.arm();
        }
        self.publish();
    }

    async fn load_active(&mut self, clip: &ClipId) -> Result<(), PlaybackError> {
        let timeout = self.config.timing.ready_timeout;
        let active = self.pair.active_mut();
        let mut events = crossfade::preload(active, clip, true);
        let result = match crossfade::await_ready(&mut events, clip, timeout).await {
            Ok(()) => {
                active.set_muted(false);
                active.play().await.map_err(|e| PlaybackError::MediaLoad {
                    clip: clip.clone(),
                    reason: e.to_string(),
                })
            }
            Err(err) => Err(err),
        };
        // A clip that never came up must not count as shown
        if result.is_err() {
            active.clear_source();
        }
        result
    }

    async fn switch_to(&mut self, clip: &ClipId, looping: bool) -> CrossfadeOutcome {
        let needs_load = self.pair.active().current_source().as_ref() != Some(clip);
        if needs_load {
            self.preloading = true;
            self.publish();
        }

        let outcome = crossfade::crossfade(&mut self.pair, clip, looping, &self.config.timing).await;
        self.preloading = false;

        match &outcome {
            CrossfadeOutcome::Swapped { .. } => {
                tracing::debug!(clip = %clip, looping, slot = ?self.pair.active_slot(), "Crossfade complete");
            }
            CrossfadeOutcome::Reused { .. } => {
                tracing::debug!(clip = %clip, looping, "Clip already showing");
            }
            CrossfadeOutcome::Abandoned(err) => {
                tracing::warn!(clip = %clip, error = %err, "Transition abandoned; keeping last frame");
            }
        }
        self.publish();
        outcome
    }

    fn watch_end(&mut self, kind: EndWatch, events: broadcast::Receiver<MediaEvent>) -> u64 {
        self.cancel_end_watch();
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let clip = self.pair.active().current_source();
        let timeout = match kind {
            EndWatch::Speech => None,
            EndWatch::IdleAction | EndWatch::ModeReply { .. } => Some(self.config.one_shot_timeout),
        };
        let signals = self.signals.clone();

        let watcher = tokio::spawn(async move {
            let reason = match clip {
                Some(clip) => await_ended(events, &clip, timeout).await,
                None => EndReason::SurfaceClosed,
            };
            let _ = signals.send(ControllerSignal::ClipFinished { ticket, reason });
        });

        self.pending_end = Some(PendingEnd {
            ticket,
            kind,
            watcher,
        });
        self.publish();
        ticket
    }

    fn cancel_end_watch(&mut self) {
        if let Some(pending) = self.pending_end.take() {
            pending.watcher.abort();
            tracing::trace!(ticket = pending.ticket, kind = ?pending.kind, "Clip watch cancelled");
        }
    }

    fn clip_for(&self, role: ClipRole) -> ClipId {
        self.clips
            .clip(self.mode, role)
            .cloned()
            .unwrap_or_else(|| self.clips.for_mode(self.mode).idle.clone())
    }

    fn ensure_initialized(&self, operation: &'static str) -> bool {
        if !self.initialized {
            tracing::warn!(operation, "Ignoring request before initialize");
        }
        self.initialized
    }

    fn publish(&self) {
        let active = self.pair.active();
        self.snapshot.send_replace(ControllerSnapshot {
            initialized: self.initialized,
            mode: self.mode,
            state: self.state,
            speaking: self.speaking,
            active_slot: self.pair.active_slot(),
            active_clip: active.current_source(),
            looping: active.is_looping(),
            preloading: self.preloading,
            idle_timer_armed: self.idle_timer.is_armed(),
            reply_in_flight: self.reply_in_flight(),
        });
    }
}

impl<S: MediaSurface> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.cancel_end_watch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;
    use crate::surface::simulated::SimulatedBehavior;
    use crate::surface::{SimulatedSurface, SurfaceProbe};
    use pretty_assertions::assert_eq;

    struct Rig {
        controller: PlaybackController<SimulatedSurface>,
        signals: mpsc::UnboundedReceiver<ControllerSignal>,
        primary: SurfaceProbe,
        secondary: SurfaceProbe,
    }

    impl Rig {
        fn new(behavior: SimulatedBehavior) -> Self {
            let a = SimulatedSurface::with_behavior("primary", behavior.clone());
            let b = SimulatedSurface::with_behavior("secondary", behavior);
            let (primary, secondary) = (a.probe(), b.probe());
            let (controller, signals) =
                PlaybackController::new(ClipSet::default(), ControllerConfig::default(), a, b);
            Self {
                controller,
                signals,
                primary,
                secondary,
            }
        }

        fn visible_count(&self) -> usize {
            usize::from(self.primary.is_visible()) + usize::from(self.secondary.is_visible())
        }

        fn active_clip(&self) -> Option<ClipId> {
            self.controller.surfaces().active().current_source()
        }

        fn loads(&self) -> usize {
            self.primary.load_count() + self.secondary.load_count()
        }

        async fn pump(&mut self) -> SignalOutcome {
            let signal = self.signals.recv().await.unwrap();
            self.controller.handle_signal(signal).await
        }
    }

    fn clips() -> ClipSet {
        ClipSet::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_shows_idle_and_arms_timer() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Normal).await.unwrap();

        assert_eq!(rig.controller.state(), PlaybackState::Idle);
        assert_eq!(rig.controller.mode(), Mode::Normal);
        assert!(rig.controller.idle_timer_armed());
        assert_eq!(rig.active_clip(), Some(clips().for_mode(Mode::Normal).idle.clone()));
        assert!(rig.primary.is_visible() && rig.primary.is_playing());
        assert!(!rig.primary.is_muted());
        assert_eq!(rig.visible_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_failure_still_enters_idle() {
        let mut behavior = SimulatedBehavior::default();
        behavior
            .failing
            .insert(clips().for_mode(Mode::Armored).idle.clone());
        let mut rig = Rig::new(behavior);

        let err = rig.controller.initialize(Mode::Armored).await.unwrap_err();
        assert!(matches!(err, PlaybackError::MediaLoad { .. }));
        assert!(rig.controller.is_initialized());
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
        assert!(rig.controller.idle_timer_armed());
        assert_eq!(rig.visible_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initial_clip_loads_once_media_recovers() {
        let armored_idle = clips().for_mode(Mode::Armored).idle.clone();
        let mut behavior = SimulatedBehavior::default();
        behavior.never_ready.insert(armored_idle.clone());
        let mut rig = Rig::new(behavior);

        let err = rig.controller.initialize(Mode::Armored).await.unwrap_err();
        assert!(matches!(err, PlaybackError::TransitionTimeout { .. }));
        assert_eq!(rig.active_clip(), None);
        assert_eq!(rig.controller.snapshot().active_clip, None);
        let loads = rig.loads();

        rig.primary.update_behavior(|b| b.never_ready.clear());
        rig.secondary.update_behavior(|b| b.never_ready.clear());
        rig.controller.set_mode(Mode::Armored).await;

        assert_eq!(rig.loads(), loads + 1);
        assert_eq!(rig.active_clip(), Some(armored_idle.clone()));
        assert_eq!(rig.controller.snapshot().active_clip, Some(armored_idle));
        assert_eq!(rig.visible_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_ending_before_swap_returns_to_idle() {
        let normal = clips().for_mode(Mode::Normal).clone();
        let mut behavior = SimulatedBehavior::default();
        behavior
            .clip_durations
            .insert(normal.idle_action_1.clone(), Duration::from_millis(10));
        let mut rig = Rig::new(behavior);
        rig.controller = rig.controller.with_random(ScriptedRandom::new([0.1]));
        rig.controller.initialize(Mode::Normal).await.unwrap();
        assert_eq!(rig.pump().await, SignalOutcome::IdleActionStarted(IdleAction::First));

        let start = tokio::time::Instant::now();
        assert_eq!(rig.pump().await, SignalOutcome::ReturnedToIdle);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
        assert_eq!(rig.active_clip(), Some(normal.idle.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_before_initialize_are_ignored() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.start_speaking().await;
        rig.controller.set_mode(Mode::Normal).await;

        assert!(!rig.controller.is_speaking());
        assert_eq!(rig.loads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaking_round_trip() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Normal).await.unwrap();

        rig.controller.start_speaking().await;
        assert_eq!(rig.controller.state(), PlaybackState::Speaking);
        assert!(!rig.controller.idle_timer_armed());
        assert_eq!(
            rig.active_clip(),
            Some(clips().for_mode(Mode::Normal).speaking.clone())
        );
        assert_eq!(rig.visible_count(), 1);

        // Repeated start does not reload
        let loads = rig.loads();
        rig.controller.start_speaking().await;
        assert_eq!(rig.loads(), loads);

        rig.controller.stop_speaking().await;
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
        assert!(rig.controller.idle_timer_armed());
        assert_eq!(rig.active_clip(), Some(clips().for_mode(Mode::Normal).idle.clone()));

        // Repeated stop is a no-op
        let loads = rig.loads();
        rig.controller.stop_speaking().await;
        assert_eq!(rig.loads(), loads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_action_suppressed_while_speaking() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Normal).await.unwrap();
        rig.controller.start_speaking().await;

        assert_eq!(rig.controller.play_random_idle_action().await, None);
        assert_eq!(rig.controller.state(), PlaybackState::Speaking);
        assert!(!rig.controller.idle_timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_mode_does_not_reload() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Armored).await.unwrap();
        let loads = rig.loads();

        rig.controller.set_mode(Mode::Armored).await;

        assert_eq!(rig.loads(), loads);
        assert!(rig.controller.surfaces().active().is_looping());
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_armored_speaking_reuses_idle_clip() {
        // Armored speaking and idle share a file by default
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Armored).await.unwrap();
        let loads = rig.loads();

        rig.controller.start_speaking().await;

        assert_eq!(rig.loads(), loads);
        assert_eq!(rig.controller.state(), PlaybackState::Speaking);
        assert!(rig.controller.surfaces().active().is_looping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_plays_scripted_actions() {
        let mut behavior = SimulatedBehavior::default();
        let normal = clips().for_mode(Mode::Normal).clone();
        behavior
            .clip_durations
            .insert(normal.idle_action_1.clone(), Duration::from_secs(1));
        behavior
            .clip_durations
            .insert(normal.idle_action_2.clone(), Duration::from_secs(1));
        let mut rig = Rig::new(behavior);
        rig.controller = rig
            .controller
            .with_random(ScriptedRandom::new([0.49, 0.51]));
        rig.controller.initialize(Mode::Normal).await.unwrap();

        assert_eq!(rig.pump().await, SignalOutcome::IdleActionStarted(IdleAction::First));
        assert_eq!(rig.controller.state(), PlaybackState::Action);
        assert_eq!(rig.active_clip(), Some(normal.idle_action_1.clone()));
        assert!(!rig.controller.surfaces().active().is_looping());

        assert_eq!(rig.pump().await, SignalOutcome::ReturnedToIdle);
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
        assert_eq!(rig.active_clip(), Some(normal.idle.clone()));

        assert_eq!(rig.pump().await, SignalOutcome::IdleActionStarted(IdleAction::Second));
        assert_eq!(rig.active_clip(), Some(normal.idle_action_2.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_change_reply_commits_on_end() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Normal).await.unwrap();

        let start = rig
            .controller
            .begin_mode_change_reply(Mode::Normal, Mode::Armored)
            .await;
        assert!(matches!(start, ReplyStart::Playing { .. }));
        assert_eq!(rig.controller.mode(), Mode::Normal);
        assert_eq!(rig.controller.state(), PlaybackState::Action);
        assert!(rig.controller.reply_in_flight());
        assert!(!rig.controller.idle_timer_armed());
        assert_eq!(
            rig.active_clip(),
            Some(clips().for_mode(Mode::Normal).transition_reply.clone())
        );

        let active_probe = if rig.primary.is_visible() {
            rig.primary.clone()
        } else {
            rig.secondary.clone()
        };
        active_probe.emit_ended();

        let outcome = rig.pump().await;
        assert!(matches!(
            outcome,
            SignalOutcome::ReplyCompleted {
                mode: Mode::Armored,
                ..
            }
        ));
        assert_eq!(rig.controller.mode(), Mode::Armored);
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
        assert_eq!(
            rig.active_clip(),
            Some(clips().for_mode(Mode::Armored).idle.clone())
        );
        assert!(rig.controller.surfaces().active().is_looping());
        assert!(rig.controller.idle_timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_that_never_ends_times_out() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Armored).await.unwrap();
        rig.controller
            .begin_mode_change_reply(Mode::Armored, Mode::Normal)
            .await;

        let start = tokio::time::Instant::now();
        let outcome = rig.pump().await;

        assert!(matches!(outcome, SignalOutcome::ReplyCompleted { .. }));
        assert!(start.elapsed() >= ControllerConfig::default().one_shot_timeout);
        assert_eq!(rig.controller.mode(), Mode::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unloadable_reply_commits_immediately() {
        let mut behavior = SimulatedBehavior::default();
        behavior
            .failing
            .insert(clips().for_mode(Mode::Normal).transition_reply.clone());
        let mut rig = Rig::new(behavior);
        rig.controller.initialize(Mode::Normal).await.unwrap();

        let start = rig
            .controller
            .begin_mode_change_reply(Mode::Normal, Mode::Armored)
            .await;

        assert_eq!(start, ReplyStart::Completed);
        assert_eq!(rig.controller.mode(), Mode::Armored);
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_speaking_preempts_idle_action() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller = rig.controller.with_random(ScriptedRandom::new([0.1]));
        rig.controller.initialize(Mode::Normal).await.unwrap();
        assert!(matches!(rig.pump().await, SignalOutcome::IdleActionStarted(_)));

        rig.controller.start_speaking().await;

        assert_eq!(rig.controller.state(), PlaybackState::Speaking);
        assert_eq!(
            rig.active_clip(),
            Some(clips().for_mode(Mode::Normal).speaking.clone())
        );
        assert_eq!(rig.visible_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_activity_only_rearms_when_idle() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Normal).await.unwrap();
        rig.controller.start_speaking().await;

        rig.controller.user_activity();
        assert!(!rig.controller.idle_timer_armed());

        rig.controller.stop_speaking().await;
        rig.controller.user_activity();
        assert!(rig.controller.idle_timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_idle_expiry_ignored() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        rig.controller.initialize(Mode::Normal).await.unwrap();

        let outcome = rig
            .controller
            .handle_signal(ControllerSignal::IdleExpired { generation: 999 })
            .await;
        assert_eq!(outcome, SignalOutcome::Ignored);
        assert_eq!(rig.controller.state(), PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_tracks_state() {
        let mut rig = Rig::new(SimulatedBehavior::default());
        let rx = rig.controller.subscribe();
        assert!(!rx.borrow().initialized);

        rig.controller.initialize(Mode::Normal).await.unwrap();
        rig.controller.start_speaking().await;

        let snapshot = rx.borrow().clone();
        assert!(snapshot.initialized);
        assert!(snapshot.speaking);
        assert_eq!(snapshot.state, PlaybackState::Speaking);
        assert_eq!(snapshot.mode, Mode::Normal);
        assert!(!snapshot.preloading);
        assert!(!snapshot.idle_timer_armed);
        assert_eq!(snapshot.active_slot, rig.controller.surfaces().active_slot());
    }
}
