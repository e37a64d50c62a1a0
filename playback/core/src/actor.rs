//! Controller Actor
//!
//! Runs a [`PlaybackController`] on its own task and exposes it through a
//! cloneable [`ControllerHandle`]. The actor is the single writer: commands
//! and timer/clip signals are applied one at a time, so two transitions can
//! never interleave on the surface pair.
//!
//! # Ordering
//!
//! - Every transition command runs to completion (or its bounded timeout)
//!   before the next one starts.
//! - While a mode-transition reply is playing, further transition commands
//!   are held in arrival order and applied once the reply completes.
//! - Snapshots are published on a watch channel and can be read at any
//!   time without queuing behind in-flight work.

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::controller::{
    ControllerSignal, ControllerSnapshot, PlaybackController, ReplyStart, SignalOutcome,
};
use crate::error::PlaybackError;
use crate::mode::Mode;
use crate::surface::MediaSurface;

/// Capacity of the command queue
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

type Reply = oneshot::Sender<Result<(), PlaybackError>>;

enum Command {
    Initialize { mode: Mode, respond: Reply },
    SetMode { mode: Mode, respond: Reply },
    StartSpeaking { respond: Reply },
    StopSpeaking { respond: Reply },
    ModeChangeReply { from: Mode, to: Mode, respond: Reply },
    UserActivity,
    Shutdown { respond: oneshot::Sender<()> },
}

impl Command {
    /// Commands that move the surfaces and must wait out a reply
    fn is_transition(&self) -> bool {
        matches!(
            self,
            Self::SetMode { .. }
                | Self::StartSpeaking { .. }
                | Self::StopSpeaking { .. }
                | Self::ModeChangeReply { .. }
        )
    }

    fn reject(self, err: PlaybackError) {
        match self {
            Self::Initialize { respond, .. }
            | Self::SetMode { respond, .. }
            | Self::StartSpeaking { respond }
            | Self::StopSpeaking { respond }
            | Self::ModeChangeReply { respond, .. } => {
                let _ = respond.send(Err(err));
            }
            Self::UserActivity | Self::Shutdown { .. } => {}
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable command source for a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ControllerSnapshot>,
}

impl ControllerHandle {
    /// Move `controller` onto a new task
    ///
    /// `signals` is the receiver returned alongside the controller by
    /// [`PlaybackController::new`].
    pub fn spawn<S: MediaSurface>(
        controller: PlaybackController<S>,
        signals: mpsc::UnboundedReceiver<ControllerSignal>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let snapshot = controller.subscribe();
        let actor = Actor {
            controller,
            signals,
            commands: rx,
            deferred: VecDeque::new(),
            reply_waiter: None,
        };
        let task = tokio::spawn(actor.run());
        (
            Self {
                commands: tx,
                snapshot,
            },
            task,
        )
    }

    /// Show the idle clip for `mode` and start the idle timer
    ///
    /// # Errors
    ///
    /// The media error when the first clip cannot be shown (the controller
    /// is usable regardless), or [`PlaybackError::ControllerStopped`].
    pub async fn initialize(&self, mode: Mode) -> Result<(), PlaybackError> {
        self.request(|respond| Command::Initialize { mode, respond })
            .await
    }

    /// Switch skins immediately
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NotInitialized`] or [`PlaybackError::ControllerStopped`].
    pub async fn set_mode(&self, mode: Mode) -> Result<(), PlaybackError> {
        self.request(|respond| Command::SetMode { mode, respond })
            .await
    }

    /// Begin the speaking loop
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NotInitialized`] or [`PlaybackError::ControllerStopped`].
    pub async fn start_speaking(&self) -> Result<(), PlaybackError> {
        self.request(|respond| Command::StartSpeaking { respond })
            .await
    }

    /// End the speaking loop
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NotInitialized`] or [`PlaybackError::ControllerStopped`].
    pub async fn stop_speaking(&self) -> Result<(), PlaybackError> {
        self.request(|respond| Command::StopSpeaking { respond })
            .await
    }

    /// Play the reply for leaving `from`, resolving once `to` is committed
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NotInitialized`] or [`PlaybackError::ControllerStopped`].
    pub async fn play_mode_change_reply(&self, from: Mode, to: Mode) -> Result<(), PlaybackError> {
        self.request(|respond| Command::ModeChangeReply { from, to, respond })
            .await
    }

    /// Report a user interaction; never waits
    pub fn user_activity(&self) {
        if let Err(e) = self.commands.try_send(Command::UserActivity) {
            tracing::trace!(error = %e, "User activity dropped");
        }
    }

    /// Speak for as long as `work` runs
    ///
    /// Speaking stops once `work` completes, whatever its output.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NotInitialized`] or [`PlaybackError::ControllerStopped`]
    /// from starting or stopping speech.
    pub async fn speak_while<F: Future>(&self, work: F) -> Result<F::Output, PlaybackError> {
        self.start_speaking().await?;
        let output = work.await;
        self.stop_speaking().await?;
        Ok(output)
    }

    /// Latest published state
    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.clone()
    }

    /// Whether the actor task is still accepting commands
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Stop the actor; pending requests fail with `ControllerStopped`
    pub async fn shutdown(&self) {
        let (respond, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { respond }).await.is_ok() {
            let _ = done.await;
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(Reply) -> Command,
    ) -> Result<(), PlaybackError> {
        let (respond, response) = oneshot::channel();
        self.commands
            .send(make(respond))
            .await
            .map_err(|_| PlaybackError::ControllerStopped)?;
        response.await.map_err(|_| PlaybackError::ControllerStopped)?
    }
}

// ============================================================================
// Actor loop
// ============================================================================

struct Actor<S: MediaSurface> {
    controller: PlaybackController<S>,
    signals: mpsc::UnboundedReceiver<ControllerSignal>,
    commands: mpsc::Receiver<Command>,
    deferred: VecDeque<Command>,
    reply_waiter: Option<(u64, Reply)>,
}

enum Flow {
    Continue,
    Stop,
}

impl<S: MediaSurface> Actor<S> {
    async fn run(mut self) {
        tracing::debug!("Playback actor started");
        loop {
            let flow = tokio::select! {
                biased;
                Some(signal) = self.signals.recv() => {
                    self.on_signal(signal).await
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => Flow::Stop,
                },
            };
            if matches!(flow, Flow::Stop) {
                break;
            }
        }

        self.controller.shutdown();
        for command in self.deferred.drain(..) {
            command.reject(PlaybackError::ControllerStopped);
        }
        tracing::debug!("Playback actor stopped");
    }

    async fn on_signal(&mut self, signal: ControllerSignal) -> Flow {
        let outcome = self.controller.handle_signal(signal).await;
        tracing::trace!(?signal, ?outcome, "Controller signal handled");

        if let SignalOutcome::ReplyCompleted { ticket, .. } = outcome {
            if let Some((waiting, respond)) = self.reply_waiter.take() {
                if waiting == ticket {
                    let _ = respond.send(Ok(()));
                } else {
                    self.reply_waiter = Some((waiting, respond));
                }
            }
            return self.drain_deferred().await;
        }
        Flow::Continue
    }

    async fn drain_deferred(&mut self) -> Flow {
        while !self.controller.reply_in_flight() {
            let Some(command) = self.deferred.pop_front() else {
                break;
            };
            if matches!(self.on_command(command).await, Flow::Stop) {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn on_command(&mut self, command: Command) -> Flow {
        if command.is_transition() && self.controller.reply_in_flight() {
            tracing::debug!(queued = self.deferred.len() + 1, "Transition deferred until reply completes");
            self.deferred.push_back(command);
            return Flow::Continue;
        }
        if command.is_transition() && !self.controller.is_initialized() {
            command.reject(PlaybackError::NotInitialized);
            return Flow::Continue;
        }

        match command {
            Command::Initialize { mode, respond } => {
                let result = self.controller.initialize(mode).await;
                let _ = respond.send(result);
            }
            Command::SetMode { mode, respond } => {
                self.controller.set_mode(mode).await;
                let _ = respond.send(Ok(()));
            }
            Command::StartSpeaking { respond } => {
                self.controller.start_speaking().await;
                let _ = respond.send(Ok(()));
            }
            Command::StopSpeaking { respond } => {
                self.controller.stop_speaking().await;
                let _ = respond.send(Ok(()));
            }
            Command::ModeChangeReply { from, to, respond } => {
                match self.controller.begin_mode_change_reply(from, to).await {
                    ReplyStart::Playing { ticket } => {
                        self.reply_waiter = Some((ticket, respond));
                    }
                    ReplyStart::Completed => {
                        let _ = respond.send(Ok(()));
                    }
                }
            }
            Command::UserActivity => self.controller.user_activity(),
            Command::Shutdown { respond } => {
                if let Some((_, waiter)) = self.reply_waiter.take() {
                    let _ = waiter.send(Err(PlaybackError::ControllerStopped));
                }
                let _ = respond.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}
