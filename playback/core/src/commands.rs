//! Mode Commands
//!
//! Recognises the two spoken/typed mode commands and dispatches them to a
//! running controller:
//!
//! | Text | Command | Target |
//! |------|---------|--------|
//! | contains `チェンジ`, or exactly `change` | [`ModeCommand::Change`] | Armored |
//! | contains `キャストオフ`, or exactly `castoff` | [`ModeCommand::Castoff`] | Normal |
//!
//! Leaving the armored skin is privileged: when a passphrase is configured
//! the castoff command only proceeds with a matching passphrase.

use std::fmt;

use crate::actor::ControllerHandle;
use crate::error::PlaybackError;
use crate::mode::Mode;

/// A recognised mode-switch command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeCommand {
    /// Switch to the armored skin
    Change,
    /// Switch to the normal skin
    Castoff,
}

impl ModeCommand {
    /// Recognise a command in free text
    ///
    /// Matching ignores case and surrounding whitespace. Returns `None` for
    /// anything that is not a mode command.
    #[must_use]
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        if text.contains("チェンジ") || text == "change" {
            Some(Self::Change)
        } else if text.contains("キャストオフ") || text == "castoff" {
            Some(Self::Castoff)
        } else {
            None
        }
    }

    /// Mode this command switches to
    #[must_use]
    pub fn target(self) -> Mode {
        match self {
            Self::Change => Mode::Armored,
            Self::Castoff => Mode::Normal,
        }
    }

    /// Whether this command is gated by the passphrase
    #[must_use]
    pub fn requires_passphrase(self) -> bool {
        matches!(self, Self::Castoff)
    }
}

/// Result of dispatching a [`ModeCommand`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The controller was already in the target mode; nothing played
    AlreadyInMode(Mode),
    /// A passphrase must be supplied before switching
    PassphraseRequired,
    /// The supplied passphrase did not match
    PassphraseRejected,
    /// The reply played and the new mode is committed
    Switched(Mode),
}

impl fmt::Display for SwitchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInMode(mode) => write!(f, "already in {mode} mode"),
            Self::PassphraseRequired => write!(f, "passphrase required"),
            Self::PassphraseRejected => write!(f, "passphrase rejected"),
            Self::Switched(mode) => write!(f, "switched to {mode} mode"),
        }
    }
}

/// Routes mode commands to a controller, applying the passphrase gate
#[derive(Clone)]
pub struct ModeSwitchDispatcher {
    handle: ControllerHandle,
    passphrase: Option<String>,
}

impl ModeSwitchDispatcher {
    /// Dispatcher with no passphrase gate
    #[must_use]
    pub fn new(handle: ControllerHandle) -> Self {
        Self {
            handle,
            passphrase: None,
        }
    }

    /// Require `passphrase` for privileged commands
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Whether privileged commands are gated
    #[must_use]
    pub fn is_gated(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Apply `command`, playing the transition reply when a switch happens
    ///
    /// # Errors
    ///
    /// Propagates [`PlaybackError::NotInitialized`] and
    /// [`PlaybackError::ControllerStopped`] from the controller.
    pub async fn dispatch(
        &self,
        command: ModeCommand,
        supplied: Option<&str>,
    ) -> Result<SwitchOutcome, PlaybackError> {
        let current = self.handle.snapshot().mode;
        let target = command.target();
        if current == target {
            tracing::info!(mode = %current, ?command, "Mode command ignored; already in mode");
            return Ok(SwitchOutcome::AlreadyInMode(current));
        }

        if command.requires_passphrase() {
            if let Some(expected) = &self.passphrase {
                match supplied.map(str::trim) {
                    None => return Ok(SwitchOutcome::PassphraseRequired),
                    Some(given) if given != expected.as_str() => {
                        tracing::warn!(?command, "Mode command passphrase rejected");
                        return Ok(SwitchOutcome::PassphraseRejected);
                    }
                    Some(_) => {}
                }
            }
        }

        tracing::info!(from = %current, to = %target, ?command, "Dispatching mode switch");
        self.handle.play_mode_change_reply(current, target).await?;
        Ok(SwitchOutcome::Switched(target))
    }

    /// Detect a command in `text` and dispatch it
    ///
    /// Returns `Ok(None)` when the text is not a mode command.
    ///
    /// # Errors
    ///
    /// As [`Self::dispatch`].
    pub async fn handle_text(
        &self,
        text: &str,
        supplied: Option<&str>,
    ) -> Result<Option<SwitchOutcome>, PlaybackError> {
        match ModeCommand::detect(text) {
            Some(command) => self.dispatch(command, supplied).await.map(Some),
            None => Ok(None),
        }
    }
}
