//! Playback Core - Headless Character Video Controller for P69REAL
//!
//! This crate drives a looping character animation across two playback
//! surfaces, independent of how those surfaces render. It can drive a
//! browser video element, a frame buffer, or run headless against
//! [`SimulatedSurface`] for tests and the console daemon.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Command Sources                           │
//! │   speech lifecycle   mode commands   user activity           │
//! └──────────────┬───────────────┬──────────────┬────────────────┘
//!                │               │              │
//!                ▼               ▼              ▼
//!        ┌─────────────────────────────────────────────┐
//!        │      ControllerHandle  ──▶  actor task      │
//!        │                               │             │
//!        │                     PlaybackController      │
//!        │        ┌───────────┬──────────┴──────────┐  │
//!        │        │ IdleTimer │ ClipSet │ crossfade  │  │
//!        │        └───────────┴─────────┴──────┬─────┘  │
//!        └────────────────────────────────────┼────────┘
//!                                             ▼
//!                            SurfacePair [primary, secondary]
//!                               (exactly one visible)
//! ```
//!
//! # Key Types
//!
//! - [`PlaybackController`]: the mode and speech state machine
//! - [`ControllerHandle`]: cloneable, serialised access to a running controller
//! - [`MediaSurface`]: the capability set a playback surface must provide
//! - [`ClipSet`]: per-mode clip identifiers
//! - [`ModeSwitchDispatcher`]: text command detection and passphrase gating
//!
//! # Quick Start
//!
//! ```ignore
//! use playback_core::{
//!     ClipSet, ControllerConfig, ControllerHandle, Mode, PlaybackController, SimulatedSurface,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let (controller, signals) = PlaybackController::new(
//!         ClipSet::default(),
//!         ControllerConfig::default(),
//!         SimulatedSurface::new("primary"),
//!         SimulatedSurface::new("secondary"),
//!     );
//!     let (handle, _task) = ControllerHandle::spawn(controller, signals);
//!
//!     handle.initialize(Mode::Armored).await.ok();
//!     handle.speak_while(async { /* fetch and speak a reply */ }).await.unwrap();
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actor;
pub mod clips;
pub mod commands;
pub mod config;
pub mod controller;
pub mod crossfade;
pub mod error;
pub mod idle_timer;
pub mod mode;
pub mod pair;
pub mod random;
pub mod surface;

// Re-export commonly used types
pub use actor::ControllerHandle;
pub use clips::{ClipFiles, ClipId, ClipSet, ModeClips};
pub use commands::{ModeCommand, ModeSwitchDispatcher, SwitchOutcome};
pub use controller::{
    ControllerConfig, ControllerSignal, ControllerSnapshot, PlaybackController, ReplyStart,
    SignalOutcome,
};
pub use crossfade::{CrossfadeOutcome, CrossfadeTiming, EndReason};
pub use error::PlaybackError;
pub use idle_timer::IdleTimer;
pub use mode::{ClipRole, IdleAction, Mode, PlaybackState};
pub use pair::{Slot, SurfacePair};
pub use random::{ScriptedRandom, StdRandom, UnitRandom};
pub use surface::simulated::SimulatedBehavior;
pub use surface::{MediaEvent, MediaSurface, SimulatedSurface, SurfaceError, SurfaceProbe};

// Configuration file support
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, PlaybackConfigFile,
};
