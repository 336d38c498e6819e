//! Interaction mode state machine
//!
//! ```text
//!            EnterReading              ToggleImmersive
//!   Study ─────────────────▶ Reading ──────────────────▶ Immersive
//!     ▲ ◀───────────────────   │                            │
//!     │        EnterStudy      │ ToggleImmersive            │ ToggleImmersive
//!     │                        ▼                            │ EnterStudy
//!     └───────────────────── Immersive ◀────────────────────┘ FullscreenExited
//! ```
//!
//! The viewer is always in exactly one mode. Leaving immersive mode through
//! the platform's own full-screen UI arrives as `FullscreenExited`.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Viewer interaction mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Selection enabled, annotations clickable, side panel visible
    #[default]
    Study,
    /// Selection disabled, no side panel, annotations inert
    Reading,
    /// Reading on a full-screen surface
    Immersive,
}

impl InteractionMode {
    pub fn selection_enabled(self) -> bool {
        self == InteractionMode::Study
    }

    pub fn annotations_clickable(self) -> bool {
        self == InteractionMode::Study
    }

    pub fn side_panel_visible(self) -> bool {
        self == InteractionMode::Study
    }

    pub fn wants_fullscreen(self) -> bool {
        self == InteractionMode::Immersive
    }
}

/// Inputs of the mode machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    EnterStudy,
    EnterReading,
    ToggleImmersive,
    /// The platform left full-screen on its own (e.g. Escape key)
    FullscreenExited,
}

/// Side effect the viewer must apply on its full-screen surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenAction {
    None,
    Request,
    Exit,
}

/// Result of feeding one event to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: InteractionMode,
    pub to: InteractionMode,
    pub action: FullscreenAction,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Compute the next mode. `fullscreen_active` is the surface's current state.
pub fn transition(mode: InteractionMode, event: ModeEvent, fullscreen_active: bool) -> Transition {
    use InteractionMode::*;

    let exit_if_active = if fullscreen_active {
        FullscreenAction::Exit
    } else {
        FullscreenAction::None
    };

    let (to, action) = match (mode, event) {
        (Immersive, ModeEvent::EnterStudy | ModeEvent::ToggleImmersive) => (Study, exit_if_active),
        (Immersive, ModeEvent::EnterReading) => (Reading, exit_if_active),
        (Immersive, ModeEvent::FullscreenExited) => (Study, FullscreenAction::None),
        (_, ModeEvent::ToggleImmersive) => (Immersive, FullscreenAction::Request),
        (_, ModeEvent::EnterStudy) => (Study, FullscreenAction::None),
        (_, ModeEvent::EnterReading) => (Reading, FullscreenAction::None),
        (current, ModeEvent::FullscreenExited) => (current, FullscreenAction::None),
    };

    Transition { from: mode, to, action }
}

/// A display surface that can go full-screen
///
/// `subscribe` hands out a receiver of the surface's full-screen flag. The
/// viewer holds one for its lifetime; dropping it unsubscribes.
pub trait FullscreenSurface: Send + Sync {
    fn request(&self);
    fn exit(&self);
    fn is_active(&self) -> bool;
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Full-screen surface backed by a watch channel
///
/// Headless hosts and tests drive platform-side changes with
/// [`WatchFullscreen::set_active`].
#[derive(Debug)]
pub struct WatchFullscreen {
    tx: watch::Sender<bool>,
}

impl WatchFullscreen {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Report a platform-side full-screen change
    pub fn set_active(&self, active: bool) {
        self.tx.send_replace(active);
    }

    /// Number of live subscriptions
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for WatchFullscreen {
    fn default() -> Self {
        Self::new()
    }
}

impl FullscreenSurface for WatchFullscreen {
    fn request(&self) {
        self.tx.send_replace(true);
    }

    fn exit(&self) {
        self.tx.send_replace(false);
    }

    fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
