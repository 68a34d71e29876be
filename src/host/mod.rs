//! Host Module
//!
//! Capabilities the shell core consumes from the compositor it runs inside:
//! stage grabs and key focus, per-actor signals, unredirect control and the
//! frame/idle scheduler. Everything is single-threaded; signal handlers and
//! scheduled callbacks are plain boxed closures run on the control thread.

pub mod headless;

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::modal::ModalOptions;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Identity of a stage actor. Holding one does not keep the actor alive.
    ActorId,
    "actor"
);
handle_type!(
    /// Opaque exclusive-grab handle issued by the stage
    GrabHandle,
    "grab"
);
handle_type!(
    /// Subscription returned by `connect_*`, used to disconnect the handler
    SignalId,
    "signal"
);
handle_type!(
    /// One-shot timeout source
    TimerId,
    "timer"
);

/// Handler invoked with no arguments (destroy, notify::mapped)
pub type SignalHandler = Box<dyn Fn()>;

/// One-shot callback run by the frame scheduler
pub type OneShot = Box<dyn FnOnce()>;

/// Input routing and key focus
pub trait Stage {
    /// Acquire an exclusive grab on `actor`.
    ///
    /// Returns `ShellError::GrabUnavailable` when the stage refuses.
    fn grab(&self, actor: ActorId, options: ModalOptions) -> Result<GrabHandle>;

    /// Release a grab previously returned by `grab`.
    fn dismiss(&self, grab: GrabHandle);

    /// Actor currently holding key focus
    fn key_focus(&self) -> Option<ActorId>;

    /// Move key focus; `None` returns it to the stage itself.
    fn set_key_focus(&self, target: Option<ActorId>);

    /// Whether the actor is mapped (visible on screen)
    fn is_mapped(&self, actor: ActorId) -> bool;

    /// Current event time, used when callers omit a timestamp
    fn current_time(&self) -> u32;
}

/// Per-actor signal subscriptions
pub trait ActorSignals {
    /// Run `handler` once when `actor` is destroyed.
    fn connect_destroy(&self, actor: ActorId, handler: SignalHandler) -> SignalId;

    /// Run `handler` whenever the mapped state of `actor` changes.
    fn connect_mapped(&self, actor: ActorId, handler: SignalHandler) -> SignalId;

    /// Remove a handler. Unknown ids are ignored.
    fn disconnect(&self, actor: ActorId, id: SignalId);
}

/// Compositor-level state touched when modal mode starts and ends
pub trait Compositor {
    /// Force every frame through the compositor (no fullscreen unredirect).
    fn disable_unredirect(&self);

    /// Allow fullscreen unredirection again.
    fn enable_unredirect(&self);

    /// Layout notification that the last modal was released.
    fn modal_ended(&self) {}
}

/// Frame and idle scheduling
pub trait FrameScheduler {
    /// Run `callback` once, just before the next frame is drawn.
    fn run_before_redraw(&self, callback: OneShot);

    /// Run `callback` once after `delay`. `name` labels the source for debugging.
    fn timeout_add(&self, delay: Duration, name: &str, callback: OneShot) -> TimerId;

    /// Cancel a pending timeout. Unknown or already fired ids are ignored.
    fn source_remove(&self, timer: TimerId);
}

/// Everything the shell controller needs from its host
pub trait Host: Stage + ActorSignals + Compositor + FrameScheduler {}

impl<T: Stage + ActorSignals + Compositor + FrameScheduler> Host for T {}
