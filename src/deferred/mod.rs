//! Deferred Work
//!
//! Expensive per-actor refreshes that only need to happen once the actor is
//! on screen. Work is registered against an owning actor, requested as often
//! as callers like, and run at most once per request cycle: before the next
//! frame when the owner is mapped, or by the idle flush otherwise.

pub mod redraw;
pub mod registry;
pub mod scheduler;

pub use redraw::RedrawGate;
pub use registry::{WorkCallback, WorkId, WorkItem, WorkRegistry};
pub use scheduler::{DEFERRED_TIMEOUT, DeferredScheduler, IDLE_SOURCE_NAME};
