//! Redraw Gate
//!
//! Collects work that must run before the next frame and arms a single
//! before-redraw callback per frame for all of it.

use std::rc::Rc;

use tracing::{debug, trace};

use super::registry::WorkId;
use super::scheduler::DeferredScheduler;

/// Work ids waiting for the next frame, in the order they were scheduled
#[derive(Debug, Default)]
pub struct RedrawGate {
    batch: Vec<WorkId>,
    armed: bool,
}

impl RedrawGate {
    /// Append `id` unless already batched.
    ///
    /// Returns true when the caller must arm the before-redraw callback,
    /// i.e. this is the first id since the last frame boundary.
    pub fn push(&mut self, id: WorkId) -> bool {
        if !self.batch.contains(&id) {
            self.batch.push(id);
        }
        !std::mem::replace(&mut self.armed, true)
    }

    /// Take the whole batch and disarm; later pushes start a new batch.
    pub fn take(&mut self) -> Vec<WorkId> {
        self.armed = false;
        std::mem::take(&mut self.batch)
    }

    /// Drop an id whose owner went away
    pub fn remove(&mut self, id: WorkId) {
        self.batch.retain(|other| *other != id);
    }

    /// Whether `id` is waiting for the next frame
    pub fn contains(&self, id: WorkId) -> bool {
        self.batch.contains(&id)
    }

    /// Number of batched ids
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

impl DeferredScheduler {
    /// Make sure `id` runs just before the next frame.
    pub fn schedule_before_redraw(&self, id: WorkId) {
        let arm = self.inner.redraw.borrow_mut().push(id);
        if !arm {
            return;
        }

        trace!("Arming before-redraw batch for {}", id);
        let weak = Rc::downgrade(&self.inner);
        self.inner.host.run_before_redraw(Box::new(move || {
            if let Some(scheduler) = DeferredScheduler::from_weak(&weak) {
                scheduler.run_before_redraw_batch();
            }
        }));
    }

    /// Run every batched id in order. Work scheduled by these callbacks
    /// lands in a fresh batch for the following frame.
    fn run_before_redraw_batch(&self) {
        let batch = self.inner.redraw.borrow_mut().take();
        debug!("Running {} deferred work items before redraw", batch.len());
        for id in batch {
            self.run_now(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_push_arms_once() {
        let mut gate = RedrawGate::default();
        assert!(gate.push(WorkId(1)));
        assert!(!gate.push(WorkId(2)));
        assert!(!gate.push(WorkId(1)));
        assert_eq!(gate.len(), 2);

        assert_eq!(gate.take(), vec![WorkId(1), WorkId(2)]);
        assert!(gate.is_empty());
        assert!(gate.push(WorkId(3)));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut gate = RedrawGate::default();
        for id in 1..=3 {
            gate.push(WorkId(id));
        }
        gate.remove(WorkId(2));
        assert!(!gate.contains(WorkId(2)));
        assert_eq!(gate.take(), vec![WorkId(1), WorkId(3)]);
    }
}
