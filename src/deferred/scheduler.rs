//! Deferred Scheduler
//!
//! Decides when registered work runs. Requested work waits in a FIFO queue
//! (each id at most once) until its owner is mapped, in which case it runs
//! before the next frame, or until the idle timeout flushes everything.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use super::redraw::RedrawGate;
use super::registry::{WorkId, WorkItem, WorkRegistry};
use crate::error::Result;
use crate::host::{ActorId, Host, TimerId};

/// Delay before pending work runs even though its owner stayed hidden
pub const DEFERRED_TIMEOUT: Duration = Duration::from_secs(20);

/// Source name of the idle flush timer
pub const IDLE_SOURCE_NAME: &str = "[area-shell] run_all_deferred_work";

pub(super) struct SchedulerInner {
    pub(super) host: Rc<dyn Host>,
    idle_timeout: Duration,
    registry: RefCell<WorkRegistry>,
    pending: RefCell<VecDeque<WorkId>>,
    idle_timer: Cell<Option<TimerId>>,
    pub(super) redraw: RefCell<RedrawGate>,
}

/// Visibility-aware deferred work queue; clones share the same queue
#[derive(Clone)]
pub struct DeferredScheduler {
    pub(super) inner: Rc<SchedulerInner>,
}

impl DeferredScheduler {
    /// Create a scheduler flushing hidden work after `idle_timeout`
    pub fn new(host: Rc<dyn Host>, idle_timeout: Duration) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                host,
                idle_timeout,
                registry: RefCell::new(WorkRegistry::new()),
                pending: RefCell::new(VecDeque::new()),
                idle_timer: Cell::new(None),
                redraw: RefCell::new(RedrawGate::default()),
            }),
        }
    }

    pub(super) fn from_weak(weak: &Weak<SchedulerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Register work owned by `owner` and queue it once right away.
    ///
    /// The work runs whenever `owner` gets mapped while it is pending, and
    /// is unregistered for good when `owner` is destroyed. `owner` must be
    /// alive: a host drops observers connected to a destroyed actor, so work
    /// registered for one is only ever run by the idle flush or `run_now`.
    pub fn register(&self, owner: ActorId, callback: impl Fn() + 'static) -> WorkId {
        let host = &self.inner.host;
        let id = self
            .inner
            .registry
            .borrow_mut()
            .register(owner, Rc::new(callback));

        let weak = Rc::downgrade(&self.inner);
        let mapped_id = host.connect_mapped(
            owner,
            Box::new(move || {
                if let Some(scheduler) = Self::from_weak(&weak) {
                    scheduler.on_owner_mapped(id);
                }
            }),
        );
        let weak = Rc::downgrade(&self.inner);
        let destroy_id = host.connect_destroy(
            owner,
            Box::new(move || {
                if let Some(scheduler) = Self::from_weak(&weak) {
                    debug!("Owner of {} destroyed", id);
                    scheduler.unregister(id);
                }
            }),
        );
        {
            let mut registry = self.inner.registry.borrow_mut();
            registry.attach_signal(id, mapped_id);
            registry.attach_signal(id, destroy_id);
        }

        debug!("Registered {} for {}", id, owner);
        self.request(id);
        id
    }

    /// Forget `id`, dropping it from the queue and the redraw batch.
    ///
    /// Unknown ids are ignored, so this is safe from the work's own callback.
    pub fn unregister(&self, id: WorkId) {
        let Some(item) = self.inner.registry.borrow_mut().unregister(id) else {
            return;
        };
        for signal in item.signals {
            self.inner.host.disconnect(item.owner, signal);
        }
        self.inner.redraw.borrow_mut().remove(id);
        self.inner.pending.borrow_mut().retain(|other| *other != id);
        self.cancel_idle_timer_if_drained();
        debug!("Unregistered {}", id);
    }

    /// Look up a registered item
    pub fn lookup(&self, id: WorkId) -> Result<WorkItem> {
        self.inner.registry.borrow().lookup(id).cloned()
    }

    /// Ask for `id` to run: before the next frame if its owner is mapped,
    /// otherwise when it gets mapped or the idle timeout fires.
    ///
    /// Repeated requests before the work runs collapse into one run.
    pub fn request(&self, id: WorkId) {
        let owner = match self.inner.registry.borrow().lookup(id) {
            Ok(item) => item.owner,
            Err(err) => {
                warn!("Cannot queue deferred work: {}", err);
                return;
            }
        };

        {
            let mut pending = self.inner.pending.borrow_mut();
            if !pending.contains(&id) {
                pending.push_back(id);
            }
        }

        if self.inner.host.is_mapped(owner) {
            self.schedule_before_redraw(id);
        } else if self.inner.idle_timer.get().is_none() {
            self.arm_idle_timer();
        }
    }

    /// Run `id` now if it is pending. Returns whether the callback ran.
    pub fn run_now(&self, id: WorkId) -> bool {
        if !self.is_pending(id) {
            return false;
        }
        let callback = match self.inner.registry.borrow().lookup(id) {
            Ok(item) => item.callback.clone(),
            Err(err) => {
                warn!("Cannot run deferred work: {}", err);
                return false;
            }
        };

        self.inner.pending.borrow_mut().retain(|other| *other != id);
        debug!("Running {}", id);
        callback();
        self.cancel_idle_timer_if_drained();
        true
    }

    /// Run everything that is pending right now, oldest first.
    ///
    /// Work queued by these callbacks waits for the next cycle.
    pub fn run_all_pending(&self) -> usize {
        let snapshot: Vec<WorkId> = self.inner.pending.borrow().iter().copied().collect();
        snapshot.into_iter().filter(|id| self.run_now(*id)).count()
    }

    /// Whether `id` is waiting to run
    pub fn is_pending(&self, id: WorkId) -> bool {
        self.inner.pending.borrow().contains(&id)
    }

    /// Number of pending ids
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Pending ids, oldest first
    pub fn pending_ids(&self) -> Vec<WorkId> {
        self.inner.pending.borrow().iter().copied().collect()
    }

    /// Number of registered items
    pub fn registered_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Whether the idle flush timer is armed
    pub fn idle_timer_active(&self) -> bool {
        self.inner.idle_timer.get().is_some()
    }

    /// Ids waiting for the next frame
    pub fn redraw_batch_len(&self) -> usize {
        self.inner.redraw.borrow().len()
    }

    fn on_owner_mapped(&self, id: WorkId) {
        let Ok(owner) = self.lookup(id).map(|item| item.owner) else {
            return;
        };
        if self.inner.host.is_mapped(owner) && self.is_pending(id) {
            self.schedule_before_redraw(id);
        }
    }

    fn arm_idle_timer(&self) {
        let weak = Rc::downgrade(&self.inner);
        let timer = self.inner.host.timeout_add(
            self.inner.idle_timeout,
            IDLE_SOURCE_NAME,
            Box::new(move || {
                let Some(scheduler) = Self::from_weak(&weak) else {
                    return;
                };
                scheduler.inner.idle_timer.set(None);
                let ran = scheduler.run_all_pending();
                debug!("Idle timeout flushed {} deferred work items", ran);
            }),
        );
        self.inner.idle_timer.set(Some(timer));
        debug!(
            "Armed idle flush in {:?} ({} pending)",
            self.inner.idle_timeout,
            self.pending_count()
        );
    }

    fn cancel_idle_timer_if_drained(&self) {
        if !self.inner.pending.borrow().is_empty() {
            return;
        }
        if let Some(timer) = self.inner.idle_timer.take() {
            self.inner.host.source_remove(timer);
            debug!("Deferred queue drained, idle flush canceled");
        }
    }
}
