//! Modal Stack
//!
//! Nested exclusive-input grabs. Every `push_modal` grabs the stage for an
//! actor, gives it key focus and remembers who had focus before; every
//! `pop_modal` undoes one push. Pops may come in any order: releasing a
//! record from the middle of the stack relinks the chain of previous-focus
//! references so each surviving record still points at the focus that was
//! current right before its own push.
//!
//! # Invariants
//!
//! - At most one record per grab handle.
//! - Unredirection is disabled exactly while the stack is non-empty.
//! - A record's `prev_focus` is either the focus before its push or `None`
//!   if that actor has since been destroyed. It never names a dead actor.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, error, info, warn};

use super::action_mode::{ActionMode, ModalOptions};
use crate::error::{Result, ShellError};
use crate::host::{ActorId, GrabHandle, Host, SignalId};

/// Optional parameters for `push_modal`
#[derive(Debug, Clone, Copy, Default)]
pub struct PushParams {
    /// Event time of the request; defaults to the host's current time
    pub timestamp: Option<u32>,
    /// Grabs the caller already holds
    pub options: ModalOptions,
    /// Action mode while this modal is on top; defaults to the stack default
    pub action_mode: Option<ActionMode>,
}

impl PushParams {
    /// Params with an explicit action mode
    pub fn with_action_mode(action_mode: ActionMode) -> Self {
        Self {
            action_mode: Some(action_mode),
            ..Self::default()
        }
    }
}

/// One active grab
#[derive(Debug)]
struct ModalRecord {
    actor: ActorId,
    grab: GrabHandle,
    destroy_id: SignalId,
    prev_focus: Option<ActorId>,
    prev_focus_destroy_id: Option<SignalId>,
    /// Ambient mode that was in effect before this push
    action_mode: ActionMode,
}

/// Read-only view of a record, bottom of the stack first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalEntry {
    pub actor: ActorId,
    pub grab: GrabHandle,
    pub prev_focus: Option<ActorId>,
    pub action_mode_at_push: ActionMode,
}

#[derive(Debug, Default)]
struct ModalState {
    records: Vec<ModalRecord>,
    action_mode: ActionMode,
}

struct ModalInner {
    host: Rc<dyn Host>,
    default_action_mode: ActionMode,
    state: RefCell<ModalState>,
}

/// Stack of modal grabs; cloning yields another handle to the same stack
#[derive(Clone)]
pub struct ModalStack {
    inner: Rc<ModalInner>,
}

impl ModalStack {
    /// Create an empty stack. `default_action_mode` applies to pushes that
    /// don't name a mode.
    pub fn new(host: Rc<dyn Host>, default_action_mode: ActionMode) -> Self {
        Self {
            inner: Rc::new(ModalInner {
                host,
                default_action_mode,
                state: RefCell::new(ModalState::default()),
            }),
        }
    }

    fn from_weak(weak: &Weak<ModalInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Number of active grabs
    pub fn modal_count(&self) -> usize {
        self.inner.state.borrow().records.len()
    }

    /// Whether any grab is active
    pub fn is_modal(&self) -> bool {
        self.modal_count() > 0
    }

    /// Whether `grab` belongs to an active record
    pub fn contains(&self, grab: GrabHandle) -> bool {
        self.find(grab).is_some()
    }

    /// Current ambient action mode
    pub fn action_mode(&self) -> ActionMode {
        self.inner.state.borrow().action_mode
    }

    /// Replace the ambient action mode
    pub fn set_action_mode(&self, mode: ActionMode) {
        self.inner.state.borrow_mut().action_mode = mode;
    }

    /// Snapshot of the stack, bottom first
    pub fn entries(&self) -> Vec<ModalEntry> {
        self.inner
            .state
            .borrow()
            .records
            .iter()
            .map(|record| ModalEntry {
                actor: record.actor,
                grab: record.grab,
                prev_focus: record.prev_focus,
                action_mode_at_push: record.action_mode,
            })
            .collect()
    }

    fn find(&self, grab: GrabHandle) -> Option<usize> {
        self.inner
            .state
            .borrow()
            .records
            .iter()
            .position(|record| record.grab == grab)
    }

    /// Grab the stage for `actor` and give it key focus.
    ///
    /// The effect is undone by `pop_modal` with the returned handle, or
    /// automatically if `actor` is destroyed first. A refused grab returns
    /// `GrabUnavailable` and leaves everything untouched.
    pub fn push_modal(&self, actor: ActorId, params: PushParams) -> Result<GrabHandle> {
        let host = &self.inner.host;
        let timestamp = params.timestamp.unwrap_or_else(|| host.current_time());

        let grab = host.grab(actor, params.options).inspect_err(|err| {
            warn!("Modal grab for {} refused at {}: {}", actor, timestamp, err);
        })?;

        if !self.is_modal() {
            info!("Entering modal mode");
            host.disable_unredirect();
        }

        // Connected first so a self-referencing previous focus is forgotten
        // before the implicit pop could restore it.
        let prev_focus = host.key_focus();
        let prev_focus_destroy_id = prev_focus.map(|target| {
            let weak = Rc::downgrade(&self.inner);
            host.connect_destroy(
                target,
                Box::new(move || {
                    if let Some(stack) = Self::from_weak(&weak) {
                        stack.forget_prev_focus(target);
                    }
                }),
            )
        });

        let weak = Rc::downgrade(&self.inner);
        let destroy_id = host.connect_destroy(
            actor,
            Box::new(move || {
                let Some(stack) = Self::from_weak(&weak) else {
                    return;
                };
                if !stack.contains(grab) {
                    return;
                }
                debug!("{} destroyed while holding {}, popping", actor, grab);
                if let Err(err) = stack.pop_modal(grab, None) {
                    warn!("Implicit pop of {} failed: {}", grab, err);
                }
            }),
        );

        let action_mode = params
            .action_mode
            .unwrap_or(self.inner.default_action_mode);
        let depth = {
            let mut state = self.inner.state.borrow_mut();
            let previous_mode = state.action_mode;
            state.records.push(ModalRecord {
                actor,
                grab,
                destroy_id,
                prev_focus,
                prev_focus_destroy_id,
                action_mode: previous_mode,
            });
            state.action_mode = action_mode;
            state.records.len()
        };

        host.set_key_focus(Some(actor));
        debug!(
            "Pushed modal {} for {} (depth={}, prev_focus={:?}, action_mode={:?})",
            grab, actor, depth, prev_focus, action_mode
        );
        Ok(grab)
    }

    /// Undo the `push_modal` that returned `grab`.
    ///
    /// Popping the topmost record restores its previous focus and action
    /// mode. Popping any other record relinks the focus chain above it.
    /// An unknown handle clears key focus and resets the action mode to
    /// `NORMAL` before returning `ProtocolViolation`.
    pub fn pop_modal(&self, grab: GrabHandle, timestamp: Option<u32>) -> Result<()> {
        let host = &self.inner.host;
        let timestamp = timestamp.unwrap_or_else(|| host.current_time());

        let mut state = self.inner.state.borrow_mut();
        let Some(index) = state.records.iter().position(|record| record.grab == grab) else {
            state.action_mode = ActionMode::NORMAL;
            drop(state);
            host.set_key_focus(None);
            error!("Incorrect pop of {} at {}: no matching push", grab, timestamp);
            return Err(ShellError::ProtocolViolation { grab });
        };

        let top = state.records.len() - 1;
        let was_top = index == top;
        let stale_watch = if was_top {
            let record = &state.records[index];
            record.prev_focus.zip(record.prev_focus_destroy_id)
        } else {
            // With focus on `a` and pushes of b, c, d the chain is
            // [a<-b, b<-c, c<-d]. Dropping c must leave [a<-b, b<-d], so
            // every reference above the gap moves up one record and the
            // topmost reference is discarded.
            let discarded = {
                let record = &state.records[top];
                record.prev_focus.zip(record.prev_focus_destroy_id)
            };
            for i in (index + 1..=top).rev() {
                let below = &state.records[i - 1];
                let (prev_focus, prev_focus_destroy_id, action_mode) =
                    (below.prev_focus, below.prev_focus_destroy_id, below.action_mode);
                let record = &mut state.records[i];
                record.prev_focus = prev_focus;
                record.prev_focus_destroy_id = prev_focus_destroy_id;
                record.action_mode = action_mode;
            }
            debug!(
                "Popped {} out of order at position {} of {}, focus chain relinked",
                grab,
                index,
                top + 1
            );
            discarded
        };

        let record = state.records.remove(index);
        if was_top {
            state.action_mode = record.action_mode;
        }
        let now_empty = state.records.is_empty();
        if now_empty {
            state.action_mode = ActionMode::NORMAL;
        }
        drop(state);

        host.disconnect(record.actor, record.destroy_id);
        host.dismiss(record.grab);
        if let Some((target, id)) = stale_watch {
            host.disconnect(target, id);
        }
        if was_top {
            host.set_key_focus(record.prev_focus);
        }

        debug!(
            "Popped modal {} for {} at {} (remaining={})",
            grab,
            record.actor,
            timestamp,
            self.modal_count()
        );

        if now_empty {
            host.modal_ended();
            host.enable_unredirect();
            info!("Modal mode ended");
        }
        Ok(())
    }

    /// A previous-focus target died; no record may restore focus into it.
    fn forget_prev_focus(&self, target: ActorId) {
        let mut state = self.inner.state.borrow_mut();
        for record in state
            .records
            .iter_mut()
            .filter(|record| record.prev_focus == Some(target))
        {
            debug!("Previous focus {} of {} destroyed", target, record.grab);
            record.prev_focus = None;
            record.prev_focus_destroy_id = None;
        }
    }
}
