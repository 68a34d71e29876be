//! Shell Controller
//!
//! Composition root owning the one modal stack and the one deferred work
//! scheduler of a shell process. Collaborators get an explicit handle
//! instead of reaching for globals.

use std::rc::Rc;

use tracing::info;

use crate::config::Config;
use crate::deferred::{DeferredScheduler, WorkId};
use crate::error::Result;
use crate::host::{ActorId, GrabHandle, Host};
use crate::modal::{ActionMode, ModalStack, PushParams};

/// Central shell state shared with panels, popovers and dialogs
#[derive(Clone)]
pub struct ShellController {
    deferred: DeferredScheduler,
    modal: ModalStack,
}

impl ShellController {
    /// Build the controller on top of `host`
    pub fn new(host: Rc<dyn Host>, config: &Config) -> anyhow::Result<Self> {
        let default_action_mode = config.modal.default_action_mode()?;
        let idle_timeout = config.deferred.idle_timeout();
        info!(
            "Shell controller ready (idle_timeout={:?}, default_action_mode={:?})",
            idle_timeout, default_action_mode
        );
        Ok(Self {
            deferred: DeferredScheduler::new(host.clone(), idle_timeout),
            modal: ModalStack::new(host, default_action_mode),
        })
    }

    /// The deferred work scheduler
    pub fn deferred(&self) -> &DeferredScheduler {
        &self.deferred
    }

    /// The modal stack
    pub fn modal(&self) -> &ModalStack {
        &self.modal
    }

    /// Startup finished: leave the initial no-keybindings mode.
    pub fn startup_complete(&self) {
        if self.modal.action_mode() == ActionMode::NONE {
            self.modal.set_action_mode(ActionMode::NORMAL);
        }
        info!("Startup complete (action_mode={:?})", self.modal.action_mode());
    }

    /// Current ambient action mode
    pub fn action_mode(&self) -> ActionMode {
        self.modal.action_mode()
    }

    /// Replace the ambient action mode
    pub fn set_action_mode(&self, mode: ActionMode) {
        self.modal.set_action_mode(mode);
    }

    /// Register work run when `actor` is mapped or the shell goes idle.
    /// The work is queued once immediately.
    pub fn initialize_deferred_work(
        &self,
        actor: ActorId,
        callback: impl Fn() + 'static,
    ) -> WorkId {
        self.deferred.register(actor, callback)
    }

    /// Make sure the work runs on map or timeout
    pub fn queue_deferred_work(&self, id: WorkId) {
        self.deferred.request(id);
    }

    /// See [`ModalStack::push_modal`]
    pub fn push_modal(&self, actor: ActorId, params: PushParams) -> Result<GrabHandle> {
        self.modal.push_modal(actor, params)
    }

    /// See [`ModalStack::pop_modal`]
    pub fn pop_modal(&self, grab: GrabHandle, timestamp: Option<u32>) -> Result<()> {
        self.modal.pop_modal(grab, timestamp)
    }

    /// Number of active modal grabs
    pub fn modal_count(&self) -> usize {
        self.modal.modal_count()
    }

    /// Run all pending deferred work now, e.g. before shutting down.
    pub fn flush(&self) -> usize {
        let ran = self.deferred.run_all_pending();
        info!("Flushed {} deferred work items", ran);
        ran
    }
}
