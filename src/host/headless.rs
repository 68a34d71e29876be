//! Headless Stage
//!
//! In-memory implementation of every host capability. Actors are plain ids
//! with a name and a mapped flag, time is virtual and only moves when
//! `advance` is called, and frames are drawn when `dispatch_frame` is called.
//! Used by the test suites and by the scripted session in the binary.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace};

use super::{
    ActorId, ActorSignals, Compositor, FrameScheduler, GrabHandle, OneShot, SignalHandler,
    SignalId, Stage, TimerId,
};
use crate::error::{Result, ShellError};
use crate::modal::ModalOptions;

type SharedHandler = Rc<dyn Fn()>;
type HandlerTable = HashMap<ActorId, Vec<(SignalId, SharedHandler)>>;

/// State for a single actor
#[derive(Debug, Clone)]
struct ActorState {
    name: String,
    mapped: bool,
}

/// A pending timeout
struct Timer {
    deadline: Duration,
    name: String,
    callback: OneShot,
}

#[derive(Default)]
struct StageState {
    next_id: u64,
    actors: HashMap<ActorId, ActorState>,
    /// Actors whose destroy signal is being emitted
    dying: HashSet<ActorId>,
    destroy_handlers: HandlerTable,
    mapped_handlers: HandlerTable,
    key_focus: Option<ActorId>,
    grabs: Vec<(GrabHandle, ActorId)>,
    refuse_grabs: bool,
    unredirect_disabled: bool,
    modal_ended_count: u32,
    laters: Vec<OneShot>,
    timers: BTreeMap<TimerId, Timer>,
    clock: Duration,
    event_time: u32,
}

impl StageState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn destroy_table(state: &StageState) -> &HandlerTable {
    &state.destroy_handlers
}

fn mapped_table(state: &StageState) -> &HandlerTable {
    &state.mapped_handlers
}

fn destroy_table_mut(state: &mut StageState) -> &mut HandlerTable {
    &mut state.destroy_handlers
}

fn mapped_table_mut(state: &mut StageState) -> &mut HandlerTable {
    &mut state.mapped_handlers
}

/// In-memory stage, signal bus, compositor and frame clock
#[derive(Default)]
pub struct HeadlessStage {
    state: RefCell<StageState>,
}

impl HeadlessStage {
    /// Create an empty stage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an actor. New actors start unmapped.
    pub fn create_actor(&self, name: &str) -> ActorId {
        let mut state = self.state.borrow_mut();
        let actor = ActorId(state.allocate());
        state.actors.insert(
            actor,
            ActorState {
                name: name.to_string(),
                mapped: false,
            },
        );
        debug!("Created {} ({})", actor, name);
        actor
    }

    /// Name given at creation, if the actor is still alive
    pub fn actor_name(&self, actor: ActorId) -> Option<String> {
        self.state.borrow().actors.get(&actor).map(|a| a.name.clone())
    }

    /// Whether the actor has not been destroyed
    pub fn is_alive(&self, actor: ActorId) -> bool {
        self.state.borrow().actors.contains_key(&actor)
    }

    /// Change the mapped state and emit notify::mapped if it changed
    pub fn set_mapped(&self, actor: ActorId, mapped: bool) {
        {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.actors.get_mut(&actor) else {
                return;
            };
            if entry.mapped == mapped {
                return;
            }
            entry.mapped = mapped;
        }
        trace!("{} mapped={}", actor, mapped);
        self.emit(actor, mapped_table);
    }

    /// Destroy an actor: emit destroy, then forget it and its handlers.
    ///
    /// Key focus held by the actor returns to the stage before handlers run,
    /// and handlers cannot give it back.
    pub fn destroy_actor(&self, actor: ActorId) {
        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let Some(entry) = state.actors.get_mut(&actor) else {
                return;
            };
            if !state.dying.insert(actor) {
                return;
            }
            entry.mapped = false;
            if state.key_focus == Some(actor) {
                state.key_focus = None;
            }
        }
        debug!("Destroying {}", actor);
        self.emit(actor, destroy_table);

        let mut state = self.state.borrow_mut();
        state.dying.remove(&actor);
        state.actors.remove(&actor);
        state.destroy_handlers.remove(&actor);
        state.mapped_handlers.remove(&actor);
    }

    /// Make every following `grab` fail (or succeed again)
    pub fn set_refuse_grabs(&self, refuse: bool) {
        self.state.borrow_mut().refuse_grabs = refuse;
    }

    /// Set the event time reported by `current_time`
    pub fn set_event_time(&self, time: u32) {
        self.state.borrow_mut().event_time = time;
    }

    /// Number of grabs not yet dismissed
    pub fn active_grabs(&self) -> usize {
        self.state.borrow().grabs.len()
    }

    /// Whether the grab is still held
    pub fn is_grab_active(&self, grab: GrabHandle) -> bool {
        self.state.borrow().grabs.iter().any(|(g, _)| *g == grab)
    }

    /// Whether fullscreen unredirection is currently disabled
    pub fn unredirect_disabled(&self) -> bool {
        self.state.borrow().unredirect_disabled
    }

    /// How many times the modal-ended notification fired
    pub fn modal_ended_count(&self) -> u32 {
        self.state.borrow().modal_ended_count
    }

    /// Number of handlers connected to `actor` (destroy + mapped)
    pub fn handler_count(&self, actor: ActorId) -> usize {
        let state = self.state.borrow();
        state.destroy_handlers.get(&actor).map_or(0, Vec::len)
            + state.mapped_handlers.get(&actor).map_or(0, Vec::len)
    }

    /// Callbacks waiting for the next frame
    pub fn pending_frame_callbacks(&self) -> usize {
        self.state.borrow().laters.len()
    }

    /// Names of the timeouts that have not fired or been removed
    pub fn active_timers(&self) -> Vec<String> {
        self.state
            .borrow()
            .timers
            .values()
            .map(|t| t.name.clone())
            .collect()
    }

    /// Virtual time elapsed since the stage was created
    pub fn now(&self) -> Duration {
        self.state.borrow().clock
    }

    /// Draw one frame: run the callbacks queued before it.
    ///
    /// Callbacks queued while the frame runs wait for the next one.
    pub fn dispatch_frame(&self) -> usize {
        let laters = std::mem::take(&mut self.state.borrow_mut().laters);
        let count = laters.len();
        for callback in laters {
            callback();
        }
        trace!("Frame dispatched {} before-redraw callbacks", count);
        count
    }

    /// Move the virtual clock forward, firing due timeouts in deadline order.
    pub fn advance(&self, delta: Duration) -> usize {
        let target = {
            let mut state = self.state.borrow_mut();
            state.clock += delta;
            state.clock
        };

        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                let next = state
                    .timers
                    .iter()
                    .filter(|(_, t)| t.deadline <= target)
                    .min_by_key(|(id, t)| (t.deadline, **id))
                    .map(|(id, _)| *id);
                next.and_then(|id| state.timers.remove(&id))
            };
            let Some(timer) = due else {
                break;
            };
            debug!("Timeout '{}' fired", timer.name);
            (timer.callback)();
            fired += 1;
        }
        fired
    }

    fn emit(&self, actor: ActorId, table: fn(&StageState) -> &HandlerTable) {
        let handlers: Vec<(SignalId, SharedHandler)> = table(&*self.state.borrow())
            .get(&actor)
            .cloned()
            .unwrap_or_default();

        for (id, handler) in handlers {
            // An earlier handler may have disconnected this one.
            let connected = table(&*self.state.borrow())
                .get(&actor)
                .is_some_and(|list| list.iter().any(|(other, _)| *other == id));
            if connected {
                handler();
            }
        }
    }

    fn connect(
        &self,
        actor: ActorId,
        handler: SignalHandler,
        table: fn(&mut StageState) -> &mut HandlerTable,
    ) -> SignalId {
        let mut state = self.state.borrow_mut();
        let id = SignalId(state.allocate());
        if state.actors.contains_key(&actor) {
            table(&mut *state)
                .entry(actor)
                .or_default()
                .push((id, Rc::from(handler)));
        }
        id
    }
}

impl Stage for HeadlessStage {
    fn grab(&self, actor: ActorId, options: ModalOptions) -> Result<GrabHandle> {
        let mut state = self.state.borrow_mut();
        if state.refuse_grabs || !state.actors.contains_key(&actor) {
            return Err(ShellError::GrabUnavailable { actor });
        }
        let grab = GrabHandle(state.allocate());
        state.grabs.push((grab, actor));
        debug!("Stage {} on {} (options={:?})", grab, actor, options);
        Ok(grab)
    }

    fn dismiss(&self, grab: GrabHandle) {
        self.state.borrow_mut().grabs.retain(|(g, _)| *g != grab);
    }

    fn key_focus(&self) -> Option<ActorId> {
        self.state.borrow().key_focus
    }

    fn set_key_focus(&self, target: Option<ActorId>) {
        let mut state = self.state.borrow_mut();
        let target = target
            .filter(|actor| state.actors.contains_key(actor) && !state.dying.contains(actor));
        state.key_focus = target;
    }

    fn is_mapped(&self, actor: ActorId) -> bool {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .is_some_and(|a| a.mapped)
    }

    fn current_time(&self) -> u32 {
        self.state.borrow().event_time
    }
}

impl ActorSignals for HeadlessStage {
    fn connect_destroy(&self, actor: ActorId, handler: SignalHandler) -> SignalId {
        self.connect(actor, handler, destroy_table_mut)
    }

    fn connect_mapped(&self, actor: ActorId, handler: SignalHandler) -> SignalId {
        self.connect(actor, handler, mapped_table_mut)
    }

    fn disconnect(&self, actor: ActorId, id: SignalId) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        for table in [&mut state.destroy_handlers, &mut state.mapped_handlers] {
            if let Some(list) = table.get_mut(&actor) {
                list.retain(|(other, _)| *other != id);
            }
        }
    }
}

impl Compositor for HeadlessStage {
    fn disable_unredirect(&self) {
        self.state.borrow_mut().unredirect_disabled = true;
    }

    fn enable_unredirect(&self) {
        self.state.borrow_mut().unredirect_disabled = false;
    }

    fn modal_ended(&self) {
        self.state.borrow_mut().modal_ended_count += 1;
    }
}

impl FrameScheduler for HeadlessStage {
    fn run_before_redraw(&self, callback: OneShot) {
        self.state.borrow_mut().laters.push(callback);
    }

    fn timeout_add(&self, delay: Duration, name: &str, callback: OneShot) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId(state.allocate());
        let deadline = state.clock + delay;
        state.timers.insert(
            id,
            Timer {
                deadline,
                name: name.to_string(),
                callback,
            },
        );
        id
    }

    fn source_remove(&self, timer: TimerId) {
        self.state.borrow_mut().timers.remove(&timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_destroy_clears_focus_and_runs_handlers() {
        let stage = HeadlessStage::new();
        let actor = stage.create_actor("popup");
        stage.set_key_focus(Some(actor));

        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        stage.connect_destroy(actor, Box::new(move || h.set(h.get() + 1)));

        stage.destroy_actor(actor);
        stage.destroy_actor(actor);

        assert_eq!(hits.get(), 1);
        assert_eq!(stage.key_focus(), None);
        assert!(!stage.is_alive(actor));
        assert_eq!(stage.handler_count(actor), 0);
    }

    #[test]
    fn test_handler_disconnected_during_emit_is_skipped() {
        let stage = Rc::new(HeadlessStage::new());
        let actor = stage.create_actor("panel");
        let hits = Rc::new(Cell::new(0));

        let second = Rc::new(Cell::new(None));
        let (s, slot) = (stage.clone(), second.clone());
        stage.connect_destroy(
            actor,
            Box::new(move || {
                if let Some(id) = slot.get() {
                    s.disconnect(actor, id);
                }
            }),
        );
        let h = hits.clone();
        second.set(Some(
            stage.connect_destroy(actor, Box::new(move || h.set(h.get() + 1))),
        ));

        stage.destroy_actor(actor);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_mapped_emits_only_on_change() {
        let stage = HeadlessStage::new();
        let actor = stage.create_actor("calendar");
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        stage.connect_mapped(actor, Box::new(move || h.set(h.get() + 1)));

        stage.set_mapped(actor, true);
        stage.set_mapped(actor, true);
        stage.set_mapped(actor, false);

        assert_eq!(hits.get(), 2);
        assert!(!stage.is_mapped(actor));
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let stage = HeadlessStage::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        let late = Box::new(move || o.borrow_mut().push("late"));
        stage.timeout_add(Duration::from_secs(5), "late", late);
        let o = order.clone();
        let early = Box::new(move || o.borrow_mut().push("early"));
        stage.timeout_add(Duration::from_secs(1), "early", early);
        let removed = stage.timeout_add(Duration::from_secs(2), "removed", Box::new(|| {}));
        stage.source_remove(removed);

        assert_eq!(stage.advance(Duration::from_secs(3)), 1);
        assert_eq!(stage.active_timers(), vec!["late".to_string()]);
        assert_eq!(stage.advance(Duration::from_secs(3)), 1);
        assert_eq!(*order.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn test_frame_callbacks_queued_during_frame_wait() {
        let stage = Rc::new(HeadlessStage::new());
        let s = stage.clone();
        stage.run_before_redraw(Box::new(move || {
            s.run_before_redraw(Box::new(|| {}));
        }));

        assert_eq!(stage.dispatch_frame(), 1);
        assert_eq!(stage.pending_frame_callbacks(), 1);
        assert_eq!(stage.dispatch_frame(), 1);
        assert_eq!(stage.pending_frame_callbacks(), 0);
    }

    #[test]
    fn test_destroy_handlers_cannot_refocus_dying_actor() {
        let stage = Rc::new(HeadlessStage::new());
        let actor = stage.create_actor("entry");
        stage.set_key_focus(Some(actor));

        let s = stage.clone();
        stage.connect_destroy(actor, Box::new(move || s.set_key_focus(Some(actor))));
        stage.destroy_actor(actor);

        assert_eq!(stage.key_focus(), None);
        assert!(!stage.is_alive(actor));
    }

    #[test]
    fn test_disconnect_removes_from_both_tables() {
        let stage = HeadlessStage::new();
        let actor = stage.create_actor("clock");
        let destroy_id = stage.connect_destroy(actor, Box::new(|| {}));
        let mapped_id = stage.connect_mapped(actor, Box::new(|| {}));
        assert_eq!(stage.handler_count(actor), 2);

        stage.disconnect(actor, destroy_id);
        stage.disconnect(actor, mapped_id);
        assert_eq!(stage.handler_count(actor), 0);
    }

    #[test]
    fn test_refused_grab() {
        let stage = HeadlessStage::new();
        let actor = stage.create_actor("dialog");
        stage.set_refuse_grabs(true);
        assert_eq!(
            stage.grab(actor, ModalOptions::empty()),
            Err(ShellError::GrabUnavailable { actor })
        );
        stage.set_refuse_grabs(false);
        let grab = stage.grab(actor, ModalOptions::empty()).unwrap();
        assert!(stage.is_grab_active(grab));
        stage.dismiss(grab);
        assert_eq!(stage.active_grabs(), 0);
    }
}
