//! Work Registry
//!
//! Maps work ids to the actor that owns the work and the callback that
//! performs it. Ids come from a counter and are never reused.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, ShellError};
use crate::host::{ActorId, SignalId};

/// Identifier of a registered unit of deferred work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work#{}", self.0)
    }
}

/// Callback performing the work. `Fn` so a callback may re-queue itself.
pub type WorkCallback = Rc<dyn Fn()>;

/// A registered unit of work
#[derive(Clone)]
pub struct WorkItem {
    pub id: WorkId,
    pub owner: ActorId,
    pub callback: WorkCallback,
    /// Subscriptions on the owner, removed when the work is unregistered
    pub signals: Vec<SignalId>,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

/// Registry of deferred work
#[derive(Debug, Default)]
pub struct WorkRegistry {
    items: HashMap<WorkId, WorkItem>,
    sequence: u64,
}

impl WorkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new work item and return its fresh id
    pub fn register(&mut self, owner: ActorId, callback: WorkCallback) -> WorkId {
        self.sequence += 1;
        let id = WorkId(self.sequence);
        self.items.insert(
            id,
            WorkItem {
                id,
                owner,
                callback,
                signals: Vec::new(),
            },
        );
        id
    }

    /// Remember an owner subscription so it can be disconnected later
    pub fn attach_signal(&mut self, id: WorkId, signal: SignalId) {
        if let Some(item) = self.items.get_mut(&id) {
            item.signals.push(signal);
        }
    }

    /// Remove an item. Unknown ids are ignored.
    pub fn unregister(&mut self, id: WorkId) -> Option<WorkItem> {
        self.items.remove(&id)
    }

    /// Look up an item
    pub fn lookup(&self, id: WorkId) -> Result<&WorkItem> {
        self.items.get(&id).ok_or(ShellError::UnknownWorkId(id))
    }

    /// Whether the id is registered
    pub fn contains(&self, id: WorkId) -> bool {
        self.items.contains_key(&id)
    }

    /// Number of registered items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = WorkRegistry::new();
        let owner = ActorId(1);
        let first = registry.register(owner, Rc::new(|| {}));
        registry.unregister(first);
        let second = registry.register(owner, Rc::new(|| {}));

        assert_ne!(first, second);
        assert!(second > first);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_and_unregister() {
        let mut registry = WorkRegistry::new();
        let id = registry.register(ActorId(7), Rc::new(|| {}));
        registry.attach_signal(id, SignalId(3));

        let item = registry.lookup(id).unwrap();
        assert_eq!(item.owner, ActorId(7));
        assert_eq!(item.signals, vec![SignalId(3)]);

        assert!(registry.unregister(id).is_some());
        assert!(registry.unregister(id).is_none());
        assert!(matches!(
            registry.lookup(id),
            Err(ShellError::UnknownWorkId(missing)) if missing == id
        ));
        assert!(registry.is_empty());
    }
}
