//! Arena of execution context records.

use super::ExecutionContext;
use crate::core::{ContextId, ContextStatus};

/// Append-only storage for context records.
///
/// Slots are never freed or reused: a dead context keeps its record so that
/// handles to it stay unambiguous and report `Dead`.
#[derive(Debug, Default)]
pub(crate) struct ContextArena {
    records: Vec<ExecutionContext>,
}

impl ContextArena {
    /// Creates an arena holding only the root record.
    pub(crate) fn with_root(root: ExecutionContext) -> Self {
        Self {
            records: vec![root],
        }
    }

    pub(crate) fn alloc(&mut self, record: ExecutionContext) -> ContextId {
        let id = ContextId::from_index(self.records.len());
        self.records.push(record);
        id
    }

    pub(crate) fn get(&self, id: ContextId) -> Option<&ExecutionContext> {
        self.records.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> Option<&mut ExecutionContext> {
        self.records.get_mut(id.index())
    }

    pub(crate) fn status(&self, id: ContextId) -> Option<ContextStatus> {
        self.get(id).map(|record| record.status)
    }

    pub(crate) fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.get(id).and_then(|record| record.parent)
    }

    /// Iterates the parent chain of `id`, excluding `id` itself.
    pub(crate) fn ancestors(&self, id: ContextId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.parent(id),
            remaining: self.records.len(),
        }
    }

    /// Returns true if `candidate` is `id` or one of its ancestors.
    pub(crate) fn is_ancestor_or_self(&self, candidate: ContextId, id: ContextId) -> bool {
        candidate == id || self.ancestors(id).any(|ancestor| ancestor == candidate)
    }

    /// The first ancestor of `id` that has not finished, or the root.
    pub(crate) fn nearest_living_ancestor(&self, id: ContextId) -> ContextId {
        self.ancestors(id)
            .find(|&ancestor| self.status(ancestor).is_some_and(|status| status.is_alive()))
            .unwrap_or(ContextId::ROOT)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ExecutionContext> {
        self.records.iter_mut()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.status.is_alive())
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Iterator over a parent chain.
///
/// Bounded by the arena size so a transiently cyclic chain still terminates.
pub(crate) struct Ancestors<'a> {
    arena: &'a ContextArena,
    next: Option<ContextId>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = ContextId;

    fn next(&mut self) -> Option<ContextId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.arena.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LocalBag;

    fn spawn(arena: &mut ContextArena, parent: ContextId) -> ContextId {
        let entry: crate::engine::Entry = Box::new(|_, value| Ok(value));
        arena.alloc(ExecutionContext::spawned("run", parent, entry, LocalBag::new()))
    }

    fn arena() -> ContextArena {
        ContextArena::with_root(ExecutionContext::root("main"))
    }

    #[test]
    fn test_alloc_assigns_sequential_ids() {
        let mut arena = arena();
        let a = spawn(&mut arena, ContextId::ROOT);
        let b = spawn(&mut arena, a);

        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 2);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.status(a), Some(ContextStatus::NotStarted));
        assert_eq!(arena.status(ContextId::ROOT), Some(ContextStatus::Running));
    }

    #[test]
    fn test_ancestors() {
        let mut arena = arena();
        let a = spawn(&mut arena, ContextId::ROOT);
        let b = spawn(&mut arena, a);

        let chain: Vec<_> = arena.ancestors(b).collect();
        assert_eq!(chain, vec![a, ContextId::ROOT]);
        assert!(arena.is_ancestor_or_self(ContextId::ROOT, b));
        assert!(arena.is_ancestor_or_self(b, b));
        assert!(!arena.is_ancestor_or_self(b, a));
    }

    #[test]
    fn test_nearest_living_ancestor_skips_dead() {
        let mut arena = arena();
        let a = spawn(&mut arena, ContextId::ROOT);
        let b = spawn(&mut arena, a);

        assert_eq!(arena.nearest_living_ancestor(b), a);
        let _ = arena.get_mut(a).map(ExecutionContext::retire);
        assert_eq!(arena.nearest_living_ancestor(b), ContextId::ROOT);
        assert_eq!(arena.live_count(), 2);
    }

    #[test]
    fn test_ancestors_terminates_on_cycle() {
        let mut arena = arena();
        let a = spawn(&mut arena, ContextId::ROOT);
        let b = spawn(&mut arena, a);
        if let Some(record) = arena.get_mut(a) {
            record.parent = Some(b);
        }

        assert!(arena.ancestors(b).count() <= arena.len());
    }

    #[test]
    fn test_unknown_id() {
        let arena = arena();
        let missing = ContextId::from_index(9);
        assert!(arena.get(missing).is_none());
        assert_eq!(arena.ancestors(missing).next(), None);
    }
}
