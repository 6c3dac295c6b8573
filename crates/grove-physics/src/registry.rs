//! Ordered storage of the world's body handles.

use std::collections::HashMap;

use crate::body::{BodyHandle, BodyId};
use crate::scene::NodeId;

/// Slots reserved before the first registration.
pub const INITIAL_CAPACITY: usize = 128;

/// Append-only, randomly indexable collection of [`BodyHandle`]s.
///
/// Registry order is the force dispatch order. Slots of unregistered bodies
/// stay empty and are never handed out again.
#[derive(Debug)]
pub struct BodyRegistry {
    slots: Vec<Option<BodyHandle>>,
    by_node: HashMap<NodeId, BodyId>,
    reallocations: usize,
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(INITIAL_CAPACITY),
            by_node: HashMap::new(),
            reallocations: 0,
        }
    }

    /// Id the next [`register`](Self::register) call will return.
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_id(&self) -> BodyId {
        BodyId(self.slots.len() as u32)
    }

    /// Append `handle`, doubling the capacity when it is exhausted.
    pub fn register(&mut self, handle: BodyHandle) -> BodyId {
        if self.slots.len() == self.slots.capacity() {
            let grow = self.slots.len().max(1);
            self.slots.reserve_exact(grow);
            self.reallocations += 1;
        }
        let id = self.next_id();
        debug_assert_eq!(handle.id(), id, "handle built for a different slot");
        self.by_node.insert(handle.node(), id);
        self.slots.push(Some(handle));
        id
    }

    /// Empty the slot without compacting. Returns the removed handle.
    pub fn unregister(&mut self, id: BodyId) -> Option<BodyHandle> {
        let handle = self.slots.get_mut(id.0 as usize)?.take()?;
        self.by_node.remove(&handle.node());
        Some(handle)
    }

    pub fn get(&self, id: BodyId) -> Option<&BodyHandle> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut BodyHandle> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn by_node(&self, node: NodeId) -> Option<&BodyHandle> {
        self.get(*self.by_node.get(&node)?)
    }

    pub fn id_of(&self, node: NodeId) -> Option<BodyId> {
        self.by_node.get(&node).copied()
    }

    /// Registered handles in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &BodyHandle> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BodyHandle> {
        self.slots.iter_mut().flatten()
    }

    /// Registered handles whose native body exists, in registry order.
    pub fn iter_live(&self) -> impl Iterator<Item = &BodyHandle> {
        self.iter().filter(|h| h.is_live())
    }

    pub fn iter_live_mut(&mut self) -> impl Iterator<Item = &mut BodyHandle> {
        self.iter_mut().filter(|h| h.is_live())
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Slots handed out so far, including emptied ones.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of times the backing storage had to grow.
    pub const fn reallocations(&self) -> usize {
        self.reallocations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::RigidBodyDesc;

    fn offline(registry: &BodyRegistry, node: u32) -> BodyHandle {
        BodyHandle::offline(NodeId(node), registry.next_id(), &RigidBodyDesc::dynamic(1.0))
    }

    #[test]
    fn starts_with_initial_capacity() {
        let registry = BodyRegistry::new();
        assert!(registry.capacity() >= INITIAL_CAPACITY);
        assert!(registry.is_empty());
        assert_eq!(registry.reallocations(), 0);
    }

    #[test]
    fn register_returns_sequential_ids() {
        let mut registry = BodyRegistry::new();
        for i in 0..3 {
            let h = offline(&registry, i);
            assert_eq!(registry.register(h), BodyId(i));
        }
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.by_node(NodeId(1)).map(BodyHandle::id), Some(BodyId(1)));
    }

    #[test]
    fn unregister_leaves_hole() {
        let mut registry = BodyRegistry::new();
        let a = registry.register(offline(&registry, 0));
        let b = registry.register(offline(&registry, 1));
        assert!(registry.unregister(a).is_some());
        assert!(registry.unregister(a).is_none());
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_some());
        assert_eq!(registry.id_of(NodeId(0)), None);

        let c = registry.register(offline(&registry, 2));
        assert_eq!(c, BodyId(2));
        assert_eq!(registry.slot_count(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn growth_doubles_once_past_initial_capacity() {
        let mut registry = BodyRegistry::new();
        let initial = registry.capacity();
        for i in 0..initial as u32 {
            registry.register(offline(&registry, i));
        }
        assert_eq!(registry.reallocations(), 0);

        registry.register(offline(&registry, initial as u32));
        assert_eq!(registry.reallocations(), 1);
        assert!(registry.capacity() >= 2 * initial);
        for i in 0..=initial as u32 {
            assert_eq!(registry.get(BodyId(i)).map(BodyHandle::node), Some(NodeId(i)));
        }
    }

    #[test]
    fn offline_handles_are_not_live() {
        let mut registry = BodyRegistry::new();
        registry.register(offline(&registry, 0));
        assert_eq!(registry.iter().count(), 1);
        assert_eq!(registry.iter_live().count(), 0);
    }
}
