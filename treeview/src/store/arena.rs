//! Generational slot storage for tree nodes.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Handle to a node of a [`NodeStore`](super::NodeStore).
///
/// A handle stays valid until its node is removed. The slot is then reused
/// with a new generation, so a stale handle never aliases a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index (diagnostics only).
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation (diagnostics only).
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
pub(crate) struct Arena<N> {
    slots: Vec<Option<N>>,
    // Last generation per slot, kept across frees.
    generations: Vec<u32>,
    free: Vec<u32>,
    live: usize,
}

impl<N> Default for Arena<N> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<N> Arena<N> {
    pub fn insert(&mut self, node: N) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.slots[slot] = Some(node);
            NodeId {
                index,
                generation: self.generations[slot],
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(node));
            self.generations.push(0);
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&N> {
        let slot = id.index as usize;
        if self.generations.get(slot) != Some(&id.generation) {
            return None;
        }
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut N> {
        let slot = id.index as usize;
        if self.generations.get(slot) != Some(&id.generation) {
            return None;
        }
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, id: NodeId) -> Option<N> {
        let slot = id.index as usize;
        if self.generations.get(slot) != Some(&id.generation) {
            return None;
        }
        let node = self.slots.get_mut(slot)?.take()?;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    /// Removes every node except `keep`.
    pub fn retain_only(&mut self, keep: NodeId) {
        for slot in 0..self.slots.len() {
            if slot == keep.index as usize || self.slots[slot].is_none() {
                continue;
            }
            self.slots[slot] = None;
            self.generations[slot] = self.generations[slot].wrapping_add(1);
            self.free.push(slot as u32);
            self.live -= 1;
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, node)| {
            node.as_ref().map(|_| NodeId {
                index: slot as u32,
                generation: self.generations[slot],
            })
        })
    }
}

// Indexing is reserved for handles reached through live links (parent,
// child and sibling pointers), which always point at occupied slots.
impl<N> Index<NodeId> for Arena<N> {
    type Output = N;

    fn index(&self, id: NodeId) -> &N {
        match self.get(id) {
            Some(node) => node,
            None => panic!("dangling link to {id}"),
        }
    }
}

impl<N> IndexMut<NodeId> for Arena<N> {
    fn index_mut(&mut self, id: NodeId) -> &mut N {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("dangling link to {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut arena = Arena::default();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        let b = arena.insert("b");

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.remove(a), None);
    }

    #[test]
    fn test_retain_only_keeps_one_slot() {
        let mut arena = Arena::default();
        let root = arena.insert(0);
        let one = arena.insert(1);
        let two = arena.insert(2);

        arena.retain_only(root);

        assert_eq!(arena.len(), 1);
        assert!(arena.get(root).is_some());
        assert!(arena.get(one).is_none());
        assert!(arena.get(two).is_none());
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![root]);
    }
}
