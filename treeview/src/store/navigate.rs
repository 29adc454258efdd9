//! Visible-node navigation over the sibling lists.
//!
//! Starting a walk is O(depth); each further step is O(1) amortized since
//! rejected siblings are skipped once per pass.

use crate::item::TreeItem;

use super::arena::NodeId;
use super::inner::StoreInner;

impl<T: TreeItem> StoreInner<T> {
    fn first_accepted_child(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.arena[id];
        if !node.has_accepted_children() {
            return None;
        }
        let mut cur = node.first_child;
        while let Some(child) = cur {
            if self.arena[child].accepted {
                return Some(child);
            }
            cur = self.arena[child].next_sibling;
        }
        None
    }

    fn last_accepted_child(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.arena[id];
        if !node.has_accepted_children() {
            return None;
        }
        let mut cur = node.last_child;
        while let Some(child) = cur {
            if self.arena[child].accepted {
                return Some(child);
            }
            cur = self.arena[child].prev_sibling;
        }
        None
    }

    pub fn next_accepted_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.arena[id].next_sibling;
        while let Some(sibling) = cur {
            if self.arena[sibling].accepted {
                return Some(sibling);
            }
            cur = self.arena[sibling].next_sibling;
        }
        None
    }

    pub fn prev_accepted_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.arena[id].prev_sibling;
        while let Some(sibling) = cur {
            if self.arena[sibling].accepted {
                return Some(sibling);
            }
            cur = self.arena[sibling].prev_sibling;
        }
        None
    }

    /// Deepest last visible descendant of a visible node, or the node.
    pub fn last_descendant(&self, mut id: NodeId) -> NodeId {
        while self.arena[id].expanded {
            match self.last_accepted_child(id) {
                Some(child) => id = child,
                None => break,
            }
        }
        id
    }

    pub fn first_visible(&self) -> Option<NodeId> {
        self.first_accepted_child(self.root)
    }

    pub fn last_visible(&self) -> Option<NodeId> {
        self.last_accepted_child(self.root)
            .map(|id| self.last_descendant(id))
    }

    /// Visible successor of a visible node.
    pub fn next_visible(&self, id: NodeId) -> Option<NodeId> {
        if self.arena[id].expanded
            && let Some(child) = self.first_accepted_child(id)
        {
            return Some(child);
        }
        let mut cur = id;
        loop {
            if let Some(sibling) = self.next_accepted_sibling(cur) {
                return Some(sibling);
            }
            match self.arena[cur].parent {
                Some(parent) if parent != self.root => cur = parent,
                _ => return None,
            }
        }
    }

    /// Visible predecessor of a visible node.
    pub fn prev_visible(&self, id: NodeId) -> Option<NodeId> {
        if let Some(sibling) = self.prev_accepted_sibling(id) {
            return Some(self.last_descendant(sibling));
        }
        self.arena[id].parent.filter(|parent| *parent != self.root)
    }

    /// Number of visible descendants of a visible node.
    pub fn visible_below(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![id];
        while let Some(parent) = stack.pop() {
            let node = &self.arena[parent];
            if !node.expanded || !node.has_accepted_children() {
                continue;
            }
            let mut child = node.first_child;
            while let Some(c) = child {
                if self.arena[c].accepted {
                    count += 1;
                    stack.push(c);
                }
                child = self.arena[c].next_sibling;
            }
        }
        count
    }

    /// The root-level node whose subtree contains `id`.
    pub fn root_level_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = id;
        loop {
            let parent = self.arena.get(cur)?.parent?;
            if parent == self.root {
                return Some(cur);
            }
            cur = parent;
        }
    }
}
