//! Per-subtree ordering: stable sorting and single-item repositioning.

use std::cmp::Ordering;

use log::debug;

use crate::events::TreeEvent;
use crate::item::TreeItem;

use super::arena::NodeId;
use super::inner::{Comparer, StoreInner};

impl<T: TreeItem> StoreInner<T> {
    /// Comparer governing the children of `parent`: the one registered on
    /// the closest ancestor-or-self.
    pub fn comparer_for(&self, parent: NodeId) -> Option<Comparer<T>> {
        let mut cur = Some(parent);
        while let Some(id) = cur {
            if let Some(cmp) = self.comparers.get(&id) {
                return Some(cmp.clone());
            }
            cur = self.arena.get(id).and_then(|n| n.parent);
        }
        None
    }

    /// Stable insertion point for `item` among the children of `parent`:
    /// the first sibling that sorts strictly after it.
    pub fn sorted_position(&self, parent: NodeId, item: &T, cmp: &Comparer<T>) -> Option<NodeId> {
        let mut cur = self.arena[parent].first_child;
        while let Some(id) = cur {
            let node = &self.arena[id];
            if let Some(other) = &node.item
                && cmp(item, other) == Ordering::Less
            {
                return Some(id);
            }
            cur = node.next_sibling;
        }
        None
    }

    fn compare_nodes(&self, a: NodeId, b: NodeId, cmp: &Comparer<T>) -> Ordering {
        match (&self.arena[a].item, &self.arena[b].item) {
            (Some(x), Some(y)) => cmp(x, y),
            _ => Ordering::Equal,
        }
    }

    /// Whether a node sits between its neighbours.
    fn in_order(&self, id: NodeId, cmp: &Comparer<T>) -> bool {
        let node = &self.arena[id];
        let after_prev = node
            .prev_sibling
            .is_none_or(|prev| self.compare_nodes(prev, id, cmp) != Ordering::Greater);
        let before_next = node
            .next_sibling
            .is_none_or(|next| self.compare_nodes(id, next, cmp) != Ordering::Greater);
        after_prev && before_next
    }

    /// Rewrites the sibling list of `parent` to follow `order`.
    fn relink_children(&mut self, parent: NodeId, order: &[NodeId]) {
        let mut prev: Option<NodeId> = None;
        for id in order {
            let node = &mut self.arena[*id];
            node.prev_sibling = prev;
            node.next_sibling = None;
            if let Some(p) = prev {
                self.arena[p].next_sibling = Some(*id);
            }
            prev = Some(*id);
        }
        let parent_node = &mut self.arena[parent];
        parent_node.first_child = order.first().copied();
        parent_node.last_child = order.last().copied();
    }

    /// Stable sort of one child list. Returns whether the order changed.
    pub fn sort_children(&mut self, parent: NodeId, cmp: &Comparer<T>) -> bool {
        let before = self.children_of(parent);
        let mut sorted = before.clone();
        sorted.sort_by(|a, b| self.compare_nodes(*a, *b, cmp));
        if sorted == before {
            return false;
        }
        self.relink_children(parent, &sorted);
        true
    }

    /// Applies every registered comparer to its subtree.
    pub fn sort_all(&mut self) {
        let mut stack: Vec<(NodeId, Option<Comparer<T>>)> = vec![(self.root, None)];
        let mut sorted = 0;
        while let Some((parent, inherited)) = stack.pop() {
            let cmp = self.comparers.get(&parent).cloned().or(inherited);
            if let Some(cmp) = &cmp
                && self.arena[parent].child_count > 1
                && self.sort_children(parent, cmp)
            {
                sorted += 1;
            }
            for child in self.children_of(parent) {
                if self.arena[child].child_count > 0 {
                    stack.push((child, cmp.clone()));
                }
            }
        }
        debug!("Sorted tree ({sorted} child lists reordered)");
        self.outbox.emit(TreeEvent::Sorted { parent: self.root });
    }

    /// Puts an updated node back into sorted position with a single move.
    ///
    /// If the node updated before this one shares the parent and is now out
    /// of order as well, the whole child list is re-sorted instead of
    /// chasing it with further moves.
    pub fn reposition(&mut self, id: NodeId) {
        let Some(parent) = self.arena[id].parent else {
            return;
        };
        let Some(cmp) = self.comparer_for(parent) else {
            self.last_updated = Some(id);
            return;
        };

        if !self.in_order(id, &cmp) {
            let from = self.position(id);
            self.unlink(id);
            let before = match &self.arena[id].item {
                Some(item) => self.sorted_position(parent, item, &cmp),
                None => None,
            };
            self.link(parent, id, before);
            let to = self.position(id);
            self.outbox.emit(TreeEvent::NodeMoved {
                node: id,
                parent,
                from,
                to,
            });
        }

        if let Some(last) = self.last_updated
            && last != id
            && self.arena.get(last).is_some_and(|n| n.parent == Some(parent))
            && !self.in_order(last, &cmp)
        {
            debug!("Update displaced {last}, re-sorting children of {parent}");
            self.sort_children(parent, &cmp);
            self.outbox.emit(TreeEvent::Sorted { parent });
        }
        self.last_updated = Some(id);
    }
}
