//! Lock-protected tree state and the mutations that run under the lock.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::config::StoreConfig;
use crate::error::{TreeError, TreeResult};
use crate::events::TreeEvent;
use crate::filter::FilterChain;
use crate::item::TreeItem;

use super::arena::{Arena, NodeId};
use super::batch::Outbox;
use super::node::TreeNode;

/// Ordering over item data, registered per subtree.
pub type Comparer<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Internal state of a [`NodeStore`](super::NodeStore).
pub(crate) struct StoreInner<T: TreeItem> {
    pub arena: Arena<TreeNode<T>>,
    pub root: NodeId,
    /// Every node carrying a given item key.
    pub index: HashMap<T::Key, Vec<NodeId>>,
    pub filters: FilterChain<T>,
    pub comparers: HashMap<NodeId, Comparer<T>>,
    pub config: StoreConfig,
    /// Non-root nodes that currently have children. Zero means the tree is
    /// flat.
    pub nested_parents: usize,
    /// Node touched by the previous `update`.
    pub last_updated: Option<NodeId>,
    pub outbox: Outbox,
}

impl<T: TreeItem> StoreInner<T> {
    pub fn new(config: StoreConfig) -> Self {
        let mut arena = Arena::default();
        let root = arena.insert(TreeNode::root());
        Self {
            arena,
            root,
            index: HashMap::new(),
            filters: FilterChain::new(),
            comparers: HashMap::new(),
            config,
            nested_parents: 0,
            last_updated: None,
            outbox: Outbox::default(),
        }
    }

    pub fn node(&self, id: NodeId) -> TreeResult<&TreeNode<T>> {
        self.arena.get(id).ok_or_else(|| TreeError::stale(id))
    }

    /// Like [`node`](Self::node) but rejects the root.
    pub fn item_node(&self, id: NodeId) -> TreeResult<&TreeNode<T>> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        self.node(id)
    }

    /// Child of `parent` carrying `key`.
    pub fn find_child(&self, key: &T::Key, parent: NodeId) -> Option<NodeId> {
        self.index
            .get(key)?
            .iter()
            .copied()
            .find(|id| self.arena[*id].parent == Some(parent))
    }

    // -------------------------------------------------------------------------
    // Linking
    // -------------------------------------------------------------------------

    /// Attaches a detached node under `parent`, before `before` or at the end.
    pub fn link(&mut self, parent: NodeId, id: NodeId, before: Option<NodeId>) {
        let prev = match before {
            Some(next) => self.arena[next].prev_sibling,
            None => self.arena[parent].last_child,
        };
        let accepted = {
            let node = &mut self.arena[id];
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = before;
            node.accepted
        };
        match prev {
            Some(p) => self.arena[p].next_sibling = Some(id),
            None => self.arena[parent].first_child = Some(id),
        }
        match before {
            Some(n) => self.arena[n].prev_sibling = Some(id),
            None => self.arena[parent].last_child = Some(id),
        }

        let root = self.root;
        let parent_node = &mut self.arena[parent];
        parent_node.child_count += 1;
        if !accepted {
            parent_node.rejected_children += 1;
        }
        if parent != root && parent_node.child_count == 1 {
            self.nested_parents += 1;
        }
    }

    /// Detaches a node from its sibling list. The parent pointer is kept so
    /// the caller still knows where it came from.
    pub fn unlink(&mut self, id: NodeId) {
        let (parent, prev, next, accepted) = {
            let node = &mut self.arena[id];
            let links = (node.parent, node.prev_sibling, node.next_sibling, node.accepted);
            node.prev_sibling = None;
            node.next_sibling = None;
            links
        };
        let Some(parent) = parent else {
            return;
        };
        match prev {
            Some(p) => self.arena[p].next_sibling = next,
            None => self.arena[parent].first_child = next,
        }
        match next {
            Some(n) => self.arena[n].prev_sibling = prev,
            None => self.arena[parent].last_child = prev,
        }

        let root = self.root;
        let parent_node = &mut self.arena[parent];
        parent_node.child_count -= 1;
        if !accepted {
            parent_node.rejected_children -= 1;
        }
        if parent != root && parent_node.child_count == 0 {
            self.nested_parents -= 1;
        }
    }

    /// Direct children in sibling order.
    pub fn children_of(&self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.arena[parent].child_count);
        let mut cur = self.arena[parent].first_child;
        while let Some(id) = cur {
            out.push(id);
            cur = self.arena[id].next_sibling;
        }
        out
    }

    /// Position of a node among its siblings.
    pub fn position(&self, id: NodeId) -> usize {
        let mut pos = 0;
        let mut cur = self.arena[id].prev_sibling;
        while let Some(prev) = cur {
            pos += 1;
            cur = self.arena[prev].prev_sibling;
        }
        pos
    }

    // -------------------------------------------------------------------------
    // Visibility and acceptance
    // -------------------------------------------------------------------------

    /// Accepted and every ancestor below the root expanded.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(node) = self.arena.get(id) else {
            return false;
        };
        if id == self.root || !node.accepted {
            return false;
        }
        let mut cur = node.parent;
        while let Some(parent) = cur {
            if parent == self.root {
                return true;
            }
            let parent_node = &self.arena[parent];
            if !parent_node.expanded {
                return false;
            }
            cur = parent_node.parent;
        }
        true
    }

    /// The visible subtree rooted at `id` in display order, or nothing if
    /// `id` itself is hidden.
    pub fn visible_subtree(&self, id: NodeId) -> Vec<NodeId> {
        if !self.is_visible(id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let node = &self.arena[current];
            if !node.expanded {
                continue;
            }
            let mut child = node.last_child;
            while let Some(c) = child {
                if self.arena[c].accepted {
                    stack.push(c);
                }
                child = self.arena[c].prev_sibling;
            }
        }
        out
    }

    /// Acceptance of `item` if it sat under `parent` at `depth`.
    pub fn evaluate(&self, item: &T, parent: NodeId, depth: usize) -> bool {
        self.arena[parent].accepted && self.filters.accepts(item, depth)
    }

    /// Sets the acceptance flag, keeping the parent's rejected count in
    /// step. Returns whether the flag changed.
    fn set_accepted(&mut self, id: NodeId, accepted: bool) -> bool {
        let node = &mut self.arena[id];
        if node.accepted == accepted {
            return false;
        }
        node.accepted = accepted;
        if let Some(parent) = node.parent {
            let parent_node = &mut self.arena[parent];
            if accepted {
                parent_node.rejected_children -= 1;
            } else {
                parent_node.rejected_children += 1;
            }
        }
        true
    }

    /// Re-derives acceptance for every descendant of `id`.
    pub fn reevaluate_below(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(parent) = stack.pop() {
            let mut child = self.arena[parent].first_child;
            while let Some(c) = child {
                let node = &self.arena[c];
                let accepted = match &node.item {
                    Some(item) => self.evaluate(item, parent, node.depth),
                    None => true,
                };
                self.set_accepted(c, accepted);
                stack.push(c);
                child = self.arena[c].next_sibling;
            }
        }
    }

    /// Moves a node to a new acceptance state and emits the visibility
    /// transitions of its subtree.
    fn apply_acceptance(&mut self, id: NodeId, accepted: bool) {
        if self.arena[id].accepted == accepted {
            return;
        }
        let Some(parent) = self.arena[id].parent else {
            return;
        };
        let had_accepted = self.arena[parent].has_accepted_children();

        if accepted {
            self.set_accepted(id, true);
            self.reevaluate_below(id);
            for node in self.visible_subtree(id) {
                self.outbox.emit(TreeEvent::VisibleNodeAdded { node });
            }
        } else {
            let leaving = self.visible_subtree(id);
            for node in &leaving {
                self.outbox.emit(TreeEvent::VisibleNodeRemoving { node: *node });
            }
            self.set_accepted(id, false);
            self.reevaluate_below(id);
            for node in leaving {
                self.outbox.emit(TreeEvent::VisibleNodeRemoved { node });
            }
        }
        self.notify_parent(parent, had_accepted);
    }

    /// Emits `NodeChanged(parent)` if its "has accepted children" state
    /// differs from `had_accepted`.
    fn notify_parent(&mut self, parent: NodeId, had_accepted: bool) {
        if parent != self.root && self.arena[parent].has_accepted_children() != had_accepted {
            self.outbox.emit(TreeEvent::NodeChanged { node: parent });
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub fn add(&mut self, item: T, parent: NodeId) -> TreeResult<NodeId> {
        let depth = self.node(parent)?.depth + 1;
        let key = item.key();
        if self.config.unique_per_parent && self.find_child(&key, parent).is_some() {
            return Err(TreeError::DuplicateKey {
                parent,
                item: format!("{key:?}"),
            });
        }

        let accepted = self.evaluate(&item, parent, depth);
        let before = match self.insertion_comparer(parent) {
            Some(cmp) => self.sorted_position(parent, &item, &cmp),
            None => None,
        };
        let had_accepted = self.arena[parent].has_accepted_children();

        let id = self.arena.insert(TreeNode::new(item, parent, depth, accepted));
        self.link(parent, id, before);
        self.index.entry(key).or_default().push(id);

        self.outbox.emit(TreeEvent::NodeAdded { node: id, parent });
        if accepted && self.is_visible(id) {
            self.outbox.emit(TreeEvent::VisibleNodeAdded { node: id });
        }
        self.notify_parent(parent, had_accepted);
        Ok(id)
    }

    /// Comparer used to place new children of `parent`, if insertion
    /// sorting is on.
    fn insertion_comparer(&self, parent: NodeId) -> Option<Comparer<T>> {
        if self.config.sort_on_insert {
            self.comparer_for(parent)
        } else {
            None
        }
    }

    /// Removes a node and its subtree, children first.
    pub fn remove_subtree(&mut self, id: NodeId, notify_parent: bool) {
        let mut stack = vec![id];
        while let Some(&current) = stack.last() {
            if let Some(child) = self.arena[current].last_child {
                stack.push(child);
                continue;
            }
            stack.pop();
            self.remove_leaf(current, notify_parent && current == id);
        }
    }

    fn remove_leaf(&mut self, id: NodeId, notify_parent: bool) {
        let visible = self.is_visible(id);
        if visible {
            self.outbox.emit(TreeEvent::VisibleNodeRemoving { node: id });
        }
        let (parent, prev, next) = {
            let node = &self.arena[id];
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        let Some(parent) = parent else {
            return;
        };
        let had_accepted = self.arena[parent].has_accepted_children();

        self.unlink(id);
        if let Some(TreeNode {
            item: Some(item), ..
        }) = self.arena.remove(id)
        {
            self.unindex(&item.key(), id);
        }
        self.comparers.remove(&id);
        if self.last_updated == Some(id) {
            self.last_updated = None;
        }

        self.outbox.emit(TreeEvent::NodeRemoved {
            node: id,
            parent,
            prev,
            next,
        });
        if visible {
            self.outbox.emit(TreeEvent::VisibleNodeRemoved { node: id });
        }
        if notify_parent {
            self.notify_parent(parent, had_accepted);
        }
    }

    fn unindex(&mut self, key: &T::Key, id: NodeId) {
        if let Some(nodes) = self.index.get_mut(key) {
            nodes.retain(|n| *n != id);
            if nodes.is_empty() {
                self.index.remove(key);
            }
        }
    }

    pub fn clear_children(&mut self, id: NodeId) -> TreeResult<()> {
        if id == self.root {
            self.reset();
            return Ok(());
        }
        let had_children = self.node(id)?.child_count > 0;
        while let Some(child) = self.arena[id].last_child {
            self.remove_subtree(child, false);
        }
        if had_children {
            self.outbox.emit(TreeEvent::NodeChanged { node: id });
        }
        Ok(())
    }

    /// Drops every node but the root.
    pub fn reset(&mut self) {
        let root = self.root;
        let removed = self.arena.len() - 1;
        self.arena.retain_only(root);
        let root_node = &mut self.arena[root];
        root_node.first_child = None;
        root_node.last_child = None;
        root_node.child_count = 0;
        root_node.rejected_children = 0;
        self.index.clear();
        self.comparers.retain(|id, _| *id == root);
        self.nested_parents = 0;
        self.last_updated = None;
        debug!("Cleared tree ({removed} nodes)");
        self.outbox.emit(TreeEvent::reset());
    }

    pub fn set_parent(&mut self, id: NodeId, new_parent: NodeId) -> TreeResult<()> {
        self.item_node(id)?;
        self.node(new_parent)?;
        let mut cur = Some(new_parent);
        while let Some(ancestor) = cur {
            if ancestor == id {
                return Err(TreeError::Cycle { node: id, new_parent });
            }
            cur = self.arena[ancestor].parent;
        }

        self.unlink(id);
        let before = match (self.insertion_comparer(new_parent), &self.arena[id].item) {
            (Some(cmp), Some(item)) => self.sorted_position(new_parent, item, &cmp),
            _ => None,
        };
        self.link(new_parent, id, before);

        // Depths of the moved subtree.
        let base = self.arena[new_parent].depth + 1;
        let shift = base as isize - self.arena[id].depth as isize;
        if shift != 0 {
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                let node = &mut self.arena[current];
                node.depth = (node.depth as isize + shift) as usize;
                stack.extend(self.children_of(current));
            }
        }

        let accepted = match &self.arena[id].item {
            Some(item) => self.evaluate(item, new_parent, base),
            None => true,
        };
        self.set_accepted(id, accepted);
        self.reevaluate_below(id);

        debug!("Moved {id} under {new_parent}");
        self.outbox.emit(TreeEvent::reset());
        Ok(())
    }

    /// Replaces the data of every node carrying the item's key.
    pub fn update(&mut self, item: T) -> TreeResult<Vec<NodeId>> {
        let key = item.key();
        let nodes = self
            .index
            .get(&key)
            .cloned()
            .ok_or_else(|| TreeError::missing_item(&key, self.root))?;

        for id in &nodes {
            let id = *id;
            let (parent, depth) = {
                let node = &self.arena[id];
                (node.parent.unwrap_or(self.root), node.depth)
            };
            self.arena[id].item = Some(item.clone());
            self.outbox.emit(TreeEvent::NodeChanged { node: id });

            let accepted = self.evaluate(&item, parent, depth);
            self.apply_acceptance(id, accepted);
            self.reposition(id);
        }
        Ok(nodes)
    }

    /// Returns whether the state changed.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> TreeResult<bool> {
        let node = self.node(id)?;
        if id == self.root || node.expanded == expanded {
            return Ok(false);
        }
        self.outbox.emit(TreeEvent::ExpandChanging { node: id, expanded });
        self.arena[id].expanded = expanded;
        self.outbox.emit(TreeEvent::ExpandChanged { node: id, expanded });
        Ok(true)
    }

    /// Expands or collapses every node that has children. Emits one reset
    /// notification if anything changed.
    pub fn set_all_expanded(&mut self, expanded: bool) -> usize {
        let root = self.root;
        let targets: Vec<NodeId> = self
            .arena
            .ids()
            .filter(|id| {
                let node = &self.arena[*id];
                *id != root && node.child_count > 0 && node.expanded != expanded
            })
            .collect();
        for id in &targets {
            self.arena[*id].expanded = expanded;
        }
        if !targets.is_empty() {
            debug!("Set expanded={expanded} on {} nodes", targets.len());
            self.outbox.emit(TreeEvent::reset());
        }
        targets.len()
    }

    /// Re-evaluates the whole tree against the filter chain.
    pub fn refilter(&mut self) {
        let root = self.root;
        self.reevaluate_below(root);
        debug!("Re-evaluated filters ({} active)", self.filters.len());
        self.outbox.emit(TreeEvent::FilterListChanged);
    }

    // -------------------------------------------------------------------------
    // Counting
    // -------------------------------------------------------------------------

    pub fn visible_count(&self) -> usize {
        let root = &self.arena[self.root];
        if self.nested_parents == 0 && self.filters.is_empty() {
            return root.child_count;
        }
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(parent) = stack.pop() {
            let mut child = self.arena[parent].first_child;
            while let Some(c) = child {
                let node = &self.arena[c];
                if node.accepted {
                    count += 1;
                    if node.expanded && node.child_count > 0 {
                        stack.push(c);
                    }
                }
                child = node.next_sibling;
            }
        }
        count
    }
}
