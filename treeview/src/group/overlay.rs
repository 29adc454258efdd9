//! The grouping overlay: a [`ViewSource`] that wraps a [`NodeStore`] and
//! injects one header row per run of root-level nodes sharing a group.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, warn};

use crate::error::{TreeError, ViewError, ViewResult};
use crate::events::{EventBus, Invoker, Listener, SubscriptionId, TreeEvent, listener};
use crate::item::TreeItem;
use crate::store::{NodeId, NodeStore, StoreInner};
use crate::view::{Direction, ViewNode, ViewSource};

use super::GroupId;
use super::header::{GroupHeader, GroupState};

/// Maps an item to the name of its group. Must not return an empty name.
pub type GroupFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

struct OverlayCore<T: TreeItem> {
    store: NodeStore<T>,
    grouping: GroupFn<T>,
    state: Mutex<GroupState>,
    // Bumped by header changes; added to the store version.
    version: AtomicU64,
    events: EventBus<TreeEvent>,
}

/// Groups the root-level nodes of a [`NodeStore`] under synthetic headers.
///
/// Root-level nodes of one group must be contiguous, which holds when the
/// root comparer orders by group first. A step that would enter a second
/// run of a group fails with [`ViewError::InvalidGrouping`], which ends any
/// cursor walking the overlay. Collapsing a header hides every member in
/// one step.
///
/// # Example
///
/// ```
/// use treeview::{Direction, GroupOverlay, NodeStore, ViewSource};
///
/// let store: NodeStore<String> = NodeStore::new();
/// for name in ["apple", "avocado", "banana"] {
///     store.add(name.to_string(), None).unwrap();
/// }
/// let overlay = GroupOverlay::new(store, |s: &String| s[..1].to_uppercase()).unwrap();
///
/// // Header "A", apple, avocado, header "B", banana.
/// assert_eq!(overlay.cursor(None, Direction::Forward).count(), 5);
///
/// let a = overlay.group_header("A").unwrap();
/// overlay.collapse_group(a).unwrap();
/// assert_eq!(overlay.cursor(None, Direction::Forward).count(), 3);
/// ```
pub struct GroupOverlay<T: TreeItem> {
    core: Arc<OverlayCore<T>>,
    subscription: SubscriptionId,
}

impl<T: TreeItem> fmt::Debug for GroupOverlay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupOverlay")
            .field("store", &self.core.store)
            .field("groups", &self.core.lock().headers().count())
            .finish()
    }
}

impl<T: TreeItem> GroupOverlay<T> {
    /// Wraps `store`, building headers for its current root level.
    ///
    /// Fails with [`ViewError::InvalidGrouping`] if any root-level item maps
    /// to an empty name.
    pub fn new(
        store: NodeStore<T>,
        grouping: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> ViewResult<Self> {
        let core = Arc::new(OverlayCore {
            store,
            grouping: Arc::new(grouping),
            state: Mutex::new(GroupState::default()),
            version: AtomicU64::new(0),
            events: EventBus::new(),
        });

        {
            let mut state = core.lock();
            core.store.read(|inner| {
                for node in inner.children_of(inner.root) {
                    core.name_of(inner, node)?;
                }
                core.rebuild(&mut state, inner);
                Ok::<_, ViewError>(())
            })?;
            // Nobody is listening yet.
            state.take_pending();
        }

        let weak: Weak<OverlayCore<T>> = Arc::downgrade(&core);
        let subscription = core.store.subscribe(listener(move |event: &TreeEvent| {
            if let Some(core) = weak.upgrade() {
                core.on_store_event(event);
            }
        }));
        Ok(Self { core, subscription })
    }

    /// The wrapped tree.
    pub fn store(&self) -> &NodeStore<T> {
        &self.core.store
    }

    /// The header for `name`, created on first reference.
    ///
    /// A header created for a name no root-level node maps to is dropped on
    /// the next header change unless a node joins it first.
    pub fn group_header(&self, name: &str) -> ViewResult<GroupId> {
        if name.is_empty() {
            return Err(ViewError::InvalidGrouping("empty group name".to_string()));
        }
        let (id, pending) = {
            let mut state = self.core.lock();
            let id = state.request_header(name);
            (id, state.take_pending())
        };
        self.core.announce(pending);
        Ok(id)
    }

    /// Expand or collapse a group. Returns whether the state changed.
    pub fn set_group_expanded(&self, group: GroupId, expanded: bool) -> ViewResult<bool> {
        {
            let mut state = self.core.lock();
            let header = state.header_mut(group)?;
            if header.expanded == expanded {
                return Ok(false);
            }
            header.expanded = expanded;
            self.core.version.fetch_add(1, Ordering::SeqCst);
        }
        debug!("Group {group} expanded={expanded}");
        self.core
            .events
            .emit(&TreeEvent::GroupExpandChanged { group, expanded });
        Ok(true)
    }

    pub fn expand_group(&self, group: GroupId) -> ViewResult<bool> {
        self.set_group_expanded(group, true)
    }

    pub fn collapse_group(&self, group: GroupId) -> ViewResult<bool> {
        self.set_group_expanded(group, false)
    }

    /// Flip a group's state. Returns the new state.
    pub fn toggle_group(&self, group: GroupId) -> ViewResult<bool> {
        let expanded = !self.is_group_expanded(group)?;
        self.set_group_expanded(group, expanded)?;
        Ok(expanded)
    }

    pub fn is_group_expanded(&self, group: GroupId) -> ViewResult<bool> {
        Ok(self.core.lock().header(group)?.expanded)
    }

    /// The group of the root-level ancestor of `node`.
    pub fn group_of(&self, node: NodeId) -> ViewResult<GroupId> {
        self.core.with(|state, inner| {
            let top = inner
                .root_level_ancestor(node)
                .ok_or_else(|| TreeError::stale(node))?;
            self.core.group_id_of(state, inner, top)
        })
    }

    pub fn group_name(&self, group: GroupId) -> ViewResult<String> {
        Ok(self.core.lock().header(group)?.name.clone())
    }

    /// First visible root-level member of the group.
    pub fn top_node(&self, group: GroupId) -> ViewResult<Option<NodeId>> {
        self.core.with(|state, inner| {
            state.header(group)?;
            Ok(self.core.locate_top(state, inner, group))
        })
    }

    /// Snapshot of every header, in creation order.
    pub fn groups(&self) -> Vec<GroupHeader> {
        let mut groups: Vec<GroupHeader> = self.core.lock().headers().cloned().collect();
        groups.sort_by_key(|h| h.id);
        groups
    }

    /// Register a listener for the forwarded tree notifications and the
    /// overlay's own header notifications.
    pub fn subscribe_via(
        &self,
        invoker: Arc<dyn Invoker>,
        listener: Listener<TreeEvent>,
    ) -> SubscriptionId {
        self.core.events.subscribe_via(invoker, listener)
    }
}

impl<T: TreeItem> Drop for GroupOverlay<T> {
    fn drop(&mut self) {
        self.core.store.unsubscribe(self.subscription);
    }
}

impl<T: TreeItem> OverlayCore<T> {
    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with the header table and the tree locked, in that order.
    fn with<R>(&self, f: impl FnOnce(&mut GroupState, &StoreInner<T>) -> R) -> R {
        let mut state = self.lock();
        self.store.read(|inner| f(&mut *state, inner))
    }

    fn announce(&self, pending: Vec<TreeEvent>) {
        if !pending.is_empty() {
            self.version.fetch_add(1, Ordering::SeqCst);
            self.events.emit_all(pending);
        }
    }

    fn name_of(&self, inner: &StoreInner<T>, node: NodeId) -> ViewResult<String> {
        let item = inner
            .node(node)?
            .item
            .as_ref()
            .ok_or(TreeError::RootNode)?;
        let name = (self.grouping)(item);
        if name.is_empty() {
            return Err(ViewError::InvalidGrouping(format!("empty group name for {node}")));
        }
        Ok(name)
    }

    /// Group of a root-level node.
    fn group_id_of(
        &self,
        state: &mut GroupState,
        inner: &StoreInner<T>,
        node: NodeId,
    ) -> ViewResult<GroupId> {
        if let Some(group) = state.member_group(node) {
            return Ok(group);
        }
        // Not seen yet: the notification is still on its way.
        let name = self.name_of(inner, node)?;
        let group = state.header_for(&name);
        state.assign(node, group);
        Ok(group)
    }

    fn is_expanded(&self, state: &GroupState, group: GroupId) -> bool {
        state.header(group).map(|h| h.expanded).unwrap_or(true)
    }

    /// First visible root-level member of a group, refreshing the cached
    /// top node when it went stale.
    fn locate_top(
        &self,
        state: &mut GroupState,
        inner: &StoreInner<T>,
        group: GroupId,
    ) -> Option<NodeId> {
        let cached = state.header(group).ok()?.top_node;
        if let Some(top) = cached
            && inner.is_visible(top)
            && inner.arena[top].parent == Some(inner.root)
            && state.member_group(top) == Some(group)
            && inner
                .prev_accepted_sibling(top)
                .is_none_or(|prev| state.member_group(prev) != Some(group))
        {
            return Some(top);
        }

        let mut cur = inner.first_visible();
        let mut found = None;
        while let Some(node) = cur {
            if self.group_id_of(state, inner, node).ok() == Some(group) {
                found = Some(node);
                break;
            }
            cur = inner.next_accepted_sibling(node);
        }
        if let Ok(header) = state.header_mut(group) {
            header.top_node = found;
        }
        found
    }

    /// Rebuilds membership and the header table from the root level.
    fn rebuild(&self, state: &mut GroupState, inner: &StoreInner<T>) {
        state.clear_members();
        let mut referenced = HashSet::new();
        let mut tops: Vec<(GroupId, NodeId)> = Vec::new();
        for node in inner.children_of(inner.root) {
            match self.name_of(inner, node) {
                Ok(name) => {
                    let group = state.header_for(&name);
                    state.assign(node, group);
                    if referenced.insert(group)
                        && let Ok(header) = state.header_mut(group)
                    {
                        header.top_node = None;
                    }
                    if inner.arena[node].accepted && !tops.iter().any(|(g, _)| *g == group) {
                        tops.push((group, node));
                    }
                }
                Err(err) => warn!("Skipping {node} while grouping: {err}"),
            }
        }
        for (group, node) in tops {
            if let Ok(header) = state.header_mut(group) {
                header.top_node = Some(node);
            }
        }
        state.retain_headers(&referenced);
        debug!("Rebuilt group headers ({} groups)", referenced.len());
    }

    /// Re-derives the group of a root-level node that changed or moved.
    fn regroup(&self, state: &mut GroupState, inner: &StoreInner<T>, node: NodeId) {
        let name = match self.name_of(inner, node) {
            Ok(name) => name,
            Err(err) => {
                warn!("Cannot regroup {node}: {err}");
                return;
            }
        };
        let group = state.header_for(&name);
        if let Some(old) = state.assign(node, group)
            && old != group
        {
            let (prev, next) = {
                let n = &inner.arena[node];
                (n.prev_sibling, n.next_sibling)
            };
            state.dispose_unless_adjacent(old, prev, next);
        }
    }

    fn on_store_event(&self, event: &TreeEvent) {
        let pending = self.with(|state, inner| {
            let root = inner.root;
            match event {
                TreeEvent::NodeAdded { node, parent } if *parent == root => {
                    if inner.node(*node).is_ok() {
                        self.regroup(state, inner, *node);
                    }
                }
                TreeEvent::NodeChanged { node } | TreeEvent::NodeMoved { node, .. } => {
                    if inner.arena.get(*node).is_some_and(|n| n.parent == Some(root)) {
                        self.regroup(state, inner, *node);
                    }
                }
                TreeEvent::NodeRemoved {
                    node,
                    parent,
                    prev,
                    next,
                } if *parent == root => {
                    if let Some(old) = state.unassign(*node) {
                        state.dispose_unless_adjacent(old, *prev, *next);
                    }
                }
                TreeEvent::MultiNodeChanged(_) => self.rebuild(state, inner),
                _ => {}
            }
            if state.has_pending() {
                state.drop_unclaimed();
            }
            state.take_pending()
        });
        self.announce(pending);
        self.events.emit(event);
    }

    // -------------------------------------------------------------------------
    // Enumeration
    // -------------------------------------------------------------------------

    /// Whether a tree node is visible with its group's state applied.
    fn node_visible(&self, state: &mut GroupState, inner: &StoreInner<T>, node: NodeId) -> bool {
        if !inner.is_visible(node) {
            return false;
        }
        inner
            .root_level_ancestor(node)
            .and_then(|top| self.group_id_of(state, inner, top).ok())
            .is_some_and(|group| self.is_expanded(state, group))
    }

    fn first_visible(&self, state: &mut GroupState, inner: &StoreInner<T>) -> ViewResult<Option<ViewNode>> {
        match inner.first_visible() {
            Some(first) => Ok(Some(ViewNode::Group(self.group_id_of(state, inner, first)?))),
            None => Ok(None),
        }
    }

    fn last_visible(&self, state: &mut GroupState, inner: &StoreInner<T>) -> ViewResult<Option<ViewNode>> {
        let Some(last) = inner.last_visible() else {
            return Ok(None);
        };
        let top = inner
            .root_level_ancestor(last)
            .ok_or_else(|| TreeError::stale(last))?;
        let group = self.group_id_of(state, inner, top)?;
        if self.is_expanded(state, group) {
            Ok(Some(ViewNode::Node(last)))
        } else {
            self.check_run(state, inner, group, top)?;
            Ok(Some(ViewNode::Group(group)))
        }
    }

    /// First root-level node of the run of `group` that contains `node`.
    fn run_start(
        &self,
        state: &mut GroupState,
        inner: &StoreInner<T>,
        group: GroupId,
        mut node: NodeId,
    ) -> ViewResult<NodeId> {
        while let Some(prev) = inner.prev_accepted_sibling(node) {
            if self.group_id_of(state, inner, prev)? != group {
                break;
            }
            node = prev;
        }
        Ok(node)
    }

    /// Fails unless the run of `group` containing `node` is its only run.
    ///
    /// A header stands for exactly one run, so a group whose root-level
    /// members are split by another group cannot be enumerated.
    fn check_run(
        &self,
        state: &mut GroupState,
        inner: &StoreInner<T>,
        group: GroupId,
        node: NodeId,
    ) -> ViewResult<()> {
        let start = self.run_start(state, inner, group, node)?;
        if self.locate_top(state, inner, group) == Some(start) {
            return Ok(());
        }
        let name = state.header(group)?.name.clone();
        warn!("Group {name:?} is split around {start}; root level is not ordered by group");
        Err(ViewError::InvalidGrouping(format!(
            "group {name:?} is split around {start}"
        )))
    }

    fn step(
        &self,
        state: &mut GroupState,
        inner: &StoreInner<T>,
        from: ViewNode,
        direction: Direction,
    ) -> ViewResult<Option<ViewNode>> {
        if let ViewNode::Node(node) = from
            && !self.node_visible(state, inner, node)
        {
            return Err(TreeError::stale(node).into());
        }
        match (from, direction) {
            (ViewNode::Group(group), Direction::Forward) => {
                let top = self
                    .locate_top(state, inner, group)
                    .ok_or(ViewError::UnknownGroup(group))?;
                if self.is_expanded(state, group) {
                    return Ok(Some(ViewNode::Node(top)));
                }
                // Skip the whole collapsed run.
                let mut cur = top;
                while let Some(next) = inner.next_accepted_sibling(cur) {
                    let next_group = self.group_id_of(state, inner, next)?;
                    if next_group != group {
                        self.check_run(state, inner, next_group, next)?;
                        return Ok(Some(ViewNode::Group(next_group)));
                    }
                    cur = next;
                }
                Ok(None)
            }
            (ViewNode::Group(group), Direction::Backward) => {
                let top = self
                    .locate_top(state, inner, group)
                    .ok_or(ViewError::UnknownGroup(group))?;
                let Some(prev) = inner.prev_accepted_sibling(top) else {
                    return Ok(None);
                };
                let prev_group = self.group_id_of(state, inner, prev)?;
                if self.is_expanded(state, prev_group) {
                    Ok(Some(ViewNode::Node(inner.last_descendant(prev))))
                } else {
                    self.check_run(state, inner, prev_group, prev)?;
                    Ok(Some(ViewNode::Group(prev_group)))
                }
            }
            (ViewNode::Node(node), Direction::Forward) => {
                let Some(next) = inner.next_visible(node) else {
                    return Ok(None);
                };
                if inner.arena[next].parent != Some(inner.root) {
                    return Ok(Some(ViewNode::Node(next)));
                }
                let current = inner
                    .root_level_ancestor(node)
                    .ok_or_else(|| TreeError::stale(node))?;
                let current_group = self.group_id_of(state, inner, current)?;
                let next_group = self.group_id_of(state, inner, next)?;
                if next_group == current_group {
                    Ok(Some(ViewNode::Node(next)))
                } else {
                    self.check_run(state, inner, next_group, next)?;
                    Ok(Some(ViewNode::Group(next_group)))
                }
            }
            (ViewNode::Node(node), Direction::Backward) => {
                if inner.arena[node].parent == Some(inner.root) {
                    let group = self.group_id_of(state, inner, node)?;
                    let starts_run = match inner.prev_accepted_sibling(node) {
                        Some(prev) => self.group_id_of(state, inner, prev)? != group,
                        None => true,
                    };
                    if starts_run {
                        self.check_run(state, inner, group, node)?;
                        return Ok(Some(ViewNode::Group(group)));
                    }
                }
                Ok(inner.prev_visible(node).map(ViewNode::Node))
            }
        }
    }

    fn visible_count(&self, state: &mut GroupState, inner: &StoreInner<T>) -> usize {
        let mut count = 0;
        let mut run: Option<GroupId> = None;
        let mut cur = inner.first_visible();
        while let Some(node) = cur {
            match self.group_id_of(state, inner, node) {
                Ok(group) => {
                    if run != Some(group) {
                        count += 1;
                        run = Some(group);
                    }
                    if self.is_expanded(state, group) {
                        count += 1 + inner.visible_below(node);
                    }
                }
                Err(err) => warn!("Not counting {node}: {err}"),
            }
            cur = inner.next_accepted_sibling(node);
        }
        count
    }
}

impl<T: TreeItem> ViewSource for GroupOverlay<T> {
    fn first_visible(&self) -> ViewResult<Option<ViewNode>> {
        self.core.with(|state, inner| self.core.first_visible(state, inner))
    }

    fn last_visible(&self) -> ViewResult<Option<ViewNode>> {
        self.core.with(|state, inner| self.core.last_visible(state, inner))
    }

    fn step(&self, from: ViewNode, direction: Direction) -> ViewResult<Option<ViewNode>> {
        self.core
            .with(|state, inner| self.core.step(state, inner, from, direction))
    }

    fn is_visible(&self, node: ViewNode) -> bool {
        self.core.with(|state, inner| match node {
            ViewNode::Node(id) => self.core.node_visible(state, inner, id),
            ViewNode::Group(group) => self.core.locate_top(state, inner, group).is_some(),
        })
    }

    fn visible_count(&self) -> usize {
        self.core.with(|state, inner| self.core.visible_count(state, inner))
    }

    fn version(&self) -> u64 {
        self.core.store.version() + self.core.version.load(Ordering::SeqCst)
    }

    fn supports_fixed_height(&self) -> bool {
        false
    }

    fn subscribe(&self, listener: Listener<TreeEvent>) -> SubscriptionId {
        self.core.events.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.core.events.unsubscribe(id);
    }
}
