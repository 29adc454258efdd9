//! The tree of items and its visibility bookkeeping.
//!
//! [`NodeStore`] is a cheap-to-clone handle: every clone shares the same
//! tree. One mutex serializes mutations and snapshot reads; notifications
//! are queued while it is held and delivered after it is released.

mod arena;
mod batch;
mod inner;
mod navigate;
mod node;
mod sort;

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;

pub use arena::NodeId;
pub use inner::Comparer;
pub(crate) use inner::StoreInner;

use crate::config::StoreConfig;
use crate::error::{TreeError, TreeResult, ViewError, ViewResult};
use crate::events::{EventBus, Invoker, Listener, SubscriptionId, TreeEvent};
use crate::filter::{FilterId, NodeFilter};
use crate::item::TreeItem;
use crate::view::{Direction, ViewNode, ViewSource};

/// A mutable tree of items with filter-driven visibility.
///
/// Items hang below an invisible root. A node is visible when it is
/// accepted by the filter chain (and so is its parent) and every ancestor
/// is expanded. Passing `None` wherever a parent is expected means the
/// root.
///
/// # Example
///
/// ```
/// use treeview::NodeStore;
///
/// let store: NodeStore<String> = NodeStore::new();
/// let docs = store.add("docs".to_string(), None).unwrap();
/// store.add("readme.md".to_string(), Some(docs)).unwrap();
///
/// assert_eq!(store.visible_item_count(), 1);
/// store.expand(docs).unwrap();
/// assert_eq!(store.visible_item_count(), 2);
/// ```
pub struct NodeStore<T: TreeItem> {
    inner: Arc<Mutex<StoreInner<T>>>,
    root: NodeId,
    version: Arc<AtomicU64>,
    batch_depth: Arc<AtomicUsize>,
    events: Arc<EventBus<TreeEvent>>,
}

impl<T: TreeItem> Clone for NodeStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            root: self.root,
            version: Arc::clone(&self.version),
            batch_depth: Arc::clone(&self.batch_depth),
            events: Arc::clone(&self.events),
        }
    }
}

impl<T: TreeItem> Default for NodeStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TreeItem> fmt::Debug for NodeStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStore")
            .field("len", &self.len())
            .field("version", &self.version())
            .field("listeners", &self.events.len())
            .finish()
    }
}

impl<T: TreeItem> NodeStore<T> {
    /// Create an empty tree with default settings.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty tree.
    pub fn with_config(config: StoreConfig) -> Self {
        let inner = StoreInner::new(config);
        let root = inner.root;
        Self {
            inner: Arc::new(Mutex::new(inner)),
            root,
            version: Arc::new(AtomicU64::new(0)),
            batch_depth: Arc::new(AtomicUsize::new(0)),
            events: Arc::new(EventBus::new()),
        }
    }

    /// The invisible root sentinel.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parent_or_root(&self, parent: Option<NodeId>) -> NodeId {
        parent.unwrap_or(self.root)
    }

    /// Runs a compound read under the lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&StoreInner<T>) -> R) -> R {
        f(&*self.lock())
    }

    /// Runs a mutation under the lock, then delivers what it emitted.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreInner<T>) -> R) -> R {
        let (result, events) = {
            let mut inner = self.lock();
            let batching = self.batch_depth.load(AtomicOrdering::SeqCst) > 0;
            inner.outbox.open(batching);
            let result = f(&mut *inner);
            if inner.outbox.touched() {
                self.version.fetch_add(1, AtomicOrdering::SeqCst);
            }
            (result, inner.outbox.take_events())
        };
        self.events.emit_all(events);
        result
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Attach a new node carrying `item` under `parent`.
    ///
    /// With a comparer governing the parent the node lands at its stable
    /// sorted position, otherwise it is appended.
    pub fn add(&self, item: T, parent: Option<NodeId>) -> TreeResult<NodeId> {
        let parent = self.parent_or_root(parent);
        self.mutate(|inner| inner.add(item, parent))
    }

    /// Remove the child of `parent` carrying `key`, with its subtree.
    pub fn remove(&self, key: &T::Key, parent: Option<NodeId>) -> TreeResult<NodeId> {
        let parent = self.parent_or_root(parent);
        self.mutate(|inner| {
            inner.node(parent)?;
            let id = inner
                .find_child(key, parent)
                .ok_or_else(|| TreeError::missing_item(key, parent))?;
            inner.remove_subtree(id, true);
            Ok(id)
        })
    }

    /// Remove a node and its subtree.
    pub fn remove_node(&self, node: NodeId) -> TreeResult<()> {
        self.mutate(|inner| {
            inner.item_node(node)?;
            inner.remove_subtree(node, true);
            Ok(())
        })
    }

    /// Move a node (with its subtree) under another parent.
    ///
    /// Always reported as a structural reset.
    pub fn set_parent(&self, node: NodeId, new_parent: Option<NodeId>) -> TreeResult<()> {
        let new_parent = self.parent_or_root(new_parent);
        self.mutate(|inner| inner.set_parent(node, new_parent))
    }

    /// Replace the data of every node carrying `item`'s key.
    ///
    /// Acceptance is re-evaluated and each node is moved back into sorted
    /// position. Returns the updated nodes.
    pub fn update(&self, item: T) -> TreeResult<Vec<NodeId>> {
        self.mutate(|inner| inner.update(item))
    }

    /// Remove every node.
    pub fn clear(&self) {
        self.mutate(|inner| inner.reset());
    }

    /// Remove the children of `node`. Clearing the root resets the tree.
    pub fn clear_children(&self, node: Option<NodeId>) -> TreeResult<()> {
        let node = self.parent_or_root(node);
        self.mutate(|inner| inner.clear_children(node))
    }

    // -------------------------------------------------------------------------
    // Sorting
    // -------------------------------------------------------------------------

    /// Register the comparer governing the subtree below `node`.
    ///
    /// Existing children keep their order until [`sort`](Self::sort) runs;
    /// later inserts and updates already follow the new order.
    pub fn set_comparer(
        &self,
        node: Option<NodeId>,
        cmp: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    ) -> TreeResult<()> {
        let node = self.parent_or_root(node);
        let mut inner = self.lock();
        inner.node(node)?;
        inner.comparers.insert(node, Arc::new(cmp));
        Ok(())
    }

    /// Drop the comparer registered on `node`.
    pub fn clear_comparer(&self, node: Option<NodeId>) -> bool {
        let node = self.parent_or_root(node);
        self.lock().comparers.remove(&node).is_some()
    }

    /// Stable sort of every subtree by its governing comparer.
    pub fn sort(&self) {
        self.mutate(|inner| inner.sort_all());
    }

    // -------------------------------------------------------------------------
    // Expand / collapse
    // -------------------------------------------------------------------------

    /// Set a node's expanded state. Returns whether it changed.
    pub fn set_expanded(&self, node: NodeId, expanded: bool) -> TreeResult<bool> {
        self.mutate(|inner| inner.set_expanded(node, expanded))
    }

    pub fn expand(&self, node: NodeId) -> TreeResult<bool> {
        self.set_expanded(node, true)
    }

    pub fn collapse(&self, node: NodeId) -> TreeResult<bool> {
        self.set_expanded(node, false)
    }

    /// Flip a node's expanded state. Returns the new state.
    pub fn toggle(&self, node: NodeId) -> TreeResult<bool> {
        self.mutate(|inner| {
            let expanded = !inner.item_node(node)?.expanded;
            inner.set_expanded(node, expanded)?;
            Ok(expanded)
        })
    }

    /// Expand every node that has children. Returns how many changed.
    pub fn expand_all(&self) -> usize {
        self.mutate(|inner| inner.set_all_expanded(true))
    }

    /// Collapse every node that has children. Returns how many changed.
    pub fn collapse_all(&self) -> usize {
        self.mutate(|inner| inner.set_all_expanded(false))
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    /// Append a filter and re-evaluate the tree.
    pub fn add_filter(&self, filter: impl NodeFilter<T> + 'static) -> FilterId {
        self.mutate(|inner| {
            let id = inner.filters.push(Arc::new(filter));
            inner.refilter();
            id
        })
    }

    /// Remove a filter. Returns `false` if it was not registered.
    pub fn remove_filter(&self, id: FilterId) -> bool {
        self.mutate(|inner| {
            let removed = inner.filters.remove(id);
            if removed {
                inner.refilter();
            }
            removed
        })
    }

    /// Remove every filter.
    pub fn clear_filters(&self) {
        self.mutate(|inner| {
            if !inner.filters.is_empty() {
                inner.filters.clear();
                inner.refilter();
            }
        });
    }

    /// Re-evaluate every node, for filters whose outcome changed without
    /// the chain itself changing.
    pub fn invalidate_filters(&self) {
        self.mutate(|inner| inner.refilter());
    }

    // -------------------------------------------------------------------------
    // Batching
    // -------------------------------------------------------------------------

    /// Open a batch. Nested calls are counted.
    pub fn begin_update(&self) {
        self.batch_depth.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Close a batch. The outermost close delivers one
    /// [`TreeEvent::MultiNodeChanged`] for everything that happened inside.
    /// A close without a matching open does nothing.
    pub fn end_update(&self) {
        match self
            .batch_depth
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |depth| {
                depth.checked_sub(1)
            }) {
            Ok(1) => {
                let flushed = self.lock().outbox.flush_batch();
                if let Some(event) = flushed {
                    self.events.emit(&event);
                }
            }
            Ok(_) => {}
            Err(_) => trace!("Ignoring end_update without begin_update"),
        }
    }

    /// Whether a batch is open.
    pub fn is_updating(&self) -> bool {
        self.batch_depth.load(AtomicOrdering::SeqCst) > 0
    }

    // -------------------------------------------------------------------------
    // Snapshot reads
    // -------------------------------------------------------------------------

    /// Whether any node carries `key`.
    pub fn contains(&self, key: &T::Key) -> bool {
        self.lock().index.contains_key(key)
    }

    /// The child of `parent` carrying `key`.
    pub fn node_from_item(&self, key: &T::Key, parent: Option<NodeId>) -> Option<NodeId> {
        let parent = self.parent_or_root(parent);
        self.lock().find_child(key, parent)
    }

    /// Every node carrying `key`, anywhere in the tree.
    pub fn nodes_for_item(&self, key: &T::Key) -> Vec<NodeId> {
        self.lock().index.get(key).cloned().unwrap_or_default()
    }

    /// A copy of the node's item.
    pub fn item(&self, node: NodeId) -> TreeResult<T> {
        let inner = self.lock();
        inner
            .item_node(node)?
            .item
            .clone()
            .ok_or(TreeError::RootNode)
    }

    /// The node's parent, `None` for root-level nodes.
    pub fn parent(&self, node: NodeId) -> TreeResult<Option<NodeId>> {
        let inner = self.lock();
        let parent = inner.item_node(node)?.parent;
        Ok(parent.filter(|p| *p != inner.root))
    }

    /// Direct children in order.
    pub fn children(&self, node: Option<NodeId>) -> TreeResult<Vec<NodeId>> {
        let node = self.parent_or_root(node);
        let inner = self.lock();
        inner.node(node)?;
        Ok(inner.children_of(node))
    }

    /// Depth of a node; root-level nodes have depth 1.
    pub fn depth(&self, node: NodeId) -> TreeResult<usize> {
        Ok(self.lock().node(node)?.depth)
    }

    pub fn is_expanded(&self, node: NodeId) -> TreeResult<bool> {
        Ok(self.lock().node(node)?.expanded)
    }

    /// Whether the node passed the filter chain (and so did its parent).
    pub fn is_accepted(&self, node: NodeId) -> TreeResult<bool> {
        Ok(self.lock().node(node)?.accepted)
    }

    pub fn has_accepted_children(&self, node: NodeId) -> TreeResult<bool> {
        Ok(self.lock().node(node)?.has_accepted_children())
    }

    /// Whether the node is part of the visible sequence.
    pub fn is_node_visible(&self, node: NodeId) -> bool {
        self.lock().is_visible(node)
    }

    /// Number of item nodes, visible or not.
    pub fn len(&self) -> usize {
        self.lock().arena.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of visible nodes. O(1) for a flat, unfiltered tree.
    pub fn visible_item_count(&self) -> usize {
        self.lock().visible_count()
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Current mutation version.
    pub fn version(&self) -> u64 {
        self.version.load(AtomicOrdering::SeqCst)
    }

    /// Register a listener called on the mutating thread.
    pub fn subscribe(&self, listener: Listener<TreeEvent>) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    /// Register a listener whose calls go through `invoker`.
    pub fn subscribe_via(
        &self,
        invoker: Arc<dyn Invoker>,
        listener: Listener<TreeEvent>,
    ) -> SubscriptionId {
        self.events.subscribe_via(invoker, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

fn node_of(view: ViewNode) -> ViewResult<NodeId> {
    match view {
        ViewNode::Node(id) => Ok(id),
        ViewNode::Group(group) => Err(ViewError::UnknownGroup(group)),
    }
}

impl<T: TreeItem> ViewSource for NodeStore<T> {
    fn first_visible(&self) -> ViewResult<Option<ViewNode>> {
        Ok(self.read(|inner| inner.first_visible()).map(ViewNode::Node))
    }

    fn last_visible(&self) -> ViewResult<Option<ViewNode>> {
        Ok(self.read(|inner| inner.last_visible()).map(ViewNode::Node))
    }

    fn step(&self, from: ViewNode, direction: Direction) -> ViewResult<Option<ViewNode>> {
        let id = node_of(from)?;
        let inner = self.lock();
        if !inner.is_visible(id) {
            return Err(TreeError::stale(id).into());
        }
        let next = match direction {
            Direction::Forward => inner.next_visible(id),
            Direction::Backward => inner.prev_visible(id),
        };
        Ok(next.map(ViewNode::Node))
    }

    fn is_visible(&self, node: ViewNode) -> bool {
        node.as_node().is_some_and(|id| self.is_node_visible(id))
    }

    fn visible_count(&self) -> usize {
        self.visible_item_count()
    }

    fn version(&self) -> u64 {
        NodeStore::version(self)
    }

    fn subscribe(&self, listener: Listener<TreeEvent>) -> SubscriptionId {
        NodeStore::subscribe(self, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        NodeStore::unsubscribe(self, id);
    }
}
