//! Notification types and the listener registry.
//!
//! Every component raises plain callbacks. Events are collected while the
//! component's lock is held and dispatched once it is released, so a
//! listener may call straight back into the tree.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::group::GroupId;
use crate::store::NodeId;

/// Structural and visibility notifications raised by the tree and the
/// group overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node was attached under `parent`.
    NodeAdded { node: NodeId, parent: NodeId },
    /// A node was detached and destroyed. `prev`/`next` are the siblings it
    /// had at the moment of removal.
    NodeRemoved {
        node: NodeId,
        parent: NodeId,
        prev: Option<NodeId>,
        next: Option<NodeId>,
    },
    /// A node's data or its "has accepted children" state changed.
    NodeChanged { node: NodeId },
    /// A node moved from one position to another among its siblings.
    NodeMoved {
        node: NodeId,
        parent: NodeId,
        from: usize,
        to: usize,
    },
    /// A node became visible.
    VisibleNodeAdded { node: NodeId },
    /// A visible node is about to disappear.
    VisibleNodeRemoving { node: NodeId },
    /// A visible node disappeared.
    VisibleNodeRemoved { node: NodeId },
    /// Coalesced notification for a batch, or a structural reset when
    /// [`MultiChange::full`] is set.
    MultiNodeChanged(MultiChange),
    /// The children of `parent` were re-sorted.
    Sorted { parent: NodeId },
    /// A node is about to expand or collapse.
    ExpandChanging { node: NodeId, expanded: bool },
    /// A node expanded or collapsed.
    ExpandChanged { node: NodeId, expanded: bool },
    /// The filter chain changed and acceptance was re-evaluated.
    FilterListChanged,
    /// A group header expanded or collapsed.
    GroupExpandChanged { group: GroupId, expanded: bool },
    /// A group header was created.
    GroupHeaderAdded { group: GroupId },
    /// A group header was dropped.
    GroupHeaderRemoved { group: GroupId },
}

impl TreeEvent {
    /// Whether the event can change the set of visible rows or their
    /// heights, i.e. whether scroll geometry must be recomputed.
    pub fn affects_layout(&self) -> bool {
        !matches!(
            self,
            TreeEvent::NodeAdded { .. }
                | TreeEvent::NodeRemoved { .. }
                | TreeEvent::NodeChanged { .. }
                | TreeEvent::VisibleNodeRemoving { .. }
                | TreeEvent::ExpandChanging { .. }
        )
    }

    /// A structural reset notification.
    pub fn reset() -> Self {
        TreeEvent::MultiNodeChanged(MultiChange::full())
    }
}

/// Coalesced changes of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiChange {
    pub added: HashSet<NodeId>,
    pub removed: HashSet<NodeId>,
    pub changed: HashSet<NodeId>,
    /// Set when the precise sets are meaningless (sort, re-parent, clear,
    /// filter change). Listeners must treat everything as changed.
    pub full: bool,
}

impl MultiChange {
    /// A change that invalidates everything.
    pub fn full() -> Self {
        Self {
            full: true,
            ..Default::default()
        }
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        !self.full && self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Folds one event into the sets. This is the mapping a batch applies
    /// to the notifications it swallows.
    pub fn record(&mut self, event: &TreeEvent) {
        match event {
            TreeEvent::NodeAdded { node, .. } => {
                self.added.insert(*node);
            }
            TreeEvent::NodeRemoved { node, .. } => {
                self.removed.insert(*node);
            }
            TreeEvent::NodeChanged { node }
            | TreeEvent::NodeMoved { node, .. }
            | TreeEvent::ExpandChanged { node, .. } => {
                self.changed.insert(*node);
            }
            TreeEvent::MultiNodeChanged(other) => self.merge(other),
            TreeEvent::Sorted { .. } | TreeEvent::FilterListChanged => self.full = true,
            // Implied by the add/remove/change sets.
            TreeEvent::VisibleNodeAdded { .. }
            | TreeEvent::VisibleNodeRemoving { .. }
            | TreeEvent::VisibleNodeRemoved { .. }
            | TreeEvent::ExpandChanging { .. }
            | TreeEvent::GroupExpandChanged { .. }
            | TreeEvent::GroupHeaderAdded { .. }
            | TreeEvent::GroupHeaderRemoved { .. } => {}
        }
    }

    /// Unions another change into this one.
    pub fn merge(&mut self, other: &MultiChange) {
        self.added.extend(other.added.iter().copied());
        self.removed.extend(other.removed.iter().copied());
        self.changed.extend(other.changed.iter().copied());
        self.full |= other.full;
    }
}

/// Notifications raised by a [`ScrollWindow`](crate::scroll::ScrollWindow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEvent {
    /// Total height of the visible rows changed.
    ScrollRangeChanged { range: u64 },
    /// The absolute scroll offset changed.
    ScrollOffsetChanged { offset: u64 },
    /// The band `start_y..end_y` of the viewport must be repainted.
    RepaintRegion { start_y: u32, end_y: u32 },
    /// The owner is asked to scroll to the absolute offset `y`.
    RequestScroll { y: u64 },
}

/// Unique identifier for a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

impl SubscriptionId {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "__subscription_{}", self.0)
    }
}

/// A notification callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Wraps a closure into a [`Listener`].
pub fn listener<E>(f: impl Fn(&E) + Send + Sync + 'static) -> Listener<E> {
    Arc::new(f)
}

/// Marshals a callback onto the thread that owns the view.
pub trait Invoker: Send + Sync {
    /// Runs `task`, possibly later and on another thread.
    fn invoke(&self, task: Box<dyn FnOnce() + Send>);
}

/// Queues callbacks until the owning thread drains them.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use treeview::events::{EventBus, QueueInvoker, listener};
///
/// let invoker = Arc::new(QueueInvoker::new());
/// let bus: EventBus<u32> = EventBus::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// bus.subscribe_via(invoker.clone(), listener(move |_: &u32| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// bus.emit(&7);
/// assert_eq!(hits.load(Ordering::SeqCst), 0);
/// assert_eq!(invoker.drain(), 1);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
pub struct QueueInvoker {
    tx: mpsc::Sender<Box<dyn FnOnce() + Send>>,
    rx: Mutex<mpsc::Receiver<Box<dyn FnOnce() + Send>>>,
}

impl QueueInvoker {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Runs every queued callback. Returns how many ran.
    pub fn drain(&self) -> usize {
        let tasks: Vec<_> = {
            let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.try_iter().collect()
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

impl Default for QueueInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl Invoker for QueueInvoker {
    fn invoke(&self, task: Box<dyn FnOnce() + Send>) {
        // Receiver lives as long as self.
        let _ = self.tx.send(task);
    }
}

struct Subscriber<E> {
    id: SubscriptionId,
    listener: Listener<E>,
    invoker: Option<Arc<dyn Invoker>>,
}

impl<E> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
            invoker: self.invoker.clone(),
        }
    }
}

/// Registry of listeners for one event type.
pub struct EventBus<E> {
    subscribers: RwLock<Vec<Subscriber<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .map(|s| s.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener called synchronously on the emitting thread.
    pub fn subscribe(&self, listener: Listener<E>) -> SubscriptionId {
        self.register(listener, None)
    }

    /// Registers a listener whose calls are marshaled through `invoker`.
    pub fn subscribe_via(&self, invoker: Arc<dyn Invoker>, listener: Listener<E>) -> SubscriptionId {
        self.register(listener, Some(invoker))
    }

    fn register(&self, listener: Listener<E>, invoker: Option<Arc<dyn Invoker>>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                listener,
                invoker,
            });
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Delivers one event to every listener.
    pub fn emit(&self, event: &E) {
        // Snapshot so listeners can (un)subscribe from inside a callback.
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            match &subscriber.invoker {
                None => (subscriber.listener)(event),
                Some(invoker) => {
                    let listener = Arc::clone(&subscriber.listener);
                    let event = event.clone();
                    invoker.invoke(Box::new(move || listener(&event)));
                }
            }
        }
    }

    /// Delivers events in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = E>) {
        for event in events {
            self.emit(&event);
        }
    }
}
