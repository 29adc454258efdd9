//! Visible-node abstraction shared by the tree and the group overlay.
//!
//! [`ViewSource`] is what a [`ScrollWindow`](crate::scroll::ScrollWindow)
//! scrolls over. Both [`NodeStore`](crate::store::NodeStore) and
//! [`GroupOverlay`](crate::group::GroupOverlay) implement it, so the scroll
//! window does not care whether grouping is active.

use std::fmt;

use crate::error::ViewResult;
use crate::events::{Listener, SubscriptionId, TreeEvent};
use crate::group::GroupId;
use crate::store::NodeId;

/// A row in the visible sequence: either a real tree node or a synthetic
/// group header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewNode {
    /// A node of the tree.
    Node(NodeId),
    /// A group header injected by the overlay.
    Group(GroupId),
}

impl ViewNode {
    /// The tree node, if this is not a group header.
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ViewNode::Node(id) => Some(*id),
            ViewNode::Group(_) => None,
        }
    }

    /// The group, if this is a group header.
    pub fn as_group(&self) -> Option<GroupId> {
        match self {
            ViewNode::Group(id) => Some(*id),
            ViewNode::Node(_) => None,
        }
    }

    /// Whether this row is a group header.
    pub fn is_group(&self) -> bool {
        matches!(self, ViewNode::Group(_))
    }
}

impl From<NodeId> for ViewNode {
    fn from(id: NodeId) -> Self {
        ViewNode::Node(id)
    }
}

impl From<GroupId> for ViewNode {
    fn from(id: GroupId) -> Self {
        ViewNode::Group(id)
    }
}

impl fmt::Display for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewNode::Node(id) => id.fmt(f),
            ViewNode::Group(id) => id.fmt(f),
        }
    }
}

/// Enumeration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// A sequence of visible rows that can be walked in both directions.
///
/// Each call is atomic on its own but consecutive calls are not: a
/// concurrent mutation may land between two steps. Callers that need a
/// consistent pass record [`version`](ViewSource::version) first and
/// restart when it changes.
pub trait ViewSource: Send + Sync {
    /// The first visible row.
    fn first_visible(&self) -> ViewResult<Option<ViewNode>>;

    /// The last visible row.
    fn last_visible(&self) -> ViewResult<Option<ViewNode>>;

    /// The visible row adjacent to `from` in `direction`.
    ///
    /// `from` must be visible; a vanished `from` yields a not-found error.
    fn step(&self, from: ViewNode, direction: Direction) -> ViewResult<Option<ViewNode>>;

    /// Whether `node` is currently part of the visible sequence.
    fn is_visible(&self, node: ViewNode) -> bool;

    /// Number of visible rows.
    fn visible_count(&self) -> usize;

    /// Current mutation version.
    fn version(&self) -> u64;

    /// Whether every row may be assumed to share one height. Group headers
    /// break this, so the overlay returns `false`.
    fn supports_fixed_height(&self) -> bool {
        true
    }

    /// Registers a listener for structural notifications.
    fn subscribe(&self, listener: Listener<TreeEvent>) -> SubscriptionId;

    /// Removes a listener.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Creates a cursor. With `start == None` the cursor begins at the
    /// first (forward) or last (backward) visible row.
    fn cursor(&self, start: Option<ViewNode>, direction: Direction) -> VisibleCursor<'_, Self>
    where
        Self: Sized,
    {
        VisibleCursor::new(self, start, direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Start(Option<ViewNode>),
    After(ViewNode),
    Done,
}

/// Directional, restartable iterator over visible rows.
///
/// The cursor holds no lock between steps. A step from a row that vanished
/// in the meantime yields one error and ends the iteration.
///
/// # Example
///
/// ```
/// use treeview::{Direction, NodeStore, ViewSource};
///
/// let store: NodeStore<&'static str> = NodeStore::new();
/// store.add("a", None).unwrap();
/// store.add("b", None).unwrap();
///
/// let rows: Vec<_> = store
///     .cursor(None, Direction::Forward)
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(rows.len(), 2);
/// ```
pub struct VisibleCursor<'a, S: ViewSource + ?Sized> {
    source: &'a S,
    direction: Direction,
    state: CursorState,
}

impl<'a, S: ViewSource + ?Sized> VisibleCursor<'a, S> {
    /// Creates a cursor over `source`.
    pub fn new(source: &'a S, start: Option<ViewNode>, direction: Direction) -> Self {
        Self {
            source,
            direction,
            state: CursorState::Start(start),
        }
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Restarts the cursor at `node` (yielded first if visible).
    pub fn restart(&mut self, node: ViewNode) {
        self.state = CursorState::Start(Some(node));
    }

    /// Flips the direction, continuing from the last yielded row.
    pub fn reverse(&mut self) {
        self.direction = self.direction.reverse();
    }

    /// The last row yielded, if any.
    pub fn position(&self) -> Option<ViewNode> {
        match self.state {
            CursorState::After(node) => Some(node),
            _ => None,
        }
    }
}

impl<S: ViewSource + ?Sized> Iterator for VisibleCursor<'_, S> {
    type Item = ViewResult<ViewNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.state {
            CursorState::Done => return None,
            CursorState::Start(None) => match self.direction {
                Direction::Forward => self.source.first_visible(),
                Direction::Backward => self.source.last_visible(),
            },
            CursorState::Start(Some(node)) => {
                if self.source.is_visible(node) {
                    Ok(Some(node))
                } else {
                    Ok(None)
                }
            }
            CursorState::After(node) => self.source.step(node, self.direction),
        };
        match next {
            Ok(Some(node)) => {
                self.state = CursorState::After(node);
                Some(Ok(node))
            }
            Ok(None) => {
                self.state = CursorState::Done;
                None
            }
            Err(err) => {
                self.state = CursorState::Done;
                Some(Err(err))
            }
        }
    }
}
