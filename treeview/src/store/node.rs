//! Tree node record.

use super::arena::NodeId;

/// One node of the tree. Children form a doubly linked sibling list so
/// that stepping to a neighbour, attaching and detaching are O(1).
#[derive(Debug, Clone)]
pub(crate) struct TreeNode<T> {
    /// `None` only for the root sentinel.
    pub item: Option<T>,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub child_count: usize,
    /// Direct children whose acceptance flag is false.
    pub rejected_children: usize,
    pub expanded: bool,
    pub accepted: bool,
    /// Root is 0, root-level items are 1.
    pub depth: usize,
}

impl<T> TreeNode<T> {
    pub fn root() -> Self {
        Self {
            item: None,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
            rejected_children: 0,
            expanded: true,
            accepted: true,
            depth: 0,
        }
    }

    pub fn new(item: T, parent: NodeId, depth: usize, accepted: bool) -> Self {
        Self {
            item: Some(item),
            parent: Some(parent),
            depth,
            accepted,
            expanded: false,
            ..Self::root()
        }
    }

    pub fn has_accepted_children(&self) -> bool {
        self.child_count > self.rejected_children
    }
}
