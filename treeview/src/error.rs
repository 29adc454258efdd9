//! Error types

use crate::group::GroupId;
use crate::store::NodeId;

/// Errors returned by [`NodeStore`](crate::store::NodeStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The node or item is not (or no longer) part of the tree under the
    /// requested parent.
    #[error("node not found: {0}")]
    NotFound(String),

    /// The parent already has a child carrying this item and the store
    /// enforces per-parent uniqueness.
    #[error("item {item} already present under {parent}")]
    DuplicateKey { parent: NodeId, item: String },

    /// Re-parenting would move a node below itself.
    #[error("cannot move {node} under its own descendant {new_parent}")]
    Cycle { node: NodeId, new_parent: NodeId },

    /// The operation is not allowed on the sentinel root.
    #[error("operation not permitted on the root node")]
    RootNode,
}

impl TreeError {
    /// Creates a not-found error for a node handle.
    pub fn stale(node: NodeId) -> Self {
        Self::NotFound(node.to_string())
    }

    /// Creates a not-found error for an item under a parent.
    pub fn missing_item(item: impl std::fmt::Debug, parent: NodeId) -> Self {
        Self::NotFound(format!("item {item:?} under {parent}"))
    }
}

/// Errors returned by visible-node navigation, grouping and scrolling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// The underlying tree rejected the request.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The grouping function produced an empty group name, or a group's
    /// root-level members are not contiguous.
    #[error("invalid grouping: {0}")]
    InvalidGrouping(String),

    /// The group header does not exist (any more).
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),
}

impl ViewError {
    /// Returns `true` if the error was caused by a node that vanished,
    /// which is the signature of a concurrent mutation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ViewError::Tree(TreeError::NotFound(_)) | ViewError::UnknownGroup(_))
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
pub type ViewResult<T> = Result<T, ViewError>;
