//! Scroll anchor and the state it lives in.

use crate::error::{TreeError, ViewError};
use crate::view::ViewNode;

/// Topmost row of the viewport and how far it is scrolled out of view.
///
/// Invariant while `Valid`: the absolute scroll offset equals the summed
/// heights of every visible row above `node`, plus `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    /// Not known; derived from the absolute offset on next use.
    #[default]
    Unset,
    /// `offset` pixels of `node` are above the viewport.
    Valid { node: ViewNode, offset: u32 },
}

impl Anchor {
    /// The anchored row, if any.
    pub fn node(&self) -> Option<ViewNode> {
        match self {
            Anchor::Valid { node, .. } => Some(*node),
            Anchor::Unset => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScrollState {
    pub anchor: Anchor,
    pub scroll_offset: u64,
    pub range: u64,
    pub viewport_height: u32,
}

impl ScrollState {
    pub fn new(viewport_height: u32) -> Self {
        Self {
            viewport_height,
            ..Default::default()
        }
    }

    /// Largest offset that still fills the viewport.
    pub fn max_offset(&self) -> u64 {
        self.range.saturating_sub(u64::from(self.viewport_height))
    }
}

/// Not-found error for a row that left the visible sequence.
pub(crate) fn missing(node: ViewNode) -> ViewError {
    match node {
        ViewNode::Node(id) => TreeError::stale(id).into(),
        ViewNode::Group(group) => ViewError::UnknownGroup(group),
    }
}
