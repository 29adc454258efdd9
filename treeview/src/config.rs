//! Store and scroll window configuration.

use std::fmt;
use std::sync::Arc;

use crate::view::ViewNode;

/// Configuration for a [`NodeStore`](crate::store::NodeStore).
///
/// # Example
///
/// ```
/// use treeview::StoreConfig;
///
/// let config = StoreConfig::default().with_unique_per_parent(true);
/// assert!(config.unique_per_parent);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Reject adding an item to a parent that already has a child carrying
    /// the same item.
    ///
    /// Default: false (an item may appear several times, even under one
    /// parent).
    pub unique_per_parent: bool,

    /// Insert new nodes at their sorted position when a comparer governs
    /// the parent. When disabled, new nodes are appended and only
    /// [`NodeStore::sort`](crate::store::NodeStore::sort) orders them.
    ///
    /// Default: true
    pub sort_on_insert: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            unique_per_parent: false,
            sort_on_insert: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new store config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets per-parent item uniqueness.
    pub fn with_unique_per_parent(mut self, unique: bool) -> Self {
        self.unique_per_parent = unique;
        self
    }

    /// Sets whether inserts respect the registered comparer.
    pub fn with_sort_on_insert(mut self, sort_on_insert: bool) -> Self {
        self.sort_on_insert = sort_on_insert;
        self
    }
}

/// Supplies the pixel height of a visible row.
///
/// Heights must be stable between two calls unless
/// [`ScrollWindow::row_height_changed`](crate::scroll::ScrollWindow::row_height_changed)
/// is raised for the node.
pub trait RowHeightProvider: Send + Sync {
    /// Height of the row for `node`, in pixels.
    fn height(&self, node: ViewNode) -> u32;
}

impl<F> RowHeightProvider for F
where
    F: Fn(ViewNode) -> u32 + Send + Sync,
{
    fn height(&self, node: ViewNode) -> u32 {
        self(node)
    }
}

/// Height calculation strategy for rows.
#[derive(Clone)]
pub enum RowHeight {
    /// Every row (group headers included) has the same height.
    Fixed(u32),
    /// Rows are measured one by one through a provider.
    Variable(Arc<dyn RowHeightProvider>),
}

impl RowHeight {
    /// Creates a variable height strategy from a provider.
    pub fn variable(provider: impl RowHeightProvider + 'static) -> Self {
        Self::Variable(Arc::new(provider))
    }

    /// Height of a single row.
    pub fn of(&self, node: ViewNode) -> u32 {
        match self {
            RowHeight::Fixed(h) => *h,
            RowHeight::Variable(provider) => provider.height(node),
        }
    }

    /// The fixed height, if every row shares one.
    pub fn fixed(&self) -> Option<u32> {
        match self {
            RowHeight::Fixed(h) => Some(*h),
            RowHeight::Variable(_) => None,
        }
    }
}

impl Default for RowHeight {
    fn default() -> Self {
        RowHeight::Fixed(1)
    }
}

impl fmt::Debug for RowHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowHeight::Fixed(h) => f.debug_tuple("Fixed").field(h).finish(),
            RowHeight::Variable(_) => f.write_str("Variable(..)"),
        }
    }
}

/// Configuration for a [`ScrollWindow`](crate::scroll::ScrollWindow).
///
/// # Example
///
/// ```
/// use treeview::{RowHeight, ScrollConfig};
///
/// let config = ScrollConfig::default()
///     .with_row_height(RowHeight::Fixed(20))
///     .with_viewport_height(400);
/// assert_eq!(config.viewport_height, 400);
/// ```
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Row height strategy.
    ///
    /// Default: `Fixed(1)` (one terminal row per node)
    pub row_height: RowHeight,

    /// Height of the viewport in pixels.
    ///
    /// Default: 0 (set by the renderer once it knows its area)
    pub viewport_height: u32,

    /// How many times [`visible_rows`](crate::scroll::ScrollWindow::visible_rows)
    /// restarts after detecting a concurrent mutation before giving up and
    /// returning the last attempt.
    ///
    /// Default: 4
    pub max_paint_retries: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            row_height: RowHeight::default(),
            viewport_height: 0,
            max_paint_retries: 4,
        }
    }
}

impl ScrollConfig {
    /// Creates a new scroll config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row height strategy.
    pub fn with_row_height(mut self, row_height: RowHeight) -> Self {
        self.row_height = row_height;
        self
    }

    /// Sets the viewport height.
    pub fn with_viewport_height(mut self, height: u32) -> Self {
        self.viewport_height = height;
        self
    }

    /// Sets the retry budget for consistent row snapshots.
    pub fn with_max_paint_retries(mut self, retries: usize) -> Self {
        self.max_paint_retries = retries;
        self
    }
}
