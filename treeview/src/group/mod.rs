//! Group headers injected over the root level of a tree.

mod header;
mod overlay;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use header::GroupHeader;
pub use overlay::{GroupFn, GroupOverlay};

/// Unique identifier for a group header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

impl GroupId {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "__group_{}", self.0)
    }
}
