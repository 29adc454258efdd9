//! TreeItem trait for data carried by tree nodes.

use std::fmt::Debug;
use std::hash::Hash;

/// Trait for items that can be stored in a [`NodeStore`](crate::store::NodeStore).
///
/// The key identifies the item across updates: `update` replaces the data
/// of every node whose item has the same key, and `remove`/`contains`
/// look items up by key. The same item may be attached under several
/// parents.
///
/// # Example
///
/// ```
/// use treeview::TreeItem;
///
/// #[derive(Clone, Debug)]
/// struct Contact {
///     id: u32,
///     name: String,
/// }
///
/// impl TreeItem for Contact {
///     type Key = u32;
///
///     fn key(&self) -> u32 {
///         self.id
///     }
/// }
/// ```
pub trait TreeItem: Send + Sync + Clone + 'static {
    /// Stable identity of the item.
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Returns the item's identity key.
    fn key(&self) -> Self::Key;
}

macro_rules! self_keyed {
    ($($ty:ty),*) => {
        $(
            impl TreeItem for $ty {
                type Key = $ty;

                fn key(&self) -> $ty {
                    self.clone()
                }
            }
        )*
    };
}

self_keyed!(String, &'static str, u32, u64, i32, i64, usize);
