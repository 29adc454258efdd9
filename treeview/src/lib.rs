pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod group;
pub mod item;
pub mod scroll;
pub mod store;
pub mod view;

pub use config::{RowHeight, RowHeightProvider, ScrollConfig, StoreConfig};
pub use error::{TreeError, TreeResult, ViewError, ViewResult};
pub use events::{ScrollEvent, TreeEvent};
pub use group::{GroupId, GroupOverlay};
pub use item::TreeItem;
pub use scroll::ScrollWindow;
pub use store::{NodeId, NodeStore};
pub use view::{Direction, ViewNode, ViewSource, VisibleCursor};

pub mod prelude {
    pub use crate::config::{RowHeight, RowHeightProvider, ScrollConfig, StoreConfig};
    pub use crate::error::{TreeError, TreeResult, ViewError, ViewResult};
    pub use crate::events::{
        EventBus, Invoker, Listener, MultiChange, QueueInvoker, ScrollEvent, SubscriptionId,
        TreeEvent, listener,
    };
    pub use crate::filter::{FilterId, FnFilter, FuzzyFilter, NodeFilter, RegexFilter};
    pub use crate::group::{GroupHeader, GroupId, GroupOverlay};
    pub use crate::item::TreeItem;
    pub use crate::scroll::{Anchor, PaintOutcome, PaintRow, RowBounds, RowPainter, ScrollWindow};
    pub use crate::store::{Comparer, NodeId, NodeStore};
    pub use crate::view::{Direction, ViewNode, ViewSource, VisibleCursor};
}
