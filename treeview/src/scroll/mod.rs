//! Pixel scrolling over visible rows.

mod anchor;
mod paint;
mod window;

pub use anchor::Anchor;
pub use paint::{PaintOutcome, PaintRow, RowPainter};
pub use window::{RowBounds, ScrollWindow};
