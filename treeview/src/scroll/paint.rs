//! Row snapshots for drawing and the abortable paint pass.

use log::debug;

use crate::error::ViewResult;
use crate::events::ScrollEvent;
use crate::view::{Direction, ViewNode, ViewSource};

use super::anchor::{Anchor, ScrollState};
use super::window::{ScrollCore, ScrollWindow};

/// A row inside the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintRow {
    pub node: ViewNode,
    /// Relative to the viewport top; negative for a partially hidden first
    /// row.
    pub top: i64,
    pub height: u32,
}

impl PaintRow {
    pub fn bottom(&self) -> i64 {
        self.top + i64::from(self.height)
    }
}

/// Draws one row. Drawing may mutate the tree; the pass notices.
pub trait RowPainter {
    fn paint_row(&mut self, row: &PaintRow);
}

impl<F: FnMut(&PaintRow)> RowPainter for F {
    fn paint_row(&mut self, row: &PaintRow) {
        self(row)
    }
}

/// How a paint pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    /// Every row in the viewport was drawn.
    Completed { painted: usize },
    /// The source changed during the pass. The band from `repaint_from` to
    /// the viewport bottom was queued for repaint.
    Aborted { painted: usize, repaint_from: u32 },
}

impl<S: ViewSource> ScrollCore<S> {
    fn rows_in_viewport(&self, state: &mut ScrollState) -> ViewResult<Vec<PaintRow>> {
        self.ensure_anchor(state);
        let Anchor::Valid { node, offset } = state.anchor else {
            return Ok(Vec::new());
        };
        let viewport = i64::from(state.viewport_height);
        let mut rows = Vec::new();
        let mut top = -i64::from(offset);
        let mut current = Some(node);
        while let Some(node) = current
            && top < viewport
        {
            let row = PaintRow {
                node,
                top,
                height: self.row_height.of(node),
            };
            top = row.bottom();
            rows.push(row);
            current = self.source.step(node, Direction::Forward)?;
        }
        Ok(rows)
    }
}

impl<S: ViewSource + 'static> ScrollWindow<S> {
    /// Rows currently in the viewport, top to bottom, with the version they
    /// were read at.
    fn snapshot(&self) -> ViewResult<(Vec<PaintRow>, u64)> {
        let core = self.core();
        let mut last = Vec::new();
        let mut last_version = 0;
        for attempt in 0..=core.max_retries {
            let version = core.source.version();
            let rows = {
                let mut state = core.lock();
                core.rows_in_viewport(&mut state)
            };
            match rows {
                Ok(rows) if core.source.version() == version => return Ok((rows, version)),
                Ok(rows) => {
                    last = rows;
                    last_version = version;
                }
                Err(err) if err.is_not_found() => {
                    debug!("Row snapshot lost a row: {err}");
                }
                Err(err) => return Err(err),
            }
            debug!("Row snapshot raced a mutation (attempt {attempt})");
        }
        Ok((last, last_version))
    }

    /// A consistent snapshot of the rows in the viewport.
    ///
    /// The walk restarts when the source changes underneath it, up to the
    /// configured retry budget.
    pub fn visible_rows(&self) -> ViewResult<Vec<PaintRow>> {
        Ok(self.snapshot()?.0)
    }

    /// Draws the rows in the viewport.
    ///
    /// The source version is checked after every row. If a draw changed it,
    /// the pass stops and a [`ScrollEvent::RepaintRegion`] covering the rest
    /// of the viewport is emitted.
    pub fn paint(&self, painter: &mut impl RowPainter) -> ViewResult<PaintOutcome> {
        let (rows, version) = self.snapshot()?;
        let core = self.core();
        let viewport = self.viewport_height();
        for (index, row) in rows.iter().enumerate() {
            painter.paint_row(row);
            if core.source.version() != version {
                let repaint_from = row.bottom().clamp(0, i64::from(viewport)) as u32;
                debug!("Paint aborted after {} rows, source changed", index + 1);
                core.events.emit(&ScrollEvent::RepaintRegion {
                    start_y: repaint_from,
                    end_y: viewport,
                });
                return Ok(PaintOutcome::Aborted {
                    painted: index + 1,
                    repaint_from,
                });
            }
        }
        Ok(PaintOutcome::Completed {
            painted: rows.len(),
        })
    }
}
