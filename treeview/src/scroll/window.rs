//! Anchor-based pixel scrolling over a [`ViewSource`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, trace, warn};

use crate::config::{RowHeight, ScrollConfig};
use crate::error::ViewResult;
use crate::events::{EventBus, Invoker, Listener, ScrollEvent, SubscriptionId, TreeEvent, listener};
use crate::view::{Direction, ViewNode, ViewSource};

use super::anchor::{Anchor, ScrollState, missing};

/// Position of a row relative to the top of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    /// Negative when the row starts above the viewport.
    pub top: i64,
    pub height: u32,
}

impl RowBounds {
    pub fn bottom(&self) -> i64 {
        self.top + i64::from(self.height)
    }
}

pub(crate) struct ScrollCore<S: ViewSource> {
    pub source: Arc<S>,
    pub row_height: RowHeight,
    pub max_retries: usize,
    pub state: Mutex<ScrollState>,
    recomputing: AtomicBool,
    pub events: EventBus<ScrollEvent>,
}

/// A viewport over the visible rows of a tree or group overlay.
///
/// The window never materializes geometry for off-screen rows. It keeps an
/// [`Anchor`] (the topmost row plus how far it is scrolled out) and answers
/// every query by walking from it, so the cost is proportional to the
/// distance travelled rather than to the size of the tree.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use treeview::{NodeStore, RowHeight, ScrollConfig, ScrollWindow};
///
/// let store: NodeStore<u32> = NodeStore::new();
/// for n in 0..100 {
///     store.add(n, None).unwrap();
/// }
/// let window = ScrollWindow::new(
///     Arc::new(store),
///     ScrollConfig::new()
///         .with_row_height(RowHeight::Fixed(20))
///         .with_viewport_height(200),
/// );
/// assert_eq!(window.scroll_range(), 2000);
///
/// window.set_scroll_offset(45);
/// let (_, delta) = window.row_at(0).unwrap().unwrap();
/// assert_eq!(delta, 5);
/// ```
pub struct ScrollWindow<S: ViewSource + 'static> {
    core: Arc<ScrollCore<S>>,
    subscription: SubscriptionId,
}

impl<S: ViewSource + 'static> fmt::Debug for ScrollWindow<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.lock();
        f.debug_struct("ScrollWindow")
            .field("anchor", &state.anchor)
            .field("scroll_offset", &state.scroll_offset)
            .field("range", &state.range)
            .field("viewport_height", &state.viewport_height)
            .finish()
    }
}

impl<S: ViewSource + 'static> ScrollWindow<S> {
    /// Creates a window over `source` and starts tracking its changes.
    pub fn new(source: Arc<S>, config: ScrollConfig) -> Self {
        let core = Arc::new(ScrollCore {
            source,
            row_height: config.row_height,
            max_retries: config.max_paint_retries,
            state: Mutex::new(ScrollState::new(config.viewport_height)),
            recomputing: AtomicBool::new(false),
            events: EventBus::new(),
        });
        {
            let range = core.total_height();
            core.lock().range = range;
        }

        let weak: Weak<ScrollCore<S>> = Arc::downgrade(&core);
        let subscription = core.source.subscribe(listener(move |event: &TreeEvent| {
            if let Some(core) = weak.upgrade() {
                core.on_source_event(event);
            }
        }));
        Self { core, subscription }
    }

    /// The source being scrolled.
    pub fn source(&self) -> &Arc<S> {
        &self.core.source
    }

    pub(crate) fn core(&self) -> &ScrollCore<S> {
        &self.core
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    /// Absolute offset of the viewport top, in pixels.
    pub fn scroll_offset(&self) -> u64 {
        self.core.lock().scroll_offset
    }

    /// Total height of all visible rows.
    pub fn scroll_range(&self) -> u64 {
        self.core.lock().range
    }

    pub fn viewport_height(&self) -> u32 {
        self.core.lock().viewport_height
    }

    /// Resize the viewport. The offset is clamped to the new maximum.
    pub fn set_viewport_height(&self, height: u32) {
        let events = {
            let mut state = self.core.lock();
            state.viewport_height = height;
            let mut events = Vec::new();
            let max = state.max_offset();
            if state.scroll_offset > max {
                self.core.move_anchor(&mut state, max);
                events.push(ScrollEvent::ScrollOffsetChanged {
                    offset: state.scroll_offset,
                });
            }
            events.push(ScrollEvent::RepaintRegion {
                start_y: 0,
                end_y: height,
            });
            events
        };
        self.core.events.emit_all(events);
    }

    /// The current anchor, derived first if it is unset or went stale.
    pub fn anchor(&self) -> Anchor {
        let mut state = self.core.lock();
        self.core.ensure_anchor(&mut state);
        state.anchor
    }

    // -------------------------------------------------------------------------
    // Scrolling
    // -------------------------------------------------------------------------

    /// Scroll to an absolute offset, clamped to the scroll range.
    ///
    /// The anchor is moved incrementally from where it is.
    pub fn set_scroll_offset(&self, y: u64) {
        let events = {
            let mut state = self.core.lock();
            let target = y.min(state.max_offset());
            if target == state.scroll_offset && state.anchor != Anchor::Unset {
                return;
            }
            let before = state.scroll_offset;
            self.core.move_anchor(&mut state, target);
            if state.scroll_offset == before {
                return;
            }
            vec![
                ScrollEvent::ScrollOffsetChanged {
                    offset: state.scroll_offset,
                },
                ScrollEvent::RepaintRegion {
                    start_y: 0,
                    end_y: state.viewport_height,
                },
            ]
        };
        self.core.events.emit_all(events);
    }

    /// Scroll by a signed number of pixels.
    pub fn scroll_by(&self, delta: i64) {
        let current = self.scroll_offset();
        self.set_scroll_offset(current.saturating_add_signed(delta));
    }

    pub fn scroll_to_top(&self) {
        self.set_scroll_offset(0);
    }

    pub fn scroll_to_bottom(&self) {
        self.set_scroll_offset(u64::MAX);
    }

    /// Ask the owner to scroll `node` fully into view.
    ///
    /// Emits [`ScrollEvent::RequestScroll`] with the offset that would show
    /// the row and returns it; returns `None` when the row is already fully
    /// visible. The window itself does not move.
    pub fn scroll_into_view(&self, node: ViewNode) -> ViewResult<Option<u64>> {
        let (bounds, offset, viewport) = {
            let mut state = self.core.lock();
            let bounds = self.core.row_bounds(&mut state, node)?.ok_or_else(|| missing(node))?;
            (bounds, state.scroll_offset, state.viewport_height)
        };
        let target = if bounds.top < 0 {
            offset.saturating_sub(bounds.top.unsigned_abs())
        } else if bounds.bottom() > i64::from(viewport) {
            let overflow = bounds.bottom() - i64::from(viewport);
            // A row taller than the viewport is aligned to the top.
            let shift = overflow.min(bounds.top);
            offset + shift.unsigned_abs()
        } else {
            return Ok(None);
        };
        debug!("Requesting scroll to {target} to reveal {node}");
        self.core
            .events
            .emit(&ScrollEvent::RequestScroll { y: target });
        Ok(Some(target))
    }

    /// Tell the window that the height of `node` changed.
    pub fn row_height_changed(&self, node: ViewNode) {
        trace!("Row height of {node} changed");
        self.core.relayout_guarded();
    }

    // -------------------------------------------------------------------------
    // Hit testing
    // -------------------------------------------------------------------------

    /// The row under viewport coordinate `y` and the offset of `y` inside
    /// that row. `None` below the last row.
    pub fn row_at(&self, y: u32) -> ViewResult<Option<(ViewNode, u32)>> {
        let mut state = self.core.lock();
        self.core.ensure_anchor(&mut state);
        let Anchor::Valid { node, offset } = state.anchor else {
            return Ok(None);
        };
        let found = self
            .core
            .walk_forward(node, u64::from(offset) + u64::from(y))?;
        Ok(found.map(|(node, delta)| (node, delta as u32)))
    }

    /// Position of `node` relative to the viewport top. `None` if the row
    /// is not visible.
    pub fn row_bounds(&self, node: ViewNode) -> ViewResult<Option<RowBounds>> {
        let mut state = self.core.lock();
        self.core.row_bounds(&mut state, node)
    }

    /// Walks from `start` until the accumulated height would exceed the
    /// viewport. Returns the last row that fits, or `start`.
    pub fn move_by_page(&self, start: ViewNode, direction: Direction) -> ViewResult<ViewNode> {
        let viewport = u64::from(self.viewport_height());
        let source = &self.core.source;
        if !source.is_visible(start) {
            return Err(missing(start));
        }
        let mut total = self.core.height(start);
        let mut last = start;
        while let Some(next) = source.step(last, direction)? {
            let height = self.core.height(next);
            if total + height > viewport {
                break;
            }
            total += height;
            last = next;
        }
        Ok(last)
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    pub fn subscribe(&self, listener: Listener<ScrollEvent>) -> SubscriptionId {
        self.core.events.subscribe(listener)
    }

    pub fn subscribe_via(
        &self,
        invoker: Arc<dyn Invoker>,
        listener: Listener<ScrollEvent>,
    ) -> SubscriptionId {
        self.core.events.subscribe_via(invoker, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.events.unsubscribe(id)
    }
}

impl<S: ViewSource + 'static> Drop for ScrollWindow<S> {
    fn drop(&mut self) {
        self.core.source.unsubscribe(self.subscription);
    }
}

impl<S: ViewSource> ScrollCore<S> {
    pub fn lock(&self) -> MutexGuard<'_, ScrollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn height(&self, node: ViewNode) -> u64 {
        u64::from(self.row_height.of(node))
    }

    fn fixed_height(&self) -> Option<u64> {
        if self.source.supports_fixed_height() {
            self.row_height.fixed().map(u64::from)
        } else {
            None
        }
    }

    /// Sum of all visible row heights, retried while the walk races a
    /// mutation.
    fn total_height(&self) -> u64 {
        if let Some(height) = self.fixed_height() {
            return height * self.source.visible_count() as u64;
        }
        let mut total = 0;
        for attempt in 0..=self.max_retries {
            let version = self.source.version();
            total = 0;
            let mut complete = true;
            for row in self.source.cursor(None, Direction::Forward) {
                match row {
                    Ok(node) => total += self.height(node),
                    Err(err) => {
                        debug!("Range walk interrupted: {err}");
                        complete = false;
                        break;
                    }
                }
            }
            if complete && self.source.version() == version {
                return total;
            }
            debug!("Range walk raced a mutation (attempt {attempt})");
        }
        warn!("Range walk kept racing mutations, using last total {total}");
        total
    }

    /// Summed heights of the rows above `node`.
    fn offset_of(&self, node: ViewNode) -> ViewResult<u64> {
        let mut cursor = self.source.cursor(Some(node), Direction::Backward);
        match cursor.next() {
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err),
            None => return Err(missing(node)),
        }
        let mut total = 0;
        for row in cursor {
            total += self.height(row?);
        }
        Ok(total)
    }

    /// Derives the anchor from the absolute offset by a linear walk from
    /// the first row.
    pub fn recompute_anchor(&self, state: &mut ScrollState) {
        let target = state.scroll_offset.min(state.max_offset());
        let mut top = 0;
        let mut last = None;
        for row in self.source.cursor(None, Direction::Forward) {
            let node = match row {
                Ok(node) => node,
                Err(err) => {
                    warn!("Anchor recompute interrupted: {err}");
                    break;
                }
            };
            let height = self.height(node);
            if top + height > target {
                debug!("Anchor recomputed at {node}+{}", target - top);
                state.anchor = Anchor::Valid {
                    node,
                    offset: (target - top) as u32,
                };
                state.scroll_offset = target;
                return;
            }
            last = Some((node, top));
            top += height;
        }
        match last {
            Some((node, top)) => {
                state.anchor = Anchor::Valid { node, offset: 0 };
                state.scroll_offset = top;
            }
            None => {
                state.anchor = Anchor::Unset;
                state.scroll_offset = 0;
            }
        }
    }

    pub fn ensure_anchor(&self, state: &mut ScrollState) {
        if let Anchor::Valid { node, .. } = state.anchor
            && self.source.is_visible(node)
        {
            return;
        }
        self.recompute_anchor(state);
    }

    /// The row containing pixel `offset`, measured from the top of `node`.
    pub fn walk_forward(&self, mut node: ViewNode, mut offset: u64) -> ViewResult<Option<(ViewNode, u64)>> {
        loop {
            let height = self.height(node);
            if offset < height {
                return Ok(Some((node, offset)));
            }
            match self.source.step(node, Direction::Forward)? {
                Some(next) => {
                    trace!("Anchor walk {node} -> {next}");
                    offset -= height;
                    node = next;
                }
                None => return Ok(None),
            }
        }
    }

    /// The row `back` pixels above offset `offset` of `node`.
    fn walk_backward(
        &self,
        mut node: ViewNode,
        offset: u64,
        back: u64,
    ) -> ViewResult<Option<(ViewNode, u64)>> {
        if back <= offset {
            return Ok(Some((node, offset - back)));
        }
        let mut remaining = back - offset;
        loop {
            match self.source.step(node, Direction::Backward)? {
                Some(prev) => {
                    trace!("Anchor walk {node} -> {prev}");
                    let height = self.height(prev);
                    node = prev;
                    if remaining <= height {
                        return Ok(Some((node, height - remaining)));
                    }
                    remaining -= height;
                }
                None => return Ok(None),
            }
        }
    }

    /// Moves the anchor to absolute offset `target`, walking from the
    /// current anchor. Falls back to a full recompute when the walk hits a
    /// row that vanished.
    pub fn move_anchor(&self, state: &mut ScrollState, target: u64) {
        self.ensure_anchor(state);
        let Anchor::Valid { node, offset } = state.anchor else {
            state.scroll_offset = 0;
            return;
        };
        let offset = u64::from(offset);
        let walked = if target >= state.scroll_offset {
            self.walk_forward(node, offset + (target - state.scroll_offset))
        } else {
            self.walk_backward(node, offset, state.scroll_offset - target)
        };
        match walked {
            Ok(Some((node, offset))) => {
                state.anchor = Anchor::Valid {
                    node,
                    offset: offset as u32,
                };
                state.scroll_offset = target;
            }
            Ok(None) => {
                warn!("Anchor walk from {node} ran off the rows, recomputing");
                state.scroll_offset = target;
                self.recompute_anchor(state);
            }
            Err(err) => {
                warn!("Anchor walk from {node} failed ({err}), recomputing");
                state.scroll_offset = target;
                self.recompute_anchor(state);
            }
        }
    }

    pub fn row_bounds(&self, state: &mut ScrollState, target: ViewNode) -> ViewResult<Option<RowBounds>> {
        if !self.source.is_visible(target) {
            return Ok(None);
        }
        self.ensure_anchor(state);
        let Anchor::Valid { node, offset } = state.anchor else {
            return Ok(None);
        };
        let bounds = |node: ViewNode, top: i64| RowBounds {
            top,
            height: self.row_height.of(node),
        };

        // Walk both ways from the anchor, one step each in turn.
        let top = -i64::from(offset);
        let mut forward = Some((node, top));
        let mut backward = Some((node, top));
        if node == target {
            return Ok(Some(bounds(node, top)));
        }
        while forward.is_some() || backward.is_some() {
            if let Some((current, top)) = forward {
                forward = match self.source.step(current, Direction::Forward)? {
                    Some(next) => {
                        let next_top = top + self.height(current) as i64;
                        if next == target {
                            return Ok(Some(bounds(next, next_top)));
                        }
                        Some((next, next_top))
                    }
                    None => None,
                };
            }
            if let Some((current, top)) = backward {
                backward = match self.source.step(current, Direction::Backward)? {
                    Some(prev) => {
                        let prev_top = top - self.height(prev) as i64;
                        if prev == target {
                            return Ok(Some(bounds(prev, prev_top)));
                        }
                        Some((prev, prev_top))
                    }
                    None => None,
                };
            }
        }
        Ok(None)
    }

    /// Recomputes the range and re-derives the offset from the anchor so
    /// the rows on screen stay put.
    fn relayout(&self, state: &mut ScrollState) -> Vec<ScrollEvent> {
        let mut events = Vec::new();
        let before = state.scroll_offset;

        let range = self.total_height();
        if range != state.range {
            debug!("Scroll range {} -> {range}", state.range);
            state.range = range;
            events.push(ScrollEvent::ScrollRangeChanged { range });
        }

        if let Anchor::Valid { node, offset } = state.anchor {
            let top = if self.source.is_visible(node) {
                self.offset_of(node).ok()
            } else {
                None
            };
            match top {
                Some(top) => {
                    let offset = offset.min(self.row_height.of(node).saturating_sub(1));
                    state.anchor = Anchor::Valid { node, offset };
                    state.scroll_offset = top + u64::from(offset);
                }
                None => {
                    debug!("Anchor {node} left the visible rows");
                    state.anchor = Anchor::Unset;
                }
            }
        }

        let max = state.max_offset();
        if state.scroll_offset > max {
            state.scroll_offset = max;
            state.anchor = Anchor::Unset;
        }
        if state.scroll_offset != before {
            events.push(ScrollEvent::ScrollOffsetChanged {
                offset: state.scroll_offset,
            });
        }
        events.push(ScrollEvent::RepaintRegion {
            start_y: 0,
            end_y: state.viewport_height,
        });
        events
    }

    /// Relayout unless one is already running.
    fn relayout_guarded(&self) {
        if self
            .recomputing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Ignoring reentrant scroll range recompute");
            return;
        }
        let events = {
            let mut state = self.lock();
            self.relayout(&mut state)
        };
        self.recomputing.store(false, Ordering::SeqCst);
        self.events.emit_all(events);
    }

    fn on_source_event(&self, event: &TreeEvent) {
        if event.affects_layout() {
            self.relayout_guarded();
        }
    }
}
