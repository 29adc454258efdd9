//! Notification outbox and batch coalescing.

use log::debug;

use crate::events::{MultiChange, TreeEvent};

/// Collects the notifications of one locked mutation.
///
/// Outside a batch, events queue up in order and are dispatched once the
/// store lock is released. Inside a batch they are folded into
/// [`MultiChange`] sets that survive until the outermost `end_update`.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    batching: bool,
    touched: bool,
    events: Vec<TreeEvent>,
    pending: MultiChange,
}

impl Outbox {
    /// Starts a locked section.
    pub fn open(&mut self, batching: bool) {
        self.batching = batching;
        self.touched = false;
    }

    pub fn emit(&mut self, event: TreeEvent) {
        self.touched = true;
        if self.batching {
            self.pending.record(&event);
        } else {
            self.events.push(event);
        }
    }

    pub fn touched(&self) -> bool {
        self.touched
    }

    pub fn take_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Turns everything swallowed by the batch into one notification.
    pub fn flush_batch(&mut self) -> Option<TreeEvent> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return None;
        }
        let change = if pending.full {
            MultiChange::full()
        } else {
            pending
        };
        debug!(
            "Flushing batch: {} added, {} removed, {} changed, full={}",
            change.added.len(),
            change.removed.len(),
            change.changed.len(),
            change.full
        );
        Some(TreeEvent::MultiNodeChanged(change))
    }
}
