//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use simplelog::{Config, LevelFilter, TestLogger};
use treeview::events::listener;
use treeview::{Direction, ScrollEvent, ScrollWindow, TreeEvent, ViewNode, ViewSource};

pub type Log<E> = Arc<Mutex<Vec<E>>>;

pub fn init_logging() {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

/// Records every tree notification raised by `source`.
pub fn record<S: ViewSource>(source: &S) -> Log<TreeEvent> {
    let log: Log<TreeEvent> = Arc::default();
    let sink = Arc::clone(&log);
    source.subscribe(listener(move |event: &TreeEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    log
}

/// Records every scroll notification raised by `window`.
pub fn record_scroll<S: ViewSource + 'static>(window: &ScrollWindow<S>) -> Log<ScrollEvent> {
    let log: Log<ScrollEvent> = Arc::default();
    let sink = Arc::clone(&log);
    window.subscribe(listener(move |event: &ScrollEvent| {
        sink.lock().unwrap().push(*event);
    }));
    log
}

pub fn take<E>(log: &Log<E>) -> Vec<E> {
    std::mem::take(&mut *log.lock().unwrap())
}

pub fn rows<S: ViewSource>(source: &S) -> Vec<ViewNode> {
    source
        .cursor(None, Direction::Forward)
        .collect::<Result<_, _>>()
        .unwrap()
}

pub fn rows_backward<S: ViewSource>(source: &S) -> Vec<ViewNode> {
    source
        .cursor(None, Direction::Backward)
        .collect::<Result<_, _>>()
        .unwrap()
}
