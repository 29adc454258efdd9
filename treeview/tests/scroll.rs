//! Tests for the scroll window.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use common::{init_logging, record_scroll, rows, take};
use treeview::scroll::{Anchor, PaintOutcome, PaintRow, RowBounds};
use treeview::{
    Direction, GroupOverlay, NodeStore, RowHeight, ScrollConfig, ScrollEvent, ScrollWindow,
    ViewNode,
};

fn flat(count: u32) -> NodeStore<u32> {
    let store = NodeStore::new();
    for n in 0..count {
        store.add(n, None).unwrap();
    }
    store
}

fn fixed_window(store: &NodeStore<u32>, height: u32, viewport: u32) -> ScrollWindow<NodeStore<u32>> {
    ScrollWindow::new(
        Arc::new(store.clone()),
        ScrollConfig::new()
            .with_row_height(RowHeight::Fixed(height))
            .with_viewport_height(viewport),
    )
}

fn row(store: &NodeStore<u32>, value: u32) -> ViewNode {
    ViewNode::Node(store.node_from_item(&value, None).unwrap())
}

#[test]
fn test_fixed_height_range() {
    init_logging();
    let store = flat(100);
    let window = fixed_window(&store, 20, 200);
    assert_eq!(window.scroll_range(), 2000);
    assert_eq!(window.anchor(), Anchor::Valid {
        node: row(&store, 0),
        offset: 0
    });
}

#[test]
fn test_offset_is_clamped() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 200);

    window.set_scroll_offset(5000);
    assert_eq!(window.scroll_offset(), 1800);
    assert_eq!(window.row_at(0).unwrap(), Some((row(&store, 90), 0)));

    window.scroll_by(-10_000);
    assert_eq!(window.scroll_offset(), 0);

    window.scroll_to_bottom();
    assert_eq!(window.scroll_offset(), 1800);
    window.scroll_to_top();
    assert_eq!(window.scroll_offset(), 0);
}

#[test]
fn test_scroll_emits_offset_and_repaint() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 200);
    let log = record_scroll(&window);

    window.set_scroll_offset(45);
    window.set_scroll_offset(45);

    assert_eq!(
        take(&log),
        vec![
            ScrollEvent::ScrollOffsetChanged { offset: 45 },
            ScrollEvent::RepaintRegion {
                start_y: 0,
                end_y: 200
            },
        ]
    );
}

#[test]
fn test_hit_testing_and_row_bounds() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 100);
    window.set_scroll_offset(45);

    assert_eq!(window.row_at(0).unwrap(), Some((row(&store, 2), 5)));
    assert_eq!(window.row_at(16).unwrap(), Some((row(&store, 3), 1)));

    let bounds = |v| window.row_bounds(row(&store, v)).unwrap();
    assert_eq!(bounds(2), Some(RowBounds { top: -5, height: 20 }));
    assert_eq!(bounds(3), Some(RowBounds { top: 15, height: 20 }));
    assert_eq!(bounds(0), Some(RowBounds { top: -45, height: 20 }));
    assert_eq!(bounds(10), Some(RowBounds { top: 155, height: 20 }));
}

#[test]
fn test_row_at_below_last_row() {
    let store = flat(3);
    let window = fixed_window(&store, 20, 100);
    assert_eq!(window.row_at(59).unwrap(), Some((row(&store, 2), 19)));
    assert_eq!(window.row_at(70).unwrap(), None);
}

#[test]
fn test_hidden_row_has_no_bounds() {
    let store = flat(5);
    let parent = store.node_from_item(&0, None).unwrap();
    let child = store.add(50, Some(parent)).unwrap();
    let window = fixed_window(&store, 20, 100);

    assert_eq!(window.row_bounds(ViewNode::Node(child)).unwrap(), None);
    assert!(window.scroll_into_view(ViewNode::Node(child)).is_err());
}

#[test]
fn test_move_by_page() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 100);

    assert_eq!(
        window.move_by_page(row(&store, 0), Direction::Forward).unwrap(),
        row(&store, 4)
    );
    assert_eq!(
        window.move_by_page(row(&store, 10), Direction::Backward).unwrap(),
        row(&store, 6)
    );
    assert_eq!(
        window.move_by_page(row(&store, 98), Direction::Forward).unwrap(),
        row(&store, 99)
    );
}

#[test]
fn test_scroll_into_view_requests_offset() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 100);
    window.set_scroll_offset(45);
    let log = record_scroll(&window);

    assert_eq!(window.scroll_into_view(row(&store, 10)).unwrap(), Some(120));
    assert_eq!(window.scroll_into_view(row(&store, 0)).unwrap(), Some(0));
    assert_eq!(window.scroll_into_view(row(&store, 3)).unwrap(), None);

    assert_eq!(
        take(&log),
        vec![
            ScrollEvent::RequestScroll { y: 120 },
            ScrollEvent::RequestScroll { y: 0 },
        ]
    );
    // Only a request; the window stays where it was.
    assert_eq!(window.scroll_offset(), 45);
}

fn varying_height(store: &NodeStore<u32>) -> RowHeight {
    let store = store.clone();
    RowHeight::variable(move |node: ViewNode| match node {
        ViewNode::Node(id) => 10 + (store.item(id).unwrap_or(0) % 3) * 5,
        ViewNode::Group(_) => 10,
    })
}

/// Reference answer: the row at `offset` found by summing every row from
/// the top.
fn linear_scan(store: &NodeStore<u32>, offset: u64) -> (ViewNode, u32) {
    let mut top = 0u64;
    for node in rows(store) {
        let value = store.item(node.as_node().unwrap()).unwrap();
        let height = u64::from(10 + (value % 3) * 5);
        if top + height > offset {
            return (node, (offset - top) as u32);
        }
        top += height;
    }
    panic!("offset {offset} is past the last row");
}

#[test]
fn test_variable_height_anchor_walk_matches_linear_scan() {
    let store = flat(50);
    let window = ScrollWindow::new(
        Arc::new(store.clone()),
        ScrollConfig::new()
            .with_row_height(varying_height(&store))
            .with_viewport_height(100),
    );
    assert_eq!(window.scroll_range(), 745);

    window.set_scroll_offset(5);
    assert_eq!(window.row_at(0).unwrap(), Some((row(&store, 0), 5)));

    // 30px crosses the rest of row 0 and all of row 1.
    window.scroll_by(30);
    assert_eq!(window.scroll_offset(), 35);
    assert_eq!(window.row_at(0).unwrap(), Some(linear_scan(&store, 35)));
    assert_eq!(window.row_at(0).unwrap(), Some((row(&store, 2), 10)));

    let fresh = ScrollWindow::new(
        Arc::new(store.clone()),
        ScrollConfig::new()
            .with_row_height(varying_height(&store))
            .with_viewport_height(100),
    );
    fresh.set_scroll_offset(35);
    assert_eq!(fresh.anchor(), window.anchor());

    for target in [400, 401, 644, 3, 120] {
        window.set_scroll_offset(target);
        assert_eq!(window.row_at(0).unwrap(), Some(linear_scan(&store, target)));
    }
}

#[test]
fn test_row_height_change_recomputes_range() {
    let store = flat(10);
    let height = Arc::new(AtomicU32::new(10));
    let provider = Arc::clone(&height);
    let window = ScrollWindow::new(
        Arc::new(store.clone()),
        ScrollConfig::new()
            .with_row_height(RowHeight::variable(move |_: ViewNode| {
                provider.load(Ordering::SeqCst)
            }))
            .with_viewport_height(50),
    );
    assert_eq!(window.scroll_range(), 100);
    let log = record_scroll(&window);

    height.store(15, Ordering::SeqCst);
    window.row_height_changed(row(&store, 0));

    assert_eq!(window.scroll_range(), 150);
    assert!(take(&log).contains(&ScrollEvent::ScrollRangeChanged { range: 150 }));
}

#[test]
fn test_viewport_resize_clamps_offset() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 200);
    window.scroll_to_bottom();
    let log = record_scroll(&window);

    window.set_viewport_height(400);

    assert_eq!(window.scroll_offset(), 1600);
    assert_eq!(
        take(&log),
        vec![
            ScrollEvent::ScrollOffsetChanged { offset: 1600 },
            ScrollEvent::RepaintRegion {
                start_y: 0,
                end_y: 400
            },
        ]
    );
    assert_eq!(window.row_at(0).unwrap(), Some((row(&store, 80), 0)));
}

#[test]
fn test_insert_above_anchor_keeps_rows_in_place() {
    let store: NodeStore<i32> = NodeStore::new();
    store.set_comparer(None, |a: &i32, b: &i32| a.cmp(b)).unwrap();
    for n in 1..=50 {
        store.add(n, None).unwrap();
    }
    let window = ScrollWindow::new(
        Arc::new(store.clone()),
        ScrollConfig::new()
            .with_row_height(RowHeight::Fixed(20))
            .with_viewport_height(100),
    );
    window.set_scroll_offset(200);
    let anchor = window.anchor();
    let log = record_scroll(&window);

    store.add(0, None).unwrap();

    assert_eq!(window.anchor(), anchor);
    assert_eq!(window.scroll_offset(), 220);
    assert_eq!(window.scroll_range(), 1020);
    let events = take(&log);
    assert!(events.contains(&ScrollEvent::ScrollRangeChanged { range: 1020 }));
    assert!(events.contains(&ScrollEvent::ScrollOffsetChanged { offset: 220 }));

    store.add(100, None).unwrap();
    assert_eq!(window.anchor(), anchor);
    assert_eq!(window.scroll_offset(), 220);
}

#[test]
fn test_removed_anchor_is_recomputed() {
    let store = flat(50);
    let window = fixed_window(&store, 20, 100);
    window.set_scroll_offset(220);
    assert_eq!(window.anchor().node(), Some(row(&store, 11)));

    store.remove(&11, None).unwrap();

    assert_eq!(window.scroll_offset(), 220);
    assert_eq!(
        window.anchor(),
        Anchor::Valid {
            node: row(&store, 12),
            offset: 0
        }
    );
}

#[test]
fn test_collapse_above_anchor_shifts_offset() {
    let store = flat(20);
    let parent = store.node_from_item(&0, None).unwrap();
    for n in 100..105 {
        store.add(n, Some(parent)).unwrap();
    }
    store.expand(parent).unwrap();
    let window = fixed_window(&store, 10, 50);
    assert_eq!(window.scroll_range(), 250);

    window.set_scroll_offset(100);
    let anchor = window.anchor();
    assert_eq!(anchor.node(), Some(row(&store, 5)));

    store.collapse(parent).unwrap();
    assert_eq!(window.scroll_range(), 200);
    assert_eq!(window.scroll_offset(), 50);
    assert_eq!(window.anchor(), anchor);
}

#[test]
fn test_visible_rows_snapshot() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 100);
    window.set_scroll_offset(45);

    let rows = window.visible_rows().unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(
        rows[0],
        PaintRow {
            node: row(&store, 2),
            top: -5,
            height: 20
        }
    );
    assert_eq!(rows[5].node, row(&store, 7));
}

#[test]
fn test_paint_completes_on_quiet_source() {
    let store = flat(100);
    let window = fixed_window(&store, 20, 100);
    let mut painted = Vec::new();

    let outcome = window.paint(&mut |row: &PaintRow| painted.push(row.top)).unwrap();

    assert_eq!(outcome, PaintOutcome::Completed { painted: 5 });
    assert_eq!(painted, vec![0, 20, 40, 60, 80]);
}

#[test]
fn test_paint_aborts_when_drawing_mutates_the_tree() {
    let store = flat(10);
    let window = fixed_window(&store, 20, 100);
    let log = record_scroll(&window);
    let writer = store.clone();

    let outcome = window
        .paint(&mut |row: &PaintRow| {
            if row.top == 20 {
                writer.add(99, None).unwrap();
            }
        })
        .unwrap();

    assert_eq!(
        outcome,
        PaintOutcome::Aborted {
            painted: 2,
            repaint_from: 40
        }
    );
    assert!(take(&log).contains(&ScrollEvent::RepaintRegion {
        start_y: 40,
        end_y: 100
    }));
    assert_eq!(window.scroll_range(), 220);
}

#[test]
fn test_group_headers_take_a_row() {
    let store: NodeStore<&'static str> = NodeStore::new();
    for name in ["a1", "a2", "a3"] {
        store.add(name, None).unwrap();
    }
    let overlay = GroupOverlay::new(store, |s: &&'static str| s[..1].to_uppercase()).unwrap();
    let window = ScrollWindow::new(
        Arc::new(overlay),
        ScrollConfig::new()
            .with_row_height(RowHeight::Fixed(10))
            .with_viewport_height(100),
    );
    assert_eq!(window.scroll_range(), 40);

    let a = window.source().group_header("A").unwrap();
    assert_eq!(window.row_at(0).unwrap(), Some((ViewNode::Group(a), 0)));

    window.source().collapse_group(a).unwrap();
    assert_eq!(window.scroll_range(), 10);
}
