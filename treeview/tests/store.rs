//! Tests for NodeStore structure, expansion and enumeration.

mod common;

use common::{init_logging, record, rows, rows_backward, take};
use treeview::{
    Direction, NodeId, NodeStore, StoreConfig, TreeError, TreeEvent, TreeItem, ViewNode, ViewSource,
};

#[derive(Clone, Debug, PartialEq)]
struct Contact {
    id: u32,
    name: &'static str,
}

impl TreeItem for Contact {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }
}

fn contact(id: u32, name: &'static str) -> Contact {
    Contact { id, name }
}

/// a (expanded)
///   a1
///   a2 (expanded)
///     a2x
/// b (collapsed)
///   b1
/// c
struct Sample {
    store: NodeStore<&'static str>,
    a: NodeId,
    a1: NodeId,
    a2: NodeId,
    a2x: NodeId,
    b: NodeId,
    b1: NodeId,
    c: NodeId,
}

fn sample() -> Sample {
    let store = NodeStore::new();
    let a = store.add("a", None).unwrap();
    let a1 = store.add("a1", Some(a)).unwrap();
    let a2 = store.add("a2", Some(a)).unwrap();
    let a2x = store.add("a2x", Some(a2)).unwrap();
    let b = store.add("b", None).unwrap();
    let b1 = store.add("b1", Some(b)).unwrap();
    let c = store.add("c", None).unwrap();
    store.expand(a).unwrap();
    store.expand(a2).unwrap();
    Sample {
        store,
        a,
        a1,
        a2,
        a2x,
        b,
        b1,
        c,
    }
}

fn nodes(ids: &[NodeId]) -> Vec<ViewNode> {
    ids.iter().copied().map(ViewNode::Node).collect()
}

#[test]
fn test_forward_enumeration_follows_expanded_subtrees() {
    init_logging();
    let s = sample();
    assert_eq!(rows(&s.store), nodes(&[s.a, s.a1, s.a2, s.a2x, s.b, s.c]));
    assert_eq!(s.store.visible_item_count(), 6);
}

#[test]
fn test_backward_enumeration_mirrors_forward() {
    let s = sample();
    let mut forward = rows(&s.store);
    forward.reverse();
    assert_eq!(rows_backward(&s.store), forward);
}

#[test]
fn test_cursor_from_hidden_node_yields_nothing() {
    let s = sample();
    assert_eq!(s.store.cursor(Some(ViewNode::Node(s.b1)), Direction::Forward).count(), 0);

    let from_b: Vec<_> = s
        .store
        .cursor(Some(ViewNode::Node(s.b)), Direction::Forward)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(from_b, nodes(&[s.b, s.c]));
}

#[test]
fn test_cursor_reverse_continues_from_position() {
    let s = sample();
    let mut cursor = s.store.cursor(None, Direction::Forward);
    assert_eq!(cursor.next().unwrap().unwrap(), ViewNode::Node(s.a));
    assert_eq!(cursor.next().unwrap().unwrap(), ViewNode::Node(s.a1));
    assert_eq!(cursor.next().unwrap().unwrap(), ViewNode::Node(s.a2));

    cursor.reverse();
    assert_eq!(cursor.next().unwrap().unwrap(), ViewNode::Node(s.a1));

    cursor.restart(ViewNode::Node(s.c));
    assert_eq!(cursor.next().unwrap().unwrap(), ViewNode::Node(s.c));
    assert_eq!(cursor.next().unwrap().unwrap(), ViewNode::Node(s.b));
}

#[test]
fn test_add_root_level_emits_visible_added() {
    let store: NodeStore<&'static str> = NodeStore::new();
    let log = record(&store);
    let a = store.add("a", None).unwrap();

    assert_eq!(
        take(&log),
        vec![
            TreeEvent::NodeAdded {
                node: a,
                parent: store.root()
            },
            TreeEvent::VisibleNodeAdded { node: a },
        ]
    );
}

#[test]
fn test_add_under_collapsed_parent_notifies_parent_once() {
    let store: NodeStore<&'static str> = NodeStore::new();
    let parent = store.add("p", None).unwrap();
    let log = record(&store);

    let x = store.add("x", Some(parent)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            TreeEvent::NodeAdded { node: x, parent },
            TreeEvent::NodeChanged { node: parent },
        ]
    );

    let y = store.add("y", Some(parent)).unwrap();
    assert_eq!(take(&log), vec![TreeEvent::NodeAdded { node: y, parent }]);
    assert!(store.has_accepted_children(parent).unwrap());
}

#[test]
fn test_collapsed_parent_scenario() {
    let store: NodeStore<u32> = NodeStore::new();
    let parent = store.add(0, None).unwrap();
    for n in 1..=5 {
        store.add(n, Some(parent)).unwrap();
    }
    assert_eq!(store.visible_item_count(), 1);

    store.add(6, Some(parent)).unwrap();
    assert_eq!(store.visible_item_count(), 1);

    store.expand(parent).unwrap();
    assert_eq!(store.visible_item_count(), 7);
}

#[test]
fn test_expand_emits_changing_then_changed() {
    let s = sample();
    let log = record(&s.store);

    assert!(s.store.expand(s.b).unwrap());
    assert!(!s.store.expand(s.b).unwrap());
    assert_eq!(
        take(&log),
        vec![
            TreeEvent::ExpandChanging {
                node: s.b,
                expanded: true
            },
            TreeEvent::ExpandChanged {
                node: s.b,
                expanded: true
            },
        ]
    );

    assert!(!s.store.toggle(s.b).unwrap());
    assert!(!s.store.is_expanded(s.b).unwrap());
}

#[test]
fn test_expand_all_and_collapse_all() {
    let s = sample();
    let log = record(&s.store);

    assert_eq!(s.store.expand_all(), 1);
    assert_eq!(s.store.visible_item_count(), 7);
    assert_eq!(take(&log), vec![TreeEvent::reset()]);

    assert_eq!(s.store.collapse_all(), 3);
    assert_eq!(rows(&s.store), nodes(&[s.a, s.b, s.c]));
}

#[test]
fn test_remove_is_leaf_first() {
    let s = sample();
    let log = record(&s.store);

    assert_eq!(s.store.remove(&"a", None).unwrap(), s.a);

    let removed: Vec<_> = take(&log)
        .into_iter()
        .filter_map(|e| match e {
            TreeEvent::NodeRemoved { node, .. } => Some(node),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![s.a2x, s.a2, s.a1, s.a]);
    assert_eq!(rows(&s.store), nodes(&[s.b, s.c]));
    assert!(!s.store.contains(&"a2x"));
    assert_eq!(s.store.len(), 3);
}

#[test]
fn test_remove_deep_chain() {
    let store: NodeStore<u32> = NodeStore::new();
    let top = store.add(0, None).unwrap();
    let mut parent = top;
    for n in 1..30_000 {
        parent = store.add(n, Some(parent)).unwrap();
    }
    let deepest = parent;
    let log = record(&store);

    store.remove_node(top).unwrap();

    let removed: Vec<_> = take(&log)
        .into_iter()
        .filter_map(|e| match e {
            TreeEvent::NodeRemoved { node, .. } => Some(node),
            _ => None,
        })
        .collect();
    assert_eq!(removed.len(), 30_000);
    assert_eq!(removed.first(), Some(&deepest));
    assert_eq!(removed.last(), Some(&top));
    assert!(store.is_empty());
    assert_eq!(store.visible_item_count(), 0);
}

#[test]
fn test_remove_reports_neighbours_and_visibility() {
    let s = sample();
    let log = record(&s.store);

    s.store.remove_node(s.b).unwrap();

    let events = take(&log);
    assert!(events.contains(&TreeEvent::NodeRemoved {
        node: s.b,
        parent: s.store.root(),
        prev: Some(s.a),
        next: Some(s.c),
    }));
    // b1 was hidden, b was not.
    assert!(events.contains(&TreeEvent::VisibleNodeRemoving { node: s.b }));
    assert!(events.contains(&TreeEvent::VisibleNodeRemoved { node: s.b }));
    assert!(!events.contains(&TreeEvent::VisibleNodeRemoving { node: s.b1 }));
}

#[test]
fn test_remove_missing_item_is_not_found() {
    let s = sample();
    let err = s.store.remove(&"a1", None).unwrap_err();
    assert!(matches!(err, TreeError::NotFound(_)));

    assert_eq!(s.store.remove(&"a1", Some(s.a)).unwrap(), s.a1);
}

#[test]
fn test_stale_handle_is_not_found() {
    let s = sample();
    s.store.remove_node(s.b).unwrap();

    assert!(matches!(s.store.expand(s.b), Err(TreeError::NotFound(_))));
    assert!(matches!(s.store.item(s.b1), Err(TreeError::NotFound(_))));
    assert!(!s.store.is_node_visible(s.b));

    // A new node may reuse the slot but not the handle.
    let d = s.store.add("d", None).unwrap();
    assert_ne!(d, s.b);
    assert!(matches!(s.store.depth(s.b), Err(TreeError::NotFound(_))));
}

#[test]
fn test_root_is_protected() {
    let store: NodeStore<u32> = NodeStore::new();
    assert_eq!(store.remove_node(store.root()), Err(TreeError::RootNode));
    let a = store.add(1, None).unwrap();
    assert_eq!(
        store.set_parent(store.root(), Some(a)),
        Err(TreeError::RootNode)
    );
}

#[test]
fn test_duplicates_only_rejected_when_configured() {
    let store: NodeStore<&'static str> = NodeStore::new();
    store.add("x", None).unwrap();
    store.add("x", None).unwrap();
    assert_eq!(store.nodes_for_item(&"x").len(), 2);

    let unique: NodeStore<&'static str> =
        NodeStore::with_config(StoreConfig::new().with_unique_per_parent(true));
    let p = unique.add("p", None).unwrap();
    unique.add("x", None).unwrap();
    assert!(matches!(
        unique.add("x", None),
        Err(TreeError::DuplicateKey { .. })
    ));
    // Uniqueness is per parent, never global.
    unique.add("x", Some(p)).unwrap();
}

#[test]
fn test_set_parent_moves_subtree_and_resets() {
    let s = sample();
    let log = record(&s.store);

    s.store.set_parent(s.a2, Some(s.b1)).unwrap();

    assert_eq!(take(&log), vec![TreeEvent::reset()]);
    assert_eq!(s.store.parent(s.a2).unwrap(), Some(s.b1));
    assert_eq!(s.store.depth(s.a2).unwrap(), 3);
    assert_eq!(s.store.depth(s.a2x).unwrap(), 4);
    assert_eq!(s.store.children(Some(s.a)).unwrap(), vec![s.a1]);

    s.store.set_parent(s.b1, None).unwrap();
    assert_eq!(s.store.parent(s.b1).unwrap(), None);
    assert_eq!(s.store.depth(s.a2x).unwrap(), 3);
    assert!(s.store.is_node_visible(s.b1));
}

#[test]
fn test_set_parent_rejects_cycles() {
    let s = sample();
    assert_eq!(
        s.store.set_parent(s.a, Some(s.a2x)),
        Err(TreeError::Cycle {
            node: s.a,
            new_parent: s.a2x
        })
    );
    assert_eq!(
        s.store.set_parent(s.a, Some(s.a)),
        Err(TreeError::Cycle {
            node: s.a,
            new_parent: s.a
        })
    );
}

#[test]
fn test_update_replaces_every_copy() {
    let store: NodeStore<Contact> = NodeStore::new();
    let team = store.add(contact(100, "team"), None).unwrap();
    let first = store.add(contact(1, "ada"), None).unwrap();
    let second = store.add(contact(1, "ada"), Some(team)).unwrap();
    let log = record(&store);

    let updated = store.update(contact(1, "ada lovelace")).unwrap();

    assert_eq!(updated, vec![first, second]);
    assert_eq!(store.item(first).unwrap().name, "ada lovelace");
    assert_eq!(store.item(second).unwrap().name, "ada lovelace");
    let events = take(&log);
    assert!(events.contains(&TreeEvent::NodeChanged { node: first }));
    assert!(events.contains(&TreeEvent::NodeChanged { node: second }));
}

#[test]
fn test_update_unknown_item_is_not_found() {
    let store: NodeStore<Contact> = NodeStore::new();
    assert!(matches!(
        store.update(contact(9, "nobody")),
        Err(TreeError::NotFound(_))
    ));
}

#[test]
fn test_snapshot_reads() {
    let s = sample();
    assert!(s.store.contains(&"a2x"));
    assert!(!s.store.contains(&"zzz"));
    assert_eq!(s.store.node_from_item(&"a1", Some(s.a)), Some(s.a1));
    assert_eq!(s.store.node_from_item(&"a1", None), None);
    assert_eq!(s.store.item(s.a2x).unwrap(), "a2x");
    assert_eq!(s.store.parent(s.a).unwrap(), None);
    assert_eq!(s.store.parent(s.a1).unwrap(), Some(s.a));
    assert_eq!(s.store.children(None).unwrap(), vec![s.a, s.b, s.c]);
    assert_eq!(s.store.depth(s.a).unwrap(), 1);
    assert!(s.store.is_accepted(s.b1).unwrap());
    assert!(!s.store.is_node_visible(s.b1));
    assert_eq!(s.store.len(), 7);
    assert!(!s.store.is_empty());
}

#[test]
fn test_clear_resets_everything() {
    let s = sample();
    let log = record(&s.store);

    s.store.clear();

    assert_eq!(take(&log), vec![TreeEvent::reset()]);
    assert!(s.store.is_empty());
    assert_eq!(s.store.visible_item_count(), 0);
    assert!(rows(&s.store).is_empty());
    assert!(matches!(s.store.item(s.a), Err(TreeError::NotFound(_))));
    assert!(!s.store.contains(&"a"));

    let again = s.store.add("a", None).unwrap();
    assert_eq!(rows(&s.store), nodes(&[again]));
}

#[test]
fn test_clear_children_keeps_the_node() {
    let s = sample();
    let log = record(&s.store);

    s.store.clear_children(Some(s.a)).unwrap();

    assert!(take(&log).contains(&TreeEvent::NodeChanged { node: s.a }));
    assert_eq!(rows(&s.store), nodes(&[s.a, s.b, s.c]));
    assert!(!s.store.has_accepted_children(s.a).unwrap());
    assert_eq!(s.store.len(), 4);
}

#[test]
fn test_version_only_increases() {
    let store: NodeStore<u32> = NodeStore::new();
    let v0 = store.version();
    let a = store.add(1, None).unwrap();
    let v1 = store.version();
    assert!(v1 > v0);

    // Failed operations change nothing.
    assert!(store.remove(&99, None).is_err());
    assert_eq!(store.version(), v1);

    store.expand(a).unwrap();
    store.add(2, Some(a)).unwrap();
    store.remove(&2, Some(a)).unwrap();
    assert!(store.version() > v1);
}

#[test]
fn test_visible_count_fast_path_agrees_with_walk() {
    let store: NodeStore<u32> = NodeStore::new();
    for n in 0..20 {
        store.add(n, None).unwrap();
    }
    assert_eq!(store.visible_item_count(), 20);
    assert_eq!(rows(&store).len(), 20);

    let parent = store.node_from_item(&3, None).unwrap();
    let child = store.add(100, Some(parent)).unwrap();
    assert_eq!(store.visible_item_count(), 20);
    store.expand(parent).unwrap();
    assert_eq!(store.visible_item_count(), 21);
    assert_eq!(rows(&store).len(), 21);

    // Back to flat.
    store.remove_node(child).unwrap();
    assert_eq!(store.visible_item_count(), 20);
}

#[test]
fn test_listener_may_call_back_into_the_store() {
    let store: NodeStore<u32> = NodeStore::new();
    let observer = store.clone();
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(treeview::events::listener(move |event: &TreeEvent| {
        if let TreeEvent::VisibleNodeAdded { .. } = event {
            sink.lock().unwrap().push(observer.visible_item_count());
        }
    }));

    store.add(1, None).unwrap();
    store.add(2, None).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}
