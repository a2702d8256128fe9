use super::*;
use callscope_core::{CallNode, NodeId, TraceInput};
use callscope_events::{EventKind, EventBus};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn id(value: i64) -> NodeId {
    NodeId(value)
}

/// main: 1 -> (2 -> (3, 4), 5 -> 6) ; worker: 10 -> 11
fn sample_input() -> TraceInput {
    let main = CallNode::new(1, "app.Main.main()").with_children(vec![
        CallNode::new(2, "app.svc.Service.run()").with_children(vec![
            CallNode::new(3, "app.dao.Repo.load()"),
            CallNode::new(4, "app.dao.Repo.save()"),
        ]),
        CallNode::new(5, "app.svc.Service.stop()")
            .with_children(vec![CallNode::new(6, "app.dao.Repo.close()")]),
    ]);
    let worker = CallNode::new(10, "app.Worker.loop()")
        .with_children(vec![CallNode::new(11, "app.dao.Repo.load()")]);
    TraceInput::new(BTreeMap::from([
        ("main".to_string(), main),
        ("worker".to_string(), worker),
    ]))
}

fn store() -> DataStore {
    DataStore::new(EventBus::new(), sample_input())
}

#[test]
fn first_thread_is_active_after_load() {
    let store = store();
    assert_eq!(store.current_thread().as_deref(), Some("main"));
    assert_eq!(store.root_id(), Some(id(1)));
    assert_eq!(store.children_of(id(2)), vec![id(3), id(4)]);
    assert_eq!(store.parent(id(6)), Some(id(5)));
    assert!(store.verify_indices().is_empty());
}

#[test]
fn select_is_idempotent() {
    let store = store();
    assert!(store.select(id(3), true, false));
    assert!(!store.select(id(3), true, false));
    assert!(store.deselect(id(3)));
    assert!(!store.deselect(id(3)));
}

#[test]
fn expand_and_collapse_are_idempotent() {
    let store = store();
    assert!(!store.expand(id(2)));
    assert!(store.collapse(id(2)));
    assert!(!store.collapse(id(2)));
    assert!(store.toggle_expand(id(2)));
    assert_eq!(store.node_state(id(2)).map(|s| s.expanded), Some(true));
}

#[test]
fn unknown_ids_are_no_ops() {
    let store = store();
    let events = store.bus().tap(&EventKind::ALL);
    assert!(!store.select(id(999), true, false));
    assert!(!store.expand(id(999)));
    assert!(store.select_all_children(id(999)).is_empty());
    assert!(store.select_ancestors(id(999)).is_empty());
    assert!(store.select_by_package("nope", true).is_empty());
    // Worker ids are valid globally but not in the active thread.
    assert!(!store.select(id(11), true, false));
    assert!(events.try_iter().next().is_none());
}

#[test]
fn single_select_publishes_both_events_in_order() {
    let store = store();
    let events = store.bus().tap(&EventKind::ALL);
    store.select(id(3), true, false);
    let seen: Vec<Event> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            Event::NodeSelectionChanged {
                node_id: id(3),
                selected: true,
                package_name: "app.dao".to_string(),
            },
            Event::ChangeSingleMethodByIdToClassviz {
                node_id: id(3),
                selected: true,
            },
        ]
    );
}

#[test]
fn batch_select_suppresses_node_events_and_refreshes_once() {
    let store = store();
    store.select(id(3), true, false);
    let events = store.bus().tap(&EventKind::ALL);

    let changed = store.select_all_children(id(2));
    assert_eq!(changed, vec![id(2), id(4)]);

    let seen: Vec<Event> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            Event::ChangeSingleMethodByIdToClassviz {
                node_id: id(2),
                selected: true,
            },
            Event::ChangeSingleMethodByIdToClassviz {
                node_id: id(4),
                selected: true,
            },
            Event::RefreshFlame,
        ]
    );

    assert!(store.select_all_children(id(2)).is_empty());
    assert!(events.try_iter().next().is_none());
}

#[test]
fn id_range_selection_clamps_to_the_active_thread() {
    let store = store();
    store.select(id(4), true, false);
    let events = store.bus().tap(&[EventKind::NodeSelectionChanged, EventKind::RefreshFlame]);

    // Clamped to [1, 6]; the worker's 10 and 11 are never touched.
    let changed = store.select_id_range(id(3), id(50), true);
    assert_eq!(changed, vec![id(3), id(5), id(6)]);
    assert!(!store.is_selected(id(2)));
    assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![Event::RefreshFlame]);

    assert_eq!(store.select_id_range(id(-5), id(2), false), Vec::<NodeId>::new());
    assert_eq!(store.select_id_range(id(-5), id(4), false), vec![id(3), id(4)]);
    assert!(store.select_id_range(id(7), id(9), true).is_empty());

    store.switch_thread("worker");
    assert_eq!(store.select_id_range(id(0), id(100), true), vec![id(10), id(11)]);
    assert!(store.verify_indices().is_empty());
}

#[test]
fn children_ancestor_and_global_batches() {
    let store = store();
    assert_eq!(store.select_children(id(1)), vec![id(2), id(5)]);
    assert!(!store.is_selected(id(3)));
    assert_eq!(store.select_ancestors(id(6)), vec![id(1)]);
    assert_eq!(store.deselect_ancestors(id(6)), vec![id(5), id(1)]);
    assert_eq!(store.deselect_children(id(1)), vec![id(2)]);

    assert_eq!(store.select_all().len(), 6);
    assert_eq!(store.selected_ids().len(), 6);
    assert_eq!(
        store.deselect_all_children(id(2)),
        vec![id(2), id(3), id(4)]
    );
    assert_eq!(store.deselect_all(), vec![id(1), id(5), id(6)]);
    assert!(store.verify_indices().is_empty());
}

#[test]
fn package_selection_is_tri_state() {
    let store = store();
    assert_eq!(
        store.package_selection_state("app.dao"),
        PackageSelectionState::Unselected
    );

    store.select(id(3), true, false);
    assert_eq!(
        store.package_selection_state("app.dao"),
        PackageSelectionState::Partial
    );

    assert_eq!(store.select_by_package("app.dao", true), vec![id(4), id(6)]);
    assert_eq!(
        store.package_selection_state("app.dao"),
        PackageSelectionState::Selected
    );
    assert_eq!(
        store.package_selection_state("missing"),
        PackageSelectionState::Unselected
    );
}

#[test]
fn expand_all_descendants_visits_tree_order_and_includes_node() {
    let store = store();
    let events = store.bus().tap(&[EventKind::NodeExpansionChanged]);
    assert_eq!(
        store.collapse_all_descendants(id(1)),
        vec![id(1), id(2), id(3), id(4), id(5), id(6)]
    );
    store.expand(id(5));
    assert_eq!(
        store.expand_all_descendants(id(1)),
        vec![id(1), id(2), id(3), id(4), id(6)]
    );
    assert_eq!(events.try_iter().count(), 3);
}

#[test]
fn switch_thread_rejects_unknown_and_current() {
    let store = store();
    let events = store.bus().tap(&[EventKind::ThreadChanged]);
    assert!(!store.switch_thread("main"));
    assert!(!store.switch_thread("ghost"));
    assert!(store.switch_thread("worker"));
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![Event::ThreadChanged {
            thread_name: "worker".to_string()
        }]
    );
    assert_eq!(store.root_id(), Some(id(10)));
    assert!(store.node(id(1)).is_none());
}

#[test]
fn thread_switch_round_trip_rebuilds_identical_indices() {
    let store = store();
    store.select(id(3), true, false);
    store.collapse(id(5));
    let before = store.index_snapshot();

    assert!(store.switch_thread("worker"));
    assert!(store.switch_thread("main"));
    let after = store.index_snapshot();

    assert_eq!(before.nodes, after.nodes);
    assert_eq!(before.children, after.children);
    assert_eq!(before.parents, after.parents);
    // Selection and collapse were persisted onto the tree.
    assert_eq!(before.selected, after.selected);
    assert_eq!(before.state, after.state);
}

#[test]
fn selection_is_written_back_onto_the_tree() {
    let store = store();
    store.select(id(4), true, false);
    store.collapse(id(2));
    let tree = store.thread_tree("main").unwrap();
    let node = tree.find(id(4)).unwrap();
    assert!(node.selected);
    assert!(tree.find(id(2)).unwrap().collapsed);
    assert!(!tree.find(id(3)).unwrap().selected);
}

#[test]
fn global_lookups_span_threads() {
    let store = store();
    assert_eq!(store.label_of(id(11)).as_deref(), Some("app.dao.Repo.load()"));
    assert_eq!(store.thread_of(id(11)).as_deref(), Some("worker"));
    assert_eq!(store.parent_of(id(11)), Some(id(10)));
    assert_eq!(store.parent_of(id(10)), None);
    assert!(store.label_of(id(500)).is_none());
    assert_eq!(store.id_range("worker").map(|r| r.max), Some(id(11)));
    let count = store.with_thread_tree("worker", CallNode::node_count);
    assert_eq!(count, Some(2));
}

#[test]
fn search_highlights_matches_and_clears_previous() {
    let store = store();
    let events = store.bus().tap(&[EventKind::SearchResultsChanged]);
    assert_eq!(store.search("repo.LOAD"), vec![id(3)]);
    assert!(store.node_state(id(3)).unwrap().highlight);

    assert_eq!(store.search("service"), vec![id(2), id(5)]);
    assert!(!store.node_state(id(3)).unwrap().highlight);
    assert!(store.search("").is_empty());
    assert!(store.clear_highlights().is_empty());
    assert_eq!(events.try_iter().count(), 3);
}

#[test]
fn manual_highlight_is_idempotent_and_not_persisted() {
    let store = store();
    assert!(store.set_highlight(id(4), true));
    assert!(!store.set_highlight(id(4), true));
    assert!(!store.set_highlight(id(99), true));
    assert_eq!(store.clear_highlights(), vec![id(4)]);

    store.set_highlight(id(4), true);
    store.switch_thread("worker");
    store.switch_thread("main");
    assert!(!store.node_state(id(4)).unwrap().highlight);
}

#[test]
fn focus_and_view_mode_publish_only_on_change() {
    let store = store();
    let events = store.bus().tap(&[
        EventKind::ChangeCurrentFocusedNode,
        EventKind::ViewModeChanged,
    ]);
    assert!(store.set_focused_node(id(11)));
    assert!(!store.set_focused_node(id(11)));
    assert!(!store.set_focused_node(id(404)));
    assert!(!store.set_view_mode(ViewMode::Logical));
    assert!(store.set_view_mode(ViewMode::Temporal));
    assert_eq!(store.focused_node(), Some(id(11)));
    assert_eq!(events.try_iter().count(), 2);
}

#[test]
fn handlers_may_read_the_store_during_dispatch() {
    use std::cell::Cell;
    use std::rc::Rc;

    let store = Rc::new(store());
    let observed = Rc::new(Cell::new(0usize));
    {
        let weak = Rc::downgrade(&store);
        let observed = Rc::clone(&observed);
        store
            .bus()
            .subscribe(EventKind::ChangeSingleMethodByIdToClassviz, move |_| {
                if let Some(store) = weak.upgrade() {
                    observed.set(store.selected_ids().len());
                }
            });
    }
    store.select_all_children(id(2));
    assert_eq!(observed.get(), 3);
}

#[derive(Debug, Clone)]
enum Op {
    Select(i64, bool),
    AllChildren(i64, bool),
    Ancestors(i64, bool),
    Package(&'static str, bool),
    Expand(i64, bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let node = 0i64..8;
    prop_oneof![
        (node.clone(), any::<bool>()).prop_map(|(n, s)| Op::Select(n, s)),
        (node.clone(), any::<bool>()).prop_map(|(n, s)| Op::AllChildren(n, s)),
        (node.clone(), any::<bool>()).prop_map(|(n, s)| Op::Ancestors(n, s)),
        (
            prop::sample::select(vec!["app", "app.svc", "app.dao", "none"]),
            any::<bool>()
        )
            .prop_map(|(p, s)| Op::Package(p, s)),
        (node, any::<bool>()).prop_map(|(n, e)| Op::Expand(n, e)),
    ]
}

proptest! {
    #[test]
    fn indices_stay_consistent_under_random_operations(
        ops in proptest::collection::vec(op_strategy(), 0..40)
    ) {
        let store = store();
        for op in ops {
            match op {
                Op::Select(n, s) => { store.select(id(n), s, false); }
                Op::AllChildren(n, true) => { store.select_all_children(id(n)); }
                Op::AllChildren(n, false) => { store.deselect_all_children(id(n)); }
                Op::Ancestors(n, true) => { store.select_ancestors(id(n)); }
                Op::Ancestors(n, false) => { store.deselect_ancestors(id(n)); }
                Op::Package(p, s) => { store.select_by_package(p, s); }
                Op::Expand(n, true) => { store.expand(id(n)); }
                Op::Expand(n, false) => { store.collapse(id(n)); }
            }
            let problems = store.verify_indices();
            prop_assert!(problems.is_empty(), "{:?}", problems);
        }
    }

    #[test]
    fn batch_results_report_exactly_the_flipped_nodes(node in 1i64..7, selected in any::<bool>()) {
        let store = store();
        store.select(id(3), true, false);
        let before: std::collections::BTreeSet<NodeId> = store.selected_ids().into_iter().collect();
        let changed = if selected {
            store.select_all_children(id(node))
        } else {
            store.deselect_all_children(id(node))
        };
        let after: std::collections::BTreeSet<NodeId> = store.selected_ids().into_iter().collect();
        let diff: std::collections::BTreeSet<NodeId> =
            before.symmetric_difference(&after).copied().collect();
        prop_assert_eq!(diff, changed.into_iter().collect());
    }
}
