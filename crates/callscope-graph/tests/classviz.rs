use callscope_core::{CallNode, NodeId, TraceInput};
use callscope_events::{Event, EventBus, EventKind};
use callscope_graph::{ClassvizManager, ClassvizOptions, DiagramEdgeKind};
use callscope_store::DataStore;
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

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

struct Fixture {
    store: Rc<DataStore>,
    classviz: Rc<RefCell<ClassvizManager>>,
}

fn fixture_with(input: TraceInput, options: ClassvizOptions) -> Fixture {
    let store = Rc::new(DataStore::new(EventBus::new(), input));
    let classviz = Rc::new(RefCell::new(ClassvizManager::new(Rc::clone(&store), options)));
    store
        .bus()
        .attach(&classviz, &ClassvizManager::LISTENED_KINDS);
    Fixture { store, classviz }
}

fn fixture() -> Fixture {
    fixture_with(sample_input(), ClassvizOptions::default())
}

fn edge_ids(classviz: &ClassvizManager) -> Vec<String> {
    classviz.edges().edges().map(|edge| edge.id.clone()).collect()
}

fn assert_consistent(classviz: &ClassvizManager) {
    let problems = classviz.check_edge_maps();
    assert!(problems.is_empty(), "{problems:?}");
}

#[test]
fn one_node_per_label_across_threads() {
    let f = fixture();
    f.store.select(id(3), true, false);
    f.store.switch_thread("worker");
    f.store.select(id(11), true, false);

    {
        let classviz = f.classviz.borrow();
        assert_eq!(classviz.node_count(), 1);
        assert_eq!(
            classviz.original_ids_for("app.dao.Repo.load()"),
            vec![id(3), id(11)]
        );
        assert!(classviz.class_node("class:app.dao.Repo").is_some());
        assert_consistent(&classviz);
    }

    f.store.deselect(id(11));
    {
        let classviz = f.classviz.borrow();
        assert!(classviz.inserted_node("app.dao.Repo.load()").is_some());
        assert_eq!(classviz.original_ids_for("app.dao.Repo.load()"), vec![id(3)]);
        assert_consistent(&classviz);
    }

    f.store.switch_thread("main");
    f.store.deselect(id(3));
    let classviz = f.classviz.borrow();
    assert_eq!(classviz.node_count(), 0);
    assert!(classviz.class_node("class:app.dao.Repo").is_none());
    assert_consistent(&classviz);
}

#[test]
fn deselecting_interior_node_reconnects_its_neighbours() {
    let f = fixture();
    for node in [1, 2, 3] {
        f.store.select(id(node), true, false);
    }
    assert_eq!(edge_ids(&f.classviz.borrow()), vec!["ct:1->2", "ct:2->3"]);

    f.store.deselect(id(2));
    assert_eq!(edge_ids(&f.classviz.borrow()), vec!["ct:1->3"]);
    assert_consistent(&f.classviz.borrow());

    f.store.select(id(2), true, false);
    assert_eq!(edge_ids(&f.classviz.borrow()), vec!["ct:1->2", "ct:2->3"]);
    assert_consistent(&f.classviz.borrow());
}

#[test]
fn membership_changes_request_region_refresh() {
    let f = fixture();
    let events = f.store.bus().tap(&[EventKind::RefreshRegionFocus]);

    f.store.select(id(2), true, false);
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![Event::RefreshRegionFocus {
            stop_step_by_step_mode: false
        }]
    );

    // Already inserted: the diagram does not change, nothing follows.
    f.classviz.borrow_mut().insert_single_method_by_id(id(2));
    assert_eq!(events.try_iter().count(), 0);

    f.store.select_all_children(id(5));
    assert!(f.classviz.borrow().inserted_node("app.dao.Repo.close()").is_some());
    assert!(events.try_iter().count() >= 1);
}

#[test]
fn batch_event_inserts_with_one_refresh() {
    let f = fixture();
    let events = f.store.bus().tap(&[EventKind::RefreshRegionFocus]);
    f.store.bus().publish(Event::ChangeMultiMethodByIdsToClassviz {
        node_ids: vec![id(1), id(2), id(3), id(999)],
        selected: true,
    });

    assert_eq!(events.try_iter().count(), 1);
    let classviz = f.classviz.borrow();
    assert_eq!(classviz.node_count(), 3);
    assert_eq!(edge_ids(&classviz), vec!["ct:1->2", "ct:2->3"]);
    assert_consistent(&classviz);
}

#[test]
fn trace_mode_links_entries_in_id_order() {
    let f = fixture();
    for node in [6, 3, 4] {
        f.store.select(id(node), true, false);
    }
    f.store
        .bus()
        .publish(Event::SwitchTraceMode { trace_mode: true });

    let classviz = f.classviz.borrow();
    assert!(classviz.options().trace_mode);
    assert_eq!(edge_ids(&classviz), vec!["seq:3->4", "seq:4->6"]);
    assert!(
        classviz
            .edges()
            .edges()
            .all(|edge| edge.kind == DiagramEdgeKind::Sequential)
    );
    assert_consistent(&classviz);
}

#[test]
fn trace_mode_keeps_threads_apart() {
    let f = fixture();
    f.store.select(id(1), true, false);
    f.store.select(id(2), true, false);
    f.store.switch_thread("worker");
    f.store.select(id(10), true, false);
    f.store.select(id(11), true, false);

    let mut classviz = f.classviz.borrow_mut();
    assert!(classviz.switch_trace_mode(true));
    assert!(!classviz.switch_trace_mode(true));
    assert_eq!(edge_ids(&classviz), vec!["seq:1->2", "seq:10->11"]);
}

#[test]
fn numbered_call_tree_edges_carry_dfs_rank() {
    let f = fixture();
    for node in [1, 2, 5] {
        f.store.select(id(node), true, false);
    }
    let mut classviz = f.classviz.borrow_mut();
    assert!(classviz.set_numbered_edges(true));

    let first = classviz.edges().get("ct:1->2").map(|e| e.label.clone());
    let second = classviz.edges().get("ct:1->5").map(|e| e.label.clone());
    assert_eq!(first, Some(Some("1".to_string())));
    assert_eq!(second, Some(Some("2".to_string())));

    // Later insertions renumber the whole tree.
    drop(classviz);
    f.store.select(id(3), true, false);
    let classviz = f.classviz.borrow();
    let labels: Vec<Option<String>> = ["ct:1->2", "ct:2->3", "ct:1->5"]
        .iter()
        .map(|edge_id| classviz.edges().get(edge_id).and_then(|e| e.label.clone()))
        .collect();
    assert_eq!(
        labels,
        vec![
            Some("1".to_string()),
            Some("2".to_string()),
            Some("3".to_string())
        ]
    );
}

#[test]
fn lifting_is_idempotent_and_reversible() {
    let f = fixture();
    for node in [1, 2, 3, 4] {
        f.store.select(id(node), true, false);
    }
    let before = edge_ids(&f.classviz.borrow());

    let mut classviz = f.classviz.borrow_mut();
    assert!(classviz.set_edge_lifting(true));
    let lifted = classviz.lifted_edges();
    let service_to_repo = lifted
        .iter()
        .find(|edge| edge.id == "lift:class:app.svc.Service->class:app.dao.Repo")
        .cloned();
    assert_eq!(service_to_repo.map(|edge| edge.count), Some(2));
    assert_eq!(lifted.len(), 2);
    assert!(classviz.edges().is_empty());

    assert_eq!(classviz.lift_edges(), 0);
    assert_eq!(classviz.lifted_edges(), lifted);

    assert!(classviz.set_edge_lifting(false));
    assert!(classviz.lifted_edges().is_empty());
    assert_eq!(edge_ids(&classviz), before);
    assert_consistent(&classviz);
}

#[test]
fn lifted_diagram_reconnects_after_interior_removal() {
    let chain = CallNode::new(1, "a.A.x()").with_children(vec![
        CallNode::new(2, "b.B.y()").with_children(vec![CallNode::new(3, "c.C.z()")]),
    ]);
    let f = fixture_with(TraceInput::single("main", chain), ClassvizOptions::default());
    for node in [1, 2, 3] {
        f.store.select(id(node), true, false);
    }
    assert_eq!(f.classviz.borrow_mut().lift_edges(), 2);
    assert!(f.classviz.borrow().options().lift_edges);

    f.store.deselect(id(2));

    let classviz = f.classviz.borrow();
    assert!(classviz.class_node("class:b.B").is_none());
    let lifted: Vec<String> = classviz.lifted_edges().into_iter().map(|e| e.id).collect();
    assert_eq!(lifted, vec!["lift:class:a.A->class:c.C".to_string()]);
    assert!(classviz.edges().is_empty());
    assert_consistent(&classviz);
}

#[test]
fn selection_present_at_load_is_projected() {
    let main = CallNode::new(1, "app.Main.main()")
        .selected(true)
        .with_children(vec![
            CallNode::new(2, "app.svc.Service.run()"),
            CallNode::new(3, "app.svc.Service.stop()").selected(true),
        ]);
    let f = fixture_with(TraceInput::single("main", main), ClassvizOptions::default());
    let classviz = f.classviz.borrow();
    assert_eq!(classviz.node_count(), 2);
    assert_eq!(edge_ids(&classviz), vec!["ct:1->3"]);
}

#[test]
fn labels_without_a_class_are_rolled_back() {
    let main = CallNode::new(1, "app.Main.main()").with_children(vec![CallNode::new(2, "orphan")]);
    let f = fixture_with(TraceInput::single("main", main), ClassvizOptions::default());
    f.store.select(id(1), true, false);
    f.store.select(id(2), true, false);

    let classviz = f.classviz.borrow();
    assert_eq!(classviz.node_count(), 1);
    assert!(classviz.thread_entries("main").iter().all(|e| e.original_id == id(1)));
    assert_consistent(&classviz);
}

#[test]
fn library_methods_stand_alone() {
    let main = CallNode::new(1, "app.Main.main()")
        .with_children(vec![CallNode::new(2, "java.util.List.add()")]);
    let f = fixture_with(TraceInput::single("main", main), ClassvizOptions::default());
    f.store.select(id(1), true, false);
    f.store.select(id(2), true, false);

    let classviz = f.classviz.borrow();
    let library = classviz.inserted_node("java.util.List.add()");
    assert!(library.is_some_and(|node| node.parent.is_none()));
    assert!(classviz.class_node("class:java.util.List").is_none());
}

#[test]
fn focus_follows_store_focus_for_inserted_nodes_only() {
    let f = fixture();
    f.store.select(id(2), true, false);

    f.store.set_focused_node(id(2));
    assert_eq!(
        f.classviz.borrow().focused_node(),
        Some("app.svc.Service.run()")
    );
    assert!(
        f.classviz
            .borrow()
            .inserted_node("app.svc.Service.run()")
            .is_some_and(|node| node.focused)
    );

    f.store.set_focused_node(id(6));
    assert_eq!(f.classviz.borrow().focused_node(), None);
}

#[test]
fn step_coloring_marks_past_current_and_future() {
    let f = fixture();
    for node in [1, 2, 3] {
        f.store.select(id(node), true, false);
    }
    let mut classviz = f.classviz.borrow_mut();
    assert!(classviz.set_current_index("main", 1));
    assert_eq!(classviz.color_step("main"), 3);

    let focus = classviz.focus_color("main").to_hex();
    let color_of = |label: &str| classviz.inserted_node(label).map(|n| n.color.clone());
    assert_eq!(color_of("app.svc.Service.run()"), Some(focus));
    assert_ne!(color_of("app.Main.main()"), color_of("app.dao.Repo.load()"));

    classviz.restore_colors();
    let node = classviz.inserted_node("app.Main.main()");
    assert!(node.is_some_and(|n| n.color == n.original_color));
}

proptest! {
    #[test]
    fn incremental_edges_match_a_full_rebuild(
        ops in proptest::collection::vec((0i64..8, any::<bool>()), 0..30)
    ) {
        let f = fixture();
        for (node, selected) in ops {
            f.store.select(id(node), selected, false);

            let mut classviz = f.classviz.borrow_mut();
            let problems = classviz.check_edge_maps();
            prop_assert!(problems.is_empty(), "{:?}", problems);

            let labels: std::collections::BTreeSet<String> = f
                .store
                .selected_ids()
                .into_iter()
                .filter_map(|selected| f.store.label_of(selected))
                .collect();
            prop_assert_eq!(classviz.node_count(), labels.len());

            let incremental = edge_ids(&classviz);
            classviz.regenerate_edges();
            prop_assert_eq!(incremental, edge_ids(&classviz));
        }
    }
}

#[test]
fn snapshot_serializes_for_renderers() {
    let f = fixture();
    f.store.select_all_children(id(2));
    let snapshot = f.classviz.borrow().snapshot();
    assert_eq!(snapshot.methods.len(), 3);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["classes"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["edges"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["trace_mode"], false);
}
