use async_trait::async_trait;
use callscope_core::{CallNode, NodeId, NodeStatus, TraceInput};
use callscope_events::{Event, EventBus};
use callscope_explain::{
    ExplanationMode, ExplanationService, Explainer, ExplainerOptions, KntNode, RegionExplanation,
    ServiceError, TraceNode, execute_plan, explain_selection,
};
use callscope_store::DataStore;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct ScriptedService {
    calls: Mutex<Vec<String>>,
    seen_knts: Mutex<Vec<KntNode>>,
    failing_regions: HashSet<NodeId>,
    slow_regions: HashSet<NodeId>,
}

#[async_trait]
impl ExplanationService for ScriptedService {
    async fn explain_region(&self, region: &TraceNode) -> Result<RegionExplanation, ServiceError> {
        self.calls.lock().unwrap().push(format!("region:{}", region.id));
        if self.slow_regions.contains(&region.id) {
            tokio::time::sleep(Duration::from_secs(45)).await;
        }
        if self.failing_regions.contains(&region.id) {
            return Err(ServiceError::Decode("scripted failure".to_string()));
        }
        Ok(RegionExplanation {
            brief_summary: format!("summary of {}", region.label),
            detailed_behaviour: format!("{} nodes", region.node_count()),
            flow_representation: region.label.clone(),
            error: None,
        })
    }

    async fn explain_pure_knt(&self, knt: &KntNode) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(format!("knt:{}", knt.id));
        Ok(format!("quick:{}", knt.id))
    }

    async fn explain_knt_with_data(&self, knt: &KntNode) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(format!("trace:{}", knt.id));
        self.seen_knts.lock().unwrap().push(knt.clone());
        Ok(format!("detailed:{}", knt.id))
    }
}

fn fan_out() -> NodeStatus {
    NodeStatus {
        fan_out: true,
        ..NodeStatus::default()
    }
}

fn implementation() -> NodeStatus {
    NodeStatus {
        implementation_entry_point: true,
        ..NodeStatus::default()
    }
}

/// 1 -> 2* -> (3, 4*) ; 1 -> 5      (* special)
fn sample_input() -> TraceInput {
    let main = CallNode::new(1, "app.Main.main()").with_children(vec![
        CallNode::new(2, "app.svc.Service.run()")
            .with_status(fan_out())
            .with_children(vec![
                CallNode::new(3, "app.dao.Repo.load()"),
                CallNode::new(4, "app.dao.Repo.save()").with_status(implementation()),
            ]),
        CallNode::new(5, "app.svc.Service.stop()"),
    ]);
    TraceInput::single("main", main)
}

struct Fixture {
    store: Rc<DataStore>,
    explainer: Rc<RefCell<Explainer>>,
}

fn fixture(options: ExplainerOptions) -> Fixture {
    let store = Rc::new(DataStore::new(EventBus::new(), sample_input()));
    let explainer = Rc::new(RefCell::new(Explainer::new(Rc::clone(&store), options)));
    store.bus().attach(&explainer, &Explainer::LISTENED_KINDS);
    Fixture { store, explainer }
}

fn select(f: &Fixture, ids: &[i64]) {
    for &id in ids {
        f.store.select(NodeId(id), true, false);
    }
    f.store.bus().publish(Event::RefreshRegionFocus {
        stop_step_by_step_mode: false,
    });
}

fn ids(values: &[i64]) -> Vec<NodeId> {
    values.iter().copied().map(NodeId).collect()
}

#[test]
fn region_refresh_rebuilds_trees_and_regions() {
    let f = fixture(ExplainerOptions::default());
    assert_eq!(f.explainer.borrow().selected_trees().count(), 0);

    f.store.select(NodeId(1), true, false);
    assert!(f.explainer.borrow().is_stale());

    select(&f, &[2, 3, 4, 5]);
    let explainer = f.explainer.borrow();
    assert!(!explainer.is_stale());
    assert_eq!(explainer.selected_trees().count(), 1);
    assert_eq!(explainer.regions_of(NodeId(1)), ids(&[1, 2, 4]).as_slice());

    let knt = &explainer.selected_tree(NodeId(1)).unwrap().knt;
    assert_eq!(knt.ids(), ids(&[1, 2, 4]));
    let root_region = explainer.region(NodeId(1)).unwrap();
    assert_eq!(root_region.data.node_count(), 3);
}

#[test]
fn unselected_parent_cuts_off_selected_descendant() {
    let main = CallNode::new(1, "A.a()").with_children(vec![
        CallNode::new(2, "B.b()").with_children(vec![CallNode::new(3, "C.c()")]),
    ]);
    let store = Rc::new(DataStore::new(EventBus::new(), TraceInput::single("t", main)));
    store.select(NodeId(1), true, false);
    store.select(NodeId(3), true, false);

    let explainer = Explainer::new(Rc::clone(&store), ExplainerOptions::default());
    let roots: Vec<NodeId> = explainer.selected_trees().map(|tree| tree.root).collect();
    assert_eq!(roots, ids(&[1]));
    let tree = &explainer.selected_tree(NodeId(1)).unwrap().tree;
    assert!(tree.children.is_empty());
}

#[test]
fn focus_tracks_the_enclosing_region() {
    let f = fixture(ExplainerOptions::default());
    select(&f, &[1, 2, 3, 4]);

    f.store.set_focused_node(NodeId(3));
    assert_eq!(f.explainer.borrow().focused_region(), Some(NodeId(2)));
    f.store.set_focused_node(NodeId(4));
    assert_eq!(f.explainer.borrow().focused_region(), Some(NodeId(4)));
    f.store.set_focused_node(NodeId(5));
    assert_eq!(f.explainer.borrow().focused_region(), None);

    // A rebuild keeps the focus on the store's focused node.
    f.store.set_focused_node(NodeId(3));
    select(&f, &[5]);
    assert_eq!(f.explainer.borrow().focused_region(), Some(NodeId(2)));
}

#[test]
fn provider_changes_are_recorded() {
    let f = fixture(ExplainerOptions::default());
    f.store.bus().publish(Event::ChangeLlmServiceProvider {
        model: "gpt-test".to_string(),
        url: "http://localhost:9000/v1".to_string(),
        key: "secret".to_string(),
    });
    let explainer = f.explainer.borrow();
    assert_eq!(explainer.provider().model, "gpt-test");
    assert!(explainer.provider().is_configured());
}

#[tokio::test]
async fn quick_mode_explains_each_tree_once() {
    let f = fixture(ExplainerOptions::default());
    select(&f, &[1, 2, 3, 4]);
    let service = ScriptedService::default();

    let applied = explain_selection(&f.explainer, &service).await;
    assert_eq!(applied, 1);
    assert_eq!(*service.calls.lock().unwrap(), vec!["knt:1".to_string()]);

    let explainer = f.explainer.borrow();
    let tree = explainer.selected_tree(NodeId(1)).unwrap();
    assert_eq!(tree.explanation.as_deref(), Some("quick:1"));
    assert!(explainer.regions().all(|region| !region.explained));
}

#[tokio::test]
async fn detailed_mode_survives_a_failing_region() {
    let f = fixture(ExplainerOptions {
        detailed: true,
        ..ExplainerOptions::default()
    });
    select(&f, &[1, 2, 3, 4]);
    let service = ScriptedService {
        failing_regions: HashSet::from([NodeId(2)]),
        ..ScriptedService::default()
    };

    let applied = explain_selection(&f.explainer, &service).await;
    assert_eq!(applied, 4);
    assert_eq!(
        *service.calls.lock().unwrap(),
        vec!["region:1", "region:2", "region:4", "trace:1"]
    );

    let explainer = f.explainer.borrow();
    let failed = explainer.region(NodeId(2)).unwrap();
    assert!(failed.explained);
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("scripted failure")));
    let fine = explainer.region(NodeId(4)).unwrap();
    assert_eq!(fine.brief_summary.as_deref(), Some("summary of app.dao.Repo.save()"));
    assert_eq!(fine.error, None);

    let seen = service.seen_knts.lock().unwrap();
    let augmented = &seen[0];
    assert_eq!(augmented.brief_summary.as_deref(), Some("summary of app.Main.main()"));
    assert!(
        augmented.children[0]
            .brief_summary
            .as_deref()
            .is_some_and(|s| s.starts_with("Explanation unavailable"))
    );
    assert_eq!(
        explainer.selected_tree(NodeId(1)).unwrap().explanation.as_deref(),
        Some("detailed:1")
    );
}

#[tokio::test(start_paused = true)]
async fn slow_region_times_out_into_a_fallback() {
    let f = fixture(ExplainerOptions {
        detailed: true,
        ..ExplainerOptions::default()
    });
    select(&f, &[1, 2, 3, 4]);
    let service = ScriptedService {
        slow_regions: HashSet::from([NodeId(4)]),
        ..ScriptedService::default()
    };

    explain_selection(&f.explainer, &service).await;
    let explainer = f.explainer.borrow();
    let slow = explainer.region(NodeId(4)).unwrap();
    assert!(slow.error.as_deref().is_some_and(|e| e.contains("timed out")));
    assert_eq!(explainer.region(NodeId(2)).unwrap().error, None);
    assert_eq!(
        explainer.selected_tree(NodeId(1)).unwrap().explanation.as_deref(),
        Some("detailed:1")
    );
}

#[tokio::test]
async fn cancelled_runs_fall_back_everywhere() {
    let f = fixture(ExplainerOptions::default());
    select(&f, &[1, 3]);
    let service = ScriptedService::default();

    let plan = f.explainer.borrow_mut().plan_mode(ExplanationMode::Detailed);
    f.explainer.borrow_mut().cancel_pending();
    let outcome = execute_plan(&service, plan).await;

    assert_eq!(outcome.trees.len(), 1);
    assert!(outcome.regions.iter().all(|(_, r)| r.error.is_some()));
    assert!(
        outcome
            .trees
            .iter()
            .all(|(_, t)| t.error.as_deref().is_some_and(|e| e.contains("cancelled")))
    );
}

#[tokio::test]
async fn results_for_vanished_trees_are_dropped() {
    let f = fixture(ExplainerOptions::default());
    select(&f, &[1]);
    let plan = f.explainer.borrow_mut().plan();
    let outcome = execute_plan(&ScriptedService::default(), plan).await;

    f.store.deselect(NodeId(1));
    select(&f, &[]);
    assert_eq!(f.explainer.borrow_mut().apply(outcome), 0);
}
