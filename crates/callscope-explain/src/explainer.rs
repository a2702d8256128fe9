use crate::service::{
    DEFAULT_REGION_TIMEOUT_MS, DEFAULT_TRACE_TIMEOUT_MS, ExplanationService, ProviderConfig,
    RegionExplanation, with_deadline,
};
use crate::tree::{
    KntNode, TraceNode, augment_knt_with_region_summaries, build_knt, build_selected_subtree,
    compress_recursive_calls, extract_region, find_selected_roots, identify_regions,
};
use callscope_core::NodeId;
use callscope_events::telemetry::{
    ExplainOperation, ExplainSubject, OP_EXPLAIN_KNT, OP_EXPLAIN_REGION, OP_EXPLAIN_TRACE,
    explanations_applied, new_correlation_id,
};
use callscope_events::{Event, EventKind, EventListener};
use callscope_store::DataStore;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerOptions {
    /// Explain every region before the trace instead of the bare KNT.
    pub detailed: bool,
    pub region_timeout_ms: u64,
    pub trace_timeout_ms: u64,
    pub provider: ProviderConfig,
}

impl Default for ExplainerOptions {
    fn default() -> Self {
        Self {
            detailed: false,
            region_timeout_ms: DEFAULT_REGION_TIMEOUT_MS,
            trace_timeout_ms: DEFAULT_TRACE_TIMEOUT_MS,
            provider: ProviderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplanationMode {
    /// One call per selected tree over its key-node tree.
    Quick,
    /// One call per region, then one per tree over the augmented KNT.
    Detailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTree {
    pub root: NodeId,
    pub thread: String,
    /// Selected, recursion-compressed copy.
    pub tree: TraceNode,
    pub knt: KntNode,
    pub explanation: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: NodeId,
    /// Root of the selected tree the region belongs to.
    pub tree_root: NodeId,
    pub data: TraceNode,
    pub explained: bool,
    pub brief_summary: Option<String>,
    pub detailed_behaviour: Option<String>,
    pub flow_representation: Option<String>,
    pub error: Option<String>,
}

impl Region {
    fn new(id: NodeId, tree_root: NodeId, data: TraceNode) -> Self {
        Self {
            id,
            tree_root,
            data,
            explained: false,
            brief_summary: None,
            detailed_behaviour: None,
            flow_representation: None,
            error: None,
        }
    }
}

/// Work captured from the explainer so the service calls can run without
/// holding it borrowed.
#[derive(Debug, Clone)]
pub struct ExplanationPlan {
    pub correlation_id: String,
    pub mode: ExplanationMode,
    pub trees: Vec<PlannedTree>,
    pub region_timeout: Duration,
    pub trace_timeout: Duration,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct PlannedTree {
    pub root: NodeId,
    pub knt: KntNode,
    /// Empty in quick mode.
    pub regions: Vec<(NodeId, TraceNode)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeExplanation {
    pub text: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplanationOutcome {
    pub correlation_id: String,
    pub regions: Vec<(NodeId, RegionExplanation)>,
    pub trees: Vec<(NodeId, TreeExplanation)>,
}

/// Derives selected trees, key-node trees and regions from the store and
/// keeps their explanations.
///
/// The derived model is rebuilt from scratch on every
/// `RefreshRegionFocus`. Selection changes that do not reach the diagram
/// only mark it stale; [`Explainer::plan`] rebuilds a stale model first.
pub struct Explainer {
    store: Rc<DataStore>,
    options: ExplainerOptions,
    selected_trees: BTreeMap<NodeId, SelectedTree>,
    regions: BTreeMap<NodeId, Region>,
    trace_to_region: BTreeMap<NodeId, Vec<NodeId>>,
    focused_region: Option<NodeId>,
    stale: bool,
    cancel: CancellationToken,
}

impl Explainer {
    pub const LISTENED_KINDS: [EventKind; 5] = [
        EventKind::RefreshRegionFocus,
        EventKind::ChangeCurrentFocusedNode,
        EventKind::ChangeLlmServiceProvider,
        EventKind::NodeSelectionChanged,
        EventKind::RefreshFlame,
    ];

    pub fn new(store: Rc<DataStore>, options: ExplainerOptions) -> Self {
        let mut explainer = Self {
            store,
            options,
            selected_trees: BTreeMap::new(),
            regions: BTreeMap::new(),
            trace_to_region: BTreeMap::new(),
            focused_region: None,
            stale: false,
            cancel: CancellationToken::new(),
        };
        explainer.build_selected_trees();
        explainer
    }

    pub fn options(&self) -> &ExplainerOptions {
        &self.options
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.options.provider
    }

    pub fn set_detailed(&mut self, detailed: bool) {
        self.options.detailed = detailed;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Clear and rebuild every selected tree, KNT and region from the
    /// selection of all threads. Returns the number of selected trees.
    pub fn build_selected_trees(&mut self) -> usize {
        self.selected_trees.clear();
        self.regions.clear();
        self.trace_to_region.clear();

        for thread in self.store.thread_names() {
            let subtrees = self
                .store
                .with_thread_tree(&thread, |root| {
                    find_selected_roots(root)
                        .into_iter()
                        .filter_map(|id| root.find(id))
                        .filter_map(build_selected_subtree)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            for subtree in subtrees {
                let tree = compress_recursive_calls(subtree);
                let knt = build_knt(&tree);
                let region_ids = identify_regions(&tree);
                for &region_id in &region_ids {
                    match extract_region(&tree, region_id) {
                        Some(data) => {
                            self.regions
                                .insert(region_id, Region::new(region_id, tree.id, data));
                        }
                        None => tracing::warn!(region = %region_id, "Region root vanished"),
                    }
                }
                self.trace_to_region.insert(tree.id, region_ids);
                self.selected_trees.insert(
                    tree.id,
                    SelectedTree {
                        root: tree.id,
                        thread: thread.clone(),
                        tree,
                        knt,
                        explanation: None,
                        error: None,
                    },
                );
            }
        }

        self.stale = false;
        self.focused_region = self
            .store
            .focused_node()
            .and_then(|id| self.region_containing(id));
        tracing::debug!(
            trees = self.selected_trees.len(),
            regions = self.regions.len(),
            "Selected trees rebuilt"
        );
        self.selected_trees.len()
    }

    pub fn selected_trees(&self) -> impl Iterator<Item = &SelectedTree> {
        self.selected_trees.values()
    }

    pub fn selected_tree(&self, root: NodeId) -> Option<&SelectedTree> {
        self.selected_trees.get(&root)
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn region(&self, id: NodeId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn regions_of(&self, root: NodeId) -> &[NodeId] {
        self.trace_to_region
            .get(&root)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn focused_region(&self) -> Option<NodeId> {
        self.focused_region
    }

    /// Region whose body holds `id`. A region root belongs to its own
    /// region, not to the stub left in its parent region.
    pub fn region_containing(&self, id: NodeId) -> Option<NodeId> {
        if self.regions.contains_key(&id) {
            return Some(id);
        }
        self.regions
            .values()
            .find(|region| region.data.contains(id))
            .map(|region| region.id)
    }

    /// Abort every in-flight run planned so far.
    pub fn cancel_pending(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    /// Capture the work for the configured mode.
    pub fn plan(&mut self) -> ExplanationPlan {
        let mode = if self.options.detailed {
            ExplanationMode::Detailed
        } else {
            ExplanationMode::Quick
        };
        self.plan_mode(mode)
    }

    pub fn plan_mode(&mut self, mode: ExplanationMode) -> ExplanationPlan {
        if self.stale {
            self.build_selected_trees();
        }
        let trees = self
            .selected_trees
            .values()
            .map(|selected| PlannedTree {
                root: selected.root,
                knt: selected.knt.clone(),
                regions: match mode {
                    ExplanationMode::Quick => Vec::new(),
                    ExplanationMode::Detailed => self
                        .regions_of(selected.root)
                        .iter()
                        .filter_map(|id| self.regions.get(id))
                        .map(|region| (region.id, region.data.clone()))
                        .collect(),
                },
            })
            .collect();

        ExplanationPlan {
            correlation_id: new_correlation_id(),
            mode,
            trees,
            region_timeout: Duration::from_millis(self.options.region_timeout_ms),
            trace_timeout: Duration::from_millis(self.options.trace_timeout_ms),
            cancel: self.cancel.child_token(),
        }
    }

    /// Store the results of a run. Items whose tree or region no longer
    /// exists are skipped. Returns the number of items stored.
    pub fn apply(&mut self, outcome: ExplanationOutcome) -> usize {
        let mut regions = 0;
        for (id, explanation) in outcome.regions {
            let Some(region) = self.regions.get_mut(&id) else {
                tracing::debug!(region = %id, "Explained region no longer exists");
                continue;
            };
            region.explained = true;
            region.brief_summary = Some(explanation.brief_summary);
            region.detailed_behaviour = Some(explanation.detailed_behaviour);
            region.flow_representation = Some(explanation.flow_representation);
            region.error = explanation.error;
            regions += 1;
        }
        let mut trees = 0;
        for (root, explanation) in outcome.trees {
            let Some(tree) = self.selected_trees.get_mut(&root) else {
                tracing::debug!(root = %root, "Explained tree no longer exists");
                continue;
            };
            tree.explanation = Some(explanation.text);
            tree.error = explanation.error;
            trees += 1;
        }
        explanations_applied(&outcome.correlation_id, regions, trees);
        regions + trees
    }
}

/// Run a plan against `service`. Every failed call is replaced by a
/// fallback carrying its error, so one failure never stops the others.
pub async fn execute_plan(
    service: &dyn ExplanationService,
    plan: ExplanationPlan,
) -> ExplanationOutcome {
    let mut outcome = ExplanationOutcome {
        correlation_id: plan.correlation_id.clone(),
        ..ExplanationOutcome::default()
    };
    let correlation_id = plan.correlation_id.as_str();

    for tree in &plan.trees {
        match plan.mode {
            ExplanationMode::Quick => {
                let op = ExplainOperation::start(
                    OP_EXPLAIN_KNT,
                    correlation_id,
                    ExplainSubject::Tree { root: tree.root },
                );
                let result = with_deadline(
                    &plan.cancel,
                    plan.region_timeout,
                    service.explain_pure_knt(&tree.knt),
                )
                .await;
                outcome.trees.push((tree.root, finish_tree(op, result)));
            }
            ExplanationMode::Detailed => {
                let mut summaries: HashMap<NodeId, String> = HashMap::new();
                for (region_id, data) in &tree.regions {
                    let op = ExplainOperation::start(
                        OP_EXPLAIN_REGION,
                        correlation_id,
                        ExplainSubject::Region {
                            root: tree.root,
                            region: *region_id,
                        },
                    );
                    let result = with_deadline(
                        &plan.cancel,
                        plan.region_timeout,
                        service.explain_region(data),
                    )
                    .await;
                    let explanation = match result {
                        Ok(explanation) => {
                            op.succeed();
                            explanation
                        }
                        Err(error) => {
                            op.fail(&error);
                            RegionExplanation::fallback(error.to_string())
                        }
                    };
                    summaries.insert(*region_id, explanation.brief_summary.clone());
                    outcome.regions.push((*region_id, explanation));
                }

                let augmented = augment_knt_with_region_summaries(&tree.knt, &summaries);
                let op = ExplainOperation::start(
                    OP_EXPLAIN_TRACE,
                    correlation_id,
                    ExplainSubject::Tree { root: tree.root },
                );
                let result = with_deadline(
                    &plan.cancel,
                    plan.trace_timeout,
                    service.explain_knt_with_data(&augmented),
                )
                .await;
                outcome.trees.push((tree.root, finish_tree(op, result)));
            }
        }
    }
    outcome
}

fn finish_tree(op: ExplainOperation, result: Result<String, crate::ServiceError>) -> TreeExplanation {
    match result {
        Ok(text) => {
            op.succeed();
            TreeExplanation { text, error: None }
        }
        Err(error) => {
            op.fail(&error);
            TreeExplanation {
                text: format!("Explanation unavailable: {error}"),
                error: Some(error.to_string()),
            }
        }
    }
}

/// Plan, execute and apply one explanation run. The explainer is borrowed
/// only before and after the service calls.
pub async fn explain_selection(
    explainer: &RefCell<Explainer>,
    service: &dyn ExplanationService,
) -> usize {
    let plan = explainer.borrow_mut().plan();
    let outcome = execute_plan(service, plan).await;
    explainer.borrow_mut().apply(outcome)
}

impl EventListener for Explainer {
    fn handle_event(&mut self, event: &Event) -> Vec<Event> {
        match event {
            Event::RefreshRegionFocus { .. } => {
                self.build_selected_trees();
            }
            Event::ChangeCurrentFocusedNode { node_id } => {
                self.focused_region = self.region_containing(*node_id);
            }
            Event::NodeSelectionChanged { .. } | Event::RefreshFlame => {
                self.stale = true;
            }
            Event::ChangeLlmServiceProvider { model, url, key } => {
                self.options.provider = ProviderConfig {
                    model: model.clone(),
                    url: url.clone(),
                    key: key.clone(),
                };
                tracing::info!(model = %model, url = %url, "Explanation provider changed");
            }
            _ => {}
        }
        Vec::new()
    }
}
