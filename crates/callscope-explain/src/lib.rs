//! Region and key-node-tree extraction over the current selection, plus the
//! explanation pipeline that summarizes them through a language model.

pub mod explainer;
pub mod parse;
pub mod service;
pub mod tree;

pub use explainer::{
    ExplanationMode, ExplanationOutcome, ExplanationPlan, Explainer, ExplainerOptions,
    PlannedTree, Region, SelectedTree, TreeExplanation, execute_plan, explain_selection,
};
pub use parse::{fallback_object, parse_json_lenient};
pub use service::{
    ExplanationService, HttpExplanationService, ProviderConfig, RegionExplanation, ServiceError,
    with_deadline,
};
pub use tree::{
    KntNode, TraceNode, augment_knt_with_region_summaries, build_knt, build_selected_subtree,
    compress_recursive_calls, compress_recursive_node, extract_region, find_selected_roots,
    identify_regions,
};
