//! Headless view models. They hold only presentation state and re-derive it
//! from the store when told to.

mod flame_graph;
mod tree_list;

pub use flame_graph::{FlameFrame, FlameGraphView};
pub use tree_list::{TreeListView, TreeRow};

/// Shown in place of a view's content when no thread is active.
pub const DATA_NOT_AVAILABLE: &str = "data not available";
