//! Class diagram projection of the selected call-tree nodes.
//!
//! [`ClassvizManager`] owns the diagram and delegates to one sub-manager per
//! concern: node creation, styling, class layout, edges, call-tree edge
//! surgery, edge lifting and per-thread playback order.

pub mod call_tree;
pub mod class_layout;
pub mod edge_lifter;
pub mod edge_manager;
pub mod manager;
pub mod model;
pub mod node_factory;
pub mod node_styler;
pub mod style;
pub mod thread_manager;

pub use call_tree::CallTreeManager;
pub use class_layout::ClassLayoutManager;
pub use edge_lifter::EdgeLifter;
pub use edge_manager::EdgeManager;
pub use manager::{ClassvizManager, ClassvizOptions};
pub use model::{
    ClassvizSnapshot, DiagramEdge, DiagramEdgeKind, DiagramNode, DiagramNodeKind, DiagramNodes,
    LiftedEdge, MethodEntry, Rect, Vec2,
};
pub use node_factory::{NodeFactory, Placement};
pub use node_styler::NodeStyler;
pub use style::{Color, generate_color_spectrum};
pub use thread_manager::ThreadManager;
