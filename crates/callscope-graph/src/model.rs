use callscope_core::{NodeId, StatusPattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A rectangle defined by min and max corners
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self {
            min: pos,
            max: Vec2::new(pos.x + size.x, pos.y + size.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// True when `other` lies entirely inside `self`.
    pub fn encloses(&self, other: &Rect) -> bool {
        other.min.x >= self.min.x
            && other.min.y >= self.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagramNodeKind {
    /// Container for the methods of one class.
    Class,
    /// A method drawn inside its class container.
    Method,
    /// An allow-listed library method drawn standalone.
    Library,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    /// Method label for methods, `class:<name>` for containers.
    pub id: String,
    pub kind: DiagramNodeKind,
    pub label: String,
    /// Containing class node, `None` for classes and library methods.
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub color: String,
    /// Color to return to after playback recoloring.
    pub original_color: String,
    pub pattern: Option<StatusPattern>,
    pub focused: bool,
    pub position: Vec2,
    pub size: Vec2,
}

impl DiagramNode {
    pub fn bounds(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagramEdgeKind {
    CallTree,
    Sequential,
    Lifted,
}

impl DiagramEdgeKind {
    fn prefix(self) -> &'static str {
        match self {
            DiagramEdgeKind::CallTree => "ct",
            DiagramEdgeKind::Sequential => "seq",
            DiagramEdgeKind::Lifted => "lift",
        }
    }
}

/// An edge between two call-tree nodes, drawn between their diagram nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub id: String,
    pub kind: DiagramEdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    pub source_node: String,
    pub target_node: String,
    pub color: String,
    pub width: f32,
    pub label: Option<String>,
}

impl DiagramEdge {
    pub fn edge_id(kind: DiagramEdgeKind, source: NodeId, target: NodeId) -> String {
        format!("{}:{}->{}", kind.prefix(), source, target)
    }
}

/// Class-to-class edge standing in for every removed method edge between
/// the same pair of parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiftedEdge {
    pub id: String,
    pub source_node: String,
    pub target_node: String,
    pub count: usize,
    pub width: f32,
    pub label: String,
    pub color: String,
}

impl LiftedEdge {
    pub fn edge_id(source_node: &str, target_node: &str) -> String {
        format!("lift:{source_node}->{target_node}")
    }
}

/// One selected call-tree node registered in a thread's trace order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub original_id: NodeId,
    pub label: String,
}

/// Node half of the diagram. Label is the dedup key for method nodes.
#[derive(Debug, Clone, Default)]
pub struct DiagramNodes {
    pub inserted_nodes: BTreeMap<String, DiagramNode>,
    pub class_nodes: BTreeMap<String, DiagramNode>,
    pub method_label_to_original_ids: BTreeMap<String, BTreeSet<NodeId>>,
}

impl DiagramNodes {
    pub fn get(&self, id: &str) -> Option<&DiagramNode> {
        self.inserted_nodes
            .get(id)
            .or_else(|| self.class_nodes.get(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DiagramNode> {
        if self.inserted_nodes.contains_key(id) {
            self.inserted_nodes.get_mut(id)
        } else {
            self.class_nodes.get_mut(id)
        }
    }

    /// The node an edge endpoint is lifted to: its class, or itself when
    /// it has no parent.
    pub fn lift_target<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        let node = self.inserted_nodes.get(id)?;
        Some(node.parent.as_deref().unwrap_or(id))
    }

    pub fn clear(&mut self) {
        self.inserted_nodes.clear();
        self.class_nodes.clear();
        self.method_label_to_original_ids.clear();
    }
}

/// Serializable view of the whole diagram for renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassvizSnapshot {
    pub classes: Vec<DiagramNode>,
    pub methods: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
    pub lifted_edges: Vec<LiftedEdge>,
    pub trace_mode: bool,
    pub numbered_edges: bool,
    pub edges_lifted: bool,
}

impl ClassvizSnapshot {
    pub fn method(&self, label: &str) -> Option<&DiagramNode> {
        self.methods.iter().find(|node| node.id == label)
    }
}
