use crate::model::{DiagramEdge, DiagramEdgeKind, MethodEntry};
use crate::style::{COLOR_EDGE_CALL, COLOR_EDGE_SEQUENTIAL, Color, EDGE_WIDTH_DEFAULT, generate_color_spectrum};
use callscope_core::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Method-level edges and their per-original-id indices.
///
/// Every edge in `inserted_edges` is listed under its source in
/// `original_id_to_source_edges` and under its target in
/// `original_id_to_target_edges`, and nowhere else.
#[derive(Debug, Default)]
pub struct EdgeManager {
    inserted_edges: BTreeMap<String, DiagramEdge>,
    original_id_to_source_edges: HashMap<NodeId, BTreeSet<String>>,
    original_id_to_target_edges: HashMap<NodeId, BTreeSet<String>>,
}

impl EdgeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `edge`; a colliding id is logged and the edge dropped.
    pub fn add_edge(&mut self, edge: DiagramEdge) -> bool {
        if self.inserted_edges.contains_key(&edge.id) {
            tracing::warn!(edge_id = %edge.id, "Duplicate edge id; edge skipped");
            return false;
        }
        self.original_id_to_source_edges
            .entry(edge.source)
            .or_default()
            .insert(edge.id.clone());
        self.original_id_to_target_edges
            .entry(edge.target)
            .or_default()
            .insert(edge.id.clone());
        self.inserted_edges.insert(edge.id.clone(), edge);
        true
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Option<DiagramEdge> {
        let edge = self.inserted_edges.remove(edge_id)?;
        Self::unlink(&mut self.original_id_to_source_edges, edge.source, edge_id);
        Self::unlink(&mut self.original_id_to_target_edges, edge.target, edge_id);
        Some(edge)
    }

    fn unlink(map: &mut HashMap<NodeId, BTreeSet<String>>, id: NodeId, edge_id: &str) {
        if let Some(set) = map.get_mut(&id) {
            set.remove(edge_id);
            if set.is_empty() {
                map.remove(&id);
            }
        }
    }

    /// Edge ids leaving the original node.
    pub fn source_edges(&self, id: NodeId) -> Vec<String> {
        self.original_id_to_source_edges
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Edge ids entering the original node.
    pub fn target_edges(&self, id: NodeId) -> Vec<String> {
        self.original_id_to_target_edges
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, edge_id: &str) -> Option<&DiagramEdge> {
        self.inserted_edges.get(edge_id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &DiagramEdge> {
        self.inserted_edges.values()
    }

    pub fn len(&self) -> usize {
        self.inserted_edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserted_edges.is_empty()
    }

    /// Remove every edge touching the original node.
    pub fn remove_edges_of(&mut self, id: NodeId) -> Vec<DiagramEdge> {
        let mut ids = self.source_edges(id);
        ids.extend(self.target_edges(id));
        ids.into_iter()
            .filter_map(|edge_id| self.remove_edge(&edge_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.inserted_edges.clear();
        self.original_id_to_source_edges.clear();
        self.original_id_to_target_edges.clear();
    }

    /// Connect consecutive entries of one thread's trace order.
    pub fn create_sequential_edges(&mut self, entries: &[MethodEntry]) -> usize {
        entries
            .windows(2)
            .filter(|pair| {
                self.add_edge(new_edge(
                    DiagramEdgeKind::Sequential,
                    &pair[0],
                    &pair[1],
                    COLOR_EDGE_SEQUENTIAL,
                    None,
                ))
            })
            .count()
    }

    /// As [`Self::create_sequential_edges`], with edge `i` colored from an
    /// `n - 1` hue spectrum and labelled with its 1-based position.
    pub fn create_numbered_sequential_edges(&mut self, entries: &[MethodEntry]) -> usize {
        let spectrum = generate_color_spectrum(entries.len().saturating_sub(1));
        entries
            .windows(2)
            .zip(spectrum)
            .enumerate()
            .filter(|(position, (pair, color))| {
                self.add_edge(new_edge(
                    DiagramEdgeKind::Sequential,
                    &pair[0],
                    &pair[1],
                    *color,
                    Some((position + 1).to_string()),
                ))
            })
            .count()
    }

    /// Describe every asymmetry between the edge table and its indices.
    pub fn check_edge_maps(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (edge_id, edge) in &self.inserted_edges {
            let sources = self.listing_count(&self.original_id_to_source_edges, edge_id);
            let targets = self.listing_count(&self.original_id_to_target_edges, edge_id);
            if sources != 1 || targets != 1 {
                problems.push(format!(
                    "edge {edge_id} listed {sources} times as source, {targets} times as target"
                ));
            }
            let under_source = self
                .original_id_to_source_edges
                .get(&edge.source)
                .is_some_and(|set| set.contains(edge_id));
            let under_target = self
                .original_id_to_target_edges
                .get(&edge.target)
                .is_some_and(|set| set.contains(edge_id));
            if !under_source || !under_target {
                problems.push(format!("edge {edge_id} filed under the wrong node"));
            }
        }
        for map in [
            &self.original_id_to_source_edges,
            &self.original_id_to_target_edges,
        ] {
            for (id, set) in map {
                for edge_id in set {
                    if !self.inserted_edges.contains_key(edge_id) {
                        problems.push(format!("node {id} references missing edge {edge_id}"));
                    }
                }
            }
        }
        problems
    }

    fn listing_count(&self, map: &HashMap<NodeId, BTreeSet<String>>, edge_id: &str) -> usize {
        map.values().filter(|set| set.contains(edge_id)).count()
    }
}

pub(crate) fn new_edge(
    kind: DiagramEdgeKind,
    source: &MethodEntry,
    target: &MethodEntry,
    color: Color,
    label: Option<String>,
) -> DiagramEdge {
    DiagramEdge {
        id: DiagramEdge::edge_id(kind, source.original_id, target.original_id),
        kind,
        source: source.original_id,
        target: target.original_id,
        source_node: source.label.clone(),
        target_node: target.label.clone(),
        color: color.to_hex(),
        width: EDGE_WIDTH_DEFAULT,
        label,
    }
}

pub(crate) fn call_edge(source: &MethodEntry, target: &MethodEntry) -> DiagramEdge {
    new_edge(DiagramEdgeKind::CallTree, source, target, COLOR_EDGE_CALL, None)
}
