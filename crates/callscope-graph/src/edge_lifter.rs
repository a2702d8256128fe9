use crate::edge_manager::EdgeManager;
use crate::model::{DiagramNodes, LiftedEdge};
use crate::style::{COLOR_EDGE_LIFTED, lifted_edge_label, lifted_edge_width};
use std::collections::BTreeMap;

/// Replaces method edges that cross class boundaries with one counted
/// class-to-class edge per parent pair.
#[derive(Debug, Default)]
pub struct EdgeLifter {
    lifted_edges: BTreeMap<String, LiftedEdge>,
}

impl EdgeLifter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lift every current method edge whose endpoints sit in different
    /// parents. Edges inside one class, or between two parentless nodes,
    /// stay as they are. Returns the number of method edges lifted.
    pub fn lift_edges(&mut self, nodes: &DiagramNodes, edges: &mut EdgeManager) -> usize {
        let candidates: Vec<(String, String, String)> = edges
            .edges()
            .filter_map(|edge| {
                let source = nodes.inserted_nodes.get(&edge.source_node);
                let target = nodes.inserted_nodes.get(&edge.target_node);
                let (Some(source), Some(target)) = (source, target) else {
                    tracing::warn!(edge_id = %edge.id, "Edge endpoint has no diagram node; not lifted");
                    return None;
                };
                if source.parent == target.parent {
                    return None;
                }
                let lifted_source = source.parent.clone().unwrap_or_else(|| source.id.clone());
                let lifted_target = target.parent.clone().unwrap_or_else(|| target.id.clone());
                Some((edge.id.clone(), lifted_source, lifted_target))
            })
            .collect();

        let mut lifted = 0;
        for (edge_id, source_node, target_node) in candidates {
            if edges.remove_edge(&edge_id).is_none() {
                continue;
            }
            let id = LiftedEdge::edge_id(&source_node, &target_node);
            let entry = self
                .lifted_edges
                .entry(id.clone())
                .or_insert_with(|| LiftedEdge {
                    id,
                    source_node,
                    target_node,
                    count: 0,
                    width: 0.0,
                    label: String::new(),
                    color: COLOR_EDGE_LIFTED.to_hex(),
                });
            entry.count += 1;
            entry.width = lifted_edge_width(entry.count);
            entry.label = lifted_edge_label(entry.count);
            lifted += 1;
        }

        if lifted > 0 {
            tracing::debug!(lifted, class_edges = self.lifted_edges.len(), "Edges lifted");
        }
        lifted
    }

    pub fn lifted_edges(&self) -> impl Iterator<Item = &LiftedEdge> {
        self.lifted_edges.values()
    }

    pub fn get(&self, id: &str) -> Option<&LiftedEdge> {
        self.lifted_edges.get(id)
    }

    pub fn clear(&mut self) {
        self.lifted_edges.clear();
    }
}
