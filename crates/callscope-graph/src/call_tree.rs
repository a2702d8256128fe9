use crate::edge_manager::{EdgeManager, call_edge};
use crate::model::{DiagramEdge, DiagramEdgeKind, MethodEntry};
use crate::style::generate_color_spectrum;
use callscope_core::{CallNode, NodeId};
use std::collections::{HashMap, HashSet};

/// Builds and repairs call-tree mode edges.
#[derive(Debug, Default)]
pub struct CallTreeManager;

impl CallTreeManager {
    /// Depth-first walk from `root`, linking every rendered node to its
    /// nearest rendered ancestor. Unrendered nodes in between are skipped.
    ///
    /// With `numbered`, each edge is labelled with its DFS rank and colored
    /// by the depth of its target within the rendered tree.
    pub fn traverse_tree_and_create_edges(
        &self,
        root: &CallNode,
        rendered: &HashSet<NodeId>,
        numbered: bool,
    ) -> Vec<DiagramEdge> {
        let mut edges: Vec<(DiagramEdge, usize)> = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<(&CallNode, Option<MethodEntry>, usize)> = vec![(root, None, 0)];

        while let Some((node, last_selected, depth)) = stack.pop() {
            if !visited.insert(node.id) {
                tracing::warn!(node_id = %node.id, "Node reached twice during edge traversal");
                continue;
            }

            let (carry, child_depth) = if rendered.contains(&node.id) {
                let current = MethodEntry {
                    original_id: node.id,
                    label: node.label.clone(),
                };
                if let Some(parent) = &last_selected {
                    edges.push((call_edge(parent, &current), depth));
                }
                (Some(current), depth + 1)
            } else {
                (last_selected, depth)
            };

            for child in node.children.iter().rev() {
                stack.push((child, carry.clone(), child_depth));
            }
        }

        if !numbered {
            return edges.into_iter().map(|(edge, _)| edge).collect();
        }

        let max_depth = edges.iter().map(|(_, depth)| *depth).max().unwrap_or(0);
        let spectrum = generate_color_spectrum(max_depth);
        edges
            .into_iter()
            .enumerate()
            .map(|(rank, (mut edge, depth))| {
                if let Some(color) = spectrum.get(depth.saturating_sub(1)) {
                    edge.color = color.to_hex();
                }
                edge.label = Some((rank + 1).to_string());
                edge
            })
            .collect()
    }

    /// Nearest proper ancestor of `id` accepted by `is_rendered`.
    ///
    /// `visited` guards against parent chains that loop back on themselves.
    pub fn nearest_rendered_ancestor(
        &self,
        id: NodeId,
        parent_of: &dyn Fn(NodeId) -> Option<NodeId>,
        is_rendered: &dyn Fn(NodeId) -> bool,
        visited: &mut HashSet<NodeId>,
    ) -> Option<NodeId> {
        let mut current = id;
        visited.insert(current);
        while let Some(parent) = parent_of(current) {
            if !visited.insert(parent) {
                tracing::warn!(node_id = %id, parent = %parent, "Cycle in parent chain");
                return None;
            }
            if is_rendered(parent) {
                return Some(parent);
            }
            current = parent;
        }
        None
    }

    /// Splice a newly rendered node into the existing call-tree edges of its
    /// thread. `entries` already contains `inserted`.
    ///
    /// Rendered descendants that were hanging off the new node's nearest
    /// ancestor are re-parented onto the new node.
    pub fn insert_node_edges(
        &self,
        edges: &mut EdgeManager,
        inserted: &MethodEntry,
        entries: &[MethodEntry],
        parent_of: &dyn Fn(NodeId) -> Option<NodeId>,
    ) -> usize {
        let by_id: HashMap<NodeId, &MethodEntry> = entries
            .iter()
            .map(|entry| (entry.original_id, entry))
            .collect();
        let is_rendered = |id: NodeId| by_id.contains_key(&id);
        let mut created = 0;

        for entry in entries {
            if entry.original_id == inserted.original_id {
                continue;
            }
            let nearest = self.nearest_rendered_ancestor(
                entry.original_id,
                parent_of,
                &is_rendered,
                &mut HashSet::new(),
            );
            if nearest != Some(inserted.original_id) {
                continue;
            }
            for edge_id in edges.target_edges(entry.original_id) {
                if edges
                    .get(&edge_id)
                    .is_some_and(|edge| edge.kind == DiagramEdgeKind::CallTree)
                {
                    edges.remove_edge(&edge_id);
                }
            }
            if edges.add_edge(call_edge(inserted, entry)) {
                created += 1;
            }
        }

        let parent = self.nearest_rendered_ancestor(
            inserted.original_id,
            parent_of,
            &is_rendered,
            &mut HashSet::new(),
        );
        if let Some(parent) = parent.and_then(|id| by_id.get(&id))
            && edges.add_edge(call_edge(parent, inserted))
        {
            created += 1;
        }
        created
    }

    /// Remove every call-tree edge of `id` and connect its parent directly
    /// to each of its children. Returns the number of reconnecting edges.
    pub fn reconnect_parent_to_children(&self, edges: &mut EdgeManager, id: NodeId) -> usize {
        let parent_edges: Vec<DiagramEdge> = edges
            .target_edges(id)
            .into_iter()
            .filter_map(|edge_id| edges.remove_edge(&edge_id))
            .collect();
        let child_edges: Vec<DiagramEdge> = edges
            .source_edges(id)
            .into_iter()
            .filter_map(|edge_id| edges.remove_edge(&edge_id))
            .collect();

        if parent_edges.len() > 1 {
            tracing::warn!(
                node_id = %id,
                parents = parent_edges.len(),
                "Method node has several parent edges; using the first"
            );
        }
        let Some(parent_edge) = parent_edges.first() else {
            return 0;
        };
        let parent = MethodEntry {
            original_id: parent_edge.source,
            label: parent_edge.source_node.clone(),
        };

        child_edges
            .iter()
            .filter(|child_edge| {
                let child = MethodEntry {
                    original_id: child_edge.target,
                    label: child_edge.target_node.clone(),
                };
                edges.add_edge(call_edge(&parent, &child))
            })
            .count()
    }
}
