use callscope_core::{CallNode, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Flat copy of a call-tree node without its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub label: String,
    pub class_name: String,
    pub method_name: String,
    pub package_name: String,
    pub color: String,
    pub time: f64,
    pub self_time: f64,
    pub status: NodeStatus,
    pub depth: usize,
}

impl NodeData {
    fn from_node(node: &CallNode, parent_id: Option<NodeId>, depth: usize) -> Self {
        Self {
            id: node.id,
            parent_id,
            label: node.label.clone(),
            class_name: node.class_name.clone(),
            method_name: node.method_name.clone(),
            package_name: node.package_name.clone(),
            color: node.color.clone(),
            time: node.time,
            self_time: node.self_time,
            status: node.status,
            depth,
        }
    }
}

/// Mutable UI state of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub selected: bool,
    pub expanded: bool,
    pub highlight: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub count: usize,
    pub color: String,
}

/// Derived lookup tables for the active thread. Rebuilt from scratch on every
/// thread switch; mutated only through selection, expansion and highlight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadIndex {
    pub root: Option<NodeId>,
    pub nodes: HashMap<NodeId, NodeData>,
    pub state: HashMap<NodeId, NodeState>,
    pub parents: HashMap<NodeId, NodeId>,
    pub children: HashMap<NodeId, Vec<NodeId>>,
    pub selected: BTreeSet<NodeId>,
    pub package_info: BTreeMap<String, PackageInfo>,
    pub package_ids: BTreeMap<String, Vec<NodeId>>,
    pub package_selected_ids: BTreeMap<String, BTreeSet<NodeId>>,
    /// Child-index path from the root, used to write state back onto the tree.
    pub(crate) locator: HashMap<NodeId, Vec<usize>>,
}

impl ThreadIndex {
    /// Depth-first build from `root`, children in call order.
    pub fn build(root: &CallNode) -> Self {
        let mut index = ThreadIndex {
            root: Some(root.id),
            ..Default::default()
        };

        let mut stack: Vec<(&CallNode, Option<NodeId>, usize, Vec<usize>)> =
            vec![(root, None, 0, Vec::new())];
        while let Some((node, parent_id, depth, path)) = stack.pop() {
            if index.nodes.contains_key(&node.id) {
                tracing::warn!(node_id = %node.id, "Duplicate node id inside one thread; keeping the first");
                continue;
            }

            index
                .nodes
                .insert(node.id, NodeData::from_node(node, parent_id, depth));
            index.state.insert(
                node.id,
                NodeState {
                    selected: node.selected,
                    expanded: !node.collapsed,
                    highlight: false,
                },
            );
            if let Some(parent_id) = parent_id {
                index.parents.insert(node.id, parent_id);
            }
            index.children.insert(
                node.id,
                node.children.iter().map(|child| child.id).collect(),
            );

            let package = node.package_name.clone();
            let info = index
                .package_info
                .entry(package.clone())
                .or_insert_with(|| PackageInfo {
                    name: package.clone(),
                    count: 0,
                    color: node.color.clone(),
                });
            info.count += 1;
            index
                .package_ids
                .entry(package.clone())
                .or_default()
                .push(node.id);
            let selected_ids = index.package_selected_ids.entry(package).or_default();
            if node.selected {
                selected_ids.insert(node.id);
                index.selected.insert(node.id);
            }

            for (position, child) in node.children.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(position);
                stack.push((child, Some(node.id), depth + 1, child_path));
            }
            index.locator.insert(node.id, path);
        }

        index
    }

    /// Node ids of the subtree rooted at `id` in pre-order, `id` first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(children) = self.children.get(&current) {
                stack.extend(children.iter().rev().copied());
            }
        }
        out
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(&parent) = self.parents.get(&current) {
            if out.contains(&parent) {
                tracing::warn!(node_id = %id, "Cyclic parent chain in thread index");
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Describe every broken invariant; empty when consistent.
    pub fn verify(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let from_state: BTreeSet<NodeId> = self
            .state
            .iter()
            .filter(|(_, state)| state.selected)
            .map(|(&id, _)| id)
            .collect();
        if from_state != self.selected {
            problems.push(format!(
                "selected set {:?} differs from state {:?}",
                self.selected, from_state
            ));
        }

        for (package, ids) in &self.package_ids {
            let expected: BTreeSet<NodeId> = ids
                .iter()
                .copied()
                .filter(|id| self.selected.contains(id))
                .collect();
            let actual = self
                .package_selected_ids
                .get(package)
                .cloned()
                .unwrap_or_default();
            if expected != actual {
                problems.push(format!(
                    "package {package}: selected ids {actual:?}, expected {expected:?}"
                ));
            }
            if self.package_info.get(package).map(|info| info.count) != Some(ids.len()) {
                problems.push(format!("package {package}: count mismatch"));
            }
        }

        for (&child, &parent) in &self.parents {
            let listed = self
                .children
                .get(&parent)
                .is_some_and(|children| children.contains(&child));
            if !listed {
                problems.push(format!("{child} claims parent {parent} which does not list it"));
            }
        }

        problems
    }
}

pub(crate) fn node_at_path_mut<'a>(root: &'a mut CallNode, path: &[usize]) -> Option<&'a mut CallNode> {
    let mut current = root;
    for &position in path {
        current = current.children.get_mut(position)?;
    }
    Some(current)
}
