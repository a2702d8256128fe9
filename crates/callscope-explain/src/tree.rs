//! Derived trees: selected subtrees, recursive compression, key-node trees
//! and regions.

use callscope_core::{CallNode, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn one() -> u32 {
    1
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Owned copy of a call-tree node as the explainer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceNode {
    pub id: NodeId,
    pub label: String,
    pub class_name: String,
    pub method_name: String,
    pub status: NodeStatus,
    pub time: f64,
    pub self_time: f64,
    /// Number of structurally identical branches this node stands for.
    #[serde(default = "one")]
    pub freq: u32,
    /// Terminal call of a compressed recursion.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_exit: bool,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Copy one call-tree node without its children.
    pub fn leaf(node: &CallNode) -> Self {
        Self {
            id: node.id,
            label: node.label.clone(),
            class_name: node.class_name.clone(),
            method_name: node.method_name.clone(),
            status: node.status,
            time: node.time,
            self_time: node.self_time,
            freq: 1,
            is_exit: false,
            children: Vec::new(),
        }
    }

    pub fn find(&self, id: NodeId) -> Option<&TraceNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.id == id {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.find(id).is_some()
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TraceNode::node_count).sum::<usize>()
    }

    /// Label, exit marker and the sorted signatures of every child. A child
    /// signature carries its `freq`; the node's own `freq` is left out so
    /// twins with different counts still merge.
    pub fn structural_signature(&self) -> String {
        let mut child_signatures: Vec<String> = self
            .children
            .iter()
            .map(|child| format!("{}*{}", child.freq, child.structural_signature()))
            .collect();
        child_signatures.sort();
        let exit = if self.is_exit { "!" } else { "" };
        format!("{}{exit}({})", self.label, child_signatures.join(","))
    }

    fn has_label_below(&self, label: &str) -> bool {
        self.children
            .iter()
            .any(|child| child.label == label || child.has_label_below(label))
    }
}

/// Skeleton of the special nodes of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KntNode {
    pub id: NodeId,
    pub label: String,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief_summary: Option<String>,
    pub children: Vec<KntNode>,
}

impl KntNode {
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids = vec![self.id];
        for child in &self.children {
            ids.extend(child.ids());
        }
        ids
    }
}

/// Selected nodes none of whose ancestors is selected, in preorder.
pub fn find_selected_roots(tree: &CallNode) -> Vec<NodeId> {
    let mut roots = Vec::new();
    let mut stack: Vec<(&CallNode, bool)> = vec![(tree, false)];
    while let Some((node, ancestor_selected)) = stack.pop() {
        if node.selected && !ancestor_selected {
            roots.push(node.id);
        }
        let below_selected = ancestor_selected || node.selected;
        for child in node.children.iter().rev() {
            stack.push((child, below_selected));
        }
    }
    roots
}

/// Copy `root` keeping only selected nodes reachable through selected
/// parents. A selected node under an unselected child is dropped.
pub fn build_selected_subtree(root: &CallNode) -> Option<TraceNode> {
    if !root.selected {
        return None;
    }
    let mut copy = TraceNode::leaf(root);
    copy.children = root
        .children
        .iter()
        .filter_map(build_selected_subtree)
        .collect();
    Some(copy)
}

/// Compress every recursion in `tree`, outermost entry points first.
pub fn compress_recursive_calls(tree: TraceNode) -> TraceNode {
    if tree.status.recursive_entry_point {
        return compress_recursive_node(tree);
    }
    let mut tree = tree;
    tree.children = tree
        .children
        .into_iter()
        .map(compress_recursive_calls)
        .collect();
    tree
}

/// Collapse the recursion rooted at `entry`.
///
/// Same-label calls below the entry are walked through. The deepest ones,
/// with no same-label call beneath them, are kept whole and marked
/// `is_exit`. Every other branch met on the way is compressed itself and
/// then merged with its structural twins: the lowest id represents the
/// group and `freq` carries the sum.
pub fn compress_recursive_node(entry: TraceNode) -> TraceNode {
    let label = entry.label.clone();
    let mut exits: Vec<TraceNode> = Vec::new();
    let mut branches: Vec<TraceNode> = Vec::new();

    let mut entry = entry;
    let mut pending: Vec<TraceNode> = std::mem::take(&mut entry.children);
    while let Some(node) = pending.pop() {
        if node.label != label {
            branches.push(compress_recursive_calls(node));
        } else if node.has_label_below(&label) {
            pending.extend(node.children);
        } else {
            let mut exit = node;
            exit.is_exit = true;
            exits.push(exit);
        }
    }

    let mut merged: BTreeMap<String, TraceNode> = BTreeMap::new();
    for branch in branches {
        let signature = branch.structural_signature();
        match merged.get_mut(&signature) {
            Some(existing) => {
                let freq = existing.freq + branch.freq;
                if branch.id < existing.id {
                    *existing = branch;
                }
                existing.freq = freq;
            }
            None => {
                merged.insert(signature, branch);
            }
        }
    }

    let mut children: Vec<TraceNode> = merged.into_values().chain(exits).collect();
    children.sort_by_key(|child| child.id);
    tracing::debug!(
        entry = %entry.id,
        label = %label,
        children = children.len(),
        "Recursion compressed"
    );
    entry.children = children;
    entry
}

/// Root plus every special node, each hung under its nearest special
/// ancestor.
pub fn build_knt(tree: &TraceNode) -> KntNode {
    KntNode {
        id: tree.id,
        label: tree.label.clone(),
        status: tree.status,
        brief_summary: None,
        children: special_descendants(tree),
    }
}

fn special_descendants(node: &TraceNode) -> Vec<KntNode> {
    let mut found = Vec::new();
    for child in &node.children {
        if child.status.is_special() {
            found.push(build_knt(child));
        } else {
            found.extend(special_descendants(child));
        }
    }
    found
}

/// Region roots of `tree`: the root, then every special node in preorder.
pub fn identify_regions(tree: &TraceNode) -> Vec<NodeId> {
    let mut regions = vec![tree.id];
    let mut stack: Vec<&TraceNode> = tree.children.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.status.is_special() {
            regions.push(node.id);
        }
        stack.extend(node.children.iter().rev());
    }
    regions
}

/// The region rooted at `region_id`: its subtree cut at the next special
/// descendants, which stay in as childless stubs.
pub fn extract_region(tree: &TraceNode, region_id: NodeId) -> Option<TraceNode> {
    let root = tree.find(region_id)?;
    let mut region = root.clone();
    region.children = root.children.iter().map(cut_at_special).collect();
    Some(region)
}

fn cut_at_special(node: &TraceNode) -> TraceNode {
    let mut copy = node.clone();
    copy.children = if node.status.is_special() {
        Vec::new()
    } else {
        node.children.iter().map(cut_at_special).collect()
    };
    copy
}

/// Copy of `knt` with each node's region summary attached.
pub fn augment_knt_with_region_summaries(
    knt: &KntNode,
    summaries: &HashMap<NodeId, String>,
) -> KntNode {
    KntNode {
        id: knt.id,
        label: knt.label.clone(),
        status: knt.status,
        brief_summary: summaries.get(&knt.id).cloned(),
        children: knt
            .children
            .iter()
            .map(|child| augment_knt_with_region_summaries(child, summaries))
            .collect(),
    }
}
