use crate::call_tree::CallTreeManager;
use crate::class_layout::ClassLayoutManager;
use crate::edge_lifter::EdgeLifter;
use crate::edge_manager::EdgeManager;
use crate::model::{ClassvizSnapshot, DiagramNode, DiagramNodes, LiftedEdge, MethodEntry};
use crate::node_factory::{NodeFactory, Placement};
use crate::node_styler::NodeStyler;
use crate::style::Color;
use crate::thread_manager::ThreadManager;
use callscope_core::NodeId;
use callscope_events::{Event, EventKind, EventListener};
use callscope_store::DataStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

/// Diagram construction switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassvizOptions {
    /// Sequential (execution order) edges instead of call-tree edges.
    pub trace_mode: bool,
    pub numbered_edges: bool,
    pub lift_edges: bool,
    /// Labels starting with one of these become standalone nodes.
    pub library_method_prefixes: Vec<String>,
}

impl Default for ClassvizOptions {
    fn default() -> Self {
        Self {
            trace_mode: false,
            numbered_edges: false,
            lift_edges: false,
            library_method_prefixes: vec![
                "java.".to_string(),
                "javax.".to_string(),
                "jdk.".to_string(),
            ],
        }
    }
}

/// Projects the selection of every thread onto a class diagram.
///
/// One method node exists per distinct label; it stays while any selected
/// call-tree node with that label remains inserted. Membership changes are
/// followed by `RefreshRegionFocus { stop_step_by_step_mode: false }`.
pub struct ClassvizManager {
    store: Rc<DataStore>,
    options: ClassvizOptions,
    nodes: DiagramNodes,
    edges: EdgeManager,
    threads: ThreadManager,
    factory: NodeFactory,
    styler: NodeStyler,
    layout: ClassLayoutManager,
    call_tree: CallTreeManager,
    lifter: EdgeLifter,
}

impl ClassvizManager {
    pub const LISTENED_KINDS: [EventKind; 4] = [
        EventKind::ChangeSingleMethodByIdToClassviz,
        EventKind::ChangeMultiMethodByIdsToClassviz,
        EventKind::SwitchTraceMode,
        EventKind::ChangeCurrentFocusedNode,
    ];

    /// Build the manager and insert every node already selected in the
    /// loaded trees.
    pub fn new(store: Rc<DataStore>, options: ClassvizOptions) -> Self {
        let mut threads = ThreadManager::new();
        threads.assign_focus_colors(&store.id_ranges());

        let mut manager = Self {
            factory: NodeFactory::new(options.library_method_prefixes.clone()),
            store,
            options,
            nodes: DiagramNodes::default(),
            edges: EdgeManager::new(),
            threads,
            styler: NodeStyler::new(),
            layout: ClassLayoutManager,
            call_tree: CallTreeManager,
            lifter: EdgeLifter::new(),
        };

        let preselected: Vec<NodeId> = manager
            .store
            .thread_names()
            .iter()
            .filter_map(|thread| {
                manager.store.with_thread_tree(thread, |root| {
                    root.walk()
                        .filter(|node| node.selected)
                        .map(|node| node.id)
                        .collect::<Vec<_>>()
                })
            })
            .flatten()
            .collect();
        if !preselected.is_empty() {
            manager.insert_multiple_methods_by_ids(&preselected);
        }
        manager
    }

    pub fn options(&self) -> &ClassvizOptions {
        &self.options
    }

    fn incremental(&self) -> bool {
        !self.options.trace_mode
            && !self.options.numbered_edges
            && !self.options.lift_edges
            && self.lifter.lifted_edges().next().is_none()
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Insert the diagram node for one call-tree node. Returns false when the
    /// id is unknown, already inserted, or its class cannot be resolved.
    pub fn insert_single_method_by_id(&mut self, id: NodeId) -> bool {
        let Some(entry) = self.register_node(id) else {
            return false;
        };
        if self.incremental() {
            self.splice_edges(&entry.0, &entry.1);
        } else {
            self.regenerate_edges();
        }
        true
    }

    /// Insert many nodes, then rebuild the edges once. Returns the ids that
    /// were actually inserted.
    pub fn insert_multiple_methods_by_ids(&mut self, ids: &[NodeId]) -> Vec<NodeId> {
        let registered: Vec<(String, MethodEntry)> =
            ids.iter().filter_map(|&id| self.register_node(id)).collect();
        if registered.is_empty() {
            return Vec::new();
        }
        self.regenerate_edges();
        registered
            .into_iter()
            .map(|(_, entry)| entry.original_id)
            .collect()
    }

    fn register_node(&mut self, id: NodeId) -> Option<(String, MethodEntry)> {
        let Some(info) = self.store.global_entry(id) else {
            tracing::warn!(node_id = %id, "insert: no label for node id");
            return None;
        };
        if !self.threads.register(&info.thread, id, &info.label) {
            return None;
        }

        let ids = self
            .nodes
            .method_label_to_original_ids
            .entry(info.label.clone())
            .or_default();
        ids.insert(id);
        let first_reference = ids.len() == 1;

        if first_reference {
            let placement = self.factory.create_method_node(
                &mut self.nodes,
                &info.label,
                &info.color,
                info.status,
            );
            match placement {
                Some(Placement::InClass(class_id)) => {
                    self.layout.resize_to_fit(&mut self.nodes, &class_id);
                }
                Some(Placement::Standalone) => {}
                None => {
                    self.nodes.method_label_to_original_ids.remove(&info.label);
                    self.threads.unregister(&info.thread, id);
                    return None;
                }
            }
            self.layout.arrange(&mut self.nodes);
        }

        tracing::debug!(node_id = %id, label = %info.label, first_reference, "Method inserted");
        Some((
            info.thread,
            MethodEntry {
                original_id: id,
                label: info.label,
            },
        ))
    }

    fn splice_edges(&mut self, thread: &str, entry: &MethodEntry) {
        let store = &self.store;
        let parent_of = |id: NodeId| store.parent_of(id);
        self.call_tree.insert_node_edges(
            &mut self.edges,
            entry,
            self.threads.entries(thread),
            &parent_of,
        );
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove one call-tree node. Its parent is reconnected to its children
    /// first; the diagram node goes away with its last reference.
    pub fn remove_single_method_by_id(&mut self, id: NodeId) -> bool {
        let incremental = self.incremental();
        if !self.unregister_node(id, incremental) {
            return false;
        }
        if !incremental {
            self.regenerate_edges();
        }
        true
    }

    pub fn remove_multiple_methods_by_ids(&mut self, ids: &[NodeId]) -> Vec<NodeId> {
        let incremental = self.incremental();
        let removed: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|&id| self.unregister_node(id, incremental))
            .collect();
        if !removed.is_empty() && !incremental {
            self.regenerate_edges();
        }
        removed
    }

    fn unregister_node(&mut self, id: NodeId, reconnect: bool) -> bool {
        let Some(thread) = self.store.thread_of(id) else {
            tracing::warn!(node_id = %id, "remove: unknown node id");
            return false;
        };
        if !self.threads.contains(&thread, id) {
            return false;
        }

        if reconnect {
            self.call_tree.reconnect_parent_to_children(&mut self.edges, id);
        } else {
            self.edges.remove_edges_of(id);
        }

        let Some(label) = self.threads.unregister(&thread, id) else {
            return false;
        };
        let now_empty = match self.nodes.method_label_to_original_ids.get_mut(&label) {
            Some(ids) => {
                ids.remove(&id);
                ids.is_empty()
            }
            None => {
                tracing::warn!(node_id = %id, label = %label, "remove: label had no references");
                true
            }
        };

        if now_empty {
            self.nodes.method_label_to_original_ids.remove(&label);
            if let Some(class_id) = self.factory.remove_method_node(&mut self.nodes, &label) {
                self.layout.resize_to_fit(&mut self.nodes, &class_id);
            }
            self.styler.forget_if_removed(&self.nodes);
            self.layout.arrange(&mut self.nodes);
        }
        tracing::debug!(node_id = %id, label = %label, node_removed = now_empty, "Method removed");
        true
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    /// Tear down every edge and rebuild it for the current mode.
    pub fn regenerate_edges(&mut self) {
        self.edges.clear();
        self.lifter.clear();

        let threads: Vec<String> = self.threads.threads().map(str::to_string).collect();
        for thread in &threads {
            let entries = self.threads.entries(thread);
            if self.options.trace_mode {
                if self.options.numbered_edges {
                    self.edges.create_numbered_sequential_edges(entries);
                } else {
                    self.edges.create_sequential_edges(entries);
                }
                continue;
            }

            let rendered: HashSet<NodeId> = entries.iter().map(|entry| entry.original_id).collect();
            let numbered = self.options.numbered_edges;
            let call_tree = &self.call_tree;
            let created = self.store.with_thread_tree(thread, |root| {
                call_tree.traverse_tree_and_create_edges(root, &rendered, numbered)
            });
            match created {
                Some(created) => {
                    for edge in created {
                        self.edges.add_edge(edge);
                    }
                }
                None => tracing::warn!(thread = %thread, "regenerate: thread tree missing"),
            }
        }

        if self.options.lift_edges {
            self.lifter.lift_edges(&self.nodes, &mut self.edges);
        }
        tracing::debug!(
            edges = self.edges.len(),
            trace_mode = self.options.trace_mode,
            numbered = self.options.numbered_edges,
            lifted = self.options.lift_edges,
            "Edges regenerated"
        );
    }

    pub fn switch_trace_mode(&mut self, trace_mode: bool) -> bool {
        if self.options.trace_mode == trace_mode {
            return false;
        }
        self.options.trace_mode = trace_mode;
        self.regenerate_edges();
        true
    }

    pub fn set_numbered_edges(&mut self, numbered: bool) -> bool {
        if self.options.numbered_edges == numbered {
            return false;
        }
        self.options.numbered_edges = numbered;
        self.regenerate_edges();
        true
    }

    /// Lifting applies to the current edges; unlifting rebuilds them.
    pub fn set_edge_lifting(&mut self, lift: bool) -> bool {
        if self.options.lift_edges == lift {
            return false;
        }
        if lift {
            self.lift_edges();
        } else {
            self.options.lift_edges = false;
            self.regenerate_edges();
        }
        true
    }

    /// Lift the current edges and keep lifting after later membership
    /// changes. Returns the number of method edges lifted by this call.
    pub fn lift_edges(&mut self) -> usize {
        self.options.lift_edges = true;
        self.lifter.lift_edges(&self.nodes, &mut self.edges)
    }

    pub fn set_library_method_prefixes(&mut self, prefixes: Vec<String>) {
        self.options.library_method_prefixes = prefixes.clone();
        self.factory.set_library_method_prefixes(prefixes);
    }

    // ------------------------------------------------------------------
    // Focus and playback coloring
    // ------------------------------------------------------------------

    /// Mark the diagram node of `id`, if it is inserted.
    pub fn focus_node(&mut self, id: NodeId) -> bool {
        let label = self
            .store
            .label_of(id)
            .filter(|label| self.nodes.inserted_nodes.contains_key(label));
        self.styler.set_focus(&mut self.nodes, label.as_deref())
    }

    pub fn focused_node(&self) -> Option<&str> {
        self.styler.focused()
    }

    pub fn thread_entries(&self, thread: &str) -> &[MethodEntry] {
        self.threads.entries(thread)
    }

    pub fn current_index(&self, thread: &str) -> Option<usize> {
        self.threads.current_index(thread)
    }

    pub fn max_index(&self, thread: &str) -> Option<usize> {
        self.threads.max_index(thread)
    }

    pub fn set_current_index(&mut self, thread: &str, index: usize) -> bool {
        self.threads.set_current_index(thread, index)
    }

    pub fn focus_color(&self, thread: &str) -> Color {
        self.threads.focus_color(thread)
    }

    /// Recolor `thread`'s nodes for its current cursor.
    pub fn color_step(&mut self, thread: &str) -> usize {
        let Some(index) = self.threads.current_index(thread) else {
            return 0;
        };
        let focus = self.threads.focus_color(thread);
        self.styler
            .color_step(&mut self.nodes, self.threads.entries(thread), index, focus)
    }

    pub fn restore_colors(&mut self) {
        self.styler.restore_colors(&mut self.nodes);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn inserted_node(&self, label: &str) -> Option<&DiagramNode> {
        self.nodes.inserted_nodes.get(label)
    }

    pub fn class_node(&self, class_id: &str) -> Option<&DiagramNode> {
        self.nodes.class_nodes.get(class_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.inserted_nodes.len()
    }

    pub fn original_ids_for(&self, label: &str) -> Vec<NodeId> {
        self.nodes
            .method_label_to_original_ids
            .get(label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn edges(&self) -> &EdgeManager {
        &self.edges
    }

    pub fn lifted_edges(&self) -> Vec<LiftedEdge> {
        self.lifter.lifted_edges().cloned().collect()
    }

    pub fn snapshot(&self) -> ClassvizSnapshot {
        ClassvizSnapshot {
            classes: self.nodes.class_nodes.values().cloned().collect(),
            methods: self.nodes.inserted_nodes.values().cloned().collect(),
            edges: self.edges.edges().cloned().collect(),
            lifted_edges: self.lifted_edges(),
            trace_mode: self.options.trace_mode,
            numbered_edges: self.options.numbered_edges,
            edges_lifted: self.options.lift_edges,
        }
    }

    /// Every broken diagram invariant; empty when consistent.
    pub fn check_edge_maps(&self) -> Vec<String> {
        let mut problems = self.edges.check_edge_maps();
        problems.extend(self.threads.verify());

        for (label, ids) in &self.nodes.method_label_to_original_ids {
            if ids.is_empty() {
                problems.push(format!("label {label} kept with no references"));
            }
            if !self.nodes.inserted_nodes.contains_key(label) {
                problems.push(format!("label {label} referenced but has no node"));
            }
        }
        for label in self.nodes.inserted_nodes.keys() {
            if !self.nodes.method_label_to_original_ids.contains_key(label) {
                problems.push(format!("node {label} has no references"));
            }
        }

        let registered: BTreeSet<NodeId> = self
            .threads
            .threads()
            .flat_map(|thread| self.threads.entries(thread).iter().map(|e| e.original_id))
            .collect();
        let referenced: BTreeSet<NodeId> = self
            .nodes
            .method_label_to_original_ids
            .values()
            .flatten()
            .copied()
            .collect();
        if registered != referenced {
            problems.push(format!(
                "thread entries {registered:?} differ from label references {referenced:?}"
            ));
        }
        for edge in self.edges.edges() {
            if !registered.contains(&edge.source) || !registered.contains(&edge.target) {
                problems.push(format!("edge {} dangles", edge.id));
            }
        }
        let live = |id: &str| {
            self.nodes.class_nodes.contains_key(id) || self.nodes.inserted_nodes.contains_key(id)
        };
        for edge in self.lifter.lifted_edges() {
            if !live(&edge.source_node) || !live(&edge.target_node) {
                problems.push(format!("lifted edge {} dangles", edge.id));
            }
        }
        problems
    }
}

impl EventListener for ClassvizManager {
    fn handle_event(&mut self, event: &Event) -> Vec<Event> {
        let changed = match event {
            Event::ChangeSingleMethodByIdToClassviz { node_id, selected } => {
                if *selected {
                    self.insert_single_method_by_id(*node_id)
                } else {
                    self.remove_single_method_by_id(*node_id)
                }
            }
            Event::ChangeMultiMethodByIdsToClassviz { node_ids, selected } => {
                let touched = if *selected {
                    self.insert_multiple_methods_by_ids(node_ids)
                } else {
                    self.remove_multiple_methods_by_ids(node_ids)
                };
                !touched.is_empty()
            }
            Event::SwitchTraceMode { trace_mode } => {
                self.switch_trace_mode(*trace_mode);
                false
            }
            Event::ChangeCurrentFocusedNode { node_id } => {
                self.focus_node(*node_id);
                false
            }
            _ => false,
        };

        if changed {
            vec![Event::RefreshRegionFocus {
                stop_step_by_step_mode: false,
            }]
        } else {
            Vec::new()
        }
    }
}
