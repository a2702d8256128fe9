use callscope_core::{CallNode, IdRange, NodeId, NodeStatus, TraceInput, ViewMode};
use callscope_events::{Event, EventBus};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

mod expansion;
mod index;
mod selection;

pub use index::{NodeData, NodeState, PackageInfo, ThreadIndex};

/// Tri-state answer for a package checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageSelectionState {
    /// Every node of the package is selected.
    Selected,
    /// No node is selected, or the package is unknown or empty.
    Unselected,
    Partial,
}

/// Cross-thread lookup entry, built once at load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub thread: String,
    pub label: String,
    pub parent: Option<NodeId>,
    pub color: String,
    pub status: NodeStatus,
}

pub(crate) struct StoreState {
    threads: BTreeMap<String, CallNode>,
    id_ranges: BTreeMap<String, IdRange>,
    global: HashMap<NodeId, GlobalEntry>,
    current_thread: Option<String>,
    index: ThreadIndex,
    focused: Option<NodeId>,
    search_results: Vec<NodeId>,
    view_mode: ViewMode,
}

impl StoreState {
    /// Apply `f` to the owned tree node behind `id` in the active thread.
    fn write_back(&mut self, id: NodeId, f: impl FnOnce(&mut CallNode)) {
        let Some(path) = self.index.locator.get(&id) else {
            return;
        };
        let Some(thread) = self.current_thread.as_ref() else {
            return;
        };
        let Some(root) = self.threads.get_mut(thread) else {
            return;
        };
        match index::node_at_path_mut(root, path) {
            Some(node) => f(node),
            None => tracing::warn!(node_id = %id, "Index path no longer reaches its node"),
        }
    }
}

/// Canonical owner of every thread's call tree and of the active thread's
/// selection, expansion and highlight state.
///
/// All mutation goes through `&self`; the internal borrow is always released
/// before an event is published, so handlers may call back into the store.
pub struct DataStore {
    bus: EventBus,
    state: RefCell<StoreState>,
}

impl DataStore {
    /// Load every thread and activate the first one (by name) without
    /// publishing `ThreadChanged`.
    pub fn new(bus: EventBus, input: TraceInput) -> Self {
        let TraceInput {
            threads,
            id_range_by_thread,
        } = input;

        let mut global = HashMap::new();
        for (name, root) in &threads {
            let mut stack: Vec<(&CallNode, Option<NodeId>)> = vec![(root, None)];
            while let Some((node, parent)) = stack.pop() {
                global.insert(
                    node.id,
                    GlobalEntry {
                        thread: name.clone(),
                        label: node.label.clone(),
                        parent,
                        color: node.color.clone(),
                        status: node.status,
                    },
                );
                stack.extend(node.children.iter().map(|child| (child, Some(node.id))));
            }
        }

        let current_thread = threads.keys().next().cloned();
        let index = current_thread
            .as_ref()
            .and_then(|name| threads.get(name))
            .map(ThreadIndex::build)
            .unwrap_or_default();

        tracing::debug!(
            threads = threads.len(),
            nodes = global.len(),
            current = ?current_thread,
            "DataStore loaded"
        );

        Self {
            bus,
            state: RefCell::new(StoreState {
                threads,
                id_ranges: id_range_by_thread,
                global,
                current_thread,
                index,
                focused: None,
                search_results: Vec::new(),
                view_mode: ViewMode::default(),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Activate `name`, rebuilding every index from its tree.
    ///
    /// Returns false when the thread is unknown or already current.
    pub fn switch_thread(&self, name: &str) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.current_thread.as_deref() == Some(name) {
                return false;
            }
            let Some(root) = state.threads.get(name) else {
                tracing::warn!(thread = name, "switch_thread: unknown thread");
                return false;
            };
            let index = ThreadIndex::build(root);
            state.index = index;
            state.current_thread = Some(name.to_string());
            state.search_results.clear();
        }

        tracing::debug!(thread = name, "Thread switched");
        self.bus.publish(Event::ThreadChanged {
            thread_name: name.to_string(),
        });
        true
    }

    pub fn current_thread(&self) -> Option<String> {
        self.state.borrow().current_thread.clone()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.state.borrow().threads.keys().cloned().collect()
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.state.borrow().index.root
    }

    // ------------------------------------------------------------------
    // Active-thread lookups
    // ------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<NodeData> {
        self.state.borrow().index.nodes.get(&id).cloned()
    }

    pub fn node_state(&self, id: NodeId) -> Option<NodeState> {
        self.state.borrow().index.state.get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.state.borrow().index.nodes.contains_key(&id)
    }

    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        self.state
            .borrow()
            .index
            .children
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.state.borrow().index.parents.get(&id).copied()
    }

    /// Pre-order ids of the subtree under `id`, `id` included.
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.state.borrow().index.subtree(id)
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.state.borrow().index.selected.contains(&id)
    }

    /// Selected ids of the active thread in ascending (call) order.
    pub fn selected_ids(&self) -> Vec<NodeId> {
        self.state.borrow().index.selected.iter().copied().collect()
    }

    pub fn packages(&self) -> Vec<PackageInfo> {
        self.state
            .borrow()
            .index
            .package_info
            .values()
            .cloned()
            .collect()
    }

    pub fn focused_node(&self) -> Option<NodeId> {
        self.state.borrow().focused
    }

    pub fn search_results(&self) -> Vec<NodeId> {
        self.state.borrow().search_results.clone()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.state.borrow().view_mode
    }

    pub fn index_snapshot(&self) -> ThreadIndex {
        self.state.borrow().index.clone()
    }

    /// Read the active thread's index without copying it. `f` must not call
    /// mutating store methods.
    pub fn with_index<R>(&self, f: impl FnOnce(&ThreadIndex) -> R) -> R {
        f(&self.state.borrow().index)
    }

    /// Every broken index invariant of the active thread; empty when sound.
    pub fn verify_indices(&self) -> Vec<String> {
        self.state.borrow().index.verify()
    }

    // ------------------------------------------------------------------
    // Cross-thread lookups
    // ------------------------------------------------------------------

    pub fn label_of(&self, id: NodeId) -> Option<String> {
        self.state
            .borrow()
            .global
            .get(&id)
            .map(|entry| entry.label.clone())
    }

    pub fn thread_of(&self, id: NodeId) -> Option<String> {
        self.state
            .borrow()
            .global
            .get(&id)
            .map(|entry| entry.thread.clone())
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.state.borrow().global.get(&id).and_then(|entry| entry.parent)
    }

    pub fn global_entry(&self, id: NodeId) -> Option<GlobalEntry> {
        self.state.borrow().global.get(&id).cloned()
    }

    pub fn id_range(&self, thread: &str) -> Option<IdRange> {
        self.state.borrow().id_ranges.get(thread).copied()
    }

    pub fn id_ranges(&self) -> BTreeMap<String, IdRange> {
        self.state.borrow().id_ranges.clone()
    }

    /// Clone of a thread's tree, including persisted selection and collapse.
    pub fn thread_tree(&self, name: &str) -> Option<CallNode> {
        self.state.borrow().threads.get(name).cloned()
    }

    pub fn current_tree(&self) -> Option<CallNode> {
        let state = self.state.borrow();
        let name = state.current_thread.as_ref()?;
        state.threads.get(name).cloned()
    }

    /// Borrow a thread's tree for the duration of `f`. `f` must not call
    /// mutating store methods.
    pub fn with_thread_tree<R>(&self, name: &str, f: impl FnOnce(&CallNode) -> R) -> Option<R> {
        let state = self.state.borrow();
        state.threads.get(name).map(f)
    }
}

#[cfg(test)]
mod tests;
