use crate::{DataStore, PackageSelectionState, StoreState};
use callscope_core::NodeId;
use callscope_events::Event;

impl StoreState {
    /// Flip one node's selection. Returns its package when the state changed.
    fn apply_selection(&mut self, id: NodeId, selected: bool) -> Option<String> {
        let package = self.index.nodes.get(&id)?.package_name.clone();
        let entry = self.index.state.get_mut(&id)?;
        if entry.selected == selected {
            return None;
        }
        entry.selected = selected;

        let package_selected = self
            .index
            .package_selected_ids
            .entry(package.clone())
            .or_default();
        if selected {
            self.index.selected.insert(id);
            package_selected.insert(id);
        } else {
            self.index.selected.remove(&id);
            package_selected.remove(&id);
        }
        self.write_back(id, |node| node.selected = selected);
        Some(package)
    }
}

impl DataStore {
    /// Set one node's selection.
    ///
    /// Returns false for unknown ids and when nothing changed. A change always
    /// publishes `ChangeSingleMethodByIdToClassviz`; `NodeSelectionChanged` is
    /// published only outside a batch.
    pub fn select(&self, id: NodeId, selected: bool, batch: bool) -> bool {
        let package_name = {
            let mut state = self.state.borrow_mut();
            if !state.index.nodes.contains_key(&id) {
                tracing::debug!(node_id = %id, "select: node not in active thread");
                return false;
            }
            match state.apply_selection(id, selected) {
                Some(package) => package,
                None => return false,
            }
        };

        if !batch {
            self.bus.publish(Event::NodeSelectionChanged {
                node_id: id,
                selected,
                package_name,
            });
        }
        self.bus
            .publish(Event::ChangeSingleMethodByIdToClassviz { node_id: id, selected });
        true
    }

    pub fn deselect(&self, id: NodeId) -> bool {
        self.select(id, false, false)
    }

    /// Direct children of `id`.
    pub fn select_children(&self, id: NodeId) -> Vec<NodeId> {
        let targets = self.children_of(id);
        self.select_batch(targets, true)
    }

    pub fn deselect_children(&self, id: NodeId) -> Vec<NodeId> {
        let targets = self.children_of(id);
        self.select_batch(targets, false)
    }

    /// `id` and every descendant, in tree order.
    pub fn select_all_children(&self, id: NodeId) -> Vec<NodeId> {
        let targets = self.subtree_ids(id);
        self.select_batch(targets, true)
    }

    pub fn deselect_all_children(&self, id: NodeId) -> Vec<NodeId> {
        let targets = self.subtree_ids(id);
        self.select_batch(targets, false)
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn select_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let targets = self.state.borrow().index.ancestors(id);
        self.select_batch(targets, true)
    }

    pub fn deselect_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let targets = self.state.borrow().index.ancestors(id);
        self.select_batch(targets, false)
    }

    pub fn select_all(&self) -> Vec<NodeId> {
        let targets = self.all_ids_in_tree_order();
        self.select_batch(targets, true)
    }

    pub fn deselect_all(&self) -> Vec<NodeId> {
        let targets = self.all_ids_in_tree_order();
        self.select_batch(targets, false)
    }

    pub fn select_by_package(&self, package: &str, selected: bool) -> Vec<NodeId> {
        let targets = self
            .state
            .borrow()
            .index
            .package_ids
            .get(package)
            .cloned()
            .unwrap_or_default();
        if targets.is_empty() {
            tracing::debug!(package, "select_by_package: unknown or empty package");
        }
        self.select_batch(targets, selected)
    }

    /// Slider selection: every node of the active thread whose id lies in
    /// `[min, max]`, clamped to the thread's id range. Returns the flipped
    /// ids in ascending order.
    pub fn select_id_range(&self, min: NodeId, max: NodeId, selected: bool) -> Vec<NodeId> {
        let bounds = {
            let state = self.state.borrow();
            state
                .current_thread
                .as_ref()
                .and_then(|thread| state.id_ranges.get(thread).copied())
        };
        let Some(bounds) = bounds else {
            return Vec::new();
        };
        let (low, high) = (min.max(bounds.min), max.min(bounds.max));
        if low > high {
            tracing::debug!(%min, %max, "select_id_range: empty after clamping");
            return Vec::new();
        }

        let mut targets: Vec<NodeId> = self
            .all_ids_in_tree_order()
            .into_iter()
            .filter(|id| (low..=high).contains(id))
            .collect();
        targets.sort();
        self.select_batch(targets, selected)
    }

    pub fn package_selection_state(&self, package: &str) -> PackageSelectionState {
        let state = self.state.borrow();
        let total = state
            .index
            .package_ids
            .get(package)
            .map(Vec::len)
            .unwrap_or(0);
        let selected = state
            .index
            .package_selected_ids
            .get(package)
            .map(|ids| ids.len())
            .unwrap_or(0);

        if total == 0 || selected == 0 {
            PackageSelectionState::Unselected
        } else if selected == total {
            PackageSelectionState::Selected
        } else {
            PackageSelectionState::Partial
        }
    }

    /// Repeated batch `select` calls followed by one `RefreshFlame` when
    /// anything changed. Returns the ids that actually flipped.
    pub(crate) fn select_batch(&self, targets: Vec<NodeId>, selected: bool) -> Vec<NodeId> {
        let changed: Vec<NodeId> = targets
            .into_iter()
            .filter(|&id| self.select(id, selected, true))
            .collect();
        if !changed.is_empty() {
            tracing::debug!(count = changed.len(), selected, "Batch selection applied");
            self.bus.publish(Event::RefreshFlame);
        }
        changed
    }

    fn all_ids_in_tree_order(&self) -> Vec<NodeId> {
        let state = self.state.borrow();
        state
            .index
            .root
            .map(|root| state.index.subtree(root))
            .unwrap_or_default()
    }
}
