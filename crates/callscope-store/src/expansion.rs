use crate::{DataStore, StoreState};
use callscope_core::{NodeId, ViewMode};
use callscope_events::Event;

impl StoreState {
    fn apply_expansion(&mut self, id: NodeId, expanded: bool) -> bool {
        let Some(entry) = self.index.state.get_mut(&id) else {
            return false;
        };
        if entry.expanded == expanded {
            return false;
        }
        entry.expanded = expanded;
        self.write_back(id, |node| node.collapsed = !expanded);
        true
    }

    fn apply_highlight(&mut self, id: NodeId, highlight: bool) -> bool {
        match self.index.state.get_mut(&id) {
            Some(entry) if entry.highlight != highlight => {
                entry.highlight = highlight;
                true
            }
            _ => false,
        }
    }
}

impl DataStore {
    pub fn expand(&self, id: NodeId) -> bool {
        self.set_expanded(id, true)
    }

    pub fn collapse(&self, id: NodeId) -> bool {
        self.set_expanded(id, false)
    }

    pub fn toggle_expand(&self, id: NodeId) -> bool {
        match self.node_state(id) {
            Some(state) => self.set_expanded(id, !state.expanded),
            None => false,
        }
    }

    /// Expand `id` and every descendant in tree order. One
    /// `NodeExpansionChanged` for `id` is published when anything changed.
    pub fn expand_all_descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.set_expanded_subtree(id, true)
    }

    pub fn collapse_all_descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.set_expanded_subtree(id, false)
    }

    fn set_expanded(&self, id: NodeId, expanded: bool) -> bool {
        if !self.state.borrow_mut().apply_expansion(id, expanded) {
            return false;
        }
        self.bus
            .publish(Event::NodeExpansionChanged { node_id: id, expanded });
        true
    }

    fn set_expanded_subtree(&self, id: NodeId, expanded: bool) -> Vec<NodeId> {
        let changed: Vec<NodeId> = {
            let mut state = self.state.borrow_mut();
            let targets = state.index.subtree(id);
            targets
                .into_iter()
                .filter(|&target| state.apply_expansion(target, expanded))
                .collect()
        };
        if !changed.is_empty() {
            self.bus
                .publish(Event::NodeExpansionChanged { node_id: id, expanded });
        }
        changed
    }

    // ------------------------------------------------------------------
    // Highlight, search, focus, layout
    // ------------------------------------------------------------------

    /// Transient highlight; never persisted onto the tree.
    pub fn set_highlight(&self, id: NodeId, highlight: bool) -> bool {
        self.state.borrow_mut().apply_highlight(id, highlight)
    }

    pub fn clear_highlights(&self) -> Vec<NodeId> {
        let mut state = self.state.borrow_mut();
        let mut lit: Vec<NodeId> = state
            .index
            .state
            .iter()
            .filter(|(_, node_state)| node_state.highlight)
            .map(|(&id, _)| id)
            .collect();
        for &id in &lit {
            state.apply_highlight(id, false);
        }
        lit.sort();
        lit
    }

    /// Case-insensitive label match over the active thread. Matching nodes
    /// are highlighted, previous highlights cleared. An empty query clears.
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        self.clear_highlights();
        let needle = query.trim().to_lowercase();
        let results = {
            let mut state = self.state.borrow_mut();
            let mut results: Vec<NodeId> = if needle.is_empty() {
                Vec::new()
            } else {
                state
                    .index
                    .nodes
                    .values()
                    .filter(|data| data.label.to_lowercase().contains(&needle))
                    .map(|data| data.id)
                    .collect()
            };
            results.sort();
            for &id in &results {
                state.apply_highlight(id, true);
            }
            state.search_results = results.clone();
            results
        };

        tracing::debug!(query, hits = results.len(), "Search applied");
        self.bus.publish(Event::SearchResultsChanged {
            search_results: results.clone(),
        });
        results
    }

    /// Focus any loaded node, in any thread. Returns false for unknown ids
    /// and when the node is already focused.
    pub fn set_focused_node(&self, id: NodeId) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if !state.global.contains_key(&id) {
                tracing::warn!(node_id = %id, "set_focused_node: unknown node");
                return false;
            }
            if state.focused == Some(id) {
                return false;
            }
            state.focused = Some(id);
        }
        self.bus.publish(Event::ChangeCurrentFocusedNode { node_id: id });
        true
    }

    pub fn set_view_mode(&self, mode: ViewMode) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.view_mode == mode {
                return false;
            }
            state.view_mode = mode;
        }
        self.bus.publish(Event::ViewModeChanged { mode });
        true
    }
}
