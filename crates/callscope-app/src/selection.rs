use callscope_core::NodeId;
use callscope_store::DataStore;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Flame-graph side of selection: remembers which ids are drawn and routes
/// every change through the store.
///
/// Shared by the flame-graph view and its host. No borrow is held while the
/// store publishes, so the view can re-render from inside the cascade.
pub struct SelectionManager {
    store: Rc<DataStore>,
    rendered: RefCell<BTreeSet<NodeId>>,
}

impl SelectionManager {
    pub fn new(store: Rc<DataStore>) -> Self {
        Self {
            store,
            rendered: RefCell::new(BTreeSet::new()),
        }
    }

    pub(crate) fn set_rendered(&self, ids: impl IntoIterator<Item = NodeId>) {
        *self.rendered.borrow_mut() = ids.into_iter().collect();
    }

    pub fn is_rendered(&self, id: NodeId) -> bool {
        self.rendered.borrow().contains(&id)
    }

    /// Flip one frame. Returns false for ids that are not drawn.
    pub fn toggle(&self, id: NodeId) -> bool {
        if !self.is_rendered(id) {
            tracing::debug!(node_id = %id, "toggle: frame not rendered");
            return false;
        }
        self.store.select(id, !self.store.is_selected(id), false)
    }

    pub fn select_frame(&self, id: NodeId, selected: bool) -> bool {
        if !self.is_rendered(id) {
            return false;
        }
        self.store.select(id, selected, false)
    }

    /// The frame and everything stacked above it.
    pub fn select_subtree(&self, id: NodeId, selected: bool) -> Vec<NodeId> {
        if !self.is_rendered(id) {
            return Vec::new();
        }
        if selected {
            self.store.select_all_children(id)
        } else {
            self.store.deselect_all_children(id)
        }
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.store.is_selected(id)
    }

    /// Drawn frames that are selected, ascending.
    pub fn selected_frames(&self) -> Vec<NodeId> {
        self.rendered
            .borrow()
            .iter()
            .copied()
            .filter(|&id| self.store.is_selected(id))
            .collect()
    }
}
