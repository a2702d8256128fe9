use super::DATA_NOT_AVAILABLE;
use callscope_core::NodeId;
use callscope_events::{Event, EventKind, EventListener};
use callscope_store::DataStore;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub id: NodeId,
    pub depth: usize,
    pub label: String,
    pub has_children: bool,
    pub expanded: bool,
    pub selected: bool,
    pub highlighted: bool,
    pub focused: bool,
}

/// Indented, collapsible list of the active thread's call tree.
///
/// Events only mark the rows dirty; [`TreeListView::refresh`] rebuilds them.
pub struct TreeListView {
    store: Rc<DataStore>,
    rows: Vec<TreeRow>,
    message: Option<&'static str>,
    dirty: bool,
    render_count: usize,
}

impl TreeListView {
    pub const LISTENED_KINDS: [EventKind; 5] = [
        EventKind::ThreadChanged,
        EventKind::NodeSelectionChanged,
        EventKind::NodeExpansionChanged,
        EventKind::SearchResultsChanged,
        EventKind::RefreshFlame,
    ];

    pub fn new(store: Rc<DataStore>) -> Self {
        let mut view = Self {
            store,
            rows: Vec::new(),
            message: None,
            dirty: true,
            render_count: 0,
        };
        view.refresh();
        view
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Re-render if anything changed since the last render.
    pub fn refresh(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.render();
        true
    }

    /// Rebuild the visible rows: depth-first, skipping the children of
    /// collapsed nodes.
    pub fn render(&mut self) {
        self.dirty = false;
        self.render_count += 1;
        let focused = self.store.focused_node();

        let rows = self.store.with_index(|index| {
            let root = index.root?;
            let mut rows = Vec::new();
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let (Some(node), Some(state)) = (index.nodes.get(&id), index.state.get(&id)) else {
                    tracing::warn!(node_id = %id, "Tree row without node data");
                    continue;
                };
                let children = index.children.get(&id).map(Vec::as_slice).unwrap_or_default();
                rows.push(TreeRow {
                    id,
                    depth: node.depth,
                    label: node.label.clone(),
                    has_children: !children.is_empty(),
                    expanded: state.expanded,
                    selected: state.selected,
                    highlighted: state.highlight,
                    focused: focused == Some(id),
                });
                if state.expanded {
                    stack.extend(children.iter().rev());
                }
            }
            Some(rows)
        });

        match rows {
            Some(rows) => {
                self.rows = rows;
                self.message = None;
            }
            None => {
                self.rows.clear();
                self.message = Some(DATA_NOT_AVAILABLE);
            }
        }
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn message(&self) -> Option<&str> {
        self.message
    }

    pub fn render_count(&self) -> usize {
        self.render_count
    }
}

impl EventListener for TreeListView {
    fn handle_event(&mut self, _event: &Event) -> Vec<Event> {
        self.dirty = true;
        Vec::new()
    }
}
