use super::DATA_NOT_AVAILABLE;
use crate::selection::SelectionManager;
use callscope_core::{NodeId, NodeStatus, ViewMode};
use callscope_events::{Event, EventKind, EventListener};
use callscope_store::{DataStore, NodeData, ThreadIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

/// One drawn frame. `x` and `width` are fractions of the root's width.
#[derive(Debug, Clone, PartialEq)]
pub struct FlameFrame {
    pub id: NodeId,
    pub label: String,
    pub depth: usize,
    pub x: f64,
    pub width: f64,
    pub color: String,
    pub selected: bool,
    pub highlighted: bool,
    pub focused: bool,
    pub search_hit: bool,
    /// Display attributes shown in tooltips.
    pub metadata: BTreeMap<String, String>,
}

fn frame_metadata(node: &NodeData) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::from([
        ("class".to_string(), node.class_name.clone()),
        ("method".to_string(), node.method_name.clone()),
        ("package".to_string(), node.package_name.clone()),
        ("time".to_string(), node.time.to_string()),
        ("selfTime".to_string(), node.self_time.to_string()),
    ]);
    let flags = status_flags(&node.status);
    if !flags.is_empty() {
        metadata.insert("status".to_string(), flags.join(","));
    }
    metadata
}

fn status_flags(status: &NodeStatus) -> Vec<&'static str> {
    [
        (status.fan_out, "fanOut"),
        (status.implementation_entry_point, "implementationEntryPoint"),
        (status.recursive_entry_point, "recursiveEntryPoint"),
        (status.chain_start_point, "chainStartPoint"),
        (status.is_summarised, "isSummarised"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

/// Flame graph of the active thread in logical or temporal layout.
///
/// Re-renders synchronously on every event it listens to.
pub struct FlameGraphView {
    store: Rc<DataStore>,
    selection: Rc<SelectionManager>,
    frames: Vec<FlameFrame>,
    message: Option<&'static str>,
    render_count: usize,
}

impl FlameGraphView {
    pub const LISTENED_KINDS: [EventKind; 6] = [
        EventKind::ThreadChanged,
        EventKind::NodeSelectionChanged,
        EventKind::ViewModeChanged,
        EventKind::RefreshFlame,
        EventKind::ChangeCurrentFocusedNode,
        EventKind::SearchResultsChanged,
    ];

    pub fn new(store: Rc<DataStore>, selection: Rc<SelectionManager>) -> Self {
        let mut view = Self {
            store,
            selection,
            frames: Vec::new(),
            message: None,
            render_count: 0,
        };
        view.render();
        view
    }

    pub fn selection(&self) -> &Rc<SelectionManager> {
        &self.selection
    }

    pub fn render(&mut self) {
        self.render_count += 1;
        let mode = self.store.view_mode();
        let focused = self.store.focused_node();
        let search_hits: HashSet<NodeId> = self.store.search_results().into_iter().collect();

        let frames = self
            .store
            .with_index(|index| layout_frames(index, mode, focused, &search_hits));
        match frames {
            Some(frames) => {
                self.selection.set_rendered(frames.iter().map(|frame| frame.id));
                self.frames = frames;
                self.message = None;
            }
            None => {
                self.selection.set_rendered(std::iter::empty());
                self.frames.clear();
                self.message = Some(DATA_NOT_AVAILABLE);
            }
        }
        tracing::trace!(frames = self.frames.len(), %mode, "Flame graph rendered");
    }

    pub fn frames(&self) -> &[FlameFrame] {
        &self.frames
    }

    pub fn frame(&self, id: NodeId) -> Option<&FlameFrame> {
        self.frames.iter().find(|frame| frame.id == id)
    }

    pub fn message(&self) -> Option<&str> {
        self.message
    }

    pub fn render_count(&self) -> usize {
        self.render_count
    }
}

/// Frames in preorder. Logical layout weights each frame by the size of its
/// subtree, temporal layout by inclusive time; a root without time falls
/// back to logical.
fn layout_frames(
    index: &ThreadIndex,
    mode: ViewMode,
    focused: Option<NodeId>,
    search_hits: &HashSet<NodeId>,
) -> Option<Vec<FlameFrame>> {
    let root = index.root?;
    let no_children: &[NodeId] = &[];
    let children_of = |id: &NodeId| index.children.get(id).map(Vec::as_slice).unwrap_or(no_children);

    let mut preorder = Vec::with_capacity(index.nodes.len());
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        preorder.push(id);
        stack.extend(children_of(&id).iter().rev());
    }

    let mut subtree_size: HashMap<NodeId, f64> = HashMap::with_capacity(preorder.len());
    for id in preorder.iter().rev() {
        let size = 1.0
            + children_of(id)
                .iter()
                .filter_map(|child| subtree_size.get(child))
                .sum::<f64>();
        subtree_size.insert(*id, size);
    }

    let time_of = |id: &NodeId| index.nodes.get(id).map(|n| n.time.max(0.0)).unwrap_or(0.0);
    let temporal = mode == ViewMode::Temporal && time_of(&root) > 0.0;
    if mode == ViewMode::Temporal && !temporal {
        tracing::warn!(root = %root, "Root has no recorded time; using logical layout");
    }
    let weight = |id: &NodeId| {
        if temporal {
            time_of(id)
        } else {
            subtree_size.get(id).copied().unwrap_or(1.0)
        }
    };

    let mut spans: HashMap<NodeId, (f64, f64)> = HashMap::from([(root, (0.0, 1.0))]);
    let mut frames = Vec::with_capacity(preorder.len());
    for id in &preorder {
        let (Some(node), Some(&(x, width))) = (index.nodes.get(id), spans.get(id)) else {
            continue;
        };

        // Temporal children may add up to less than the parent (self time);
        // logical children share the parent's width minus its own unit.
        let parent_weight = weight(id);
        let mut cursor = x;
        for child in children_of(id) {
            let share = if parent_weight > 0.0 {
                weight(child) / parent_weight
            } else {
                0.0
            };
            let child_width = width * share;
            spans.insert(*child, (cursor, child_width));
            cursor += child_width;
        }

        let state = index.state.get(id).copied().unwrap_or_default();
        frames.push(FlameFrame {
            id: *id,
            label: node.label.clone(),
            depth: node.depth,
            x,
            width,
            color: node.color.clone(),
            selected: state.selected,
            highlighted: state.highlight,
            focused: focused == Some(*id),
            search_hit: search_hits.contains(id),
            metadata: frame_metadata(node),
        });
    }
    Some(frames)
}

impl EventListener for FlameGraphView {
    fn handle_event(&mut self, _event: &Event) -> Vec<Event> {
        self.render();
        Vec::new()
    }
}
