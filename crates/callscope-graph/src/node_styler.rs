use crate::model::{DiagramNodes, MethodEntry};
use crate::style::{COLOR_STEP_FUTURE, COLOR_STEP_PAST, Color};

/// Recoloring of method nodes for playback and focus.
#[derive(Debug, Default)]
pub struct NodeStyler {
    focused: Option<String>,
}

impl NodeStyler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color one thread's trace for cursor position `index`: past entries
    /// muted, future entries lighter, the current entry in `focus`. Future
    /// entries sharing the current label are the same diagram node and keep
    /// the focus color.
    ///
    /// Returns how many nodes were recolored.
    pub fn color_step(
        &self,
        nodes: &mut DiagramNodes,
        entries: &[MethodEntry],
        index: usize,
        focus: Color,
    ) -> usize {
        let Some(current) = entries.get(index) else {
            return 0;
        };
        let current_label = current.label.as_str();
        let mut recolored = 0;

        for (position, entry) in entries.iter().enumerate() {
            let color = if position < index {
                if entry.label == current_label {
                    continue;
                }
                COLOR_STEP_PAST
            } else if position > index {
                if entry.label == current_label {
                    continue;
                }
                COLOR_STEP_FUTURE
            } else {
                focus
            };
            match nodes.inserted_nodes.get_mut(&entry.label) {
                Some(node) => {
                    node.color = color.to_hex();
                    recolored += 1;
                }
                None => tracing::warn!(
                    label = %entry.label,
                    "Step entry has no diagram node"
                ),
            }
        }
        recolored
    }

    /// Return every method node to its stored original color.
    pub fn restore_colors(&self, nodes: &mut DiagramNodes) {
        for node in nodes.inserted_nodes.values_mut() {
            node.color.clone_from(&node.original_color);
        }
    }

    /// Move the focus marker to `id`, clearing the previous one. `None`
    /// clears only.
    pub fn set_focus(&mut self, nodes: &mut DiagramNodes, id: Option<&str>) -> bool {
        if self.focused.as_deref() == id {
            return false;
        }
        if let Some(previous) = self.focused.take()
            && let Some(node) = nodes.get_mut(&previous)
        {
            node.focused = false;
        }
        if let Some(id) = id {
            match nodes.get_mut(id) {
                Some(node) => {
                    node.focused = true;
                    self.focused = Some(id.to_string());
                }
                None => return false,
            }
        }
        true
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Forget the focus marker when its node has gone away.
    pub fn forget_if_removed(&mut self, nodes: &DiagramNodes) {
        if let Some(focused) = &self.focused
            && nodes.get(focused).is_none()
        {
            self.focused = None;
        }
    }
}
