use crate::model::{DiagramNodes, Vec2};

const CLASS_HEADER_HEIGHT: f32 = 30.0;
const CLASS_PADDING: f32 = 12.0;
const METHOD_SPACING: f32 = 6.0;
const CLASS_MIN_WIDTH: f32 = 120.0;
const CHAR_WIDTH: f32 = 7.0;
const TOP_LEVEL_GAP: f32 = 60.0;

/// Sizes class containers around their methods and lines the top-level
/// nodes up left to right.
#[derive(Debug, Default)]
pub struct ClassLayoutManager;

impl ClassLayoutManager {
    /// Stack the class's methods vertically and grow or shrink the container
    /// so every method fits inside it.
    pub fn resize_to_fit(&self, nodes: &mut DiagramNodes, class_id: &str) -> bool {
        let Some(class_node) = nodes.class_nodes.get(class_id) else {
            tracing::warn!(class_id, "resize_to_fit: unknown class node");
            return false;
        };
        let origin = class_node.position;
        let header_width = class_node.label.chars().count() as f32 * CHAR_WIDTH + 2.0 * CLASS_PADDING;
        let children = class_node.children.clone();

        let mut cursor_y = origin.y + CLASS_HEADER_HEIGHT;
        let mut widest = 0.0f32;
        for child_id in &children {
            let Some(child) = nodes.inserted_nodes.get_mut(child_id) else {
                tracing::warn!(class_id, child_id = %child_id, "Class lists a missing method node");
                continue;
            };
            child.position = Vec2::new(origin.x + CLASS_PADDING, cursor_y);
            cursor_y += child.size.y + METHOD_SPACING;
            widest = widest.max(child.size.x);
        }

        let width = (widest + 2.0 * CLASS_PADDING)
            .max(header_width)
            .max(CLASS_MIN_WIDTH);
        let content_bottom = if widest > 0.0 {
            cursor_y - METHOD_SPACING
        } else {
            origin.y + CLASS_HEADER_HEIGHT
        };
        let height = content_bottom - origin.y + CLASS_PADDING;
        if let Some(class_node) = nodes.class_nodes.get_mut(class_id) {
            class_node.size = Vec2::new(width, height);
        }
        true
    }

    /// Place classes and standalone nodes in one row, then re-fit every
    /// class so member positions follow their container.
    pub fn arrange(&self, nodes: &mut DiagramNodes) {
        let mut x = 0.0f32;
        let class_ids: Vec<String> = nodes.class_nodes.keys().cloned().collect();
        for class_id in &class_ids {
            if let Some(class_node) = nodes.class_nodes.get_mut(class_id) {
                class_node.position = Vec2::new(x, 0.0);
            }
            self.resize_to_fit(nodes, class_id);
            if let Some(class_node) = nodes.class_nodes.get(class_id) {
                x += class_node.size.x + TOP_LEVEL_GAP;
            }
        }
        for node in nodes.inserted_nodes.values_mut() {
            if node.parent.is_none() {
                node.position = Vec2::new(x, 0.0);
                x += node.size.x + TOP_LEVEL_GAP;
            }
        }
    }
}
