use crate::model::{DiagramNode, DiagramNodeKind, DiagramNodes, Vec2};
use crate::style::{COLOR_CLASS_FILL, COLOR_LIBRARY_FILL, method_fill};
use callscope_core::{MethodSignature, NodeStatus};

/// Where a freshly created method node was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Inside this class container, which must be resized.
    InClass(String),
    Standalone,
}

/// Creates diagram nodes for method labels.
#[derive(Debug, Default)]
pub struct NodeFactory {
    library_method_prefixes: Vec<String>,
}

impl NodeFactory {
    pub fn new(library_method_prefixes: Vec<String>) -> Self {
        Self {
            library_method_prefixes,
        }
    }

    pub fn set_library_method_prefixes(&mut self, prefixes: Vec<String>) {
        self.library_method_prefixes = prefixes;
    }

    pub fn is_library_method(&self, label: &str) -> bool {
        self.library_method_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && label.starts_with(prefix.as_str()))
    }

    pub fn class_node_id(class_name: &str) -> String {
        format!("class:{class_name}")
    }

    /// Create the method node for `label`, and its class container when
    /// needed. Returns `None` when a non-library label names no class.
    pub fn create_method_node(
        &self,
        nodes: &mut DiagramNodes,
        label: &str,
        color: &str,
        status: NodeStatus,
    ) -> Option<Placement> {
        let fill = method_fill(color).to_hex();

        if self.is_library_method(label) {
            let node = DiagramNode {
                id: label.to_string(),
                kind: DiagramNodeKind::Library,
                label: label.to_string(),
                parent: None,
                children: Vec::new(),
                color: COLOR_LIBRARY_FILL.to_hex(),
                original_color: COLOR_LIBRARY_FILL.to_hex(),
                pattern: status.pattern(),
                focused: false,
                position: Vec2::default(),
                size: method_size(label),
            };
            nodes.inserted_nodes.insert(label.to_string(), node);
            return Some(Placement::Standalone);
        }

        let signature = MethodSignature::parse(label);
        if signature.class_name.is_empty() {
            tracing::warn!(label, "No class resolved for method; node not created");
            return None;
        }

        let class_id = Self::class_node_id(&signature.class_name);
        let class_node = nodes
            .class_nodes
            .entry(class_id.clone())
            .or_insert_with(|| DiagramNode {
                id: class_id.clone(),
                kind: DiagramNodeKind::Class,
                label: signature.simple_class_name().to_string(),
                parent: None,
                children: Vec::new(),
                color: COLOR_CLASS_FILL.to_hex(),
                original_color: COLOR_CLASS_FILL.to_hex(),
                pattern: None,
                focused: false,
                position: Vec2::default(),
                size: Vec2::default(),
            });
        class_node.children.push(label.to_string());

        let display = if signature.method_name.is_empty() {
            label.to_string()
        } else {
            format!("{}()", signature.method_name)
        };
        let node = DiagramNode {
            id: label.to_string(),
            kind: DiagramNodeKind::Method,
            size: method_size(&display),
            label: display,
            parent: Some(class_id.clone()),
            children: Vec::new(),
            color: fill.clone(),
            original_color: fill,
            pattern: status.pattern(),
            focused: false,
            position: Vec2::default(),
        };
        nodes.inserted_nodes.insert(label.to_string(), node);
        Some(Placement::InClass(class_id))
    }

    /// Remove a method node and, when it was the last method of its class,
    /// the class container. Returns the container id that still needs a
    /// resize, if any.
    pub fn remove_method_node(&self, nodes: &mut DiagramNodes, label: &str) -> Option<String> {
        let removed = nodes.inserted_nodes.remove(label)?;
        let class_id = removed.parent?;
        let class_node = nodes.class_nodes.get_mut(&class_id)?;
        class_node.children.retain(|child| child != label);
        if class_node.children.is_empty() {
            nodes.class_nodes.remove(&class_id);
            None
        } else {
            Some(class_id)
        }
    }
}

const CHAR_WIDTH: f32 = 7.0;
const METHOD_PADDING: f32 = 16.0;
const METHOD_HEIGHT: f32 = 24.0;
const METHOD_MIN_WIDTH: f32 = 80.0;

fn method_size(text: &str) -> Vec2 {
    let width = (text.chars().count() as f32 * CHAR_WIDTH + METHOD_PADDING).max(METHOD_MIN_WIDTH);
    Vec2::new(width, METHOD_HEIGHT)
}
