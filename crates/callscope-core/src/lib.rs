use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub mod error;
pub mod signature;
pub mod trace;

pub use error::CoreError;
pub use signature::MethodSignature;
pub use trace::{IdRange, TraceInput};

/// Stable identifier assigned by the trace producer.
///
/// Ids grow strictly by call order inside a thread, so sorting by id yields
/// execution order. The producer may emit them as JSON numbers or as numeric
/// strings; both are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(value) => Ok(NodeId(value)),
            RawId::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(NodeId)
                .map_err(|_| D::Error::custom(format!("node id `{text}` is not numeric"))),
        }
    }
}

/// Visual pattern picked for a node when several status flags are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusPattern {
    FanOut,
    Implementation,
    Recursive,
}

/// Independent boolean flags computed by the trace producer.
///
/// A missing `status` object deserializes to all-false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeStatus {
    pub fan_out: bool,
    pub implementation_entry_point: bool,
    pub recursive_entry_point: bool,
    pub chain_start_point: bool,
    pub is_summarised: bool,
}

impl NodeStatus {
    /// Special nodes anchor regions and make up the key-node tree.
    pub fn is_special(&self) -> bool {
        self.fan_out || self.implementation_entry_point || self.recursive_entry_point
    }

    /// Priority: fan-out, then implementation entry, then recursive entry.
    pub fn pattern(&self) -> Option<StatusPattern> {
        if self.fan_out {
            Some(StatusPattern::FanOut)
        } else if self.implementation_entry_point {
            Some(StatusPattern::Implementation)
        } else if self.recursive_entry_point {
            Some(StatusPattern::Recursive)
        } else {
            None
        }
    }
}

fn status_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeStatus, D::Error> {
    Ok(Option::<NodeStatus>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of a recorded call tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNode {
    pub id: NodeId,
    pub label: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub method_name: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub self_time: f64,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: NodeStatus,
    #[serde(default)]
    pub children: Vec<CallNode>,
}

impl CallNode {
    /// Build a node whose class, method and package names come from `label`.
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        let label = label.into();
        let signature = MethodSignature::parse(&label);
        Self {
            id: NodeId(id),
            label,
            class_name: signature.class_name,
            method_name: signature.method_name,
            package_name: signature.package_name,
            color: String::new(),
            time: 0.0,
            self_time: 0.0,
            selected: false,
            collapsed: false,
            status: NodeStatus::default(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<CallNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_time(mut self, time: f64, self_time: f64) -> Self {
        self.time = time;
        self.self_time = self_time;
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    /// Fill `class_name`, `method_name` and `package_name` from the label
    /// wherever the producer left them empty.
    pub fn fill_derived_names(&mut self) {
        let mut stack: Vec<&mut CallNode> = vec![self];
        while let Some(node) = stack.pop() {
            if node.class_name.is_empty()
                || node.method_name.is_empty()
                || node.package_name.is_empty()
            {
                let signature = MethodSignature::parse(&node.label);
                if node.class_name.is_empty() {
                    node.class_name = signature.class_name;
                }
                if node.method_name.is_empty() {
                    node.method_name = signature.method_name;
                }
                if node.package_name.is_empty() {
                    node.package_name = signature.package_name;
                }
            }
            stack.extend(node.children.iter_mut());
        }
    }

    /// Depth-first pre-order walk, children in call order.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    pub fn find(&self, id: NodeId) -> Option<&CallNode> {
        self.walk().find(|node| node.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    /// Smallest and largest id in the tree.
    pub fn id_range(&self) -> IdRange {
        let mut range = IdRange::new(self.id, self.id);
        for node in self.walk() {
            range.min = range.min.min(node.id);
            range.max = range.max.max(node.id);
        }
        range
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a CallNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a CallNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Flame-graph layout selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    /// Frames sized by subtree structure.
    #[default]
    Logical,
    /// Frames sized by inclusive time.
    Temporal,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical => write!(f, "logical"),
            Self::Temporal => write!(f, "temporal"),
        }
    }
}
