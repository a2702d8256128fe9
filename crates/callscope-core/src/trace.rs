use crate::{CallNode, CoreError, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Inclusive id interval covered by one thread, serialized as `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(NodeId, NodeId)", into = "(NodeId, NodeId)")]
pub struct IdRange {
    pub min: NodeId,
    pub max: NodeId,
}

impl IdRange {
    pub fn new(min: NodeId, max: NodeId) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.min <= id && id <= self.max
    }
}

impl From<(NodeId, NodeId)> for IdRange {
    fn from((min, max): (NodeId, NodeId)) -> Self {
        Self::new(min, max)
    }
}

impl From<IdRange> for (NodeId, NodeId) {
    fn from(range: IdRange) -> Self {
        (range.min, range.max)
    }
}

/// Everything one session is built from: one call tree per thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceInput {
    pub threads: BTreeMap<String, CallNode>,
    #[serde(default)]
    pub id_range_by_thread: BTreeMap<String, IdRange>,
}

impl TraceInput {
    /// Build an input from thread roots, computing id ranges from the trees.
    pub fn new(threads: BTreeMap<String, CallNode>) -> Self {
        let mut input = Self {
            threads,
            id_range_by_thread: BTreeMap::new(),
        };
        input.normalize();
        input
    }

    pub fn single(thread_name: impl Into<String>, root: CallNode) -> Self {
        Self::new(BTreeMap::from([(thread_name.into(), root)]))
    }

    /// Accepts `{"threads": {...}, "idRangeByThread": {...}}` or a bare
    /// `{"thread-name": rootNode, ...}` map.
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(object) = value else {
            return Err(CoreError::Layout(
                "top-level trace value must be an object".to_string(),
            ));
        };

        let mut input = if object.get("threads").is_some_and(Value::is_object) {
            serde_json::from_value::<TraceInput>(Value::Object(object))?
        } else {
            let threads: BTreeMap<String, CallNode> =
                serde_json::from_value(Value::Object(object))?;
            TraceInput {
                threads,
                id_range_by_thread: BTreeMap::new(),
            }
        };

        if input.threads.is_empty() {
            return Err(CoreError::EmptyTrace);
        }
        input.normalize();
        Ok(input)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn thread_names(&self) -> impl Iterator<Item = &str> {
        self.threads.keys().map(String::as_str)
    }

    fn normalize(&mut self) {
        let mut owner: HashMap<NodeId, &str> = HashMap::new();
        for (name, root) in self.threads.iter_mut() {
            root.fill_derived_names();
            self.id_range_by_thread
                .entry(name.clone())
                .or_insert_with(|| root.id_range());
        }

        for (name, root) in &self.threads {
            for node in root.walk() {
                if let Some(previous) = owner.insert(node.id, name.as_str()) {
                    tracing::warn!(
                        node_id = %node.id,
                        first_thread = previous,
                        second_thread = %name,
                        "Duplicate node id in trace input; lookups resolve to the later thread"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn bare_thread_map_is_accepted() {
        let raw = r#"{"main":{"id":1,"label":"a.A.run()","children":[{"id":"2","label":"a.B.go()"}]}}"#;
        let input = TraceInput::from_json_str(raw).unwrap();
        assert_eq!(input.thread_names().collect::<Vec<_>>(), vec!["main"]);
        assert_eq!(
            input.id_range_by_thread["main"],
            IdRange::new(NodeId(1), NodeId(2))
        );
        assert_eq!(input.threads["main"].children[0].class_name, "a.B");
    }

    #[test]
    fn structured_form_keeps_given_ranges() {
        let raw = r#"{
            "threads": {"worker": {"id": 10, "label": "w.W.loop()"}},
            "idRangeByThread": {"worker": [5, 99]}
        }"#;
        let input = TraceInput::from_json_str(raw).unwrap();
        let range = input.id_range_by_thread["worker"];
        assert_eq!(range, IdRange::new(NodeId(5), NodeId(99)));
        assert!(range.contains(NodeId(10)));
        assert!(!range.contains(NodeId(100)));
    }

    #[test]
    fn empty_and_malformed_inputs_are_rejected() {
        assert!(matches!(
            TraceInput::from_json_str("{}"),
            Err(CoreError::EmptyTrace)
        ));
        assert!(matches!(
            TraceInput::from_json_str("[1,2]"),
            Err(CoreError::Layout(_))
        ));
        assert!(matches!(
            TraceInput::from_json_str("{\"main\": 3}"),
            Err(CoreError::Json(_))
        ));
    }

    #[test]
    fn load_reads_from_disk() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"t":{{"id":1,"label":"x.Y.z()"}}}}"#)?;
        let input = TraceInput::load(file.path())?;
        assert_eq!(input.threads["t"].method_name, "z");

        let missing = TraceInput::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(CoreError::Io { .. })));
        Ok(())
    }
}
