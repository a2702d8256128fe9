use crate::model::MethodEntry;
use crate::style::{Color, generate_color_spectrum};
use callscope_core::{IdRange, NodeId};
use std::collections::BTreeMap;

/// Per-thread trace order of the inserted call-tree nodes plus the
/// playback cursor over it.
///
/// Lists stay sorted by original id. A cursor exists exactly when its list
/// is non-empty and always points inside it.
#[derive(Debug, Default)]
pub struct ThreadManager {
    thread_to_method_nodes_in_order: BTreeMap<String, Vec<MethodEntry>>,
    current_index_by_thread: BTreeMap<String, usize>,
    focus_colors: BTreeMap<String, Color>,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id is already registered for the thread.
    pub fn register(&mut self, thread: &str, original_id: NodeId, label: &str) -> bool {
        let entries = self
            .thread_to_method_nodes_in_order
            .entry(thread.to_string())
            .or_default();
        match entries.binary_search_by_key(&original_id, |entry| entry.original_id) {
            Ok(_) => false,
            Err(position) => {
                entries.insert(
                    position,
                    MethodEntry {
                        original_id,
                        label: label.to_string(),
                    },
                );
                self.current_index_by_thread
                    .entry(thread.to_string())
                    .or_insert(0);
                true
            }
        }
    }

    /// Remove the entry; returns its label when it was registered.
    pub fn unregister(&mut self, thread: &str, original_id: NodeId) -> Option<String> {
        let entries = self.thread_to_method_nodes_in_order.get_mut(thread)?;
        let position = entries
            .binary_search_by_key(&original_id, |entry| entry.original_id)
            .ok()?;
        let removed = entries.remove(position);

        if entries.is_empty() {
            self.thread_to_method_nodes_in_order.remove(thread);
            self.current_index_by_thread.remove(thread);
        } else {
            let max = entries.len() - 1;
            if let Some(index) = self.current_index_by_thread.get_mut(thread)
                && *index > max
            {
                *index = max;
            }
        }
        Some(removed.label)
    }

    pub fn contains(&self, thread: &str, original_id: NodeId) -> bool {
        self.thread_to_method_nodes_in_order
            .get(thread)
            .is_some_and(|entries| {
                entries
                    .binary_search_by_key(&original_id, |entry| entry.original_id)
                    .is_ok()
            })
    }

    pub fn entries(&self, thread: &str) -> &[MethodEntry] {
        self.thread_to_method_nodes_in_order
            .get(thread)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn threads(&self) -> impl Iterator<Item = &str> {
        self.thread_to_method_nodes_in_order.keys().map(String::as_str)
    }

    pub fn current_index(&self, thread: &str) -> Option<usize> {
        self.current_index_by_thread.get(thread).copied()
    }

    /// Move the cursor. Out-of-range positions are rejected.
    pub fn set_current_index(&mut self, thread: &str, index: usize) -> bool {
        let len = self.entries(thread).len();
        if index >= len {
            return false;
        }
        self.current_index_by_thread.insert(thread.to_string(), index);
        true
    }

    pub fn max_index(&self, thread: &str) -> Option<usize> {
        self.entries(thread).len().checked_sub(1)
    }

    /// Give every thread a distinct hue, ordered by where its ids start.
    pub fn assign_focus_colors(&mut self, id_ranges: &BTreeMap<String, IdRange>) {
        let mut ordered: Vec<(&String, &IdRange)> = id_ranges.iter().collect();
        ordered.sort_by(|a, b| (a.1.min, a.0).cmp(&(b.1.min, b.0)));
        let spectrum = generate_color_spectrum(ordered.len());
        self.focus_colors = ordered
            .into_iter()
            .zip(spectrum)
            .map(|((name, _), color)| (name.clone(), color))
            .collect();
    }

    pub fn focus_color(&self, thread: &str) -> Color {
        self.focus_colors
            .get(thread)
            .copied()
            .unwrap_or(crate::style::COLOR_FOCUS_BORDER)
    }

    pub fn clear(&mut self) {
        self.thread_to_method_nodes_in_order.clear();
        self.current_index_by_thread.clear();
    }

    /// Describe every broken ordering or cursor invariant.
    pub fn verify(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (thread, entries) in &self.thread_to_method_nodes_in_order {
            if entries
                .windows(2)
                .any(|pair| pair[0].original_id >= pair[1].original_id)
            {
                problems.push(format!("thread {thread}: entries not strictly ordered"));
            }
            match self.current_index_by_thread.get(thread) {
                Some(&index) if index < entries.len() => {}
                other => problems.push(format!("thread {thread}: cursor {other:?} out of range")),
            }
        }
        for thread in self.current_index_by_thread.keys() {
            if !self.thread_to_method_nodes_in_order.contains_key(thread) {
                problems.push(format!("thread {thread}: cursor without entries"));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_stay_sorted_and_unique() {
        let mut threads = ThreadManager::new();
        assert!(threads.register("main", NodeId(5), "a.A.e()"));
        assert!(threads.register("main", NodeId(2), "a.A.b()"));
        assert!(threads.register("main", NodeId(9), "a.A.i()"));
        assert!(!threads.register("main", NodeId(2), "a.A.b()"));

        let ids: Vec<i64> = threads.entries("main").iter().map(|e| e.original_id.0).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert!(threads.contains("main", NodeId(5)));
        assert!(!threads.contains("other", NodeId(5)));
        assert!(threads.verify().is_empty());
    }

    #[test]
    fn cursor_is_clamped_on_removal_and_dropped_when_empty() {
        let mut threads = ThreadManager::new();
        threads.register("main", NodeId(1), "a.A.a()");
        threads.register("main", NodeId(2), "a.A.b()");
        assert_eq!(threads.current_index("main"), Some(0));
        assert!(threads.set_current_index("main", 1));
        assert!(!threads.set_current_index("main", 2));

        assert_eq!(threads.unregister("main", NodeId(2)).as_deref(), Some("a.A.b()"));
        assert_eq!(threads.current_index("main"), Some(0));
        assert!(threads.unregister("main", NodeId(2)).is_none());

        threads.unregister("main", NodeId(1));
        assert_eq!(threads.current_index("main"), None);
        assert_eq!(threads.max_index("main"), None);
        assert!(threads.verify().is_empty());
    }

    #[test]
    fn focus_colors_follow_id_range_order() {
        let mut threads = ThreadManager::new();
        let ranges = BTreeMap::from([
            ("b".to_string(), IdRange::new(NodeId(1), NodeId(10))),
            ("a".to_string(), IdRange::new(NodeId(11), NodeId(20))),
        ]);
        threads.assign_focus_colors(&ranges);
        let spectrum = generate_color_spectrum(2);
        assert_eq!(threads.focus_color("b"), spectrum[0]);
        assert_eq!(threads.focus_color("a"), spectrum[1]);
        assert_eq!(
            threads.focus_color("unknown"),
            crate::style::COLOR_FOCUS_BORDER
        );
    }
}
