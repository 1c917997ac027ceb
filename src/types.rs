//! Core value, document, and path types.

use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Existence history of a node. `Boolean(false)` marks the node alive as of
/// a revision, `Boolean(true)` is its tombstone.
pub const DELETED_FIELD: &str = "_deleted";

/// Direct-child counter of a node. Moved only by atomic increments, never
/// recomputed from a scan.
pub const CHILD_COUNT_FIELD: &str = "_childCount";

/// Commit message audit entry (metadata collection).
pub const MESSAGE_FIELD: &str = "_message";

/// A property value at one revision.
///
/// The closed scalar set stored in documents; `Tombstone` marks a property as
/// removed as of a revision without touching its earlier history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    String(String),
    Number(serde_json::Number),
    Boolean(bool),
    Null,
    Tombstone,
}

impl ScalarValue {
    /// JSON rendering for serialized node output. Tombstones render as
    /// nothing at all.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            ScalarValue::String(s) => Some(serde_json::Value::String(s.clone())),
            ScalarValue::Number(n) => Some(serde_json::Value::Number(n.clone())),
            ScalarValue::Boolean(b) => Some(serde_json::Value::Bool(*b)),
            ScalarValue::Null => Some(serde_json::Value::Null),
            ScalarValue::Tombstone => None,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        ScalarValue::Number(serde_json::Number::from(n))
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Boolean(b)
    }
}

/// Append-only mapping from revision to value.
pub type ValueHistory = BTreeMap<Revision, ScalarValue>;

/// One named slot in a document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DocEntry {
    /// Per-revision value history.
    History(ValueHistory),
    /// Atomic counter.
    Counter(i64),
}

/// A backing-store record: one tree path's full property and existence
/// history, keyed by the path.
///
/// Entries keep insertion order, which carries through to serialized node
/// output. Histories are append-only: normal operation never rewrites or
/// removes a revision entry, which is what makes reads time-travelable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    key: String,
    entries: Vec<(String, DocEntry)>,
}

impl Document {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entries: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Named entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DocEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn history(&self, field: &str) -> Option<&ValueHistory> {
        self.entries.iter().find_map(|(name, entry)| match entry {
            DocEntry::History(history) if name.as_str() == field => Some(history),
            _ => None,
        })
    }

    pub fn counter(&self, field: &str) -> i64 {
        self.entries
            .iter()
            .find_map(|(name, entry)| match entry {
                DocEntry::Counter(value) if name.as_str() == field => Some(*value),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// The entry at the latest revision at or below `revision` in a field's
    /// history.
    pub fn value_at(&self, field: &str, revision: Revision) -> Option<(Revision, &ScalarValue)> {
        let history = self.history(field)?;
        history
            .range(..=revision)
            .next_back()
            .map(|(rev, value)| (*rev, value))
    }

    /// Whether this path exists as a node at `revision`: the existence
    /// history must have an entry at or below `revision`, and that entry must
    /// not be a tombstone.
    pub fn is_visible_at(&self, revision: Revision) -> bool {
        matches!(
            self.value_at(DELETED_FIELD, revision),
            Some((_, ScalarValue::Boolean(false)))
        )
    }

    pub fn child_count(&self) -> i64 {
        self.counter(CHILD_COUNT_FIELD)
    }

    /// Highest revision stamped anywhere in this document's histories.
    pub fn last_modified(&self) -> Option<Revision> {
        self.entries
            .iter()
            .filter_map(|(_, entry)| match entry {
                DocEntry::History(history) => history.keys().next_back().copied(),
                DocEntry::Counter(_) => None,
            })
            .max()
    }

    fn slot_mut(&mut self, field: &str) -> Option<&mut DocEntry> {
        self.entries
            .iter_mut()
            .find(|(name, _)| name.as_str() == field)
            .map(|(_, entry)| entry)
    }

    pub(crate) fn set_map_entry(&mut self, field: &str, revision: Revision, value: ScalarValue) {
        if let Some(entry) = self.slot_mut(field) {
            match entry {
                DocEntry::History(history) => {
                    history.insert(revision, value);
                }
                DocEntry::Counter(_) => {
                    let mut history = ValueHistory::new();
                    history.insert(revision, value);
                    *entry = DocEntry::History(history);
                }
            }
            return;
        }
        let mut history = ValueHistory::new();
        history.insert(revision, value);
        self.entries.push((field.to_string(), DocEntry::History(history)));
    }

    pub(crate) fn increment(&mut self, field: &str, by: i64) {
        if let Some(entry) = self.slot_mut(field) {
            match entry {
                DocEntry::Counter(value) => *value += by,
                DocEntry::History(_) => *entry = DocEntry::Counter(by),
            }
            return;
        }
        self.entries.push((field.to_string(), DocEntry::Counter(by)));
    }

    pub(crate) fn remove_field(&mut self, field: &str) {
        self.entries.retain(|(name, _)| name.as_str() != field);
    }
}

// --- Path helpers ---

/// Parent of a path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Path of `name` as a child of `parent`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Trailing name segment of a path.
pub fn node_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Whether `ancestor` is `path` itself or one of its ancestors.
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
