//! In-memory projection of one tree path at a revision.

use crate::docstore::UpdateOp;
use crate::revision::Revision;
use crate::types::{Document, ScalarValue, DELETED_FIELD};

/// A read-time view of a node: path, revision, the property values visible
/// at that revision, and the direct-child count.
///
/// A node is a projection, not a stored entity. It is built either fresh
/// (while assembling a commit) or from a [`Document`] through
/// [`Node::from_document`].
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    path: String,
    revision: Revision,
    properties: Vec<(String, ScalarValue)>,
    child_count: i64,
}

impl Node {
    /// A fresh node carrying no properties yet.
    pub fn new(path: impl Into<String>, revision: Revision) -> Self {
        Self {
            path: path.into(),
            revision,
            properties: Vec::new(),
            child_count: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn child_count(&self) -> i64 {
        self.child_count
    }

    /// Child counts are live counters, not part of the revisioned history;
    /// cached projections overwrite theirs with a fresh value on read.
    pub(crate) fn set_child_count(&mut self, count: i64) {
        self.child_count = count;
    }

    /// Properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn property(&self, name: &str) -> Option<&ScalarValue> {
        self.properties
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, value)| value)
    }

    /// Set a property, keeping first-set order.
    pub fn set_property(&mut self, name: impl Into<String>, value: ScalarValue) {
        let name = name.into();
        if let Some(slot) = self.properties.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.properties.push((name, value));
        }
    }

    /// Project the visible state of `doc` at `revision`.
    ///
    /// Each property resolves independently to its value at the latest
    /// revision at or below `revision`, so a node can mix long-unchanged
    /// values with one freshly written property in a single view. Returns
    /// `None` when the node does not exist at `revision`: the existence
    /// history has no entry at or below it, or the latest such entry is a
    /// tombstone.
    pub fn from_document(doc: &Document, revision: Revision) -> Option<Node> {
        if !doc.is_visible_at(revision) {
            return None;
        }

        let mut properties = Vec::new();
        for (name, _) in doc.entries() {
            if name.starts_with('_') {
                continue;
            }
            match doc.value_at(name, revision) {
                Some((_, ScalarValue::Tombstone)) | None => {}
                Some((_, value)) => properties.push((name.to_string(), value.clone())),
            }
        }

        Some(Node {
            path: doc.key().to_string(),
            revision,
            properties,
            child_count: doc.child_count(),
        })
    }

    /// Serialize this node's in-memory state into an update descriptor:
    /// every property plus the node's own existence stamp, all keyed by the
    /// node's revision.
    pub fn as_operation(&self, is_new: bool) -> UpdateOp {
        let mut op = UpdateOp::new(self.path.clone(), is_new);
        for (name, value) in &self.properties {
            op.set_map_entry(name.clone(), self.revision, value.clone());
        }
        op.set_map_entry(DELETED_FIELD, self.revision, ScalarValue::Boolean(false));
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CHILD_COUNT_FIELD;

    fn rev(n: u64) -> Revision {
        Revision::new(n, 0, 0)
    }

    fn live_doc(key: &str, at: Revision) -> Document {
        let mut doc = Document::new(key);
        doc.set_map_entry(DELETED_FIELD, at, ScalarValue::Boolean(false));
        doc
    }

    #[test]
    fn test_projection_mixes_property_revisions() {
        let mut doc = live_doc("/a", rev(1));
        doc.set_map_entry("old", rev(1), ScalarValue::from("stable"));
        doc.set_map_entry("hot", rev(1), ScalarValue::from("v1"));
        doc.set_map_entry("hot", rev(5), ScalarValue::from("v2"));

        let node = Node::from_document(&doc, rev(5)).unwrap();
        assert_eq!(node.property("old"), Some(&ScalarValue::from("stable")));
        assert_eq!(node.property("hot"), Some(&ScalarValue::from("v2")));

        let node = Node::from_document(&doc, rev(4)).unwrap();
        assert_eq!(node.property("hot"), Some(&ScalarValue::from("v1")));
    }

    #[test]
    fn test_projection_hides_tombstoned_property() {
        let mut doc = live_doc("/a", rev(1));
        doc.set_map_entry("gone", rev(1), ScalarValue::from("x"));
        doc.set_map_entry("gone", rev(3), ScalarValue::Tombstone);

        let node = Node::from_document(&doc, rev(2)).unwrap();
        assert_eq!(node.property("gone"), Some(&ScalarValue::from("x")));

        let node = Node::from_document(&doc, rev(3)).unwrap();
        assert_eq!(node.property("gone"), None);
    }

    #[test]
    fn test_projection_respects_existence() {
        let mut doc = live_doc("/a", rev(2));
        doc.set_map_entry(DELETED_FIELD, rev(6), ScalarValue::Boolean(true));

        assert!(Node::from_document(&doc, rev(1)).is_none());
        assert!(Node::from_document(&doc, rev(2)).is_some());
        assert!(Node::from_document(&doc, rev(5)).is_some());
        assert!(Node::from_document(&doc, rev(6)).is_none());
    }

    #[test]
    fn test_projection_skips_system_fields() {
        let mut doc = live_doc("/a", rev(1));
        doc.increment(CHILD_COUNT_FIELD, 2);

        let node = Node::from_document(&doc, rev(1)).unwrap();
        assert_eq!(node.properties().count(), 0);
        assert_eq!(node.child_count(), 2);
    }

    #[test]
    fn test_as_operation_stamps_every_field() {
        let mut node = Node::new("/a", rev(7));
        node.set_property("name", ScalarValue::from("hello"));

        let op = node.as_operation(true);
        assert!(op.is_new());
        assert_eq!(op.key(), "/a");

        let mut doc = Document::new("/a");
        op.apply_to(&mut doc);
        assert!(doc.is_visible_at(rev(7)));
        assert_eq!(
            doc.value_at("name", rev(7)),
            Some((rev(7), &ScalarValue::from("hello")))
        );
    }
}
