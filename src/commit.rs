//! The commit engine: translating structural changes into update
//! descriptors and applying them against the document store.

use crate::children;
use crate::docstore::{Collection, DocumentStore, UpdateOp};
use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::revision::Revision;
use crate::types::{self, Document, ScalarValue, CHILD_COUNT_FIELD, DELETED_FIELD};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// A primitive structural change within one commit.
///
/// Paths are absolute. The textual diff grammar producing these lives
/// outside this crate; the engine consumes only the parsed list.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeOp {
    /// Create a node with initial properties.
    AddNode {
        path: String,
        properties: Vec<(String, ScalarValue)>,
    },
    /// Set a property; `None` removes it.
    SetProperty {
        path: String,
        name: String,
        value: Option<ScalarValue>,
    },
    /// Tombstone a node and every descendant visible at the commit revision.
    RemoveNode { path: String },
}

impl ChangeOp {
    pub fn add(path: impl Into<String>, properties: Vec<(String, ScalarValue)>) -> Self {
        ChangeOp::AddNode {
            path: path.into(),
            properties,
        }
    }

    pub fn set(
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<ScalarValue>,
    ) -> Self {
        ChangeOp::SetProperty {
            path: path.into(),
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove_property(path: impl Into<String>, name: impl Into<String>) -> Self {
        ChangeOp::SetProperty {
            path: path.into(),
            name: name.into(),
            value: None,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        ChangeOp::RemoveNode { path: path.into() }
    }

    fn path(&self) -> &str {
        match self {
            ChangeOp::AddNode { path, .. }
            | ChangeOp::SetProperty { path, .. }
            | ChangeOp::RemoveNode { path } => path,
        }
    }
}

/// Translates one ordered change list into per-document update descriptors,
/// then applies them.
///
/// One revision stamps the whole commit. No locks are held across paths:
/// new documents go through a single batch `create`, existing documents
/// through one `find_and_update` each. A batch collision means a racing
/// commit claimed a path first; the engine aborts with a retryable conflict
/// and its revision is never returned, so nothing it may have stamped is
/// ever reachable by a reader.
pub struct Commit<'a> {
    store: &'a dyn DocumentStore,
    revision: Revision,
    base_revision: Option<Revision>,
    /// One descriptor per affected path. Key order puts parents before
    /// their children.
    operations: BTreeMap<String, UpdateOp>,
    /// Paths added (or re-added) earlier in this commit.
    created: HashSet<String>,
    /// Paths tombstoned earlier in this commit, subtree roots and their
    /// descendants alike.
    removed: HashSet<String>,
}

impl<'a> Commit<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        revision: Revision,
        base_revision: Option<Revision>,
    ) -> Self {
        Self {
            store,
            revision,
            base_revision,
            operations: BTreeMap::new(),
            created: HashSet::new(),
            removed: HashSet::new(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Translate `ops` into descriptors, in order.
    ///
    /// Validation is all-or-nothing and happens entirely here: any invalid
    /// operation rejects the whole commit before a single document write is
    /// attempted.
    pub fn build(&mut self, base_path: &str, ops: &[ChangeOp]) -> Result<()> {
        let base = if base_path.is_empty() { "/" } else { base_path };
        if !valid_path(base) {
            return Err(invalid(format!("invalid base path: {:?}", base)));
        }

        for op in ops {
            let path = op.path();
            if !valid_path(path) {
                return Err(invalid(format!("invalid path: {:?}", path)));
            }
            if !types::is_ancestor_or_self(base, path) {
                return Err(invalid(format!(
                    "path {} is outside the commit base {}",
                    path, base
                )));
            }
            match op {
                ChangeOp::AddNode { path, properties } => self.add_node(path, properties)?,
                ChangeOp::SetProperty { path, name, value } => {
                    self.set_property(path, name, value.as_ref())?
                }
                ChangeOp::RemoveNode { path } => self.remove_node(path)?,
            }
        }
        Ok(())
    }

    fn add_node(&mut self, path: &str, properties: &[(String, ScalarValue)]) -> Result<()> {
        let parent = types::parent_path(path)
            .ok_or_else(|| invalid("cannot add the root node".to_string()))?;
        if self.operations.contains_key(path) {
            return Err(invalid(format!("path touched twice in one commit: {}", path)));
        }
        if self.removed_covers(parent) {
            return Err(invalid(format!(
                "parent was removed in the same commit: {}",
                parent
            )));
        }
        if !self.created.contains(parent) && self.find_visible(parent)?.is_none() {
            return Err(invalid(format!("parent does not exist: {}", parent)));
        }

        // A previously deleted path still has a document; re-adding it only
        // changes visibility, so it must go through an update, not a create.
        // A path that is already visible means another commit claimed it;
        // that is the same retryable outcome as losing the create batch.
        let is_new = match self.store.find(Collection::Nodes, path)? {
            None => true,
            Some(doc) if doc.is_visible_at(self.revision) => {
                return Err(StoreError::Conflict(format!(
                    "node already exists: {}",
                    path
                )));
            }
            Some(doc) => {
                self.check_base_revision(&doc)?;
                false
            }
        };

        let mut node = Node::new(path, self.revision);
        for (name, value) in properties {
            if name.starts_with('_') {
                return Err(invalid(format!("reserved property name: {}", name)));
            }
            node.set_property(name.clone(), value.clone());
        }
        self.operations
            .insert(path.to_string(), node.as_operation(is_new));
        self.op_mut(parent).increment(CHILD_COUNT_FIELD, 1);
        self.created.insert(path.to_string());
        Ok(())
    }

    fn set_property(&mut self, path: &str, name: &str, value: Option<&ScalarValue>) -> Result<()> {
        if name.starts_with('_') {
            return Err(invalid(format!("reserved property name: {}", name)));
        }
        if self.removed_covers(path) {
            return Err(invalid(format!(
                "node was removed in the same commit: {}",
                path
            )));
        }
        if !self.created.contains(path) {
            let doc = self
                .find_visible(path)?
                .ok_or_else(|| invalid(format!("node does not exist: {}", path)))?;
            self.check_base_revision(&doc)?;
        }
        let revision = self.revision;
        self.op_mut(path)
            .set_map_entry(name, revision, value.cloned().unwrap_or(ScalarValue::Tombstone));
        Ok(())
    }

    fn remove_node(&mut self, path: &str) -> Result<()> {
        if self.created.contains(path) {
            return Err(invalid(format!(
                "cannot remove a node added in the same commit: {}",
                path
            )));
        }
        if self.removed_covers(path) {
            return Err(invalid(format!(
                "node was already removed in the same commit: {}",
                path
            )));
        }
        if let Some(added) = self
            .created
            .iter()
            .find(|p| types::is_ancestor_or_self(path, p.as_str()))
        {
            return Err(invalid(format!(
                "cannot remove {}: {} was added under it in the same commit",
                path, added
            )));
        }
        let parent = types::parent_path(path)
            .ok_or_else(|| invalid("cannot remove the root node".to_string()))?;
        let doc = self
            .find_visible(path)?
            .ok_or_else(|| invalid(format!("node does not exist: {}", path)))?;
        self.check_base_revision(&doc)?;

        self.tombstone_subtree(path)?;
        self.op_mut(parent).increment(CHILD_COUNT_FIELD, -1);
        Ok(())
    }

    /// Tombstone `path` and, depth-first, every descendant visible at the
    /// commit revision. Nothing stamped with the commit revision has been
    /// applied yet, so reading at it still sees the pre-commit state.
    fn tombstone_subtree(&mut self, path: &str) -> Result<()> {
        let revision = self.revision;
        self.op_mut(path)
            .set_map_entry(DELETED_FIELD, revision, ScalarValue::Boolean(true));
        self.removed.insert(path.to_string());
        let listing = children::read_children(self.store, path, None, revision, usize::MAX)?;
        for child in listing.children {
            self.tombstone_subtree(&child)?;
        }
        Ok(())
    }

    /// Whether `path` falls inside a subtree already tombstoned by this
    /// commit.
    fn removed_covers(&self, path: &str) -> bool {
        self.removed
            .iter()
            .any(|r| types::is_ancestor_or_self(r, path))
    }

    fn op_mut(&mut self, path: &str) -> &mut UpdateOp {
        self.operations
            .entry(path.to_string())
            .or_insert_with(|| UpdateOp::new(path, false))
    }

    fn find_visible(&self, path: &str) -> Result<Option<Document>> {
        Ok(self
            .store
            .find(Collection::Nodes, path)?
            .filter(|doc| doc.is_visible_at(self.revision)))
    }

    /// Optimistic conflict check: when the caller pinned a base revision,
    /// any touched document modified after it fails the commit.
    fn check_base_revision(&self, doc: &Document) -> Result<()> {
        if let (Some(base), Some(last)) = (self.base_revision, doc.last_modified()) {
            if last > base {
                return Err(StoreError::Conflict(format!(
                    "{} was modified at {} after base revision {}",
                    doc.key(),
                    last,
                    base
                )));
            }
        }
        Ok(())
    }

    /// Apply the accumulated descriptors: one batch `create` for new
    /// documents, then one `find_and_update` per existing document. On a
    /// create collision the commit aborts and the revision is never
    /// returned.
    pub fn apply(self) -> Result<Revision> {
        let Commit {
            store,
            revision,
            operations,
            ..
        } = self;
        let (new_ops, update_ops): (Vec<UpdateOp>, Vec<UpdateOp>) =
            operations.into_values().partition(|op| op.is_new());

        if !new_ops.is_empty() && !store.create(Collection::Nodes, new_ops)? {
            warn!(revision = %revision, "create batch collided with a concurrent commit");
            return Err(StoreError::Conflict(
                "a concurrent commit already created one of the new paths".to_string(),
            ));
        }
        for op in update_ops {
            let key = op.key().to_string();
            store.find_and_update(Collection::Nodes, &key, op)?;
        }

        debug!(revision = %revision, "commit applied");
        Ok(revision)
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::InvalidOperation(message)
}

fn valid_path(path: &str) -> bool {
    path == "/" || (path.starts_with('/') && !path.ends_with('/') && !path.contains("//"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;
    use crate::revision::RevisionGenerator;

    fn rooted_store() -> (MemoryDocumentStore, RevisionGenerator) {
        let store = MemoryDocumentStore::new();
        let gen = RevisionGenerator::new(0);
        let root = Node::new("/", gen.next());
        assert!(store
            .create(Collection::Nodes, vec![root.as_operation(true)])
            .unwrap());
        (store, gen)
    }

    fn visible(store: &MemoryDocumentStore, path: &str, revision: Revision) -> bool {
        store
            .find(Collection::Nodes, path)
            .unwrap()
            .is_some_and(|doc| doc.is_visible_at(revision))
    }

    #[test]
    fn test_add_updates_parent_child_count() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit
            .build(
                "/",
                &[
                    ChangeOp::add("/a", vec![]),
                    ChangeOp::add("/a/b", vec![]),
                    ChangeOp::add("/a/c", vec![]),
                ],
            )
            .unwrap();
        let rev = commit.apply().unwrap();

        assert!(visible(&store, "/a", rev));
        assert!(visible(&store, "/a/b", rev));
        let root = store.find(Collection::Nodes, "/").unwrap().unwrap();
        assert_eq!(root.child_count(), 1);
        let a = store.find(Collection::Nodes, "/a").unwrap().unwrap();
        assert_eq!(a.child_count(), 2);
    }

    #[test]
    fn test_add_requires_existing_parent() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        let err = commit
            .build("/", &[ChangeOp::add("/missing/child", vec![])])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));

        // Rejected during translation: nothing was written.
        assert!(store
            .find(Collection::Nodes, "/missing/child")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_remove_tombstones_visible_descendants() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit
            .build(
                "/",
                &[
                    ChangeOp::add("/a", vec![]),
                    ChangeOp::add("/a/b", vec![]),
                    ChangeOp::add("/a/b/c", vec![]),
                ],
            )
            .unwrap();
        let before = commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit.build("/", &[ChangeOp::remove("/a")]).unwrap();
        let after = commit.apply().unwrap();

        for path in ["/a", "/a/b", "/a/b/c"] {
            assert!(visible(&store, path, before));
            assert!(!visible(&store, path, after));
        }
        let root = store.find(Collection::Nodes, "/").unwrap().unwrap();
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn test_racing_creates_conflict_deterministically() {
        let (store, gen) = rooted_store();

        // Both commits validate against the same pre-commit state before
        // either applies, which is exactly the racing-writer interleaving.
        let mut first = Commit::new(&store, gen.next(), None);
        first.build("/", &[ChangeOp::add("/same", vec![])]).unwrap();
        let mut second = Commit::new(&store, gen.next(), None);
        second.build("/", &[ChangeOp::add("/same", vec![])]).unwrap();

        let winner = first.apply().unwrap();
        let err = second.apply().unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(visible(&store, "/same", winner));
    }

    #[test]
    fn test_late_add_of_existing_path_conflicts() {
        let (store, gen) = rooted_store();

        let mut first = Commit::new(&store, gen.next(), None);
        first
            .build("/", &[ChangeOp::add("/contested", vec![])])
            .unwrap();
        first.apply().unwrap();

        // A racing writer that only starts translating after the winner
        // applied gets the same retryable conflict as a batch collision.
        let mut second = Commit::new(&store, gen.next(), None);
        let err = second
            .build("/", &[ChangeOp::add("/contested", vec![])])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_remove_rejects_subtree_added_in_same_commit() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit.build("/", &[ChangeOp::add("/a", vec![])]).unwrap();
        commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        let err = commit
            .build(
                "/",
                &[ChangeOp::add("/a/c", vec![]), ChangeOp::remove("/a")],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));

        // Rejected during translation: /a/c never reached the store.
        assert!(store.find(Collection::Nodes, "/a/c").unwrap().is_none());
    }

    #[test]
    fn test_remove_inside_removed_subtree_rejected() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit
            .build(
                "/",
                &[ChangeOp::add("/a", vec![]), ChangeOp::add("/a/b", vec![])],
            )
            .unwrap();
        commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        let err = commit
            .build("/", &[ChangeOp::remove("/a"), ChangeOp::remove("/a/b")])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn test_ops_under_removed_subtree_rejected() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit.build("/", &[ChangeOp::add("/a", vec![])]).unwrap();
        commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        let err = commit
            .build(
                "/",
                &[ChangeOp::remove("/a"), ChangeOp::add("/a/new", vec![])],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));

        let mut commit = Commit::new(&store, gen.next(), None);
        let err = commit
            .build(
                "/",
                &[ChangeOp::remove("/a"), ChangeOp::set("/a", "x", 1i64)],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }

    #[test]
    fn test_base_revision_conflict() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit
            .build("/", &[ChangeOp::add("/a", vec![])])
            .unwrap();
        let base = commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit
            .build("/", &[ChangeOp::set("/a", "x", 1i64)])
            .unwrap();
        commit.apply().unwrap();

        // The node moved past `base`, so a commit pinned to it must fail.
        let mut stale = Commit::new(&store, gen.next(), Some(base));
        let err = stale
            .build("/", &[ChangeOp::set("/a", "y", 2i64)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_readd_after_delete_is_an_update() {
        let (store, gen) = rooted_store();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit.build("/", &[ChangeOp::add("/a", vec![])]).unwrap();
        commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit.build("/", &[ChangeOp::remove("/a")]).unwrap();
        let deleted = commit.apply().unwrap();

        let mut commit = Commit::new(&store, gen.next(), None);
        commit
            .build("/", &[ChangeOp::add("/a", vec![("v".to_string(), 2i64.into())])])
            .unwrap();
        let readded = commit.apply().unwrap();

        assert!(!visible(&store, "/a", deleted));
        assert!(visible(&store, "/a", readded));
    }

    #[test]
    fn test_reserved_property_names_rejected() {
        let (store, gen) = rooted_store();
        let mut commit = Commit::new(&store, gen.next(), None);
        let err = commit
            .build("/", &[ChangeOp::set("/", "_deleted", true)])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperation(_)));
    }
}
