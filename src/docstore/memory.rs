//! In-memory reference implementation of the document store.

use super::{Collection, DocumentStore, UpdateOp};
use crate::error::Result;
use crate::types::Document;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound::Excluded;

/// Reference store backed by ordered in-memory maps.
///
/// One write lock per collection makes the batch `create` genuinely
/// all-or-nothing here, which real database adapters may only be able to
/// emulate (see [`DocumentStore::create`]). Also the test backend.
#[derive(Default)]
pub struct MemoryDocumentStore {
    nodes: RwLock<BTreeMap<String, Document>>,
    metadata: RwLock<BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, collection: Collection) -> &RwLock<BTreeMap<String, Document>> {
        match collection {
            Collection::Nodes => &self.nodes,
            Collection::Metadata => &self.metadata,
        }
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.collection(collection).read().len()
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create(&self, collection: Collection, ops: Vec<UpdateOp>) -> Result<bool> {
        let mut map = self.collection(collection).write();
        if ops.iter().any(|op| map.contains_key(op.key())) {
            return Ok(false);
        }
        for op in ops {
            let mut doc = Document::new(op.key());
            op.apply_to(&mut doc);
            map.insert(op.key().to_string(), doc);
        }
        Ok(true)
    }

    fn find(&self, collection: Collection, key: &str) -> Result<Option<Document>> {
        Ok(self.collection(collection).read().get(key).cloned())
    }

    fn find_and_update(
        &self,
        collection: Collection,
        key: &str,
        op: UpdateOp,
    ) -> Result<Option<Document>> {
        let mut map = self.collection(collection).write();
        let previous = map.get(key).cloned();
        let doc = map
            .entry(key.to_string())
            .or_insert_with(|| Document::new(key));
        op.apply_to(doc);
        Ok(previous)
    }

    fn query(
        &self,
        collection: Collection,
        from_key: &str,
        to_key: &str,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let map = self.collection(collection).read();
        Ok(map
            .range::<str, _>((Excluded(from_key), Excluded(to_key)))
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    fn remove(&self, collection: Collection, key: &str) -> Result<()> {
        self.collection(collection).write().remove(key);
        Ok(())
    }

    fn dispose(&self) {
        self.nodes.write().clear();
        self.metadata.write().clear();
    }
}
