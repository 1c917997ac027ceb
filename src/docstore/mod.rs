//! Pluggable document persistence.
//!
//! The [`DocumentStore`] trait is the only thing the rest of the crate knows
//! about the backing database: per-document atomic create/find/update over
//! named collections, plus an ordered key-range scan. Multi-document
//! consistency is layered on top by the commit engine; nothing here is
//! transactional across documents.

mod memory;
mod update;

pub use memory::MemoryDocumentStore;
pub use update::{FieldOp, UpdateOp};

use crate::error::Result;
use crate::types::Document;
use std::fmt;

/// Named collection in the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Tree node documents, keyed by path.
    Nodes,
    /// Cluster bookkeeping and commit audit records.
    Metadata,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Nodes => "nodes",
            Collection::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal persistence primitive offering per-document atomic operations.
pub trait DocumentStore: Send + Sync {
    /// Atomically insert all listed documents as new. Returns `false`
    /// without creating anything when any target key already exists.
    ///
    /// The all-or-nothing batch guarantee is required of every
    /// implementation. Adapters over databases with only single-document
    /// atomicity must emulate it: attempt each insert, and on the first
    /// collision stop and report failure, leaving earlier siblings in place
    /// rather than unwinding them. Such leftovers are harmless orphans —
    /// the revision that stamped them is never returned to any caller, so
    /// no reader ever resolves them. This emulation is not a transaction
    /// and must not be mistaken for one.
    fn create(&self, collection: Collection, ops: Vec<UpdateOp>) -> Result<bool>;

    fn find(&self, collection: Collection, key: &str) -> Result<Option<Document>>;

    /// Atomic single-document read-modify-write. Returns the previous
    /// document, or `None` if the key was absent (the document is created in
    /// that case). A descriptor's field operations are applied in full or
    /// not at all.
    fn find_and_update(
        &self,
        collection: Collection,
        key: &str,
        op: UpdateOp,
    ) -> Result<Option<Document>>;

    /// Documents with keys strictly between `from_key` and `to_key`, in
    /// lexicographic key order, at most `limit` of them.
    fn query(
        &self,
        collection: Collection,
        from_key: &str,
        to_key: &str,
        limit: usize,
    ) -> Result<Vec<Document>>;

    /// Physically remove a document. Store-level cleanup only; node deletion
    /// is a tombstone write and never goes through here.
    fn remove(&self, collection: Collection, key: &str) -> Result<()>;

    /// Release backing resources. Calling more than once is a no-op.
    fn dispose(&self) {}
}
