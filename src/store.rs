//! Store facade tying revision allocation, commits, and reads together.

use crate::children::{self, Children};
use crate::commit::{ChangeOp, Commit};
use crate::docstore::{Collection, DocumentStore, MemoryDocumentStore, UpdateOp};
use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::revision::{Revision, RevisionGenerator};
use crate::types::{self, ScalarValue, MESSAGE_FIELD};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Identifier distinguishing this writer process from other cluster
    /// nodes; it becomes part of every allocated revision.
    pub cluster_id: u32,

    /// Node cache capacity, in entries.
    pub cache_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cluster_id: 0,
            cache_size: 1024,
        }
    }
}

/// The node store: entry point for commits and time-travel reads.
///
/// The backing [`DocumentStore`] is injected explicitly rather than held as
/// process-global state, so independent stores (and their backends) can
/// coexist in one process.
pub struct Store {
    store: Arc<dyn DocumentStore>,
    revisions: RevisionGenerator,

    /// Read-through cache keyed by (path, revision). Property projections
    /// are immutable once inserted (the history is append-only), but child
    /// counts are live, so a hit re-reads the counter before returning.
    node_cache: Mutex<LruCache<(String, Revision), Node>>,

    disposed: AtomicBool,
}

impl Store {
    /// Open a store over the given backend, bootstrapping the root node if
    /// this backend has never been used before.
    pub fn new(store: Arc<dyn DocumentStore>, config: StoreConfig) -> Result<Self> {
        let cache_size = NonZeroUsize::new(config.cache_size.max(1))
            .expect("cache size is at least one");
        let store = Self {
            store,
            revisions: RevisionGenerator::new(config.cluster_id),
            node_cache: Mutex::new(LruCache::new(cache_size)),
            disposed: AtomicBool::new(false),
        };
        store.init_root()?;
        Ok(store)
    }

    /// Store over the in-memory reference backend.
    pub fn in_memory(cluster_id: u32) -> Result<Self> {
        Self::new(
            Arc::new(MemoryDocumentStore::new()),
            StoreConfig {
                cluster_id,
                ..Default::default()
            },
        )
    }

    /// The injected backing store.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// A collision here means another store instance over the same backend
    /// already bootstrapped the root; that is fine.
    fn init_root(&self) -> Result<()> {
        let root = Node::new("/", self.revisions.next());
        self.store
            .create(Collection::Nodes, vec![root.as_operation(true)])?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(StoreError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Allocate a fresh revision for this process's cluster node id.
    pub fn new_revision(&self) -> Revision {
        self.revisions.next()
    }

    /// Commit an ordered list of structural changes under `base_path`.
    ///
    /// One new revision stamps the whole commit and is returned on success;
    /// from then on the commit is fully visible to any reader at that
    /// revision or later. On a conflict the revision is never returned and
    /// nothing the commit wrote is reachable. Retrying is the caller's
    /// responsibility, against a fresh base revision and change list.
    ///
    /// `message` is opaque audit metadata, stored but never interpreted.
    pub fn commit(
        &self,
        base_path: &str,
        ops: &[ChangeOp],
        base_revision: Option<Revision>,
        message: Option<&str>,
    ) -> Result<Revision> {
        self.ensure_open()?;
        let mut commit = Commit::new(self.store.as_ref(), self.revisions.next(), base_revision);
        commit.build(base_path, ops)?;
        let revision = commit.apply()?;
        if let Some(message) = message {
            // The node writes already applied; failing the whole call here
            // would hide a revision that is in fact committed.
            if let Err(err) = self.record_commit_message(revision, message) {
                warn!(revision = %revision, error = %err, "commit message write failed");
            }
        }
        Ok(revision)
    }

    /// Audit records live in the metadata collection, keyed by the revision
    /// string. Revisions are unique, so these creates never collide.
    fn record_commit_message(&self, revision: Revision, message: &str) -> Result<()> {
        let mut op = UpdateOp::new(revision.to_string(), true);
        op.set_map_entry(
            MESSAGE_FIELD,
            revision,
            ScalarValue::String(message.to_string()),
        );
        self.store.create(Collection::Metadata, vec![op])?;
        Ok(())
    }

    /// Commit message stored for `revision`, if any.
    pub fn commit_message(&self, revision: Revision) -> Result<Option<String>> {
        self.ensure_open()?;
        let Some(doc) = self
            .store
            .find(Collection::Metadata, &revision.to_string())?
        else {
            return Ok(None);
        };
        Ok(match doc.value_at(MESSAGE_FIELD, revision) {
            Some((_, ScalarValue::String(message))) => Some(message.clone()),
            _ => None,
        })
    }

    /// Resolve the node at `path` as visible at `revision`. Absence — the
    /// path never existed, or is tombstoned at that revision — is `Ok(None)`,
    /// not an error.
    pub fn get_node(&self, path: &str, revision: Revision) -> Result<Option<Node>> {
        self.ensure_open()?;

        let cache_key = (path.to_string(), revision);
        let cached = self.node_cache.lock().get(&cache_key).cloned();
        if let Some(mut node) = cached {
            trace!(path, revision = %revision, "node cache hit");
            // The cached property projection is final, but the child count
            // moves with later commits; re-read it so a warm hit and a cold
            // read at the same (path, revision) agree.
            let count = self
                .store
                .find(Collection::Nodes, path)?
                .map(|doc| doc.child_count())
                .unwrap_or(0);
            node.set_child_count(count);
            return Ok(Some(node));
        }

        let Some(doc) = self.store.find(Collection::Nodes, path)? else {
            return Ok(None);
        };
        let Some(node) = Node::from_document(&doc, revision) else {
            return Ok(None);
        };
        self.node_cache.lock().put(cache_key, node.clone());
        Ok(Some(node))
    }

    /// One page of `parent`'s direct children as of `revision`. See
    /// [`children::read_children`].
    pub fn read_children(
        &self,
        parent: &str,
        continuation: Option<&str>,
        revision: Revision,
        limit: usize,
    ) -> Result<Children> {
        self.ensure_open()?;
        children::read_children(self.store.as_ref(), parent, continuation, revision, limit)
    }

    /// Serialized representation of the node at `path`: its own properties
    /// in insertion order, then one entry per visible child, then
    /// `":childNodeCount"`. Child entries at depth 0 are empty stubs;
    /// `depth` governs how many levels below them are expanded. `offset`
    /// and `count` window the children at each level.
    pub fn get_nodes(
        &self,
        path: &str,
        revision: Revision,
        depth: u32,
        offset: usize,
        count: usize,
    ) -> Result<Option<String>> {
        self.ensure_open()?;
        let Some(node) = self.get_node(path, revision)? else {
            return Ok(None);
        };
        let mut out = String::new();
        self.render_node(&node, revision, depth, offset, count, &mut out)?;
        Ok(Some(out))
    }

    fn render_node(
        &self,
        node: &Node,
        revision: Revision,
        depth: u32,
        offset: usize,
        count: usize,
        out: &mut String,
    ) -> Result<()> {
        out.push('{');
        for (name, value) in node.properties() {
            if let Some(json) = value.to_json() {
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
                out.push_str(&serde_json::to_string(&json)?);
                out.push(',');
            }
        }
        let listing =
            self.read_children(node.path(), None, revision, offset.saturating_add(count))?;
        for child in listing.children.iter().skip(offset) {
            if depth == 0 {
                out.push_str(&serde_json::to_string(types::node_name(child))?);
                out.push_str(":{},");
            } else if let Some(child_node) = self.get_node(child, revision)? {
                out.push_str(&serde_json::to_string(types::node_name(child))?);
                out.push(':');
                self.render_node(&child_node, revision, depth - 1, 0, count, out)?;
                out.push(',');
            }
        }

        out.push_str("\":childNodeCount\":");
        out.push_str(&node.child_count().to_string());
        out.push('}');
        Ok(())
    }

    /// Release the node cache and backing-store resources. Safe to call
    /// more than once; later calls are no-ops. Subsequent operations fail
    /// with [`StoreError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.node_cache.lock().clear();
        self.store.dispose();
        debug!("store disposed");
    }
}
