//! # Grove
//!
//! A revision-addressed, multi-version tree node store: the storage core of
//! a hierarchical content repository. Many writers commit structural and
//! property changes to a tree while readers get a consistent point-in-time
//! view at any past revision.
//!
//! ## Core Concepts
//!
//! - **Revisions**: totally ordered (timestamp, counter, cluster id) stamps
//! - **Documents**: per-path, append-only property and existence histories
//! - **Commits**: optimistic multi-document writes with conflict detection
//! - **Time travel**: reads resolve each history to "latest at or below" a revision
//! - **Tombstones**: deletion is a history entry, never physical removal
//!
//! ## Example
//!
//! ```ignore
//! use grove::{ChangeOp, ScalarValue, Store};
//!
//! let store = Store::in_memory(0)?;
//!
//! // Commit a child of the root
//! let r1 = store.commit(
//!     "/",
//!     &[ChangeOp::add(
//!         "/test",
//!         vec![("name".into(), ScalarValue::from("Hello"))],
//!     )],
//!     None,
//!     None,
//! )?;
//!
//! // Read it back at that revision
//! let node = store.get_node("/test", r1)?.unwrap();
//! assert_eq!(node.property("name"), Some(&ScalarValue::from("Hello")));
//! ```

pub mod children;
pub mod commit;
pub mod docstore;
pub mod error;
pub mod node;
pub mod revision;
pub mod store;
pub mod types;

// Re-exports
pub use children::{read_children, Children};
pub use commit::{ChangeOp, Commit};
pub use docstore::{Collection, DocumentStore, FieldOp, MemoryDocumentStore, UpdateOp};
pub use error::{Result, StoreError};
pub use node::Node;
pub use revision::{Revision, RevisionGenerator};
pub use store::{Store, StoreConfig};
pub use types::{DocEntry, Document, ScalarValue, ValueHistory};
