//! Update descriptors: buildable mutations of a single document.

use crate::revision::Revision;
use crate::types::{Document, ScalarValue};
use serde::{Deserialize, Serialize};

/// One field operation within an [`UpdateOp`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldOp {
    /// Write a value into the field's revision history.
    SetMapEntry {
        revision: Revision,
        value: ScalarValue,
    },
    /// Move the field's counter by a delta.
    Increment { by: i64 },
    /// Drop the field entirely (store-level cleanup).
    Remove,
}

/// A buildable, serializable description of one document's mutation.
///
/// A descriptor targets exactly one key, is built once per affected path per
/// commit attempt, and is applied atomically to its document. After a failed
/// `create`, the retry path re-derives fresh descriptors instead of reusing
/// these, so counter increments can never be applied twice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateOp {
    key: String,
    is_new: bool,
    ops: Vec<(String, FieldOp)>,
}

impl UpdateOp {
    pub fn new(key: impl Into<String>, is_new: bool) -> Self {
        Self {
            key: key.into(),
            is_new,
            ops: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this descriptor creates its document rather than updating an
    /// existing one.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Accumulated field operations, in build order.
    pub fn operations(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    pub fn set_map_entry(
        &mut self,
        field: impl Into<String>,
        revision: Revision,
        value: ScalarValue,
    ) {
        self.ops
            .push((field.into(), FieldOp::SetMapEntry { revision, value }));
    }

    pub fn increment(&mut self, field: impl Into<String>, by: i64) {
        self.ops.push((field.into(), FieldOp::Increment { by }));
    }

    pub fn remove(&mut self, field: impl Into<String>) {
        self.ops.push((field.into(), FieldOp::Remove));
    }

    /// Apply every field operation to `doc`, in build order.
    pub(crate) fn apply_to(&self, doc: &mut Document) {
        for (field, op) in &self.ops {
            match op {
                FieldOp::SetMapEntry { revision, value } => {
                    doc.set_map_entry(field, *revision, value.clone())
                }
                FieldOp::Increment { by } => doc.increment(field, *by),
                FieldOp::Remove => doc.remove_field(field),
            }
        }
    }
}
