//! Revision-consistent, paginated enumeration of a node's direct children.

use crate::docstore::{Collection, DocumentStore};
use crate::error::Result;
use crate::revision::Revision;

/// One page of a child listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Children {
    /// Full child paths, lexicographically ordered by child name.
    pub children: Vec<String>,
    /// Whether more children exist beyond this page.
    pub has_more: bool,
}

/// Read one page of `parent`'s direct children as of `revision`.
///
/// Candidates come from a key-range scan over the backing store; the
/// continuation token (the last child *name* already seen) folds into the
/// exclusive lower bound, so resuming never re-reads a page. Candidates are
/// filtered structurally to direct children and by visibility at `revision`.
///
/// The listing is anchored to `revision`, not to current store state:
/// children committed after `revision` never appear, and children deleted
/// after `revision` still do.
pub fn read_children(
    store: &dyn DocumentStore,
    parent: &str,
    continuation: Option<&str>,
    revision: Revision,
    limit: usize,
) -> Result<Children> {
    let (prefix, upper) = descendant_key_range(parent);
    let from = match continuation {
        Some(name) if !name.is_empty() => format!("{}{}", prefix, name),
        _ => prefix.clone(),
    };

    let mut children = Vec::new();
    let mut has_more = false;
    // The scan range also yields deeper descendants and invisible nodes, so
    // the page size cannot be pushed down into the query limit.
    for doc in store.query(Collection::Nodes, &from, &upper, usize::MAX)? {
        if !is_direct_child(doc.key(), &prefix) {
            continue;
        }
        if !doc.is_visible_at(revision) {
            continue;
        }
        if children.len() == limit {
            has_more = true;
            break;
        }
        children.push(doc.key().to_string());
    }

    Ok(Children { children, has_more })
}

/// Exclusive key range bracketing every descendant of `parent`.
fn descendant_key_range(parent: &str) -> (String, String) {
    let prefix = if parent == "/" {
        "/".to_string()
    } else {
        format!("{}/", parent)
    };
    let mut upper = prefix.clone();
    upper.pop();
    upper.push('0'); // the key byte just after '/'
    (prefix, upper)
}

fn is_direct_child(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}
