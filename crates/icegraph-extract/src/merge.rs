//! Merging body-text and table entity bags.
//!
//! Both inputs are already in the canonical flat-list-per-kind shape, so the
//! merge is a plain per-kind concatenation: body entities first, then table
//! entities. The order is documented and stable so markup rendering (and the
//! tests over it) stay deterministic.

use crate::EntityBag;

/// Merge one document's body and table bags.
///
/// An extractor that failed upstream contributes an empty bag; a partially
/// extracted document still merges and ingests with whatever it has. Merging
/// with an empty bag is the identity.
pub fn merge_bags(body: EntityBag, table: EntityBag) -> EntityBag {
    let mut merged = body;
    for entity in table.into_flat() {
        merged.push(entity);
    }
    merged
}
