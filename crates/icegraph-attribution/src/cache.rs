//! Per-query confidence cache.
//!
//! Built in a single pass over all retrieved chunks before any lookup, and
//! scoped to one query: never shared across queries, never mutated after
//! construction. The only way to obtain a cache is [`ConfidenceCache::build`],
//! which is what makes construction-before-use a property of the types
//! instead of a property of statement ordering. The historical failure mode
//! was a module-level cache read before it was written, with the language's
//! scoping rules hiding the hoisted use-before-definition.

use std::collections::HashMap;
use tracing::debug;

use icegraph_markup::decode_entities;

/// Entity-name → maximum markup-derived confidence seen across all chunks.
#[derive(Debug, Clone)]
pub struct ConfidenceCache {
    by_name: HashMap<String, f64>,
}

/// Cache keys are case-insensitive, whitespace-collapsed entity names.
fn cache_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ConfidenceCache {
    /// Build the cache from every chunk of one query's retrieval set.
    pub fn build<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
        let mut by_name: HashMap<String, f64> = HashMap::new();
        for chunk in chunks {
            for entity in decode_entities(chunk) {
                let key = cache_key(&entity.name);
                let slot = by_name.entry(key).or_insert(entity.confidence);
                if entity.confidence > *slot {
                    *slot = entity.confidence;
                }
            }
        }
        debug!(entries = by_name.len(), "confidence cache built");
        Self { by_name }
    }

    /// Markup-derived confidence for an entity name, if any chunk carried it.
    pub fn lookup(&self, entity_name: &str) -> Option<f64> {
        self.by_name.get(&cache_key(entity_name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
