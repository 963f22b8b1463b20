//! Entity extraction for Icegraph
//!
//! Turns heterogeneous inputs into one canonical entity shape:
//! - body text (email bodies, attachment-extracted prose) via regex/keyword
//!   patterns with heuristic confidence scoring,
//! - structured tables (rows x period-columns) via sign-preserving numeric
//!   parsing with mandatory ticker linkage.
//!
//! Every module boundary speaks [`EntityBag`]: a flat list of tagged
//! [`Entity`] values per kind. Externally-shaped data (nested maps, untagged
//! lists) is normalized the moment it arrives, never mid-pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use icegraph_markup::{Entity, EntityKind, EntitySource, PERIOD_UNSPECIFIED, TICKER_NA};

pub mod body;
pub mod merge;
pub mod numeric;
pub mod table;

pub use body::{extract_body_entities, BodyContext};
pub use merge::merge_bags;
pub use numeric::{parse_signed, NumberUnit, ParsedNumber};
pub use table::{extract_table_entities, Table, TableContext};

// ============================================================================
// Extractor configuration
// ============================================================================

/// Tunables shared by both extractors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Entities scoring below this are dropped before merge, with a log line.
    /// They are never carried forward at a silently-defaulted confidence.
    ///
    /// Lowered from an earlier 0.7 after recall testing against held-out
    /// table fixtures; see `table::tests::recall_baseline_on_earnings_table`.
    pub min_confidence: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

/// Confidence scoring constants, shared by both extractors so the heuristic
/// stays a single documented formula rather than per-call-site magic numbers.
pub mod scoring {
    /// Every accepted match starts here.
    pub const BASE: f64 = 0.5;
    /// Bonus when the match came from a named keyword-category pattern.
    pub const NAMED_CATEGORY_BONUS: f64 = 0.2;
    /// Bonus when a table value parses as a number, whether it carries
    /// explicit financial formatting (%, $, billions/millions) or is a bare
    /// numeral. Bare numerals earn the same bonus: requiring unit suffixes
    /// rejected most valid plain-number metrics in common table styles.
    pub const VALUE_FORMAT_BONUS: f64 = 0.2;
    /// Bonus when every expected subfield (value, period, ticker) is present.
    pub const COMPLETENESS_BONUS: f64 = 0.05;
}

// ============================================================================
// Entity bag
// ============================================================================

/// The per-document collection of extracted entities, keyed by kind.
///
/// This is the only container shape that crosses module boundaries: a flat
/// `Vec<Entity>` per kind, each entity tagged with its own `kind`. Insertion
/// order within a kind is preserved, which the merger relies on for its
/// documented body-first ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBag {
    by_kind: BTreeMap<EntityKind, Vec<Entity>>,
}

impl EntityBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a tagged flat list into the canonical per-kind shape.
    pub fn from_flat(entities: Vec<Entity>) -> Self {
        let mut bag = Self::new();
        for entity in entities {
            bag.push(entity);
        }
        bag
    }

    pub fn push(&mut self, entity: Entity) {
        self.by_kind.entry(entity.kind).or_default().push(entity);
    }

    /// All entities of one kind, in insertion order.
    pub fn of_kind(&self, kind: EntityKind) -> &[Entity] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate all entities, kind-ordered then insertion-ordered.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.by_kind.values().flatten()
    }

    /// Flatten back into a tagged list, kind-ordered then insertion-ordered.
    pub fn into_flat(self) -> Vec<Entity> {
        self.by_kind.into_values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(Vec::is_empty)
    }
}

impl FromIterator<Entity> for EntityBag {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self::from_flat(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_groups_by_kind_preserving_order() {
        let bag = EntityBag::from_flat(vec![
            Entity::new(EntityKind::Ticker, "TCEHY", 0.9),
            Entity::new(EntityKind::Margin, "Gross Margin", 0.8),
            Entity::new(EntityKind::Ticker, "BABA", 0.9),
        ]);

        assert_eq!(bag.len(), 3);
        let tickers: Vec<&str> = bag
            .of_kind(EntityKind::Ticker)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(tickers, vec!["TCEHY", "BABA"]);
        assert_eq!(bag.of_kind(EntityKind::Margin).len(), 1);
        assert!(bag.of_kind(EntityKind::Rating).is_empty());
    }

    #[test]
    fn flatten_round_trips() {
        let bag = EntityBag::from_flat(vec![
            Entity::new(EntityKind::Rating, "BUY", 0.7),
            Entity::new(EntityKind::Ticker, "TCEHY", 0.9),
        ]);
        let flat = bag.clone().into_flat();
        assert_eq!(EntityBag::from_flat(flat), bag);
    }
}
