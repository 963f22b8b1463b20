//! Typestate lifecycle for query-time attribution.
//!
//! Attribution moves through fixed stages: build the confidence cache,
//! enrich with source markers, resolve per-entity confidence, flag
//! cross-source conflicts, render. Each stage is a distinct type and each
//! transition consumes its predecessor, so the compiler rejects a pipeline
//! that looks up confidence before the cache exists or renders before
//! conflicts were checked. No stage can be skipped, repeated, or reordered.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use icegraph_extract::parse_signed;
use icegraph_markup::{decode_entities, decode_markers, Entity, SourceMarker};

use crate::cache::ConfidenceCache;
use crate::conflict::{detect_conflicts, ConflictReport, SourceValue};
use crate::DEFAULT_UNMARKED_CONFIDENCE;

/// An entity with its resolved confidence and owning source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntity {
    pub entity: Entity,
    /// Identifier of the marker in the chunk the entity came from, if any.
    pub source_id: Option<String>,
    pub resolved_confidence: f64,
    /// Which tier answered: "cache", "markup", or "default".
    pub resolution: &'static str,
}

/// One retrieved chunk, parsed once: its entities stay associated with the
/// source markers of the same chunk.
#[derive(Debug, Clone)]
struct ParsedChunk {
    entities: Vec<Entity>,
    markers: Vec<SourceMarker>,
}

/// Entry point of the lifecycle. Holds the raw retrieved chunks.
#[derive(Debug, Clone)]
pub struct QueryAttribution {
    chunks: Vec<String>,
}

/// Cache built; no per-entity resolution has happened yet.
#[derive(Debug)]
pub struct CacheBuilt {
    cache: ConfidenceCache,
    parsed: Vec<ParsedChunk>,
}

/// Source markers collected and deduplicated across chunks.
#[derive(Debug)]
pub struct SourcesEnriched {
    cache: ConfidenceCache,
    parsed: Vec<ParsedChunk>,
    sources: Vec<SourceMarker>,
}

/// Every entity carries a resolved confidence.
#[derive(Debug)]
pub struct ConfidenceResolved {
    sources: Vec<SourceMarker>,
    entities: Vec<ResolvedEntity>,
}

/// Terminal state: entities, sources, and any conflicts, ready to render.
#[derive(Debug)]
pub struct DisplayReady {
    pub sources: Vec<SourceMarker>,
    pub entities: Vec<ResolvedEntity>,
    pub conflicts: Vec<ConflictReport>,
}

impl QueryAttribution {
    pub fn new(chunks: Vec<String>) -> Self {
        Self { chunks }
    }

    /// First transition: parse every chunk and build the confidence cache
    /// over the whole retrieval set.
    pub fn build_cache(self) -> CacheBuilt {
        let cache = ConfidenceCache::build(self.chunks.iter().map(String::as_str));
        let parsed = self
            .chunks
            .iter()
            .map(|chunk| ParsedChunk {
                entities: decode_entities(chunk),
                markers: decode_markers(chunk),
            })
            .collect();
        CacheBuilt { cache, parsed }
    }
}

impl CacheBuilt {
    /// Collect the distinct source markers across all chunks, in first-seen
    /// order.
    pub fn enrich_sources(self) -> SourcesEnriched {
        let mut sources: Vec<SourceMarker> = Vec::new();
        for chunk in &self.parsed {
            for marker in &chunk.markers {
                if !sources.iter().any(|s| s.identifier() == marker.identifier()) {
                    sources.push(marker.clone());
                }
            }
        }
        debug!(sources = sources.len(), "distinct sources enriched");
        SourcesEnriched {
            cache: self.cache,
            parsed: self.parsed,
            sources,
        }
    }
}

impl SourcesEnriched {
    /// Resolve each entity's confidence through the three-tier fallback:
    /// cache hit, then the entity's own markup confidence, then
    /// [`DEFAULT_UNMARKED_CONFIDENCE`].
    pub fn resolve_confidence(self) -> ConfidenceResolved {
        let mut entities = Vec::new();
        for chunk in &self.parsed {
            // A chunk is a contiguous slice of one stored document, so a
            // single marker speaks for all of its entities.
            let source_id = chunk
                .markers
                .first()
                .map(|m| m.identifier().to_string());
            for entity in &chunk.entities {
                let (resolved_confidence, resolution) = match self.cache.lookup(&entity.name) {
                    Some(cached) => (cached, "cache"),
                    None if entity.confidence > 0.0 => (entity.confidence, "markup"),
                    None => (DEFAULT_UNMARKED_CONFIDENCE, "default"),
                };
                entities.push(ResolvedEntity {
                    entity: entity.clone(),
                    source_id: source_id.clone(),
                    resolved_confidence,
                    resolution,
                });
            }
        }
        ConfidenceResolved {
            sources: self.sources,
            entities,
        }
    }
}

/// Grouping key for conflict detection: case-insensitive name plus period.
fn fact_key(entity: &Entity) -> String {
    format!(
        "{} {}",
        entity.name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" "),
        entity.period.to_lowercase()
    )
}

impl ConfidenceResolved {
    /// Group numeric entities by (name, period) and check each group that
    /// spans at least two distinct sources for disagreement.
    pub fn flag_conflicts(self) -> DisplayReady {
        let mut groups: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for resolved in &self.entities {
            let Some(source_id) = &resolved.source_id else {
                continue;
            };
            let Some(parsed) = parse_signed(&resolved.entity.value) else {
                continue;
            };
            groups
                .entry(fact_key(&resolved.entity))
                .or_default()
                .push((source_id.clone(), parsed.scaled()));
        }

        let mut conflicts = Vec::new();
        for (fact, claims) in groups {
            let distinct_sources = {
                let mut ids: Vec<&str> = claims.iter().map(|(id, _)| id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                ids.len()
            };
            if distinct_sources < 2 {
                continue;
            }
            let values: Vec<SourceValue> = claims
                .into_iter()
                .map(|(source, value)| SourceValue { source, value })
                .collect();
            if let Some(report) = detect_conflicts(&fact, &values) {
                conflicts.push(report);
            }
        }
        debug!(conflicts = conflicts.len(), "conflict pass complete");

        DisplayReady {
            sources: self.sources,
            entities: self.entities,
            conflicts,
        }
    }
}

impl DisplayReady {
    /// Human-readable attribution block for display under an answer.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Sources:\n");
        if self.sources.is_empty() {
            out.push_str("  (none)\n");
        }
        for source in &self.sources {
            match source.timestamp() {
                Some(ts) => {
                    out.push_str(&format!("  - {} ({})\n", source.identifier(), ts));
                }
                None => out.push_str(&format!("  - {}\n", source.identifier())),
            }
        }
        if !self.entities.is_empty() {
            out.push_str("Entities:\n");
            for resolved in &self.entities {
                out.push_str(&format!(
                    "  - {}: {} [confidence {:.2}]\n",
                    resolved.entity.name, resolved.entity.value, resolved.resolved_confidence
                ));
            }
        }
        for conflict in &self.conflicts {
            out.push_str(&format!(
                "WARNING: sources disagree on {} (spread {:.1}% of mean):\n",
                conflict.fact,
                conflict.coefficient_of_variation * 100.0
            ));
            for value in &conflict.values {
                out.push_str(&format!("  - {}: {}\n", value.source, value.value));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MARGIN_CHUNK: &str = "Operating margin expanded.\n\
        [MARGIN:Operating Margin|value:37.5%|period:2Q2025|ticker:TCEHY|confidence:0.95]\n\
        [SOURCE_EMAIL:q2-wrap_a1b2c3d4|sender:analyst@example.com|date:Sun, 17 Aug 2025 10:59:59 +0800|subject:Q2 wrap]";

    fn run(chunks: &[&str]) -> DisplayReady {
        QueryAttribution::new(chunks.iter().map(|s| s.to_string()).collect())
            .build_cache()
            .enrich_sources()
            .resolve_confidence()
            .flag_conflicts()
    }

    #[test]
    fn marked_entity_resolves_from_cache() {
        let done = run(&[MARGIN_CHUNK]);
        assert_eq!(done.entities.len(), 1);
        assert_eq!(done.entities[0].resolution, "cache");
        assert_relative_eq!(done.entities[0].resolved_confidence, 0.95);
        assert_eq!(
            done.entities[0].source_id.as_deref(),
            Some("q2-wrap_a1b2c3d4")
        );
    }

    #[test]
    fn chunk_without_markup_gets_no_entities_but_keeps_sources() {
        let chunk = "Plain prose with no tags.\n\
            [SOURCE:YAHOO_FINANCE|SYMBOL:TCEHY|DATE:2025-08-17T10:59:59Z]";
        let done = run(&[chunk]);
        assert!(done.entities.is_empty());
        assert_eq!(done.sources.len(), 1);
        assert_eq!(done.sources[0].identifier(), "YAHOO_FINANCE");
    }

    #[test]
    fn duplicate_sources_across_chunks_are_deduplicated() {
        let done = run(&[MARGIN_CHUNK, MARGIN_CHUNK]);
        assert_eq!(done.sources.len(), 1);
        assert_eq!(done.entities.len(), 2);
    }

    #[test]
    fn disagreeing_sources_are_flagged_not_averaged() {
        let a = "[TABLE_METRIC:Price Target|value:95.00|period:FY2025|ticker:TCEHY|confidence:0.90]\n\
            [SOURCE_EMAIL:filing_00000001|sender:ir@example.com|date:Fri, 15 Aug 2025 09:00:00 +0800]";
        let b = "[TABLE_METRIC:Price Target|value:120.00|period:FY2025|ticker:TCEHY|confidence:0.80]\n\
            [SOURCE:NEWS_WIRE|SYMBOL:TCEHY|DATE:2025-08-16T02:00:00Z]";
        let c = "[TABLE_METRIC:Price Target|value:100.00|period:FY2025|ticker:TCEHY|confidence:0.85]\n\
            [SOURCE_EMAIL:note_00000002|sender:analyst@example.com|date:Sat, 16 Aug 2025 18:00:00 +0800]";
        let done = run(&[a, b, c]);

        assert_eq!(done.conflicts.len(), 1);
        let report = &done.conflicts[0];
        assert_eq!(report.values.len(), 3);
        assert!(report.coefficient_of_variation > 0.10);

        let rendered = done.render();
        assert!(rendered.contains("WARNING: sources disagree"));
        assert!(rendered.contains("filing_00000001"));
        assert!(rendered.contains("120"));
    }

    #[test]
    fn same_source_repeating_a_value_is_not_a_conflict() {
        let a = "[TABLE_METRIC:Revenue|value:184.5B|period:2Q2025|ticker:TCEHY|confidence:0.90]\n\
            [SOURCE_EMAIL:note_00000003|sender:a@example.com|date:Sat, 16 Aug 2025 18:00:00 +0800]";
        let b = "[TABLE_METRIC:Revenue|value:210.0B|period:2Q2025|ticker:TCEHY|confidence:0.90]\n\
            [SOURCE_EMAIL:note_00000003|sender:a@example.com|date:Sat, 16 Aug 2025 18:00:00 +0800]";
        let done = run(&[a, b]);
        assert!(done.conflicts.is_empty());
    }

    #[test]
    fn periods_keep_facts_apart() {
        // Q1 and Q2 revenue are different facts, not a disagreement.
        let a = "[TABLE_METRIC:Revenue|value:160.0B|period:1Q2025|ticker:TCEHY|confidence:0.90]\n\
            [SOURCE_EMAIL:note_00000004|sender:a@example.com|date:Fri, 16 May 2025 18:00:00 +0800]";
        let b = "[TABLE_METRIC:Revenue|value:184.5B|period:2Q2025|ticker:TCEHY|confidence:0.90]\n\
            [SOURCE_EMAIL:note_00000005|sender:b@example.com|date:Sat, 16 Aug 2025 18:00:00 +0800]";
        let done = run(&[a, b]);
        assert!(done.conflicts.is_empty());
    }

    #[test]
    fn render_lists_sources_with_timestamps() {
        let done = run(&[MARGIN_CHUNK]);
        let rendered = done.render();
        assert!(rendered.contains("q2-wrap_a1b2c3d4"));
        assert!(rendered.contains("17 Aug 2025"));
        assert!(rendered.contains("Operating Margin: 37.5% [confidence 0.95]"));
    }

    #[test]
    fn empty_retrieval_set_renders_no_sources() {
        let done = run(&[]);
        assert!(done.render().contains("(none)"));
    }
}
