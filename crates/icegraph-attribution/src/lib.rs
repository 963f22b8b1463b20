//! Query-time attribution for Icegraph
//!
//! After the external RAG engine answers a query, the retrieved chunks still
//! carry the inline markup written at ingestion time. This crate recovers
//! structured attribution from them:
//!
//! - which sources (emails, API fetches) contributed, and when
//! - per-entity confidence, resolved through a three-tier fallback
//! - cross-source numeric conflicts, reported rather than averaged away
//! - answer-level confidence, aggregated by explicit scenario-specific
//!   formulas that are never conflated into one universal average
//!
//! The attribution lifecycle is a typestate chain (see [`lifecycle`]): the
//! confidence cache is built before any source enrichment or lookup can be
//! expressed, so use-before-construction is unrepresentable rather than
//! merely discouraged.

use thiserror::Error;

pub mod aggregate;
pub mod cache;
pub mod conflict;
pub mod lifecycle;

pub use aggregate::{aggregate_confidence, AggregationMode, SourceConfidence, SourceTrust, TrustWeights};
pub use cache::ConfidenceCache;
pub use conflict::{detect_conflicts, ConflictReport, SourceValue, CONFLICT_CV_THRESHOLD};
pub use lifecycle::{CacheBuilt, ConfidenceResolved, DisplayReady, QueryAttribution, ResolvedEntity, SourcesEnriched};

pub use icegraph_markup::{decode_markers, SourceMarker};

/// Documented default for entities found in retrieved text without any
/// markup-derived or metadata confidence: "extracted without markup,
/// moderate trust".
pub const DEFAULT_UNMARKED_CONFIDENCE: f64 = 0.75;

#[derive(Debug, Error)]
pub enum AttributionError {
    #[error("no sources to aggregate")]
    NoSources,
}

/// Parse one retrieved chunk's source markers.
///
/// Tolerant of both marker grammars (email and API) and of malformed tags;
/// see `icegraph_markup::decode` for the skip-and-continue semantics.
pub fn parse_chunk(chunk_text: &str) -> Vec<SourceMarker> {
    decode_markers(chunk_text)
}
