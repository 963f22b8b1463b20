//! Document ingestion for Icegraph
//!
//! Takes one ingestion unit (email body + extracted attachments, or a fetched
//! page) through extraction, merge and annotation, and lands the result:
//!
//! - enhanced document: original content + inline entity markup + source
//!   markers, ready for the external RAG ingester
//! - content-addressed artifacts on disk (original bytes, extracted text,
//!   `metadata.json`), collision-free under concurrent workers
//! - a batch report with per-source-type succeeded/failed/skipped counts
//!
//! Per-document processing is strictly sequential; the batch level fans out
//! across a bounded tokio worker pool. One bad document fails in isolation.

use thiserror::Error;

pub mod batch;
pub mod builder;
pub mod config;
pub mod metadata;
pub mod store;

pub use batch::{
    process_document, run_batch, BatchConfig, BatchOutput, DocumentOutcome, IngestReport,
    RawDocument, SourceTypeCounts,
};
pub use builder::{build_enhanced_document, BuilderConfig, EnhancedDocument};
pub use config::{FetchMethod, PipelineConfig, TableEngine};
pub use metadata::{
    parse_timestamp, AttachmentRecord, DocumentMetadata, ExtractionStatus, SourceType,
};
pub use store::{new_document_uid, ContentStore, ProcessingStatus, StoreRecord, StoredArtifact};

/// Errors raised by the ingestion pipeline.
///
/// Per-item failures (`ExtractionFailure`, `FetchFailure`) are recoverable:
/// they are logged, recorded in the document's processing status, and the
/// batch continues. `ContractViolation` is different — it marks a bug at a
/// stage boundary (historically: a missing attachments key silently dropping
/// every attachment from downstream processing) and must surface loudly, not
/// be defaulted away.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("extraction failed for {item}: {reason}")]
    ExtractionFailure { item: String, reason: String },

    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
