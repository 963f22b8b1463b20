//! Batch-level ingestion with bounded parallelism.
//!
//! One worker per document, bounded by a semaphore. Inside a worker the
//! pipeline is strictly sequential: extract body, extract attachments and
//! tables, merge, build. No state is shared between documents; the only
//! global resource is the content store, whose hash-based paths make
//! concurrent writes collision-free.
//!
//! Failure is isolated per document: a bad attachment or a contract
//! violation fails its own document, is logged with uid and stage, and the
//! batch carries on. The report never hides a partial success.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use icegraph_extract::{
    extract_body_entities, extract_table_entities, merge_bags, BodyContext, EntityBag,
    ExtractorConfig, TableContext,
};

use crate::builder::{build_enhanced_document, BuilderConfig, EnhancedDocument};
use crate::config::PipelineConfig;
use crate::metadata::{AttachmentRecord, DocumentMetadata, ExtractionStatus, SourceType};
use crate::store::ProcessingStatus;
use crate::IngestError;

/// One document ready for the pipeline: envelope, body text, and whatever
/// the external conversion engines produced for its attachments.
///
/// `attachments` is what extraction actually produced; well-behaved
/// producers mirror it into `metadata.attachments`. The builder checks the
/// two against each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub metadata: DocumentMetadata,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
}

/// Batch tunables.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum documents processed concurrently.
    pub workers: usize,
    pub pipeline: PipelineConfig,
    pub extractor: ExtractorConfig,
    pub builder: BuilderConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            pipeline: PipelineConfig::default(),
            extractor: ExtractorConfig::default(),
            builder: BuilderConfig::default(),
        }
    }
}

/// Outcome for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub uid: String,
    pub source_type: SourceType,
    pub status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<EnhancedDocument>,
}

/// Succeeded/failed/skipped counters for one source type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTypeCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Batch-level ingestion report, per source type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    by_source: BTreeMap<SourceType, SourceTypeCounts>,
}

impl IngestReport {
    pub fn record(&mut self, source_type: SourceType, status: &ProcessingStatus) {
        let counts = self.by_source.entry(source_type).or_default();
        match status {
            ProcessingStatus::Succeeded => counts.succeeded += 1,
            ProcessingStatus::Failed { .. } => counts.failed += 1,
            ProcessingStatus::Skipped => counts.skipped += 1,
        }
    }

    pub fn counts(&self, source_type: SourceType) -> SourceTypeCounts {
        self.by_source.get(&source_type).copied().unwrap_or_default()
    }

    pub fn total_failed(&self) -> usize {
        self.by_source.values().map(|c| c.failed).sum()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (source_type, c) in &self.by_source {
            writeln!(
                f,
                "{}: {} succeeded, {} failed, {} skipped",
                source_type.as_str(),
                c.succeeded,
                c.failed,
                c.skipped
            )?;
        }
        Ok(())
    }
}

/// Everything `run_batch` hands back.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub report: IngestReport,
    pub outcomes: Vec<DocumentOutcome>,
}

/// Run one document through extraction, merge and build. Synchronous: there
/// is no partial or interleaved state within one document's pipeline.
pub fn process_document(
    doc: &RawDocument,
    extractor: &ExtractorConfig,
    builder: &BuilderConfig,
) -> Result<EnhancedDocument, IngestError> {
    let ticker_hint = doc.metadata.ticker.clone();
    let body_ctx = BodyContext {
        ticker_hint: ticker_hint.clone(),
    };
    let table_ctx = TableContext {
        ticker: ticker_hint,
    };

    // Body-text entities: email body plus every successfully extracted
    // attachment's text. A failed attachment contributes nothing and does
    // not abort the document.
    let mut body_bag = extract_body_entities(&doc.body, &body_ctx, extractor);
    let mut table_bag = EntityBag::new();

    for attachment in &doc.attachments {
        match &attachment.status {
            ExtractionStatus::Extracted => {
                if let Some(text) = &attachment.extracted_text {
                    let from_attachment = extract_body_entities(text, &body_ctx, extractor);
                    body_bag = merge_bags(body_bag, from_attachment);
                }
                for table in &attachment.tables {
                    let from_table = extract_table_entities(table, &table_ctx, extractor);
                    table_bag = merge_bags(table_bag, from_table);
                }
            }
            ExtractionStatus::Failed { reason } => {
                warn!(
                    uid = %doc.metadata.uid,
                    filename = %attachment.filename,
                    reason = %reason,
                    "attachment extraction failed upstream, proceeding without it"
                );
            }
            ExtractionStatus::Skipped => {}
        }
    }

    let merged = merge_bags(body_bag, table_bag);
    build_enhanced_document(&doc.body, &doc.metadata, &merged, &doc.attachments, builder)
}

/// Run a batch of documents through the pipeline with bounded parallelism.
pub async fn run_batch(docs: Vec<RawDocument>, config: BatchConfig) -> BatchOutput {
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let config = Arc::new(config);
    let mut handles = Vec::with_capacity(docs.len());

    for doc in docs {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        handles.push(tokio::spawn(async move {
            // Closing the semaphore is not part of this design; acquire only
            // fails if it were, so treat that as a failed document.
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return outcome_failed(&doc, format!("worker pool unavailable: {e}"));
                }
            };
            run_one(doc, &config)
        }));
    }

    let mut report = IngestReport::default();
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                error!(error = %join_err, "ingestion worker panicked");
                continue;
            }
        };
        report.record(outcome.source_type, &outcome.status);
        outcomes.push(outcome);
    }

    BatchOutput { report, outcomes }
}

fn run_one(doc: RawDocument, config: &BatchConfig) -> DocumentOutcome {
    let uid = doc.metadata.uid.clone();
    let source_type = doc.metadata.source_type;

    if source_type == SourceType::UrlFetch && !config.pipeline.url_processing_enabled {
        info!(uid = %uid, "url processing disabled, skipping document");
        return DocumentOutcome {
            uid,
            source_type,
            status: ProcessingStatus::Skipped,
            document: None,
        };
    }

    if doc.body.trim().is_empty() && doc.attachments.iter().all(|a| !a.has_content()) {
        info!(uid = %uid, "document has no content, skipping");
        return DocumentOutcome {
            uid,
            source_type,
            status: ProcessingStatus::Skipped,
            document: None,
        };
    }

    match process_document(&doc, &config.extractor, &config.builder) {
        Ok(document) => {
            info!(
                uid = %uid,
                entities = document.rendered_entities,
                "document ingested"
            );
            DocumentOutcome {
                uid,
                source_type,
                status: ProcessingStatus::Succeeded,
                document: Some(document),
            }
        }
        Err(e) => {
            error!(uid = %uid, stage = "build", error = %e, "document failed");
            outcome_failed(&doc, e.to_string())
        }
    }
}

fn outcome_failed(doc: &RawDocument, reason: String) -> DocumentOutcome {
    DocumentOutcome {
        uid: doc.metadata.uid.clone(),
        source_type: doc.metadata.source_type,
        status: ProcessingStatus::Failed { reason },
        document: None,
    }
}
