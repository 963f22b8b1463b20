//! Integration tests for the complete Icegraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Extraction → Merge → Enhanced document build → Markup decode
//! - Batch ingestion → Content store
//! - Enhanced documents → Query-time attribution
//!
//! Run with: cargo test --test integration_tests

use icegraph_attribution::{ConfidenceCache, QueryAttribution};
use icegraph_extract::{extract_table_entities, ExtractorConfig, Table, TableContext};
use icegraph_ingest::{
    build_enhanced_document, process_document, run_batch, AttachmentRecord, BatchConfig,
    BuilderConfig, ContentStore, DocumentMetadata, ProcessingStatus, RawDocument, SourceType,
    StoreRecord,
};
use icegraph_markup::{decode_entities, decode_markers, encode_entity, SourceMarker};

// ============================================================================
// Helpers
// ============================================================================

fn email_metadata(uid: &str) -> DocumentMetadata {
    DocumentMetadata {
        uid: uid.to_string(),
        sender: "analyst@example.com".to_string(),
        subject: "Tencent 2Q2025 wrap".to_string(),
        date: "Sun, 17 Aug 2025 10:59:59 +0800".to_string(),
        source_type: SourceType::EmailBody,
        ticker: Some("TCEHY".to_string()),
        attachments: None,
    }
}

fn quarterly_results_table() -> Table {
    Table {
        headers: vec![
            "Metric".to_string(),
            "2Q2025".to_string(),
            "1Q2025".to_string(),
            "YoY".to_string(),
        ],
        rows: vec![
            vec![
                "Operating Margin".to_string(),
                "37.5%".to_string(),
                "36.1%".to_string(),
                "+1.4%".to_string(),
            ],
            vec![
                "Revenue".to_string(),
                "184.5".to_string(),
                "180.0".to_string(),
                "+15%".to_string(),
            ],
        ],
    }
}

// ============================================================================
// Extraction → build → decode
// ============================================================================

#[test]
fn test_email_with_table_attachment_end_to_end() {
    let table = quarterly_results_table();
    let record = AttachmentRecord::extracted("results.xlsx", "Quarterly results attached")
        .with_tables(vec![table]);

    let mut metadata = email_metadata("q2-wrap_a1b2c3d4");
    metadata.attachments = Some(vec![record.clone()]);

    let doc = RawDocument {
        metadata,
        body: "We reiterate BUY with a price target of $650. Operating margin \
               expanded to 37.5% in 2Q2025."
            .to_string(),
        attachments: vec![record],
    };

    let enhanced =
        process_document(&doc, &ExtractorConfig::default(), &BuilderConfig::default())
            .expect("pipeline should succeed");

    // Original content survives verbatim, ahead of the annotations.
    assert!(enhanced.text.starts_with("We reiterate BUY"));
    assert!(enhanced.text.contains("--- ATTACHMENT: results.xlsx ---"));

    // The table margin lands as markup with a high confidence.
    let entities = decode_entities(&enhanced.text);
    let margin = entities
        .iter()
        .find(|e| e.name == "Operating Margin" && e.period == "2Q2025")
        .expect("table margin should be annotated");
    assert!(margin.confidence >= 0.85, "got {}", margin.confidence);
    assert_eq!(margin.ticker, "TCEHY");
    assert_eq!(margin.value, "37.5%");

    // The document ends with its provenance marker.
    let markers = decode_markers(&enhanced.text);
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].identifier(), "q2-wrap_a1b2c3d4");
}

#[test]
fn test_annotation_round_trips_through_document_text() {
    let table = quarterly_results_table();
    let ctx = TableContext {
        ticker: Some("TCEHY".to_string()),
    };
    let bag = extract_table_entities(&table, &ctx, &ExtractorConfig::default());
    assert!(!bag.is_empty());

    for entity in bag.iter() {
        let encoded = encode_entity(entity);
        let decoded = decode_entities(&encoded);
        assert_eq!(decoded.len(), 1);
        let got = &decoded[0];
        assert_eq!(got.kind, entity.kind);
        assert_eq!(got.name, entity.name);
        assert_eq!(got.value, entity.value);
        assert_eq!(got.period, entity.period);
        assert_eq!(got.ticker, entity.ticker);
        assert_eq!(got.source, entity.source);
        // Confidence is wire-formatted to two decimals.
        assert!((got.confidence - entity.confidence).abs() < 0.005);
    }
}

#[test]
fn test_negative_values_keep_their_sign() {
    let table = Table {
        headers: vec!["Metric".to_string(), "QoQ".to_string()],
        rows: vec![
            vec!["Gross Margin".to_string(), "-6%".to_string()],
            vec!["Net Margin".to_string(), "(2.5%)".to_string()],
        ],
    };
    let ctx = TableContext {
        ticker: Some("TCEHY".to_string()),
    };
    let bag = extract_table_entities(&table, &ctx, &ExtractorConfig::default());

    let gross = bag
        .iter()
        .find(|e| e.name == "Gross Margin")
        .expect("negative margin extracted");
    assert_eq!(gross.value, "-6%");

    // Survives encode/decode with the sign intact.
    let decoded = decode_entities(&encode_entity(gross));
    assert_eq!(decoded[0].value, "-6%");
}

#[test]
fn test_bare_numeric_cells_are_extracted() {
    // No %, $, or unit suffix anywhere: plain numerals still count as values.
    let table = Table {
        headers: vec!["Metric".to_string(), "FY2025".to_string()],
        rows: vec![vec!["Revenue".to_string(), "2180".to_string()]],
    };
    let ctx = TableContext {
        ticker: Some("TCEHY".to_string()),
    };
    let bag = extract_table_entities(&table, &ctx, &ExtractorConfig::default());

    let revenue = bag.iter().find(|e| e.name == "Revenue").expect("extracted");
    assert_eq!(revenue.value, "2180");
    assert!(
        revenue.confidence >= 0.85,
        "bare numerals earn the value-format component, got {}",
        revenue.confidence
    );
}

#[test]
fn test_every_table_entity_names_its_company() {
    let table = quarterly_results_table();
    let ctx = TableContext {
        ticker: Some("0700.HK".to_string()),
    };
    let bag = extract_table_entities(&table, &ctx, &ExtractorConfig::default());
    assert!(!bag.is_empty());
    for entity in bag.iter() {
        assert_eq!(entity.ticker, "0700.HK");
    }
}

#[test]
fn test_enhanced_document_build_is_deterministic() {
    let doc = RawDocument {
        metadata: email_metadata("det-check_00000001"),
        body: "Revenue grew 15% YoY. We maintain our BUY rating.".to_string(),
        attachments: Vec::new(),
    };
    let extractor = ExtractorConfig::default();
    let builder = BuilderConfig::default();

    let first = process_document(&doc, &extractor, &builder).expect("build");
    let second = process_document(&doc, &extractor, &builder).expect("build");
    assert_eq!(first.text, second.text);
}

// ============================================================================
// Contract enforcement
// ============================================================================

#[test]
fn test_missing_attachments_key_fails_loudly() {
    // Extraction produced an attachment, but the envelope never recorded an
    // attachments key. Downstream would silently lose the attachment; the
    // builder must refuse instead.
    let record = AttachmentRecord::extracted("deck.pdf", "slide text");
    let metadata = email_metadata("bad-envelope_00000001");
    assert!(metadata.attachments.is_none());

    let bag = icegraph_extract::EntityBag::new();
    let err = build_enhanced_document(
        "body",
        &metadata,
        &bag,
        &[record],
        &BuilderConfig::default(),
    )
    .expect_err("must not silently drop attachments");
    assert!(err.to_string().contains("contract violation"), "{err}");
}

#[test]
fn test_trailing_subject_does_not_corrupt_date() {
    let tag = "[SOURCE_EMAIL:q2-wrap_a1b2c3d4|sender:analyst@example.com\
               |date:Sun, 17 Aug 2025 10:59:59 +0800|subject:2Q25 results wrap]";
    let markers = decode_markers(tag);
    assert_eq!(markers.len(), 1);
    match &markers[0] {
        SourceMarker::Email { date, subject, .. } => {
            assert_eq!(date, "Sun, 17 Aug 2025 10:59:59 +0800");
            assert_eq!(subject.as_deref(), Some("2Q25 results wrap"));
        }
        other => panic!("expected email marker, got {other:?}"),
    }
}

#[test]
fn test_one_malformed_tag_does_not_poison_the_chunk() {
    let mut text = String::new();
    for i in 0..10 {
        text.push_str(&format!(
            "[TABLE_METRIC:Metric {i}|value:{i}.0|period:2Q2025|ticker:TCEHY|confidence:0.90]\n"
        ));
    }
    text.push_str("[TABLE_METRIC:broken|value:|confidence:not-a-number]\n");

    let entities = decode_entities(&text);
    assert_eq!(entities.len(), 10);
}

// ============================================================================
// Batch ingestion → content store
// ============================================================================

#[tokio::test]
async fn test_batch_lands_documents_in_the_content_store() {
    let doc = RawDocument {
        metadata: email_metadata("store-check_00000001"),
        body: "Operating margin reached 37.5% in 2Q2025.".to_string(),
        attachments: Vec::new(),
    };

    let output = run_batch(vec![doc], BatchConfig::default()).await;
    assert_eq!(output.report.counts(SourceType::EmailBody).succeeded, 1);
    let enhanced = output.outcomes[0].document.as_ref().expect("document");

    let dir = tempfile::tempdir().expect("tempdir");
    let store = ContentStore::new(dir.path());
    let record = StoreRecord {
        source_type: SourceType::EmailBody,
        status: ProcessingStatus::Succeeded,
        extraction_method: "basic".to_string(),
        ingested_at: chrono::Utc::now().to_rfc3339(),
        source_date: Some("Sun, 17 Aug 2025 10:59:59 +0800".to_string()),
    };
    let artifact = store
        .store(
            &enhanced.uid,
            "document.txt",
            enhanced.text.as_bytes(),
            &enhanced.text,
            &record,
        )
        .expect("store");

    assert!(artifact.original_path.exists());
    assert!(artifact.extracted_path.exists());
    let sidecar = std::fs::read_to_string(&artifact.metadata_path).expect("sidecar");
    assert!(sidecar.contains("email_body"));
}

#[tokio::test]
async fn test_batch_isolates_failures_and_reports_them() {
    let good = RawDocument {
        metadata: email_metadata("good_00000001"),
        body: "Price target raised to $650.".to_string(),
        attachments: Vec::new(),
    };
    let bad = RawDocument {
        metadata: email_metadata("bad_00000001"),
        body: "see attached".to_string(),
        attachments: vec![AttachmentRecord::extracted("deck.pdf", "slides")],
    };

    let output = run_batch(vec![good, bad], BatchConfig::default()).await;
    let counts = output.report.counts(SourceType::EmailBody);
    assert_eq!(counts.succeeded, 1);
    assert_eq!(counts.failed, 1);
}

// ============================================================================
// Ingested documents → query-time attribution
// ============================================================================

#[test]
fn test_attribution_recovers_confidence_from_ingested_markup() {
    let table = quarterly_results_table();
    let record = AttachmentRecord::extracted("results.xlsx", "tables")
        .with_tables(vec![table]);
    let mut metadata = email_metadata("q2-wrap_a1b2c3d4");
    metadata.attachments = Some(vec![record.clone()]);
    let doc = RawDocument {
        metadata,
        body: "Results attached.".to_string(),
        attachments: vec![record],
    };
    let enhanced =
        process_document(&doc, &ExtractorConfig::default(), &BuilderConfig::default())
            .expect("pipeline");

    // Retrieval hands back the whole enhanced document as one chunk.
    let display = QueryAttribution::new(vec![enhanced.text.clone()])
        .build_cache()
        .enrich_sources()
        .resolve_confidence()
        .flag_conflicts();

    assert_eq!(display.sources.len(), 1);
    assert_eq!(display.sources[0].identifier(), "q2-wrap_a1b2c3d4");
    let margin = display
        .entities
        .iter()
        .find(|e| e.entity.name == "Operating Margin" && e.entity.period == "2Q2025")
        .expect("resolved");
    assert_eq!(margin.resolution, "cache");
    assert!(margin.resolved_confidence >= 0.85);

    // The same markup is visible through a standalone cache too.
    let cache = ConfidenceCache::build([enhanced.text.as_str()]);
    assert!(cache.lookup("operating margin").is_some());
}

#[test]
fn test_disagreeing_sources_are_flagged_at_query_time() {
    let filing = "[TABLE_METRIC:Price Target|value:95.00|period:FY2025|ticker:TCEHY|confidence:0.90]\n\
        [SOURCE_EMAIL:filing_00000001|sender:ir@example.com|date:Fri, 15 Aug 2025 09:00:00 +0800]";
    let wire = "[TABLE_METRIC:Price Target|value:120.00|period:FY2025|ticker:TCEHY|confidence:0.80]\n\
        [SOURCE:NEWS_WIRE|SYMBOL:TCEHY|DATE:2025-08-16T02:00:00Z]";
    let note = "[TABLE_METRIC:Price Target|value:100.00|period:FY2025|ticker:TCEHY|confidence:0.85]\n\
        [SOURCE_EMAIL:note_00000002|sender:analyst@example.com|date:Sat, 16 Aug 2025 18:00:00 +0800]";

    let display = QueryAttribution::new(vec![
        filing.to_string(),
        wire.to_string(),
        note.to_string(),
    ])
    .build_cache()
    .enrich_sources()
    .resolve_confidence()
    .flag_conflicts();

    assert_eq!(display.sources.len(), 3);
    assert_eq!(display.conflicts.len(), 1);
    let report = &display.conflicts[0];
    assert_eq!(report.values.len(), 3);
    assert!(report.coefficient_of_variation > 0.10);

    let rendered = display.render();
    assert!(rendered.contains("WARNING: sources disagree"));
    assert!(rendered.contains("filing_00000001"));
    assert!(rendered.contains("NEWS_WIRE"));
}

#[test]
fn test_prose_brackets_never_reach_attribution() {
    let chunk = "Guidance [management commentary, see p.3] was unchanged.\n\
        [MARGIN:Operating Margin|value:37.5%|period:2Q2025|ticker:TCEHY|confidence:0.95]\n\
        [SOURCE_EMAIL:note_00000003|sender:a@example.com|date:Sat, 16 Aug 2025 18:00:00 +0800]";
    let display = QueryAttribution::new(vec![chunk.to_string()])
        .build_cache()
        .enrich_sources()
        .resolve_confidence()
        .flag_conflicts();

    assert_eq!(display.entities.len(), 1);
    assert_eq!(display.sources.len(), 1);
}
