//! Enhanced document builder.
//!
//! Renders one ingestion unit into its final annotated text blob: original
//! body, attachment sections under the exact delimiter the downstream RAG
//! layer splits on, one markup tag per entity above the inclusion threshold,
//! and the trailing source marker. Output is byte-stable for identical
//! inputs; nothing time-dependent is generated here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use icegraph_extract::EntityBag;
use icegraph_markup::{encode_entity, encode_marker};

use crate::metadata::{AttachmentRecord, DocumentMetadata, ExtractionStatus};
use crate::IngestError;

/// Builder tunables.
///
/// The markup-inclusion threshold is deliberately distinct from the
/// extractors' acceptance floor (default 0.5): an entity can be worth keeping
/// in the bag for statistics and conflict detection while still being too
/// weak to assert as inline markup. Callers choose per call site which
/// threshold applies where; neither defaults from the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Entities below this confidence are kept in the bag but not rendered
    /// as markup.
    pub markup_min_confidence: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            markup_min_confidence: 0.7,
        }
    }
}

/// The final annotated text blob for one ingestion unit.
///
/// Created once at ingestion time, immutable thereafter, consumed by the
/// external RAG ingester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedDocument {
    pub uid: String,
    pub text: String,
    /// Entities actually rendered as markup (post-threshold).
    pub rendered_entities: usize,
}

/// Render the attachment section header exactly as the RAG layer expects it.
pub fn attachment_section(filename: &str, extracted_text: &str) -> String {
    format!("\n\n--- ATTACHMENT: {filename} ---\n{extracted_text}")
}

/// Build the enhanced document for one ingestion unit.
///
/// `extracted` is the attachment list the extraction stage actually produced.
/// If extraction produced attachments but the metadata envelope omits the
/// attachments key (or disagrees on count), this is a contract violation and
/// the builder fails loudly: the historical behavior of silently producing a
/// document without its attachment sections lost an entire class of documents
/// without a trace.
pub fn build_enhanced_document(
    body: &str,
    metadata: &DocumentMetadata,
    bag: &EntityBag,
    extracted: &[AttachmentRecord],
    config: &BuilderConfig,
) -> Result<EnhancedDocument, IngestError> {
    let with_content = extracted.iter().filter(|a| a.has_content()).count();
    match &metadata.attachments {
        None if with_content > 0 => {
            return Err(IngestError::ContractViolation(format!(
                "{} attachment(s) extracted for {} but the metadata envelope has no attachments key",
                with_content, metadata.uid
            )));
        }
        Some(declared) if declared.len() != extracted.len() => {
            return Err(IngestError::ContractViolation(format!(
                "metadata for {} declares {} attachment(s) but extraction produced {}",
                metadata.uid,
                declared.len(),
                extracted.len()
            )));
        }
        _ => {}
    }

    let mut text = String::from(body);

    for attachment in extracted {
        match (&attachment.status, &attachment.extracted_text) {
            (ExtractionStatus::Extracted, Some(extracted_text)) => {
                text.push_str(&attachment_section(&attachment.filename, extracted_text));
            }
            _ => {
                debug!(
                    filename = %attachment.filename,
                    status = ?attachment.status,
                    "attachment contributes no text section"
                );
            }
        }
    }

    let mut rendered = 0;
    let mut markup = String::new();
    for entity in bag.iter() {
        if entity.confidence < config.markup_min_confidence {
            debug!(
                name = %entity.name,
                confidence = entity.confidence,
                threshold = config.markup_min_confidence,
                "entity below markup-inclusion threshold"
            );
            continue;
        }
        markup.push('\n');
        markup.push_str(&encode_entity(entity));
        rendered += 1;
    }
    if rendered > 0 {
        text.push('\n');
        text.push_str(&markup);
    }

    text.push_str("\n\n");
    text.push_str(&encode_marker(&metadata.source_marker()));
    text.push('\n');

    Ok(EnhancedDocument {
        uid: metadata.uid.clone(),
        text,
        rendered_entities: rendered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SourceType;
    use icegraph_extract::{Entity, EntityKind};

    fn metadata(attachments: Option<Vec<AttachmentRecord>>) -> DocumentMetadata {
        DocumentMetadata {
            uid: "tencent_q2-3fa1".to_string(),
            sender: "jia.jun@example.com".to_string(),
            subject: "Tencent Q2 2025 Earnings".to_string(),
            date: "Sun, 17 Aug 2025 10:59:59 +0800".to_string(),
            source_type: SourceType::EmailBody,
            ticker: Some("TCEHY".to_string()),
            attachments,
        }
    }

    fn sample_bag() -> EntityBag {
        EntityBag::from_flat(vec![
            Entity::new(EntityKind::Margin, "Operating Margin", 0.95)
                .with_value("37.5%")
                .with_period("2Q2025")
                .with_ticker("TCEHY"),
            Entity::new(EntityKind::Percentage, "Percentage", 0.5).with_value("15%"),
        ])
    }

    #[test]
    fn renders_markup_and_source_marker() {
        let doc = build_enhanced_document(
            "Strong quarter.",
            &metadata(None),
            &sample_bag(),
            &[],
            &BuilderConfig::default(),
        )
        .unwrap();

        assert!(doc.text.starts_with("Strong quarter."));
        assert!(doc.text.contains("[MARGIN:Operating Margin|value:37.5%"));
        assert!(doc.text.contains("[SOURCE_EMAIL:tencent_q2-3fa1|sender:jia.jun@example.com"));
        // The 0.5-confidence percentage is below the 0.7 inclusion threshold.
        assert_eq!(doc.rendered_entities, 1);
        assert!(!doc.text.contains("PERCENTAGE"));
    }

    #[test]
    fn attachment_sections_use_exact_delimiter() {
        let attachments = vec![AttachmentRecord::extracted(
            "earnings_deck.pdf",
            "Slide 4: operating leverage improving",
        )];
        let doc = build_enhanced_document(
            "See attached.",
            &metadata(Some(attachments.clone())),
            &EntityBag::new(),
            &attachments,
            &BuilderConfig::default(),
        )
        .unwrap();

        assert!(doc
            .text
            .contains("\n\n--- ATTACHMENT: earnings_deck.pdf ---\nSlide 4: operating leverage improving"));
    }

    #[test]
    fn missing_attachments_key_is_a_contract_violation() {
        let extracted = vec![AttachmentRecord::extracted("deck.pdf", "content")];
        let err = build_enhanced_document(
            "body",
            &metadata(None),
            &EntityBag::new(),
            &extracted,
            &BuilderConfig::default(),
        )
        .unwrap_err();

        assert!(
            matches!(err, IngestError::ContractViolation(_)),
            "expected ContractViolation, got {err:?}"
        );
    }

    #[test]
    fn attachment_count_mismatch_is_a_contract_violation() {
        let extracted = vec![
            AttachmentRecord::extracted("a.pdf", "x"),
            AttachmentRecord::extracted("b.pdf", "y"),
        ];
        let declared = vec![AttachmentRecord::extracted("a.pdf", "x")];
        let err = build_enhanced_document(
            "body",
            &metadata(Some(declared)),
            &EntityBag::new(),
            &extracted,
            &BuilderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::ContractViolation(_)));
    }

    #[test]
    fn failed_attachment_contributes_no_section_but_is_not_fatal() {
        let attachments = vec![AttachmentRecord::failed("scan.tiff", "ocr engine crashed")];
        let doc = build_enhanced_document(
            "body",
            &metadata(Some(attachments.clone())),
            &EntityBag::new(),
            &attachments,
            &BuilderConfig::default(),
        )
        .unwrap();
        assert!(!doc.text.contains("ATTACHMENT"));
    }

    #[test]
    fn output_is_deterministic() {
        let attachments = vec![AttachmentRecord::extracted("deck.pdf", "content")];
        let build = || {
            build_enhanced_document(
                "body",
                &metadata(Some(attachments.clone())),
                &sample_bag(),
                &attachments,
                &BuilderConfig::default(),
            )
            .unwrap()
        };
        assert_eq!(build().text, build().text);
    }
}
