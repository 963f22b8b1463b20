//! Document metadata envelope.
//!
//! One envelope per ingestion unit. The `attachments` field is optional on
//! the wire to mirror envelopes produced by older connectors; the builder
//! cross-checks it against what extraction actually produced and refuses to
//! drop data silently (see `builder`).

use chrono::{DateTime, FixedOffset};
use icegraph_extract::Table;
use icegraph_markup::SourceMarker;
use serde::{Deserialize, Serialize};

/// Where an ingestion unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    EmailBody,
    EmailAttachment,
    UrlFetch,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::EmailBody => "email_body",
            SourceType::EmailAttachment => "email_attachment",
            SourceType::UrlFetch => "url_fetch",
        }
    }
}

/// Extraction outcome for one attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Extracted,
    Failed { reason: String },
    Skipped,
}

/// One attachment of an ingestion unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub filename: String,
    pub status: ExtractionStatus,
    /// Text recovered by the external conversion engine, when extraction
    /// succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// Structured tables recovered from the attachment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
}

impl AttachmentRecord {
    pub fn extracted(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: ExtractionStatus::Extracted,
            extracted_text: Some(text.into()),
            tables: Vec::new(),
        }
    }

    pub fn failed(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: ExtractionStatus::Failed {
                reason: reason.into(),
            },
            extracted_text: None,
            tables: Vec::new(),
        }
    }

    pub fn with_tables(mut self, tables: Vec<Table>) -> Self {
        self.tables = tables;
        self
    }

    /// True when this record carries any extracted content.
    pub fn has_content(&self) -> bool {
        self.extracted_text.is_some() || !self.tables.is_empty()
    }
}

/// Envelope data for one ingested unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Stable identifier (filename stem plus ingestion suffix, see
    /// `store::new_document_uid`).
    pub uid: String,
    pub sender: String,
    pub subject: String,
    /// RFC 2822 or ISO 8601; both are accepted, stored verbatim.
    pub date: String,
    pub source_type: SourceType,
    /// Ticker the document is about, when known upstream. Feeds the
    /// extraction context and the API source marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    /// `None` models an envelope written without the attachments key at all,
    /// as older connectors did. The builder treats "key absent while
    /// attachments were extracted" as a contract violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentRecord>>,
}

impl DocumentMetadata {
    /// Attachments list, treating an absent key as empty.
    pub fn attachments_or_empty(&self) -> &[AttachmentRecord] {
        self.attachments.as_deref().unwrap_or(&[])
    }

    /// The trailing source marker for this document's enhanced form.
    pub fn source_marker(&self) -> SourceMarker {
        match self.source_type {
            SourceType::EmailBody | SourceType::EmailAttachment => SourceMarker::Email {
                uid: self.uid.clone(),
                sender: self.sender.clone(),
                date: self.date.clone(),
                subject: if self.subject.is_empty() {
                    None
                } else {
                    Some(self.subject.clone())
                },
            },
            SourceType::UrlFetch => SourceMarker::Api {
                name: self.uid.clone(),
                symbol: self
                    .ticker
                    .clone()
                    .unwrap_or_else(|| icegraph_markup::TICKER_NA.to_string()),
                date: Some(self.date.clone()),
            },
        }
    }
}

/// Parse a marker/envelope timestamp.
///
/// Email markers carry RFC 2822 ("Sun, 17 Aug 2025 10:59:59 +0800"), API
/// markers carry ISO 8601; both must be accepted.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}
