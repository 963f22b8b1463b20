//! Inline markup codec and core entity model for Icegraph
//!
//! Enhanced documents carry their extracted entities and provenance as
//! single-line bracketed tags embedded in plain text, e.g.:
//!
//! ```text
//! [TABLE_METRIC:Operating Margin|value:37.5%|period:2Q2025|ticker:TCEHY|confidence:0.95]
//! [SOURCE_EMAIL:msg_0042|sender:"Jia Jun"|date:Sun, 17 Aug 2025 10:59:59 +0800|subject:Q2 Earnings]
//! ```
//!
//! The tag grammar is treated as a small wire format: values are escaped on
//! write so literal `|`, `[`, `]` can never be misread as structure, field
//! order per kind is stable, and the decoder tolerates optional trailing
//! fields it does not know about. Downstream RAG tooling matches these tags
//! verbatim, so the grammar here is bit-relevant.

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod escape;

pub use codec::{decode, decode_entities, decode_markers, encode_entity, encode_marker, DecodedTag};

/// Sentinel for an entity with no ticker linkage from context.
///
/// Absence of a ticker is always represented explicitly; the field is never
/// omitted from an encoded tag.
pub const TICKER_NA: &str = "N/A";

/// Sentinel period for entities without an identifiable reporting period.
pub const PERIOD_UNSPECIFIED: &str = "unspecified";

// ============================================================================
// Entity model
// ============================================================================

/// The kind of an extracted financial entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ticker,
    Rating,
    PriceTarget,
    FinancialMetric,
    Margin,
    Percentage,
}

impl EntityKind {
    /// The wire-format tag name for this kind.
    ///
    /// `FinancialMetric` encodes as `TABLE_METRIC` for compatibility with the
    /// markup already present in ingested stores.
    pub fn tag_name(&self) -> &'static str {
        match self {
            EntityKind::Ticker => "TICKER",
            EntityKind::Rating => "RATING",
            EntityKind::PriceTarget => "PRICE_TARGET",
            EntityKind::FinancialMetric => "TABLE_METRIC",
            EntityKind::Margin => "MARGIN",
            EntityKind::Percentage => "PERCENTAGE",
        }
    }

    /// Inverse of [`EntityKind::tag_name`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "TICKER" => Some(EntityKind::Ticker),
            "RATING" => Some(EntityKind::Rating),
            "PRICE_TARGET" => Some(EntityKind::PriceTarget),
            "TABLE_METRIC" => Some(EntityKind::FinancialMetric),
            "MARGIN" => Some(EntityKind::Margin),
            "PERCENTAGE" => Some(EntityKind::Percentage),
            _ => None,
        }
    }
}

/// Which extractor produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    BodyText,
    Table,
}

impl EntitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitySource::BodyText => "body_text",
            EntitySource::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "body_text" => Some(EntitySource::BodyText),
            "table" => Some(EntitySource::Table),
            _ => None,
        }
    }
}

/// An extracted fact about a financial instrument or concept.
///
/// `value` preserves the original sign and formatting of the source text;
/// any currency/percent normalization happens explicitly downstream, never
/// silently here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// Display name, e.g. "Operating Margin".
    pub name: String,
    /// Raw value text, e.g. "37.5%", "-6%", "$1.2B".
    pub value: String,
    /// Reporting period, e.g. "2Q2025", "YoY", or [`PERIOD_UNSPECIFIED`].
    pub period: String,
    /// Explicit company linkage, or [`TICKER_NA`].
    pub ticker: String,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
    pub source: EntitySource,
}

impl Entity {
    /// Entity with all optional fields at their explicit sentinels.
    pub fn new(kind: EntityKind, name: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            value: String::new(),
            period: PERIOD_UNSPECIFIED.to_string(),
            ticker: TICKER_NA.to_string(),
            confidence,
            source: EntitySource::BodyText,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = ticker.into();
        self
    }

    pub fn with_source(mut self, source: EntitySource) -> Self {
        self.source = source;
        self
    }

    /// True when the entity carries a real ticker linkage.
    pub fn has_ticker(&self) -> bool {
        self.ticker != TICKER_NA && !self.ticker.is_empty()
    }
}

// ============================================================================
// Source markers
// ============================================================================

/// Provenance tag for a block of ingested content.
///
/// Two grammars exist on the wire, distinguished by the leading type tag:
///
/// - `[SOURCE_EMAIL:<uid>|sender:<s>|date:<rfc2822>(|subject:<subj>)?]`
/// - `[SOURCE:<API_NAME>|SYMBOL:<ticker>(|DATE:<iso8601>)?]`
///
/// Both tolerate trailing fields they do not define; older producers emitted
/// fewer fields and newer ones may emit more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum SourceMarker {
    Email {
        uid: String,
        sender: String,
        /// RFC 2822 as written by the mail client, verbatim.
        date: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    Api {
        name: String,
        symbol: String,
        /// ISO 8601 fetch timestamp; absent on markers written before the
        /// field existed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<String>,
    },
}

impl SourceMarker {
    /// Stable identifier for the source (email uid or API name).
    pub fn identifier(&self) -> &str {
        match self {
            SourceMarker::Email { uid, .. } => uid,
            SourceMarker::Api { name, .. } => name,
        }
    }

    /// Timestamp string if the marker carries one.
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            SourceMarker::Email { date, .. } => Some(date.as_str()),
            SourceMarker::Api { date, .. } => date.as_deref(),
        }
    }
}
