//! Encoder/decoder for the bracketed tag grammar.
//!
//! Decode is deliberately forgiving at the corpus level: one malformed tag is
//! skipped with a warning and scanning continues, because retrieved chunks
//! routinely splice tags mid-stream. A single bad tag must never cost the
//! caller the rest of the chunk.

use tracing::warn;

use crate::escape::{escape, split_unescaped, unescape};
use crate::{Entity, EntityKind, EntitySource, SourceMarker, PERIOD_UNSPECIFIED, TICKER_NA};

/// One successfully decoded tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedTag {
    Entity(Entity),
    Source(SourceMarker),
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode an entity as a single-line tag.
///
/// Field order is stable per kind: `name|value|period|ticker|confidence|source`,
/// with `source` as a trailing field older consumers may ignore. Confidence is
/// always formatted to two decimal places.
pub fn encode_entity(entity: &Entity) -> String {
    format!(
        "[{}:{}|value:{}|period:{}|ticker:{}|confidence:{:.2}|source:{}]",
        entity.kind.tag_name(),
        escape(&entity.name),
        escape(&entity.value),
        escape(&entity.period),
        escape(&entity.ticker),
        entity.confidence,
        entity.source.as_str(),
    )
}

/// Encode a source marker.
pub fn encode_marker(marker: &SourceMarker) -> String {
    match marker {
        SourceMarker::Email {
            uid,
            sender,
            date,
            subject,
        } => {
            let mut tag = format!(
                "[SOURCE_EMAIL:{}|sender:{}|date:{}",
                escape(uid),
                escape(sender),
                escape(date),
            );
            if let Some(subject) = subject {
                tag.push_str("|subject:");
                tag.push_str(&escape(subject));
            }
            tag.push(']');
            tag
        }
        SourceMarker::Api { name, symbol, date } => {
            let mut tag = format!("[SOURCE:{}|SYMBOL:{}", escape(name), escape(symbol));
            if let Some(date) = date {
                tag.push_str("|DATE:");
                tag.push_str(&escape(date));
            }
            tag.push(']');
            tag
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode every well-formed tag in a corpus.
///
/// Malformed tags (unbalanced brackets, missing required fields, bad
/// confidence) are skipped with a warning. Brackets that do not open a tag at
/// all (ordinary prose) are ignored silently.
pub fn decode(text: &str) -> Vec<DecodedTag> {
    let mut tags = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '[' {
            i += 1;
            continue;
        }
        match find_unescaped_close(&chars, i + 1) {
            Some(close) => {
                let body: String = chars[i + 1..close].iter().collect();
                match parse_tag(&body) {
                    Ok(tag) => {
                        tags.push(tag);
                        i = close + 1;
                        continue;
                    }
                    Err(TagError::NotATag) => {
                        // Ordinary bracketed prose; keep scanning inside it.
                        i += 1;
                        continue;
                    }
                    Err(TagError::Malformed(reason)) => {
                        warn!(reason = %reason, tag = %truncate(&body), "skipping malformed markup tag");
                        i = close + 1;
                        continue;
                    }
                }
            }
            None => {
                let rest: String = chars[i + 1..].iter().take(24).collect();
                if looks_like_tag_start(&rest) {
                    warn!(tag = %truncate(&rest), "skipping unterminated markup tag");
                }
                i += 1;
            }
        }
    }

    tags
}

/// Decode only entity tags.
pub fn decode_entities(text: &str) -> Vec<Entity> {
    decode(text)
        .into_iter()
        .filter_map(|t| match t {
            DecodedTag::Entity(e) => Some(e),
            DecodedTag::Source(_) => None,
        })
        .collect()
}

/// Decode only source markers.
pub fn decode_markers(text: &str) -> Vec<SourceMarker> {
    decode(text)
        .into_iter()
        .filter_map(|t| match t {
            DecodedTag::Source(m) => Some(m),
            DecodedTag::Entity(_) => None,
        })
        .collect()
}

enum TagError {
    /// The bracketed span is not markup at all (no `KIND:` prefix).
    NotATag,
    /// Recognized kind but a required field is missing or unparseable.
    Malformed(String),
}

fn parse_tag(body: &str) -> Result<DecodedTag, TagError> {
    let segments = split_unescaped(body);
    let head = segments[0];
    let (kind_tag, name_raw) = head.split_once(':').ok_or(TagError::NotATag)?;
    if !is_kind_tag(kind_tag) {
        return Err(TagError::NotATag);
    }
    let name = unescape(name_raw);

    // Field keys are matched case-insensitively: email markers use lowercase
    // keys, API markers historically use uppercase (SYMBOL, DATE).
    let mut fields: Vec<(String, String)> = Vec::new();
    for seg in &segments[1..] {
        match seg.split_once(':') {
            Some((key, value)) => fields.push((key.to_ascii_lowercase(), unescape(value))),
            None => {
                return Err(TagError::Malformed(format!(
                    "field segment without key/value separator: {seg:?}"
                )))
            }
        }
    }
    let field = |key: &str| -> Option<&str> {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    match kind_tag {
        "SOURCE_EMAIL" => {
            let sender = field("sender")
                .ok_or_else(|| TagError::Malformed("SOURCE_EMAIL missing sender".into()))?;
            let date = field("date")
                .ok_or_else(|| TagError::Malformed("SOURCE_EMAIL missing date".into()))?;
            Ok(DecodedTag::Source(SourceMarker::Email {
                uid: name,
                sender: sender.to_string(),
                date: date.to_string(),
                subject: field("subject").map(str::to_string),
            }))
        }
        "SOURCE" => {
            let symbol = field("symbol")
                .ok_or_else(|| TagError::Malformed("SOURCE missing SYMBOL".into()))?;
            Ok(DecodedTag::Source(SourceMarker::Api {
                name,
                symbol: symbol.to_string(),
                date: field("date").map(str::to_string),
            }))
        }
        other => {
            let kind = EntityKind::from_tag(other)
                .ok_or_else(|| TagError::Malformed(format!("unknown tag kind {other}")))?;
            let confidence_raw = field("confidence")
                .ok_or_else(|| TagError::Malformed(format!("{other} missing confidence")))?;
            let confidence: f64 = confidence_raw.parse().map_err(|_| {
                TagError::Malformed(format!("unparseable confidence {confidence_raw:?}"))
            })?;
            if !(0.0..=1.0).contains(&confidence) {
                return Err(TagError::Malformed(format!(
                    "confidence {confidence} outside [0, 1]"
                )));
            }
            let source = field("source")
                .and_then(EntitySource::parse)
                .unwrap_or(EntitySource::BodyText);
            Ok(DecodedTag::Entity(Entity {
                kind,
                name,
                value: field("value").unwrap_or("").to_string(),
                period: field("period").unwrap_or(PERIOD_UNSPECIFIED).to_string(),
                ticker: field("ticker").unwrap_or(TICKER_NA).to_string(),
                confidence,
                source,
            }))
        }
    }
}

/// Index of the next `]` not preceded by an escape, starting at `from`.
fn find_unescaped_close(chars: &[char], from: usize) -> Option<usize> {
    let mut escaped = false;
    for (offset, &c) in chars[from..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ']' => return Some(from + offset),
            _ => {}
        }
    }
    None
}

/// A tag kind is ALL_CAPS with at least one letter; this keeps prose like
/// `[12:30pm]` from being mistaken for markup.
fn is_kind_tag(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn looks_like_tag_start(s: &str) -> bool {
    match s.split_once(':') {
        Some((head, _)) => is_kind_tag(head),
        None => false,
    }
}

fn truncate(s: &str) -> &str {
    let end = s
        .char_indices()
        .nth(60)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}
