//! Pattern-based entity extraction from body text.
//!
//! Uses per-kind regex/keyword patterns with heuristic confidence scoring.
//! Extraction never fails: malformed or empty input yields an empty bag and
//! a warning, because one unreadable email must not abort its batch.

use regex::Regex;
use tracing::{debug, warn};

use crate::{
    scoring, Entity, EntityBag, EntityKind, EntitySource, ExtractorConfig, TICKER_NA,
};

/// Contextual hints for one document's body extraction.
#[derive(Debug, Clone, Default)]
pub struct BodyContext {
    /// Ticker the document is known to be about (from subject, thread, or
    /// upstream classification). Metric and margin entities inherit it.
    pub ticker_hint: Option<String>,
}

/// One extraction pattern for body text.
pub struct BodyPattern {
    pub name: &'static str,
    pub kind: EntityKind,
    pub regex: Regex,
    /// Named keyword-category patterns earn the specificity bonus.
    pub named_category: bool,
    /// Skip matches that fall inside a masked date span.
    pub mask_dates: bool,
}

/// Uppercase words that look like tickers but never are.
const TICKER_STOPLIST: &[&str] = &[
    "CEO", "CFO", "COO", "USD", "EUR", "GBP", "CNY", "HKD", "GAAP", "EPS", "YOY", "QOQ", "IPO",
    "ETF", "SEC", "FED", "GDP", "PDF", "FYI", "NOTE", "BUY", "SELL", "HOLD", "EBIT", "EBITDA",
    "THE", "AND", "FOR", "NOT", "ALL", "NEW", "PT", "FY", "AM", "PM",
];

/// Build the default body-text patterns.
///
/// Patterns are matched independently; the same span may legitimately yield
/// both a margin and a percentage entity.
pub fn body_patterns() -> Vec<BodyPattern> {
    vec![
        BodyPattern {
            name: "rating_keyword",
            kind: EntityKind::Rating,
            regex: Regex::new(
                r"(?i)\b(buy|sell|hold|overweight|underweight|outperform|underperform|accumulate)\b",
            )
            .unwrap(),
            named_category: true,
            mask_dates: false,
        },
        BodyPattern {
            name: "price_target",
            kind: EntityKind::PriceTarget,
            // Covers common phrasing like:
            // - "price target of $520"
            // - "target price: 520.50"
            // - "PT $85"
            regex: Regex::new(
                r"(?i)(?:price\s+target|target\s+price|\bPT\b)\s*(?:of|at|to|:)?\s*(?:US?\$|\$|HK\$)?\s*(\d+(?:[.,]\d+)?)",
            )
            .unwrap(),
            named_category: true,
            mask_dates: false,
        },
        BodyPattern {
            name: "metric_revenue",
            kind: EntityKind::FinancialMetric,
            regex: Regex::new(
                r"(?i)\b(revenue|revenues|sales|turnover)\b[^\d\n%]{0,30}((?:US?\$|\$|HK\$)?\d[\d,]*(?:\.\d+)?\s*(?:billion|million|bn|mn|mm|[bm])?)",
            )
            .unwrap(),
            named_category: true,
            mask_dates: false,
        },
        BodyPattern {
            name: "metric_profit",
            kind: EntityKind::FinancialMetric,
            regex: Regex::new(
                r"(?i)\b(net\s+profit|net\s+income|profit|income|earnings|ebitda|ebit)\b[^\d\n%]{0,30}((?:US?\$|\$|HK\$)?\d[\d,]*(?:\.\d+)?\s*(?:billion|million|bn|mn|mm|[bm])?)",
            )
            .unwrap(),
            named_category: true,
            mask_dates: false,
        },
        BodyPattern {
            name: "margin_keyword",
            kind: EntityKind::Margin,
            regex: Regex::new(
                r"(?i)\b((?:gross|operating|net|ebitda)\s+margin|margin|profitability)\b[^\d\n]{0,30}([-+(]?\d[\d,]*(?:\.\d+)?\s*%\)?)",
            )
            .unwrap(),
            named_category: true,
            mask_dates: false,
        },
        BodyPattern {
            name: "percentage",
            kind: EntityKind::Percentage,
            regex: Regex::new(r"([-+]?\d+(?:\.\d+)?\s*%)").unwrap(),
            named_category: false,
            mask_dates: true,
        },
        BodyPattern {
            name: "ticker_symbol",
            kind: EntityKind::Ticker,
            regex: Regex::new(r"\b([A-Z]{2,5})\b").unwrap(),
            named_category: false,
            mask_dates: true,
        },
    ]
}

/// Byte spans of date-like strings in `text`.
///
/// This is a deliberate, named preprocessing step: temporal strings like
/// "October 2, 2025" or "17 Aug 2025" must be classified up front and
/// excluded from non-temporal entity categories, not left to fall through a
/// category matcher by accident. Month abbreviations in caps ("OCT", "MAY")
/// would otherwise read as ticker symbols.
pub fn mask_date_spans(text: &str) -> Vec<(usize, usize)> {
    let patterns = [
        // "October 2, 2025" / "Oct 2 2025"
        r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b",
        // "17 Aug 2025"
        r"(?i)\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{4}\b",
        // ISO dates
        r"\b\d{4}-\d{2}-\d{2}\b",
    ];

    let mut spans = Vec::new();
    for pat in patterns {
        let re = Regex::new(pat).unwrap();
        for m in re.find_iter(text) {
            spans.push((m.start(), m.end()));
        }
    }
    spans
}

fn overlaps(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && end > s)
}

/// Extract a normalized entity bag from raw body text.
pub fn extract_body_entities(text: &str, ctx: &BodyContext, config: &ExtractorConfig) -> EntityBag {
    let mut bag = EntityBag::new();
    if text.trim().is_empty() {
        warn!("body extraction on empty input, returning empty bag");
        return bag;
    }

    let date_spans = mask_date_spans(text);
    let ticker_hint = ctx.ticker_hint.as_deref().unwrap_or(TICKER_NA);
    // (kind, name, value, period) already emitted this document
    let mut seen: Vec<(EntityKind, String, String)> = Vec::new();

    for pattern in body_patterns() {
        for caps in pattern.regex.captures_iter(text) {
            let whole = caps.get(0).unwrap();
            if pattern.mask_dates && overlaps(&date_spans, whole.start(), whole.end()) {
                continue;
            }

            let entity = match build_entity(&pattern, &caps, ticker_hint) {
                Some(e) => e,
                None => continue,
            };

            let key = (entity.kind, entity.name.clone(), entity.value.clone());
            if seen.contains(&key) {
                continue;
            }

            let mut confidence = scoring::BASE;
            if pattern.named_category {
                confidence += scoring::NAMED_CATEGORY_BONUS;
            }
            if entity.has_ticker() && !entity.value.is_empty() {
                confidence += scoring::COMPLETENESS_BONUS;
            }

            if confidence < config.min_confidence {
                debug!(
                    pattern = pattern.name,
                    name = %entity.name,
                    confidence,
                    floor = config.min_confidence,
                    "dropping low-confidence body entity"
                );
                continue;
            }

            seen.push(key);
            bag.push(Entity {
                confidence,
                ..entity
            });
        }
    }

    bag
}

fn build_entity(pattern: &BodyPattern, caps: &regex::Captures, ticker_hint: &str) -> Option<Entity> {
    let g = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());

    let entity = match pattern.kind {
        EntityKind::Ticker => {
            let symbol = g(1)?;
            if TICKER_STOPLIST.contains(&symbol.as_str()) {
                return None;
            }
            Entity::new(EntityKind::Ticker, symbol.clone(), 0.0)
                .with_value(symbol.clone())
                .with_ticker(symbol)
        }
        EntityKind::Rating => {
            let word = g(1)?.to_uppercase();
            Entity::new(EntityKind::Rating, word.clone(), 0.0)
                .with_value(word)
                .with_ticker(ticker_hint)
        }
        EntityKind::PriceTarget => Entity::new(EntityKind::PriceTarget, "Price Target", 0.0)
            .with_value(g(1)?)
            .with_ticker(ticker_hint),
        EntityKind::FinancialMetric | EntityKind::Margin => {
            let keyword = title_case(&g(1)?);
            Entity::new(pattern.kind, keyword, 0.0)
                .with_value(g(2)?)
                .with_ticker(ticker_hint)
        }
        EntityKind::Percentage => Entity::new(EntityKind::Percentage, "Percentage", 0.0)
            .with_value(g(1)?)
            .with_ticker(ticker_hint),
    };
    Some(entity.with_source(EntitySource::BodyText))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
