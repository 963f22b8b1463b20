//! Entity extraction from structured tables.
//!
//! Operates on rows x columns as delivered by the external document
//! converter. The header row names the periods ("2Q2025", "YoY"); each
//! (row-label, period-column) cell that parses as a number becomes one
//! financial_metric or margin entity, ticker-linked from context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::numeric::parse_signed;
use crate::{scoring, Entity, EntityBag, EntityKind, EntitySource, ExtractorConfig, TICKER_NA};

/// A structured table: one header row plus data rows.
///
/// Column 0 is the label column; columns 1.. are period columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build from raw rows, treating the first row as the header.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let headers = rows.remove(0);
        Some(Self { headers, rows })
    }
}

/// Document/email context for one table.
#[derive(Debug, Clone, Default)]
pub struct TableContext {
    /// Ticker the table describes. Downstream multi-hop queries need the
    /// explicit (ticker, metric, period) triple, so when this is supplied
    /// every produced entity carries it; proximity inference is not enough.
    pub ticker: Option<String>,
}

/// Row labels matching these classes earn the named-category bonus and, for
/// the margin class, the `Margin` kind.
fn metric_keyword_re() -> Regex {
    Regex::new(r"(?i)\b(revenue|revenues|sales|turnover|profit|income|earnings|ebit|ebitda|eps)\b")
        .unwrap()
}

fn margin_keyword_re() -> Regex {
    Regex::new(r"(?i)\b(margin|margins|profitability)\b").unwrap()
}

/// Extract financial_metric/margin entities from a table.
///
/// One entity per (row-label, period-column) cell that either matches a known
/// keyword class or is a well-formed plain number. Sign is preserved through
/// [`parse_signed`]; the raw cell text is kept as the entity value.
pub fn extract_table_entities(
    table: &Table,
    ctx: &TableContext,
    config: &ExtractorConfig,
) -> EntityBag {
    let mut bag = EntityBag::new();

    if table.headers.len() < 2 {
        warn!(
            columns = table.headers.len(),
            "table has no period columns, returning empty bag"
        );
        return bag;
    }

    let periods: Vec<&str> = table.headers[1..].iter().map(|h| h.trim()).collect();
    let ticker = ctx.ticker.as_deref().unwrap_or(TICKER_NA);
    let metric_re = metric_keyword_re();
    let margin_re = margin_keyword_re();

    for row in &table.rows {
        let Some(label) = row.first() else {
            continue;
        };
        let label = label.trim();
        if label.is_empty() {
            continue;
        }

        let is_margin = margin_re.is_match(label);
        let named_category = is_margin || metric_re.is_match(label);
        let kind = if is_margin {
            EntityKind::Margin
        } else {
            EntityKind::FinancialMetric
        };

        for (col, cell) in row.iter().enumerate().skip(1) {
            let Some(period) = periods.get(col - 1) else {
                continue;
            };
            let raw = cell.trim();
            if parse_signed(raw).is_none() {
                continue;
            }

            let mut confidence = scoring::BASE;
            if named_category {
                confidence += scoring::NAMED_CATEGORY_BONUS;
            }
            // Any successfully parsed cell earns the format bonus, whether it
            // carries explicit financial formatting (%, $, billions) or is a
            // bare numeral. Many table styles omit unit suffixes entirely;
            // requiring them rejected most valid plain-number metrics.
            confidence += scoring::VALUE_FORMAT_BONUS;
            if ticker != TICKER_NA && !period.is_empty() {
                confidence += scoring::COMPLETENESS_BONUS;
            }

            if confidence < config.min_confidence {
                debug!(
                    label,
                    period = *period,
                    confidence,
                    floor = config.min_confidence,
                    "dropping low-confidence table entity"
                );
                continue;
            }

            bag.push(
                Entity::new(kind, label, confidence)
                    .with_value(raw)
                    .with_period(*period)
                    .with_ticker(ticker)
                    .with_source(EntitySource::Table),
            );
        }
    }

    bag
}
