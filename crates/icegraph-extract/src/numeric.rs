//! Sign-preserving numeric parsing for table cells.
//!
//! Financial tables write negatives three ways: `-6%`, `(6%)`, `-6.0`. All
//! three must parse to a negative number. A dropped sign here turns a margin
//! contraction into an expansion downstream, so the sign handling is the
//! whole point of this module.

use serde::{Deserialize, Serialize};

/// Unit suffix attached to a parsed number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberUnit {
    Plain,
    Percent,
    Millions,
    Billions,
}

impl NumberUnit {
    fn multiplier(&self) -> f64 {
        match self {
            NumberUnit::Plain | NumberUnit::Percent => 1.0,
            NumberUnit::Millions => 1e6,
            NumberUnit::Billions => 1e9,
        }
    }
}

/// A table cell parsed as a number, sign intact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedNumber {
    /// Signed magnitude as written, e.g. `-6.0` for `(6%)`, `1.2` for `$1.2B`.
    pub value: f64,
    pub unit: NumberUnit,
    /// True when the cell carried explicit financial formatting: a percent
    /// sign, currency symbol, unit suffix, or thousands separators.
    pub formatted: bool,
}

impl ParsedNumber {
    /// Value with the unit multiplier applied (`$1.2B` → `1.2e9`).
    pub fn scaled(&self) -> f64 {
        self.value * self.unit.multiplier()
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0.0
    }
}

/// Parse a raw cell, preserving sign. Returns `None` for non-numeric cells.
///
/// Accepted forms: `91.4`, `-6%`, `(6%)`, `$1,234.5`, `2.1B`, `850 million`,
/// `+3.2%`. Parenthesized values are negative per accounting convention; a
/// parenthesis must never be silently dropped to yield a positive number.
pub fn parse_signed(raw: &str) -> Option<ParsedNumber> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    let mut formatted = false;

    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].trim();
    }

    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.trim_start();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.trim_start();
    }

    if let Some(rest) = s.strip_prefix(['$', '€', '£']) {
        formatted = true;
        s = rest.trim_start();
    }

    let mut unit = NumberUnit::Plain;
    if let Some(rest) = s.strip_suffix('%') {
        unit = NumberUnit::Percent;
        formatted = true;
        s = rest.trim_end();
    }

    // Split digits from a textual unit suffix, e.g. "2.1B", "850 million".
    let split = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == ','))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    let suffix = suffix.trim().to_ascii_lowercase();

    if unit == NumberUnit::Plain && !suffix.is_empty() {
        unit = match suffix.as_str() {
            "b" | "bn" | "billion" | "billions" => NumberUnit::Billions,
            "m" | "mn" | "mm" | "million" | "millions" => NumberUnit::Millions,
            _ => return None,
        };
        formatted = true;
    } else if !suffix.is_empty() {
        // e.g. "37.5x%" or trailing garbage after a percent value
        return None;
    }

    if digits.contains(',') {
        formatted = true;
    }
    let cleaned = digits.replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    let magnitude: f64 = cleaned.parse().ok()?;

    Some(ParsedNumber {
        value: if negative { -magnitude } else { magnitude },
        unit,
        formatted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plain_number_parses_unformatted() {
        let n = parse_signed("91.4").unwrap();
        assert_relative_eq!(n.value, 91.4);
        assert_eq!(n.unit, NumberUnit::Plain);
        assert!(!n.formatted);
    }

    #[test]
    fn negative_forms_all_preserve_sign() {
        for raw in ["-6%", "(6%)", "-6.0", "(6.0)", "( 6% )"] {
            let n = parse_signed(raw).unwrap_or_else(|| panic!("{raw} should parse"));
            assert!(n.is_negative(), "{raw} parsed non-negative: {n:?}");
            assert_relative_eq!(n.value, -6.0);
        }
    }

    #[test]
    fn percent_and_currency_are_formatted() {
        assert!(parse_signed("37.5%").unwrap().formatted);
        assert!(parse_signed("$1,234.5").unwrap().formatted);
        assert_relative_eq!(parse_signed("$1,234.5").unwrap().value, 1234.5);
    }

    #[test]
    fn unit_suffixes_scale() {
        let b = parse_signed("$1.2B").unwrap();
        assert_eq!(b.unit, NumberUnit::Billions);
        assert_relative_eq!(b.scaled(), 1.2e9);

        let m = parse_signed("850 million").unwrap();
        assert_eq!(m.unit, NumberUnit::Millions);
        assert_relative_eq!(m.scaled(), 8.5e8);
    }

    #[test]
    fn non_numeric_cells_return_none() {
        for raw in ["", "N/A", "-", "n.m.", "YoY", "37.5x%"] {
            assert!(parse_signed(raw).is_none(), "{raw} should not parse");
        }
    }

    #[test]
    fn explicit_plus_is_positive() {
        assert_relative_eq!(parse_signed("+3.2%").unwrap().value, 3.2);
    }
}
