//! Cross-source numeric conflict detection.
//!
//! When several sources report different values for what purports to be the
//! same fact, disagreement above the threshold is surfaced as a report with
//! every value and source listed. It is never averaged away: a silent mean of
//! a filing and a stale news figure is exactly the misleading answer this
//! layer exists to prevent.

use serde::{Deserialize, Serialize};

/// Coefficient-of-variation threshold above which values conflict.
pub const CONFLICT_CV_THRESHOLD: f64 = 0.10;

/// One source's claim of a numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceValue {
    /// Source identifier (email uid or API name).
    pub source: String,
    pub value: f64,
}

/// Report of a detected cross-source conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// What the conflicting values claim to describe.
    pub fact: String,
    pub values: Vec<SourceValue>,
    pub mean: f64,
    /// Sample standard deviation of the claimed values.
    pub std_dev: f64,
    /// Coefficient of variation (std_dev / |mean|).
    pub coefficient_of_variation: f64,
}

/// Check a set of same-fact values from different sources for conflict.
///
/// Returns `None` when fewer than two values exist or when the spread is
/// within tolerance. Uses the sample (n-1) standard deviation.
pub fn detect_conflicts(fact: &str, sources: &[SourceValue]) -> Option<ConflictReport> {
    if sources.len() < 2 {
        return None;
    }

    let n = sources.len() as f64;
    let mean = sources.iter().map(|s| s.value).sum::<f64>() / n;
    if mean == 0.0 {
        return None;
    }

    let variance = sources
        .iter()
        .map(|s| (s.value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let std_dev = variance.sqrt();
    let cv = std_dev / mean.abs();

    if cv <= CONFLICT_CV_THRESHOLD {
        return None;
    }

    Some(ConflictReport {
        fact: fact.to_string(),
        values: sources.to_vec(),
        mean,
        std_dev,
        coefficient_of_variation: cv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sv(source: &str, value: f64) -> SourceValue {
        SourceValue {
            source: source.to_string(),
            value,
        }
    }

    #[test]
    fn three_way_disagreement_over_threshold_is_reported() {
        let sources = vec![
            sv("sec_filing", 95.00),
            sv("news_wire", 120.00),
            sv("analyst_email", 100.00),
        ];
        let report = detect_conflicts("price target", &sources).expect("should conflict");

        assert_eq!(report.values.len(), 3);
        assert_relative_eq!(report.mean, 105.0);
        // Sample std dev of {95, 120, 100} is ~13.23, CV ~12.6%.
        assert_relative_eq!(report.coefficient_of_variation, 0.126, max_relative = 0.01);
        assert!(report.coefficient_of_variation > CONFLICT_CV_THRESHOLD);
    }

    #[test]
    fn agreeing_sources_produce_no_report() {
        let sources = vec![sv("a", 100.0), sv("b", 101.0), sv("c", 99.5)];
        assert!(detect_conflicts("revenue", &sources).is_none());
    }

    #[test]
    fn single_source_cannot_conflict() {
        assert!(detect_conflicts("eps", &[sv("a", 5.01)]).is_none());
        assert!(detect_conflicts("eps", &[]).is_none());
    }

    #[test]
    fn negative_values_use_absolute_mean() {
        let sources = vec![sv("a", -6.0), sv("b", -8.0)];
        let report = detect_conflicts("margin delta", &sources);
        assert!(report.is_some(), "sign must not suppress detection");
    }
}
