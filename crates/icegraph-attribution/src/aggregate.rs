//! Answer-level confidence aggregation.
//!
//! Three scenarios, three named formulas. They are kept separate on purpose:
//! a single "universal average" reads as reasonable and produces misleading
//! confidence for both the authoritative-filing case (diluted by weaker
//! sources) and the multi-hop case (uncertainty fails to compound).

use serde::{Deserialize, Serialize};

use crate::AttributionError;

/// Trust tier of a contributing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTrust {
    /// Forwarded analyst/IR email.
    Email,
    /// News wire or aggregator.
    News,
    /// Regulatory filing or exchange disclosure.
    Regulatory,
}

/// Per-tier weights for the weighted-average scenario.
///
/// The defaults are illustrative, not load-bearing: deployments tune them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    pub regulatory: f64,
    pub news: f64,
    pub email: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            regulatory: 0.5,
            news: 0.3,
            email: 0.2,
        }
    }
}

impl TrustWeights {
    pub fn weight_for(&self, trust: SourceTrust) -> f64 {
        match trust {
            SourceTrust::Regulatory => self.regulatory,
            SourceTrust::News => self.news,
            SourceTrust::Email => self.email,
        }
    }
}

/// One source's contribution to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceConfidence {
    pub trust: SourceTrust,
    pub confidence: f64,
}

/// Which aggregation scenario applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregationMode {
    /// One authoritative source answers alone; it keeps its own confidence.
    /// With several candidates, the most trusted tier wins.
    SingleAuthoritative,
    /// Multiple agreeing sources: trust-weighted average.
    WeightedBySourceTrust(TrustWeights),
    /// A multi-hop reasoning path (company → metric → period): confidence
    /// degrades multiplicatively per hop, modeling compounding uncertainty.
    MultiHopPath,
}

/// Aggregate per-source confidences into one answer-level confidence.
pub fn aggregate_confidence(
    sources: &[SourceConfidence],
    mode: &AggregationMode,
) -> Result<f64, AttributionError> {
    if sources.is_empty() {
        return Err(AttributionError::NoSources);
    }

    let value = match mode {
        AggregationMode::SingleAuthoritative => {
            sources
                .iter()
                .max_by(|a, b| {
                    a.trust
                        .cmp(&b.trust)
                        .then(a.confidence.total_cmp(&b.confidence))
                })
                .map(|s| s.confidence)
                .unwrap_or(0.0) // unreachable: sources is non-empty
        }
        AggregationMode::WeightedBySourceTrust(weights) => {
            let total_weight: f64 = sources.iter().map(|s| weights.weight_for(s.trust)).sum();
            if total_weight == 0.0 {
                return Err(AttributionError::NoSources);
            }
            sources
                .iter()
                .map(|s| weights.weight_for(s.trust) * s.confidence)
                .sum::<f64>()
                / total_weight
        }
        AggregationMode::MultiHopPath => sources.iter().map(|s| s.confidence).product(),
    };

    Ok(value.clamp(0.0, 1.0))
}
