use serde::{Deserialize, Serialize};

use super::candidate::{AiFeature, Candidate};

/// Thresholds a candidate's statistics must meet to be confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationThresholds {
    /// Maximum NULL percentage, inclusive
    pub max_sparsity_percent: f64,
    pub min_avg_text_length: f64,
    pub min_data_readiness_score: f64,
}

impl Default for ConfirmationThresholds {
    fn default() -> Self {
        Self {
            max_sparsity_percent: 50.0,
            min_avg_text_length: 30.0,
            min_data_readiness_score: 3.5,
        }
    }
}

/// Confirmation verdict with one reason per check, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub is_confirmed: bool,
    pub reasons: Vec<String>,
}

/// Evaluate the confirmation rule. Checks run in a fixed order: sparsity,
/// content quality, JSON structure, data readiness. A missing statistic
/// fails its check, except the natural-language and JSON probes, which are
/// skipped when they were not performed.
pub fn confirm(candidate: &Candidate, thresholds: &ConfirmationThresholds) -> Confirmation {
    let mut reasons = Vec::new();
    let mut is_confirmed = true;
    let stats = candidate.statistics();

    match stats.and_then(|s| s.null_percentage) {
        None => {
            is_confirmed = false;
            reasons.push("Sparsity unknown (no NULL statistics available)".to_string());
        }
        Some(null_pct) if null_pct > thresholds.max_sparsity_percent => {
            is_confirmed = false;
            reasons.push(format!("High sparsity ({:.1}% NULL)", null_pct));
        }
        Some(null_pct) => {
            reasons.push(format!("Good completeness ({:.1}% populated)", 100.0 - null_pct));
        }
    }

    let feature = candidate.ai_feature();
    if matches!(feature, AiFeature::Llm | AiFeature::Search) {
        match stats.and_then(|s| s.avg_length) {
            None => {
                is_confirmed = false;
                reasons.push("Content length unknown (no length statistics available)".to_string());
            }
            Some(avg) if avg < thresholds.min_avg_text_length => {
                is_confirmed = false;
                reasons.push(format!("Short content (avg {:.1} chars)", avg));
            }
            Some(avg) => reasons.push(format!("Substantial content (avg {:.1} chars)", avg)),
        }

        match stats.and_then(|s| s.content.as_ref()).and_then(|c| c.is_natural_language) {
            Some(false) => {
                is_confirmed = false;
                reasons.push("Content appears to be codes/structured, not natural language".to_string());
            }
            Some(true) => reasons.push("Natural language content detected".to_string()),
            None => {}
        }
    }

    if feature == AiFeature::Extract {
        match stats.and_then(|s| s.json_structure.as_ref()).map(|j| j.is_valid_structure) {
            Some(false) => {
                is_confirmed = false;
                reasons.push("Invalid JSON structure detected".to_string());
            }
            Some(true) => reasons.push("Valid JSON structure confirmed".to_string()),
            None => {}
        }
    }

    match candidate.scores().map(|s| s.data_readiness) {
        None => {
            is_confirmed = false;
            reasons.push("Data readiness score unavailable".to_string());
        }
        Some(score) if score < thresholds.min_data_readiness_score => {
            is_confirmed = false;
            reasons.push(format!("Low data readiness score ({:.2})", score));
        }
        Some(score) => reasons.push(format!("Good data readiness ({:.2})", score)),
    }

    Confirmation { is_confirmed, reasons }
}
