use super::candidate::{AiFeature, Candidate};
use super::dimensions::ReadinessSummary;
use super::sampling::{ItemError, PassReport};
use super::statistics::{ContentClass, ProfilingThresholds, SparsityClass};
use crate::jobs::state::MergeReport;
use crate::jobs::{PipelineStage, RunMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome counts of a sampling or full-scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCounts {
    pub cache_hits: usize,
    pub newly_analyzed: usize,
    pub skipped: usize,
}

impl PassCounts {
    pub fn succeeded(&self) -> usize {
        self.cache_hits + self.newly_analyzed
    }
}

impl From<&PassReport> for PassCounts {
    fn from(report: &PassReport) -> Self {
        Self {
            cache_hits: report.cache_hits,
            newly_analyzed: report.newly_analyzed,
            skipped: report.skipped,
        }
    }
}

/// Aggregates over a candidate list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub total: usize,
    pub by_feature: BTreeMap<AiFeature, usize>,
    pub confirmed_by_feature: BTreeMap<AiFeature, usize>,
    pub confirmed: usize,
    pub unconfirmed: usize,
    pub sparsity_distribution: BTreeMap<SparsityClass, usize>,
    pub content_distribution: BTreeMap<ContentClass, usize>,
}

impl CandidateSummary {
    pub fn from_candidates(candidates: &[Candidate], thresholds: &ProfilingThresholds) -> Self {
        let mut summary = Self {
            total: candidates.len(),
            ..Default::default()
        };
        for feature in AiFeature::ALL {
            summary.by_feature.insert(feature, 0);
            summary.confirmed_by_feature.insert(feature, 0);
        }

        for candidate in candidates {
            let feature = candidate.ai_feature();
            *summary.by_feature.entry(feature).or_default() += 1;
            if candidate.is_confirmed() {
                summary.confirmed += 1;
                *summary.confirmed_by_feature.entry(feature).or_default() += 1;
            } else {
                summary.unconfirmed += 1;
            }

            if let Some(stats) = candidate.statistics() {
                let sparsity = thresholds.classify_sparsity(stats.null_percentage);
                *summary.sparsity_distribution.entry(sparsity).or_default() += 1;
                let content = thresholds.classify_content(stats.avg_length);
                *summary.content_distribution.entry(content).or_default() += 1;
            }
        }
        summary
    }
}

/// Written to `reports/run_summary.json` at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: RunMode,
    pub stages_run: Vec<PipelineStage>,
    pub readiness: ReadinessSummary,
    pub candidates: CandidateSummary,
    pub metadata: PassCounts,
    pub sampling: PassCounts,
    pub full_scan: PassCounts,
    /// Batch items analyzed or served from cache, over all passes
    pub succeeded: usize,
    /// Batch items skipped after an error, over all passes
    pub skipped: usize,
    pub merge: Option<MergeReport>,
    pub errors: Vec<ItemError>,
}

/// `(succeeded, skipped)` over a run's passes
pub fn item_totals(passes: &[PassCounts]) -> (usize, usize) {
    passes
        .iter()
        .fold((0, 0), |(ok, skipped), p| (ok + p.succeeded(), skipped + p.skipped))
}

/// Scope of a run, reported by a dry run instead of analysing anything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeReport {
    pub databases: Vec<String>,
    pub tables: usize,
    pub columns: usize,
    pub candidates_by_feature: BTreeMap<AiFeature, usize>,
    pub sampling_candidates: usize,
}

impl ScopeReport {
    pub fn new(databases: Vec<String>, tables: usize, columns: usize, candidates: &[Candidate]) -> Self {
        let mut candidates_by_feature = BTreeMap::new();
        for candidate in candidates {
            *candidates_by_feature.entry(candidate.ai_feature()).or_default() += 1;
        }
        Self {
            databases,
            tables,
            columns,
            candidates_by_feature,
            sampling_candidates: candidates.iter().filter(|c| c.is_column_level()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::confirmation::ConfirmationThresholds;
    use crate::analysis::statistics::{AnalysisType, ColumnStatistics};
    use crate::db::schema::{ColumnIdentity, TableKey};

    fn llm(column: &str, null_pct: f64, avg: f64) -> Candidate {
        let mut c = Candidate::new(
            ColumnIdentity::column("DB", "S", "T", column),
            AiFeature::Llm,
            "r".to_string(),
        )
        .unwrap();
        c.score_metadata(&[]);
        let mut stats = ColumnStatistics::from_counts(AnalysisType::Sample, 100, (100.0 - null_pct) as u64);
        stats.avg_length = Some(avg);
        stats.has_comment = true;
        stats.is_nullable = Some(false);
        c.attach_statistics(stats).unwrap();
        c
    }

    #[test]
    fn test_candidate_summary_counts() {
        let thresholds = ConfirmationThresholds::default();
        let mut candidates = vec![
            llm("GOOD", 5.0, 300.0),
            llm("SPARSE", 80.0, 300.0),
            Candidate::ml(&TableKey::new("DB", "S", "T"), "r".to_string(), vec![]),
        ];
        for c in candidates.iter_mut() {
            c.evaluate_confirmation(&thresholds);
        }

        let summary = CandidateSummary::from_candidates(&candidates, &ProfilingThresholds::default());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_feature[&AiFeature::Llm], 2);
        assert_eq!(summary.by_feature[&AiFeature::Search], 0);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.unconfirmed, 2);
        assert_eq!(summary.confirmed_by_feature[&AiFeature::Llm], 1);
        assert_eq!(summary.sparsity_distribution[&SparsityClass::Low], 1);
        assert_eq!(summary.sparsity_distribution[&SparsityClass::VeryHigh], 1);
        assert_eq!(summary.content_distribution[&ContentClass::RichContent], 2);
    }

    #[test]
    fn test_feature_keys_serialize_as_labels() {
        let summary = CandidateSummary::from_candidates(&[], &ProfilingThresholds::default());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["by_feature"]["LLM"], 0);
        assert_eq!(json["by_feature"]["Extract"], 0);
    }

    #[test]
    fn test_item_totals() {
        let metadata = PassCounts {
            cache_hits: 1,
            newly_analyzed: 2,
            skipped: 1,
        };
        let sampling = PassCounts {
            cache_hits: 0,
            newly_analyzed: 3,
            skipped: 0,
        };
        let full_scan = PassCounts {
            cache_hits: 2,
            newly_analyzed: 0,
            skipped: 2,
        };
        assert_eq!(item_totals(&[metadata, sampling, full_scan]), (8, 3));
        assert_eq!(item_totals(&[]), (0, 0));
    }

    #[test]
    fn test_scope_report() {
        let candidates = vec![
            llm("A", 0.0, 100.0),
            Candidate::search(&TableKey::new("DB", "S", "T"), "r".to_string(), vec![]),
        ];
        let scope = ScopeReport::new(vec!["DB".to_string()], 1, 4, &candidates);
        assert_eq!(scope.sampling_candidates, 1);
        assert_eq!(scope.candidates_by_feature.len(), 2);
    }
}
