use crate::analysis::candidate::Candidate;
use crate::analysis::dimensions::AggregateReadinessScore;
use crate::analysis::summary::RunSummary;
use crate::jobs::state::{write_json, RunState, StateError};
use crate::security::{AuditAction, AuditLog};
use std::path::Path;

/// Candidates by total score, highest first, ties in input order.
pub fn rank_candidates(candidates: &[Candidate]) -> Vec<&Candidate> {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
    ranked
}

/// Highest-scoring column candidates.
pub fn top_candidates(candidates: &[Candidate], limit: usize) -> Vec<&Candidate> {
    rank_candidates(candidates)
        .into_iter()
        .filter(|c| c.is_column_level())
        .take(limit)
        .collect()
}

/// Counts of what was written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WrittenOutputs {
    pub all: usize,
    pub confirmed: usize,
    pub top: usize,
    pub tables: usize,
}

fn write_recorded<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
    audit: &mut AuditLog,
) -> Result<(), StateError> {
    let result = write_json(path, value);
    match &result {
        Ok(()) => audit.record_success(AuditAction::ReportWritten, path.display().to_string(), "written"),
        Err(e) => audit.record_failure(AuditAction::ReportWritten, path.display().to_string(), e.to_string()),
    }
    result
}

/// Write the candidate and table-score outputs of a run.
pub fn write_outputs(
    state: &RunState,
    candidates: &[Candidate],
    table_scores: &[AggregateReadinessScore],
    top_limit: usize,
    audit: &mut AuditLog,
) -> Result<WrittenOutputs, StateError> {
    let ranked = rank_candidates(candidates);
    write_recorded(&state.all_candidates_path(), &ranked, audit)?;

    let confirmed: Vec<&Candidate> = ranked.iter().copied().filter(|c| c.is_confirmed()).collect();
    write_recorded(&state.confirmed_candidates_path(), &confirmed, audit)?;

    let top = top_candidates(candidates, top_limit);
    write_recorded(&state.top_candidates_path(), &top, audit)?;

    write_recorded(&state.table_scores_path(), table_scores, audit)?;

    log::info!(
        "Wrote {} candidates ({} confirmed, {} top) and {} table scores to {}",
        ranked.len(),
        confirmed.len(),
        top.len(),
        table_scores.len(),
        state.metadata_dir().display()
    );
    Ok(WrittenOutputs {
        all: ranked.len(),
        confirmed: confirmed.len(),
        top: top.len(),
        tables: table_scores.len(),
    })
}

pub fn write_summary(state: &RunState, summary: &RunSummary, audit: &mut AuditLog) -> Result<(), StateError> {
    write_recorded(&state.summary_path(), summary, audit)
}
