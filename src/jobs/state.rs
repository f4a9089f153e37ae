use super::AppendStrategy;
use crate::analysis::candidate::Candidate;
use crate::analysis::dimensions::AggregateReadinessScore;
use crate::db::schema::MetadataCatalog;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("checkpoint not found: {0}")]
    Missing(PathBuf),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Write `value` as pretty JSON through a temporary sibling file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| StateError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StateError> {
    if !path.exists() {
        return Err(StateError::Missing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StateError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Output directory
// ---------------------------------------------------------------------------

/// Layout of one output directory and the checkpoints stored in it
#[derive(Debug, Clone)]
pub struct RunState {
    root: PathBuf,
}

impl RunState {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.metadata_dir().join("catalog.json")
    }

    pub fn pipeline_candidates_path(&self) -> PathBuf {
        self.metadata_dir().join("pipeline_candidates.json")
    }

    pub fn table_scores_path(&self) -> PathBuf {
        self.metadata_dir().join("table_readiness_scores.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.metadata_dir().join("data_analysis_cache.json")
    }

    pub fn all_candidates_path(&self) -> PathBuf {
        self.metadata_dir().join("all_candidates.json")
    }

    pub fn confirmed_candidates_path(&self) -> PathBuf {
        self.metadata_dir().join("confirmed_candidates.json")
    }

    pub fn top_candidates_path(&self) -> PathBuf {
        self.metadata_dir().join("top_candidates.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.metadata_dir().join("run_history.json")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("reports").join("run_summary.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.root.join("logs").join("audit_trail.jsonl")
    }

    // ── Checkpoints ──

    pub fn save_catalog(&self, catalog: &MetadataCatalog) -> Result<(), StateError> {
        write_json(&self.catalog_path(), catalog)
    }

    pub fn load_catalog(&self) -> Result<MetadataCatalog, StateError> {
        read_json(&self.catalog_path())
    }

    pub fn save_candidates(&self, candidates: &[Candidate]) -> Result<(), StateError> {
        write_json(&self.pipeline_candidates_path(), candidates)
    }

    pub fn load_candidates(&self) -> Result<Vec<Candidate>, StateError> {
        read_json(&self.pipeline_candidates_path())
    }

    pub fn save_table_scores(&self, scores: &[AggregateReadinessScore]) -> Result<(), StateError> {
        write_json(&self.table_scores_path(), scores)
    }

    pub fn load_table_scores(&self) -> Result<Vec<AggregateReadinessScore>, StateError> {
        read_json(&self.table_scores_path())
    }

    /// Candidates from the previous run's final output. Nothing to merge
    /// when there was no previous run.
    pub fn load_previous_candidates(&self) -> Result<Vec<Candidate>, StateError> {
        match read_json(&self.all_candidates_path()) {
            Err(StateError::Missing(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Copy the output directory to a sibling `backup_<timestamp>` directory.
    /// Returns `None` when there is nothing to back up.
    pub fn backup(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>, StateError> {
        if !self.root.is_dir() {
            return Ok(None);
        }
        let root = fs::canonicalize(&self.root).map_err(|source| StateError::Io {
            path: self.root.clone(),
            source,
        })?;
        let target = backup_target(&root, now);
        copy_dir(&root, &target, &target)?;
        log::info!("Backed up {} to {}", root.display(), target.display());
        Ok(Some(target))
    }
}

/// Sibling of `root`, or a child when `root` has no parent.
fn backup_target(root: &Path, now: DateTime<Utc>) -> PathBuf {
    let name = format!("backup_{}", now.format("%Y%m%d_%H%M%S"));
    match root.parent() {
        Some(parent) => parent.join(name),
        None => root.join(name),
    }
}

/// Recursive copy. `skip` is never descended into, so a target nested in
/// `from` is not copied into itself.
fn copy_dir(from: &Path, to: &Path, skip: &Path) -> Result<(), StateError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StateError::Io { path, source }
    };
    fs::create_dir_all(to).map_err(io_err(to))?;
    for entry in fs::read_dir(from).map_err(io_err(from))? {
        let entry = entry.map_err(io_err(from))?;
        let src = entry.path();
        if src == skip {
            continue;
        }
        let dst = to.join(entry.file_name());
        if entry.file_type().map_err(io_err(&src))?.is_dir() {
            copy_dir(&src, &dst, skip)?;
        } else {
            fs::copy(&src, &dst).map_err(io_err(&src))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Candidate merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub added: usize,
    pub already_existed: usize,
}

/// Identity under which candidates are merged: `database.schema.table.column`.
/// Table-level candidates have an empty column segment, so an ML and a Search
/// candidate on the same table would share one key and the second would be
/// dropped as a duplicate. Their key carries the feature as well.
fn merge_key(candidate: &Candidate) -> String {
    if candidate.is_column_level() {
        candidate.cache_key()
    } else {
        format!("{}#{}", candidate.cache_key(), candidate.ai_feature())
    }
}

/// Keep every existing candidate untouched and append only new identities.
pub fn merge_candidates(existing: Vec<Candidate>, new: Vec<Candidate>) -> (Vec<Candidate>, MergeReport) {
    let mut seen: HashSet<String> = existing.iter().map(merge_key).collect();
    let mut merged = existing;
    let mut report = MergeReport::default();
    for candidate in new {
        if seen.insert(merge_key(&candidate)) {
            merged.push(candidate);
            report.added += 1;
        } else {
            report.already_existed += 1;
        }
    }
    (merged, report)
}

pub fn combine_candidates(
    existing: Vec<Candidate>,
    new: Vec<Candidate>,
    strategy: AppendStrategy,
) -> (Vec<Candidate>, MergeReport) {
    match strategy {
        AppendStrategy::Merge => merge_candidates(existing, new),
        AppendStrategy::Add => {
            let report = MergeReport {
                added: new.len(),
                already_existed: 0,
            };
            let mut combined = existing;
            combined.extend(new);
            (combined, report)
        }
    }
}
