use super::state::StateError;
use super::RunMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// One completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    pub databases_analyzed: Vec<String>,
    pub target_filter: String,
}

/// Every run written to one output directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunHistory {
    pub runs: Vec<RunRecord>,
    /// Union of databases over all runs
    pub databases_analyzed: BTreeSet<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RunHistory {
    /// Load history; a missing or unreadable file starts a new one.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Ignoring unreadable run history {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        super::state::write_json(path, self)
    }

    pub fn record(&mut self, record: RunRecord) {
        self.databases_analyzed
            .extend(record.databases_analyzed.iter().cloned());
        self.last_updated = Some(record.timestamp);
        self.runs.push(record);
    }

    pub fn last_run(&self) -> Option<&RunRecord> {
        self.runs.last()
    }
}

impl RunRecord {
    pub fn new(mode: RunMode, databases_analyzed: Vec<String>, target_filter: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            mode,
            databases_analyzed,
            target_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_accumulates_databases() {
        let mut history = RunHistory::default();
        history.record(RunRecord::new(RunMode::Fresh, vec!["SALES".into()], "all".into()));
        history.record(RunRecord::new(
            RunMode::Append,
            vec!["SALES".into(), "HR".into()],
            "include: SALES, HR".into(),
        ));
        assert_eq!(history.runs.len(), 2);
        assert_eq!(
            history.databases_analyzed.iter().cloned().collect::<Vec<_>>(),
            vec!["HR".to_string(), "SALES".to_string()]
        );
        assert_eq!(history.last_run().unwrap().mode, RunMode::Append);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata").join("run_history.json");
        let mut history = RunHistory::default();
        history.record(RunRecord::new(RunMode::Fresh, vec!["SALES".into()], "all".into()));
        history.save(&path).unwrap();

        let loaded = RunHistory::load(&path);
        assert_eq!(loaded.runs.len(), 1);
        assert_eq!(loaded.runs[0].id, history.runs[0].id);
        assert!(loaded.last_updated.is_some());
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempdir().unwrap();
        assert!(RunHistory::load(&dir.path().join("none.json")).runs.is_empty());
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1,2").unwrap();
        assert!(RunHistory::load(&path).runs.is_empty());
    }
}
