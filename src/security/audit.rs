use crate::security::{AuditAction, AuditEntry};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Filter criteria for querying audit log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub action_type: Option<AuditAction>,
    /// Matches targets starting with this prefix, e.g. `DB.SCHEMA`
    pub target_prefix: Option<String>,
    pub failures_only: bool,
}

/// Per-run audit trail, kept in memory and appended to a JSON-lines file at
/// the end of each stage.
#[derive(Debug, Clone)]
pub struct AuditLog {
    run_id: String,
    entries: Vec<AuditEntry>,
    flushed: usize,
}

impl AuditLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            entries: Vec::new(),
            flushed: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn record(
        &mut self,
        action: AuditAction,
        target: impl Into<String>,
        success: bool,
        details: Option<String>,
    ) {
        self.entries.push(AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: self.run_id.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            action,
            target: target.into(),
            success,
            details,
        });
    }

    pub fn record_success(&mut self, action: AuditAction, target: impl Into<String>, details: impl Into<String>) {
        self.record(action, target, true, Some(details.into()));
    }

    pub fn record_failure(&mut self, action: AuditAction, target: impl Into<String>, details: impl Into<String>) {
        self.record(action, target, false, Some(details.into()));
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.success).count()
    }

    /// Append entries not yet written to `log_path`. Returns the number written.
    pub fn flush_to(&mut self, log_path: &Path) -> Result<usize, AuditError> {
        if self.flushed >= self.entries.len() {
            return Ok(0);
        }

        // Ensure parent directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(AuditError::Io)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(AuditError::Io)?;

        let pending = &self.entries[self.flushed..];
        for entry in pending {
            let json = serde_json::to_string(entry).map_err(AuditError::Serialization)?;
            writeln!(file, "{}", json).map_err(AuditError::Io)?;
        }
        let written = pending.len();
        self.flushed = self.entries.len();
        Ok(written)
    }
}

/// Read all entries from a JSON-lines audit file, applying the given filter.
pub fn read_entries(log_path: &Path, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(log_path).map_err(AuditError::Io)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(AuditError::Io)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Skip malformed lines rather than failing the whole query
        if let Ok(entry) = serde_json::from_str::<AuditEntry>(trimmed) {
            if matches_filter(&entry, filter) {
                entries.push(entry);
            }
        }
    }

    Ok(entries)
}

fn matches_filter(entry: &AuditEntry, filter: &AuditFilter) -> bool {
    if let Some(ref from) = filter.date_from {
        if entry.timestamp.as_str() < from.as_str() {
            return false;
        }
    }

    if let Some(ref to) = filter.date_to {
        if entry.timestamp.as_str() > to.as_str() {
            return false;
        }
    }

    if let Some(action) = filter.action_type {
        if entry.action != action {
            return false;
        }
    }

    if let Some(ref prefix) = filter.target_prefix {
        if !entry.target.starts_with(prefix.as_str()) {
            return false;
        }
    }

    !(filter.failures_only && entry.success)
}

/// Errors that can occur during audit logging operations.
#[derive(Debug)]
pub enum AuditError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditError::Io(e) => write!(f, "Audit I/O error: {}", e),
            AuditError::Serialization(e) => write!(f, "Audit serialization error: {}", e),
        }
    }
}

impl std::error::Error for AuditError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_log() -> AuditLog {
        let mut log = AuditLog::new("run-1");
        log.record_success(AuditAction::Connected, "snapshot:memory", "connected");
        log.record_failure(AuditAction::SampleAttempt, "DB.SALES.ORDERS.NOTES", "10000 rows: timed out");
        log.record_success(AuditAction::SampleAttempt, "DB.SALES.ORDERS.NOTES", "1000 rows");
        log.record_success(AuditAction::SampleAttempt, "DB.HR.PEOPLE.BIO", "10000 rows");
        log
    }

    #[test]
    fn test_record_fills_ids_and_run() {
        let log = sample_log();
        assert_eq!(log.entries().len(), 4);
        assert_eq!(log.failure_count(), 1);
        assert!(log.entries().iter().all(|e| e.run_id == "run-1"));
        assert_ne!(log.entries()[0].id, log.entries()[1].id);
    }

    #[test]
    fn test_flush_appends_only_new_entries() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("logs").join("audit_trail.jsonl");
        let mut log = sample_log();

        assert_eq!(log.flush_to(&log_path).unwrap(), 4);
        assert_eq!(log.flush_to(&log_path).unwrap(), 0);
        log.record_success(AuditAction::StageCompleted, "sampling", "done");
        assert_eq!(log.flush_to(&log_path).unwrap(), 1);

        let entries = read_entries(&log_path, &AuditFilter::default()).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[4].action, AuditAction::StageCompleted);
    }

    #[test]
    fn test_filter_by_action_and_target() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        sample_log().flush_to(&log_path).unwrap();

        let filter = AuditFilter {
            action_type: Some(AuditAction::SampleAttempt),
            target_prefix: Some("DB.SALES".to_string()),
            ..Default::default()
        };
        assert_eq!(read_entries(&log_path, &filter).unwrap().len(), 2);

        let failures = AuditFilter {
            failures_only: true,
            ..Default::default()
        };
        let entries = read_entries(&log_path, &failures).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details.as_deref(), Some("10000 rows: timed out"));
    }

    #[test]
    fn test_filter_by_date_range() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        sample_log().flush_to(&log_path).unwrap();

        let future = AuditFilter {
            date_from: Some("2999-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(read_entries(&log_path, &future).unwrap().is_empty());

        let past = AuditFilter {
            date_from: Some("2000-01-01T00:00:00Z".to_string()),
            date_to: Some("2999-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert_eq!(read_entries(&log_path, &past).unwrap().len(), 4);
    }

    #[test]
    fn test_read_entries_no_file() {
        let dir = tempdir().unwrap();
        let entries = read_entries(&dir.path().join("nonexistent.jsonl"), &AuditFilter::default()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");
        let log = sample_log();
        let json = serde_json::to_string(&log.entries()[0]).unwrap();
        fs::write(&log_path, format!("{}\nthis is not json\n", json)).unwrap();

        let entries = read_entries(&log_path, &AuditFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Connected);
    }
}
