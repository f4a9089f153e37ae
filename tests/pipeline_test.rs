//! End-to-end tests for the staged analysis pipeline over in-memory metadata snapshots.
//!
//! These tests exercise:
//!   - A full fresh run with sampling and top-candidate full scans
//!   - Per-item sampling failures being skipped, never aborting the run
//!   - Cache reuse across runs and forced re-analysis
//!   - Resuming from a later stage using the written checkpoints
//!   - Append-mode merging and run history
//!   - Dry runs and fresh-mode backups
//!
//! No live warehouse is contacted; every connector reads a snapshot built here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ai_readiness_lib::analysis::candidate::{AiFeature, Candidate};
use ai_readiness_lib::analysis::statistics::{AnalysisType, ColumnStatistics, ProfilingThresholds};
use ai_readiness_lib::analysis::summary::RunSummary;
use ai_readiness_lib::commands::{AnalysisPipeline, PipelineError, RunOptions, RunOutcome};
use ai_readiness_lib::config::AppConfig;
use ai_readiness_lib::db::connectors::snapshot::{MetadataSnapshot, SampleRecord, SnapshotConnector};
use ai_readiness_lib::db::connectors::{DataSampler, MetadataSource, SampleScope};
use ai_readiness_lib::db::schema::{ColumnIdentity, Row};
use ai_readiness_lib::jobs::cache::{AnalysisCache, SampleLabel, SampleSize};
use ai_readiness_lib::jobs::history::RunHistory;
use ai_readiness_lib::jobs::{PipelineStage, RunMode};
use ai_readiness_lib::security::audit::{read_entries, AuditFilter};
use ai_readiness_lib::security::AuditAction;
use async_trait::async_trait;
use serde_json::json;
use tempfile::tempdir;

// ─── helpers ───────────────────────────────────────────────────────────────

fn column(table: &str, name: &str, ordinal: i64, data_type: &str, len: Option<i64>, nullable: &str, comment: Option<&str>) -> Row {
    vec![
        json!("SALES"),
        json!("CRM"),
        json!(table),
        json!(name),
        json!(ordinal),
        json!(data_type),
        json!(len),
        json!(null),
        json!(null),
        json!(nullable),
        json!(comment),
    ]
}

fn text_sample(total: u64, non_null: u64, avg: f64) -> SampleRecord {
    SampleRecord {
        total_count: total,
        non_null_count: non_null,
        avg_length: Some(avg),
        text_samples: vec![
            "Customer reports the invoice total is wrong".to_string(),
            "Package arrived damaged and needs a replacement".to_string(),
        ],
        ..Default::default()
    }
}

/// One table with two text columns, a VARIANT column, a timestamp and a numeric key,
/// plus a system database row that the default filter drops.
fn tickets_snapshot() -> MetadataSnapshot {
    let mut samples = HashMap::new();
    samples.insert(
        "SALES.CRM.TICKETS.DESCRIPTION".to_string(),
        text_sample(20_000, 19_000, 250.0),
    );
    samples.insert(
        "SALES.CRM.TICKETS.RESOLUTION_NOTES".to_string(),
        text_sample(20_000, 20_000, 12.0),
    );
    samples.insert(
        "SALES.CRM.TICKETS.PAYLOAD".to_string(),
        SampleRecord {
            total_count: 20_000,
            non_null_count: 20_000,
            avg_length: Some(400.0),
            json_values: vec!["{\"channel\": \"email\"}".to_string(), "[1, 2, 3]".to_string()],
            ..Default::default()
        },
    );

    MetadataSnapshot {
        columns: vec![
            column("TICKETS", "TICKET_ID", 1, "NUMBER", None, "NO", None),
            column("TICKETS", "CREATED_AT", 2, "TIMESTAMP_NTZ", None, "NO", None),
            column("TICKETS", "DESCRIPTION", 3, "TEXT", Some(2000), "NO", Some("Customer issue text")),
            column("TICKETS", "RESOLUTION_NOTES", 4, "TEXT", Some(1000), "YES", None),
            column("TICKETS", "PAYLOAD", 5, "VARIANT", None, "YES", None),
            vec![
                json!("SNOWFLAKE"),
                json!("ACCOUNT_USAGE"),
                json!("QUERY_HISTORY"),
                json!("QUERY_TEXT"),
                json!(1),
                json!("TEXT"),
                json!(100_000),
                json!(null),
                json!(null),
                json!("YES"),
                json!(null),
            ],
            vec![json!("SALES"), json!("CRM")],
        ],
        tables: vec![vec![
            json!("SALES"),
            json!("CRM"),
            json!("TICKETS"),
            json!("BASE TABLE"),
            json!(20_000),
            json!(5_000_000),
            json!("Support tickets"),
            json!("2023-01-01 00:00:00"),
            json!(chrono::Utc::now().to_rfc3339()),
            json!(null),
        ]],
        constraints: vec![vec![
            json!("SALES"),
            json!("CRM"),
            json!("TICKETS"),
            json!("PRIMARY KEY"),
            json!("PK_TICKETS"),
        ]],
        storage: vec![],
        samples,
    }
}

fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.output.directory = dir.join("reports");
    config.analysis.sampling_enabled = true;
    config
}

/// Snapshot connector that counts sampling attempts. Columns with a row
/// limit time out on larger samples and on full scans.
struct CountingWarehouse {
    inner: SnapshotConnector,
    attempts: Arc<AtomicUsize>,
    row_limits: HashMap<String, u64>,
}

impl CountingWarehouse {
    fn new(snapshot: MetadataSnapshot) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut row_limits = HashMap::new();
        row_limits.insert("SALES.CRM.TICKETS.RESOLUTION_NOTES".to_string(), 1_000);
        let warehouse = Self {
            inner: SnapshotConnector::from_snapshot(snapshot, ProfilingThresholds::default()),
            attempts: attempts.clone(),
            row_limits,
        };
        (warehouse, attempts)
    }
}

#[async_trait]
impl MetadataSource for CountingWarehouse {
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn source_name(&self) -> String {
        "counting".to_string()
    }

    async fn fetch_columns(&self) -> anyhow::Result<Vec<Row>> {
        self.inner.fetch_columns().await
    }

    async fn fetch_tables(&self) -> anyhow::Result<Vec<Row>> {
        self.inner.fetch_tables().await
    }

    async fn fetch_constraints(&self) -> anyhow::Result<Vec<Row>> {
        self.inner.fetch_constraints().await
    }

    async fn fetch_storage_metrics(&self) -> anyhow::Result<Vec<Row>> {
        anyhow::bail!("Insufficient privileges to operate on ACCOUNT_USAGE")
    }
}

#[async_trait]
impl DataSampler for CountingWarehouse {
    async fn sample_column(
        &self,
        identity: &ColumnIdentity,
        data_type: &str,
        scope: SampleScope,
    ) -> anyhow::Result<ColumnStatistics> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(&limit) = self.row_limits.get(&identity.cache_key()) {
            match scope {
                SampleScope::Rows(n) if n > limit => {
                    anyhow::bail!("Statement timed out sampling {} ({} rows)", identity, n)
                }
                SampleScope::Full => anyhow::bail!("Statement timed out scanning {}", identity),
                SampleScope::Rows(_) => {}
            }
        }
        self.inner.sample_column(identity, data_type, scope).await
    }
}

async fn run_pipeline<W>(config: AppConfig, warehouse: W, options: RunOptions) -> Result<RunSummary, PipelineError>
where
    W: MetadataSource + DataSampler,
{
    let mut pipeline = AnalysisPipeline::new(config, warehouse)?;
    match pipeline.run(options).await? {
        RunOutcome::Completed(summary) => Ok(*summary),
        RunOutcome::DryRun(_) => panic!("expected a completed run"),
    }
}

fn read_candidates(path: &Path) -> Vec<Candidate> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn find<'a>(candidates: &'a [Candidate], key: &str) -> &'a Candidate {
    candidates
        .iter()
        .find(|c| c.is_column_level() && c.cache_key() == key)
        .unwrap_or_else(|| panic!("candidate {} not found", key))
}

// ─── tests ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_samples_scans_and_confirms() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let (warehouse, attempts) = CountingWarehouse::new(tickets_snapshot());

    let summary = run_pipeline(config, warehouse, RunOptions::default()).await.unwrap();

    assert_eq!(summary.stages_run, PipelineStage::ALL.to_vec());
    assert_eq!(summary.readiness.total_tables, 1);
    assert_eq!(summary.readiness.total_columns_analyzed, 5);
    assert_eq!(summary.readiness.queries_executed, 4);

    assert_eq!(summary.candidates.total, 5);
    assert_eq!(summary.candidates.by_feature[&AiFeature::Llm], 2);
    assert_eq!(summary.candidates.by_feature[&AiFeature::Extract], 1);
    assert_eq!(summary.candidates.by_feature[&AiFeature::Ml], 1);
    assert_eq!(summary.candidates.by_feature[&AiFeature::Search], 1);
    assert_eq!(summary.candidates.confirmed, 2);
    assert_eq!(summary.candidates.unconfirmed, 3);

    assert_eq!(summary.sampling.newly_analyzed, 3);
    assert_eq!(summary.sampling.skipped, 0);
    assert_eq!(summary.full_scan.newly_analyzed, 2);
    assert_eq!(summary.full_scan.skipped, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].candidate, "SALES.CRM.TICKETS.RESOLUTION_NOTES");
    // 3 first attempts, 1 ladder fallback, 3 full scans
    assert_eq!(attempts.load(Ordering::SeqCst), 7);

    let reports = dir.path().join("reports");
    let all = read_candidates(&reports.join("metadata/all_candidates.json"));
    assert_eq!(all.len(), 5);
    let description = find(&all, "SALES.CRM.TICKETS.DESCRIPTION");
    assert!(description.is_confirmed());
    assert_eq!(description.statistics().unwrap().source, AnalysisType::FullScan);
    assert_eq!(description.scores().unwrap().data_readiness, 5.0);
    assert_eq!(
        description.confirmation().unwrap().reasons,
        vec![
            "Good completeness (95.0% populated)".to_string(),
            "Substantial content (avg 250.0 chars)".to_string(),
            "Natural language content detected".to_string(),
            "Good data readiness (5.00)".to_string(),
        ]
    );

    let notes = find(&all, "SALES.CRM.TICKETS.RESOLUTION_NOTES");
    assert!(!notes.is_confirmed());
    assert_eq!(notes.statistics().unwrap().row_count, 1_000);
    assert!(notes
        .confirmation()
        .unwrap()
        .reasons
        .contains(&"Short content (avg 12.0 chars)".to_string()));

    let confirmed = read_candidates(&reports.join("metadata/confirmed_candidates.json"));
    assert_eq!(confirmed.len(), 2);
    let top = read_candidates(&reports.join("metadata/top_candidates.json"));
    assert_eq!(top.len(), 3);
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reports.join("reports/run_summary.json")).unwrap()).unwrap();
    // 3 metadata estimates, 3 samples, 2 full scans
    assert_eq!(summary.succeeded, 8);
    assert_eq!(summary.skipped, 1);
    assert_eq!(written["succeeded"], json!(8));
    assert_eq!(written["skipped"], json!(1));
    assert!(reports.join("metadata/table_readiness_scores.json").exists());

    let cache = AnalysisCache::try_load(&reports.join("metadata/data_analysis_cache.json")).unwrap();
    assert_eq!(cache.len(), 3);
    let notes_entry = cache.get("SALES.CRM.TICKETS.RESOLUTION_NOTES").unwrap();
    assert_eq!(notes_entry.sample_size, SampleSize::Rows(1_000));
    let payload_entry = cache.get("SALES.CRM.TICKETS.PAYLOAD").unwrap();
    assert_eq!(payload_entry.sample_size, SampleSize::Label(SampleLabel::Full));

    let audit_path = reports.join("logs/audit_trail.jsonl");
    let failures = read_entries(
        &audit_path,
        &AuditFilter {
            failures_only: true,
            ..Default::default()
        },
    )
    .unwrap();
    // storage query, 10000-row attempt, full scan attempt
    assert_eq!(failures.len(), 3);
    let queries = read_entries(
        &audit_path,
        &AuditFilter {
            action_type: Some(AuditAction::MetadataQueried),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(queries.len(), 4);
}

#[tokio::test]
async fn second_run_reuses_cache() {
    let dir = tempdir().unwrap();
    let (warehouse, _) = CountingWarehouse::new(tickets_snapshot());
    run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();

    let (warehouse, attempts) = CountingWarehouse::new(tickets_snapshot());
    let summary = run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.metadata.cache_hits, 3);
    assert_eq!(summary.sampling.cache_hits, 3);
    assert_eq!(summary.sampling.newly_analyzed, 0);
    assert_eq!(summary.full_scan.cache_hits, 2);
    // only the column without a cached full scan is attempted again
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(summary.candidates.confirmed, 2);

    let mut forced = test_config(dir.path());
    forced.analysis.force_reanalysis = true;
    let (warehouse, attempts) = CountingWarehouse::new(tickets_snapshot());
    let summary = run_pipeline(forced, warehouse, RunOptions::default()).await.unwrap();
    assert_eq!(summary.sampling.cache_hits, 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn metadata_only_run_never_samples() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.analysis.sampling_enabled = false;
    let (warehouse, attempts) = CountingWarehouse::new(tickets_snapshot());

    let summary = run_pipeline(config, warehouse, RunOptions::default()).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert!(!summary.stages_run.contains(&PipelineStage::Sampling));
    assert!(!summary.stages_run.contains(&PipelineStage::FullScan));

    let all = read_candidates(&dir.path().join("reports/metadata/all_candidates.json"));
    let description = find(&all, "SALES.CRM.TICKETS.DESCRIPTION");
    let stats = description.statistics().unwrap();
    assert_eq!(stats.source, AnalysisType::MetadataOnly);
    assert_eq!(stats.avg_length, Some(600.0));
    // metadata estimates: 0% null, long declared length, comment + NOT NULL
    assert!(description.is_confirmed());
}

#[tokio::test]
async fn resume_from_confirmation_uses_checkpoints() {
    let dir = tempdir().unwrap();
    let (warehouse, _) = CountingWarehouse::new(tickets_snapshot());
    run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();

    // No reachable source: resuming past discovery must not connect.
    let mut config = test_config(dir.path());
    config.source.snapshot_path = Some(dir.path().join("missing.json"));
    config.profiling.confirmation.min_data_readiness_score = 4.5;
    let unreachable = SnapshotConnector::new(config.source.clone(), ProfilingThresholds::default());

    let summary = run_pipeline(
        config,
        unreachable,
        RunOptions {
            start_stage: "3".parse().unwrap(),
            dry_run: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(
        summary.stages_run,
        vec![PipelineStage::Confirmation, PipelineStage::Reporting]
    );
    // the VARIANT column scores 4.0 and drops out at the stricter threshold
    assert_eq!(summary.candidates.confirmed, 1);
    assert_eq!(summary.readiness.total_tables, 1);
}

#[tokio::test]
async fn resume_from_sampling_requires_connection() {
    let dir = tempdir().unwrap();
    let (warehouse, _) = CountingWarehouse::new(tickets_snapshot());
    run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();

    let mut config = test_config(dir.path());
    config.source.snapshot_path = Some(dir.path().join("missing.json"));
    let unreachable = SnapshotConnector::new(config.source.clone(), ProfilingThresholds::default());
    let err = run_pipeline(
        config,
        unreachable,
        RunOptions {
            start_stage: PipelineStage::Sampling,
            dry_run: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Connection { .. }));
}

#[tokio::test]
async fn append_mode_merges_with_previous_run() {
    let dir = tempdir().unwrap();
    let (warehouse, _) = CountingWarehouse::new(tickets_snapshot());
    run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();

    let mut snapshot = tickets_snapshot();
    snapshot
        .columns
        .push(column("TICKETS", "SUMMARY", 6, "TEXT", Some(300), "YES", None));
    let mut config = test_config(dir.path());
    config.run_mode.mode = RunMode::Append;
    let (warehouse, _) = CountingWarehouse::new(snapshot);

    let summary = run_pipeline(config, warehouse, RunOptions::default()).await.unwrap();
    let merge = summary.merge.unwrap();
    assert_eq!(merge.added, 1);
    assert_eq!(merge.already_existed, 5);
    assert_eq!(summary.candidates.total, 6);

    let all = read_candidates(&dir.path().join("reports/metadata/all_candidates.json"));
    assert_eq!(all.len(), 6);
    find(&all, "SALES.CRM.TICKETS.SUMMARY");

    let history = RunHistory::load(&dir.path().join("reports/metadata/run_history.json"));
    assert_eq!(history.runs.len(), 2);
    assert_eq!(history.runs[1].mode, RunMode::Append);
    assert!(history.databases_analyzed.contains("SALES"));
}

#[tokio::test]
async fn invalid_identifier_is_skipped_without_query() {
    let dir = tempdir().unwrap();
    let snapshot = MetadataSnapshot {
        columns: vec![column("TICKETS", "BAD-NAME", 1, "VARCHAR", Some(1000), "YES", None)],
        ..Default::default()
    };
    let (warehouse, attempts) = CountingWarehouse::new(snapshot);

    let summary = run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert_eq!(summary.sampling.skipped, 1);
    assert_eq!(summary.full_scan.skipped, 1);
    assert!(summary
        .errors
        .iter()
        .all(|e| e.candidate == "SALES.CRM.TICKETS.BAD-NAME" && e.error.contains("Invalid identifier")));
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let dir = tempdir().unwrap();
    let (warehouse, attempts) = CountingWarehouse::new(tickets_snapshot());
    let mut pipeline = AnalysisPipeline::new(test_config(dir.path()), warehouse).unwrap();

    let outcome = pipeline
        .run(RunOptions {
            start_stage: PipelineStage::Discovery,
            dry_run: true,
        })
        .await
        .unwrap();
    let RunOutcome::DryRun(scope) = outcome else {
        panic!("expected a dry run");
    };
    assert_eq!(scope.databases, vec!["SALES".to_string()]);
    assert_eq!(scope.tables, 1);
    assert_eq!(scope.columns, 5);
    assert_eq!(scope.sampling_candidates, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("reports").exists());
}

#[tokio::test]
async fn fresh_run_backs_up_previous_outputs() {
    let dir = tempdir().unwrap();
    let (warehouse, _) = CountingWarehouse::new(tickets_snapshot());
    run_pipeline(test_config(dir.path()), warehouse, RunOptions::default())
        .await
        .unwrap();

    let mut config = test_config(dir.path());
    config.run_mode.backup_before_fresh = true;
    let (warehouse, _) = CountingWarehouse::new(tickets_snapshot());
    run_pipeline(config, warehouse, RunOptions::default()).await.unwrap();

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("backup_"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].path().join("metadata/all_candidates.json").exists());
}
