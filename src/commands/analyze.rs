use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

use super::report::{write_outputs, write_summary};
use crate::analysis::candidate::Candidate;
use crate::analysis::classifier::classify_all;
use crate::analysis::dimensions::{compute_all, summarize};
use crate::analysis::sampling::{
    estimate_from_metadata, full_scan_candidates, identify_top_candidates, sample_candidates,
    ItemError, PassContext, PassReport, SamplingPolicy,
};
use crate::analysis::summary::{item_totals, CandidateSummary, PassCounts, RunSummary, ScopeReport};
use crate::config::{AppConfig, ConfigError};
use crate::db::connectors::{DataSampler, MetadataSource};
use crate::db::schema::{MetadataCatalog, RawMetadata, Row};
use crate::jobs::cache::AnalysisCache;
use crate::jobs::history::{RunHistory, RunRecord};
use crate::jobs::state::{combine_candidates, MergeReport, RunState, StateError};
use crate::jobs::{PipelineStage, RunMode};
use crate::security::{AuditAction, AuditLog};

/// Metadata queries issued by discovery
const METADATA_QUERIES: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot connect to {target}: {message}")]
    Connection { target: String, message: String },
    #[error("cannot resume at stage {stage}: missing checkpoint {}", .path.display())]
    MissingCheckpoint { stage: PipelineStage, path: PathBuf },
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub start_stage: PipelineStage,
    /// Discover and classify only, then report the scope of a full run
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start_stage: PipelineStage::Discovery,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<RunSummary>),
    DryRun(ScopeReport),
}

/// Sequences the pipeline stages over one warehouse connection.
pub struct AnalysisPipeline<W> {
    config: AppConfig,
    warehouse: W,
    state: RunState,
    audit: AuditLog,
}

impl<W> AnalysisPipeline<W>
where
    W: MetadataSource + DataSampler,
{
    pub fn new(config: AppConfig, warehouse: W) -> Result<Self, PipelineError> {
        config.validate()?;
        let state = RunState::new(config.output.directory.clone());
        Ok(Self {
            config,
            warehouse,
            state,
            audit: AuditLog::new(uuid::Uuid::new_v4().to_string()),
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn into_warehouse(self) -> W {
        self.warehouse
    }

    pub async fn run(&mut self, options: RunOptions) -> Result<RunOutcome, PipelineError> {
        if options.dry_run {
            return self.dry_run().await.map(RunOutcome::DryRun);
        }

        let started_at = Utc::now();
        let start = options.start_stage;
        log::info!(
            "Starting {} run {} at stage {} (output: {})",
            self.config.run_mode.mode,
            self.audit.run_id(),
            start,
            self.state.root().display()
        );

        if self.config.run_mode.mode == RunMode::Fresh && self.config.run_mode.backup_before_fresh {
            if let Some(path) = self.state.backup(started_at)? {
                self.audit
                    .record_success(AuditAction::BackupCreated, path.display().to_string(), "fresh run");
            }
        }

        let sampling = self.config.analysis.sampling_enabled;
        let needs_warehouse =
            start <= PipelineStage::Discovery || (sampling && start <= PipelineStage::FullScan);
        if needs_warehouse {
            self.connect().await?;
        }

        let result = self.run_stages(start, started_at).await;

        if needs_warehouse {
            self.disconnect().await;
        }
        self.flush_audit();
        result.map(|summary| RunOutcome::Completed(Box::new(summary)))
    }

    async fn run_stages(
        &mut self,
        start: PipelineStage,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary, PipelineError> {
        let mut stages_run = Vec::new();
        let mut errors: Vec<ItemError> = Vec::new();
        let mut metadata_counts = PassCounts::default();
        let mut sampling_counts = PassCounts::default();
        let mut full_scan_counts = PassCounts::default();
        let mut cache = self.load_cache();
        let force = self.config.analysis.force_reanalysis;
        let sampling = self.config.analysis.sampling_enabled;
        let policy = SamplingPolicy::from_config(&self.config.analysis);

        // ── Discovery ──
        let catalog = if PipelineStage::Discovery.runs_from(start) {
            let catalog = self.discover().await;
            self.state.save_catalog(&catalog)?;
            self.record_checkpoint(self.state.catalog_path());
            self.finish_stage(PipelineStage::Discovery, &mut stages_run);
            catalog
        } else {
            let loaded = self.state.load_catalog();
            self.resume(start, loaded)?
        };

        // ── Classification ──
        let mut candidates = if PipelineStage::Classification.runs_from(start) {
            let candidates = classify_all(catalog.columns(), &self.config.ai_candidates);
            log::info!(
                "Classified {} candidates from {} columns",
                candidates.len(),
                catalog.columns().len()
            );
            self.save_candidates(&candidates)?;
            self.finish_stage(PipelineStage::Classification, &mut stages_run);
            candidates
        } else {
            let loaded = self.state.load_candidates();
            self.resume(start, loaded)?
        };

        // ── Metadata scoring ──
        let table_scores = if PipelineStage::MetadataScoring.runs_from(start) {
            let scores = compute_all(&catalog, started_at);
            self.state.save_table_scores(&scores)?;
            self.record_checkpoint(self.state.table_scores_path());

            for candidate in candidates.iter_mut() {
                candidate.score_metadata(&self.config.pii.indicators);
            }
            let mut ctx = PassContext {
                catalog: &catalog,
                cache: &mut cache,
                audit: &mut self.audit,
                force_reanalysis: force,
                now: started_at,
            };
            let report = estimate_from_metadata(&mut candidates, &mut ctx);
            log::info!(
                "Scored {} tables; estimated {} columns from metadata ({} cached)",
                scores.len(),
                report.newly_analyzed,
                report.cache_hits
            );
            metadata_counts = PassCounts::from(&report);
            errors.extend(report.errors);

            self.save_candidates(&candidates)?;
            self.flush_cache(&cache);
            self.finish_stage(PipelineStage::MetadataScoring, &mut stages_run);
            scores
        } else {
            let loaded = self.state.load_table_scores();
            self.resume(start, loaded)?
        };

        // ── Sampling ──
        if PipelineStage::Sampling.runs_from(start) {
            if sampling {
                let mut ctx = PassContext {
                    catalog: &catalog,
                    cache: &mut cache,
                    audit: &mut self.audit,
                    force_reanalysis: force,
                    now: started_at,
                };
                let report = sample_candidates(&mut candidates, &self.warehouse, &policy, &mut ctx).await;
                log_pass("Sampling", &report);
                sampling_counts = PassCounts::from(&report);
                errors.extend(report.errors);

                self.save_candidates(&candidates)?;
                self.flush_cache(&cache);
                self.finish_stage(PipelineStage::Sampling, &mut stages_run);
            } else {
                log::info!("Sampling disabled, keeping metadata estimates");
            }
        }

        // ── Full scan ──
        if PipelineStage::FullScan.runs_from(start) && sampling {
            let top = identify_top_candidates(&candidates, self.config.analysis.top_candidates_full_scan);
            let mut ctx = PassContext {
                catalog: &catalog,
                cache: &mut cache,
                audit: &mut self.audit,
                force_reanalysis: force,
                now: started_at,
            };
            let report = full_scan_candidates(&mut candidates, &top, &self.warehouse, &policy, &mut ctx).await;
            log_pass("Full scan", &report);
            full_scan_counts = PassCounts::from(&report);
            errors.extend(report.errors);

            self.save_candidates(&candidates)?;
            self.flush_cache(&cache);
            self.finish_stage(PipelineStage::FullScan, &mut stages_run);
        }

        // ── Confirmation ──
        if PipelineStage::Confirmation.runs_from(start) {
            let thresholds = &self.config.profiling.confirmation;
            for candidate in candidates.iter_mut() {
                candidate.evaluate_confirmation(thresholds);
            }
            let confirmed = candidates.iter().filter(|c| c.is_confirmed()).count();
            log::info!("Confirmed {} of {} candidates", confirmed, candidates.len());
            self.save_candidates(&candidates)?;
            self.finish_stage(PipelineStage::Confirmation, &mut stages_run);
        }

        // ── Reporting ──
        let (final_candidates, merge) = self.combine_with_previous(candidates)?;
        write_outputs(
            &self.state,
            &final_candidates,
            &table_scores,
            self.config.analysis.top_candidates_full_scan,
            &mut self.audit,
        )?;
        self.record_history(&catalog)?;
        stages_run.push(PipelineStage::Reporting);

        let (succeeded, skipped) = item_totals(&[metadata_counts, sampling_counts, full_scan_counts]);
        let summary = RunSummary {
            run_id: self.audit.run_id().to_string(),
            started_at,
            finished_at: Utc::now(),
            mode: self.config.run_mode.mode,
            stages_run,
            readiness: summarize(&table_scores, &catalog),
            candidates: CandidateSummary::from_candidates(&final_candidates, &self.config.profiling.thresholds),
            metadata: metadata_counts,
            sampling: sampling_counts,
            full_scan: full_scan_counts,
            succeeded,
            skipped,
            merge,
            errors,
        };
        write_summary(&self.state, &summary, &mut self.audit)?;
        self.audit
            .record_success(AuditAction::StageCompleted, PipelineStage::Reporting.name(), "completed");
        log::info!(
            "Run complete: {} candidates, {} confirmed, {} items succeeded, {} skipped",
            summary.candidates.total,
            summary.candidates.confirmed,
            summary.succeeded,
            summary.skipped
        );
        Ok(summary)
    }

    async fn dry_run(&mut self) -> Result<ScopeReport, PipelineError> {
        self.connect().await?;
        let catalog = self.discover().await;
        self.disconnect().await;

        let candidates = classify_all(catalog.columns(), &self.config.ai_candidates);
        let report = ScopeReport::new(
            catalog.databases(),
            catalog.tables().len(),
            catalog.columns().len(),
            &candidates,
        );
        log::info!(
            "Dry run: {} databases, {} tables, {} columns, {} candidates ({} would be sampled)",
            report.databases.len(),
            report.tables,
            report.columns,
            candidates.len(),
            report.sampling_candidates
        );
        Ok(report)
    }

    // ── Helpers ──

    async fn connect(&mut self) -> Result<(), PipelineError> {
        let target = self.warehouse.source_name();
        let timeout = Duration::from_secs(self.config.source.connection_timeout_secs);
        let message = match tokio::time::timeout(timeout, self.warehouse.connect()).await {
            Ok(Ok(())) => {
                log::info!("Connected to {}", target);
                self.audit.record_success(AuditAction::Connected, target, "connected");
                return Ok(());
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {}s", timeout.as_secs()),
        };
        self.audit
            .record_failure(AuditAction::Connected, target.clone(), message.clone());
        self.flush_audit();
        Err(PipelineError::Connection { target, message })
    }

    async fn disconnect(&mut self) {
        let target = self.warehouse.source_name();
        match self.warehouse.disconnect().await {
            Ok(()) => self.audit.record_success(AuditAction::Disconnected, target, "disconnected"),
            Err(e) => {
                log::warn!("Failed to disconnect from {}: {}", target, e);
                self.audit.record_failure(AuditAction::Disconnected, target, e.to_string());
            }
        }
    }

    /// Fetch the four metadata views. A failed query contributes no rows.
    async fn discover(&mut self) -> MetadataCatalog {
        let target = self.warehouse.source_name();
        let columns = self.warehouse.fetch_columns().await;
        let tables = self.warehouse.fetch_tables().await;
        let constraints = self.warehouse.fetch_constraints().await;
        let storage = self.warehouse.fetch_storage_metrics().await;

        let raw = RawMetadata {
            columns: record_fetch(&mut self.audit, &target, "columns", columns),
            tables: record_fetch(&mut self.audit, &target, "tables", tables),
            constraints: record_fetch(&mut self.audit, &target, "constraints", constraints),
            storage: record_fetch(&mut self.audit, &target, "storage_metrics", storage),
        };

        let filter = self.config.database_filter();
        let mut catalog = MetadataCatalog::from_rows(&raw, &filter);
        catalog.queries_executed = METADATA_QUERIES;
        log::info!(
            "Discovered {} columns in {} tables ({}), {} constraints",
            catalog.columns().len(),
            catalog.tables().len(),
            filter.describe(),
            catalog.constraints().len()
        );
        catalog
    }

    fn load_cache(&mut self) -> AnalysisCache {
        let path = self.state.cache_path();
        match AnalysisCache::try_load(&path) {
            Ok(cache) => {
                log::info!("Loaded {} cached analyses", cache.len());
                self.audit.record_success(
                    AuditAction::CacheLoaded,
                    path.display().to_string(),
                    format!("{} entries", cache.len()),
                );
                cache
            }
            Err(e) => {
                log::warn!("{}; starting with an empty cache", e);
                self.audit
                    .record_failure(AuditAction::CacheLoaded, path.display().to_string(), e.to_string());
                AnalysisCache::default()
            }
        }
    }

    fn flush_cache(&mut self, cache: &AnalysisCache) {
        let path = self.state.cache_path();
        match cache.save(&path) {
            Ok(()) => self.audit.record_success(
                AuditAction::CacheSaved,
                path.display().to_string(),
                format!("{} entries", cache.len()),
            ),
            Err(e) => {
                log::warn!("Failed to save analysis cache: {}", e);
                self.audit
                    .record_failure(AuditAction::CacheSaved, path.display().to_string(), e.to_string());
            }
        }
    }

    fn save_candidates(&mut self, candidates: &[Candidate]) -> Result<(), StateError> {
        self.state.save_candidates(candidates)?;
        self.record_checkpoint(self.state.pipeline_candidates_path());
        Ok(())
    }

    fn record_checkpoint(&mut self, path: PathBuf) {
        self.audit
            .record_success(AuditAction::CheckpointWritten, path.display().to_string(), "written");
    }

    fn resume<T>(&mut self, stage: PipelineStage, loaded: Result<T, StateError>) -> Result<T, PipelineError> {
        match loaded {
            Ok(value) => {
                self.audit
                    .record_success(AuditAction::CheckpointLoaded, stage.name(), "resumed");
                Ok(value)
            }
            Err(StateError::Missing(path)) => Err(PipelineError::MissingCheckpoint { stage, path }),
            Err(e) => Err(e.into()),
        }
    }

    fn finish_stage(&mut self, stage: PipelineStage, stages_run: &mut Vec<PipelineStage>) {
        log::info!("Stage {} complete", stage);
        self.audit
            .record_success(AuditAction::StageCompleted, stage.name(), "completed");
        self.flush_audit();
        stages_run.push(stage);
    }

    fn flush_audit(&mut self) {
        let path = self.state.audit_path();
        if let Err(e) = self.audit.flush_to(&path) {
            log::warn!("Failed to write audit trail {}: {}", path.display(), e);
        }
    }

    fn combine_with_previous(
        &mut self,
        candidates: Vec<Candidate>,
    ) -> Result<(Vec<Candidate>, Option<MergeReport>), PipelineError> {
        if self.config.run_mode.mode != RunMode::Append {
            return Ok((candidates, None));
        }
        let previous = self.state.load_previous_candidates()?;
        let strategy = self.config.run_mode.append_strategy;
        let (combined, report) = combine_candidates(previous, candidates, strategy);
        log::info!(
            "Merge results: {} new, {} already existed",
            report.added,
            report.already_existed
        );
        Ok((combined, Some(report)))
    }

    fn record_history(&mut self, catalog: &MetadataCatalog) -> Result<(), StateError> {
        let path = self.state.history_path();
        let mut history = RunHistory::load(&path);
        history.record(RunRecord::new(
            self.config.run_mode.mode,
            catalog.databases(),
            self.config.database_filter().describe(),
        ));
        history.save(&path)?;
        self.record_checkpoint(path);
        Ok(())
    }
}

fn record_fetch(
    audit: &mut AuditLog,
    target: &str,
    query: &str,
    result: anyhow::Result<Vec<Row>>,
) -> Vec<Row> {
    match result {
        Ok(rows) => {
            audit.record_success(
                AuditAction::MetadataQueried,
                target,
                format!("{}: {} rows", query, rows.len()),
            );
            rows
        }
        Err(e) => {
            log::warn!("Metadata query {} failed: {}", query, e);
            audit.record_failure(AuditAction::MetadataQueried, target, format!("{}: {}", query, e));
            Vec::new()
        }
    }
}

fn log_pass(name: &str, report: &PassReport) {
    log::info!(
        "{}: {} newly analyzed, {} from cache, {} skipped",
        name,
        report.newly_analyzed,
        report.cache_hits,
        report.skipped
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::statistics::ProfilingThresholds;
    use crate::db::connectors::snapshot::{MetadataSnapshot, SnapshotConnector};
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.output.directory = dir.join("out");
        config
    }

    #[tokio::test]
    async fn test_connection_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.source.snapshot_path = Some(dir.path().join("missing.json"));
        let connector = SnapshotConnector::new(cfg.source.clone(), ProfilingThresholds::default());
        let mut pipeline = AnalysisPipeline::new(cfg, connector).unwrap();

        let err = pipeline.run(RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Connection { .. }));
        assert_eq!(pipeline.audit().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint() {
        let dir = tempdir().unwrap();
        let connector = SnapshotConnector::from_snapshot(MetadataSnapshot::default(), ProfilingThresholds::default());
        let mut pipeline = AnalysisPipeline::new(config(dir.path()), connector).unwrap();

        let err = pipeline
            .run(RunOptions {
                start_stage: PipelineStage::Confirmation,
                dry_run: false,
            })
            .await
            .unwrap_err();
        match err {
            PipelineError::MissingCheckpoint { stage, path } => {
                assert_eq!(stage, PipelineStage::Confirmation);
                assert!(path.ends_with("metadata/catalog.json"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.analysis.sample_sizes = vec![100, 1000];
        let connector = SnapshotConnector::from_snapshot(MetadataSnapshot::default(), ProfilingThresholds::default());
        assert!(matches!(
            AnalysisPipeline::new(cfg, connector),
            Err(PipelineError::Config(_))
        ));
    }
}
