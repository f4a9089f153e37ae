use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use super::candidate::Candidate;
use super::statistics::{AnalysisType, ColumnStatistics};
use crate::config::AnalysisConfig;
use crate::db::connectors::{DataSampler, SampleScope};
use crate::db::schema::{ColumnIdentity, MetadataCatalog};
use crate::jobs::cache::{AnalysisCache, CacheEntry};
use crate::security::{AuditAction, AuditLog};
use crate::security::validation::{truncate_for_display, validate_identity, ValidationError};

/// Error text kept per failed item
pub const MAX_ERROR_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// Retry combinator
// ---------------------------------------------------------------------------

/// Ordered list of attempt parameters. Each attempt is made only after the
/// previous one failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy<P> {
    attempts: Vec<P>,
}

impl<P: Clone> RetryPolicy<P> {
    pub fn new(attempts: Vec<P>) -> Self {
        Self { attempts }
    }

    pub fn attempts(&self) -> &[P] {
        &self.attempts
    }
}

/// One failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure<P> {
    pub param: P,
    pub error: String,
}

/// Result of the first successful attempt, plus the failures before it
#[derive(Debug)]
pub struct AttemptSuccess<P, T> {
    pub value: T,
    pub param: P,
    pub failures: Vec<AttemptFailure<P>>,
}

/// Every attempt failed
#[derive(Debug)]
pub struct RetryExhausted<P> {
    pub failures: Vec<AttemptFailure<P>>,
}

impl<P> RetryExhausted<P> {
    pub fn last_error(&self) -> &str {
        self.failures
            .last()
            .map(|f| f.error.as_str())
            .unwrap_or("no attempts configured")
    }
}

/// Run `op` with each parameter in order until one succeeds.
pub async fn attempt_each<P, T, F, Fut>(
    policy: &RetryPolicy<P>,
    mut op: F,
) -> Result<AttemptSuccess<P, T>, RetryExhausted<P>>
where
    P: Clone + std::fmt::Debug,
    F: FnMut(P) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut failures = Vec::new();
    let max_attempts = policy.attempts.len();
    for (attempt, param) in policy.attempts.iter().enumerate() {
        match op(param.clone()).await {
            Ok(value) => {
                return Ok(AttemptSuccess {
                    value,
                    param: param.clone(),
                    failures,
                })
            }
            Err(e) => {
                log::debug!(
                    "Attempt {}/{} with {:?} failed: {}",
                    attempt + 1,
                    max_attempts,
                    param,
                    e
                );
                failures.push(AttemptFailure {
                    param: param.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    Err(RetryExhausted { failures })
}

// ---------------------------------------------------------------------------
// Sampling adapter
// ---------------------------------------------------------------------------

/// Sampling ladder and statement timeouts
#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    pub ladder: RetryPolicy<SampleScope>,
    pub sample_timeout: Duration,
    pub full_scan_timeout: Duration,
}

impl SamplingPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            ladder: RetryPolicy::new(config.sample_sizes.iter().map(|n| SampleScope::Rows(*n)).collect()),
            sample_timeout: Duration::from_secs(config.sample_timeout),
            full_scan_timeout: Duration::from_secs(config.full_scan_timeout),
        }
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] ValidationError),
    #[error("all {attempts} attempts failed, last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
}

/// Statistics from a successful attempt
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub statistics: ColumnStatistics,
    pub scope: SampleScope,
    pub attempts: usize,
}

/// Run the attempts of `policy` against one column, each bounded by `timeout`.
/// Every attempt is recorded in the audit log.
pub async fn run_attempts(
    sampler: &dyn DataSampler,
    identity: &ColumnIdentity,
    data_type: &str,
    policy: &RetryPolicy<SampleScope>,
    timeout: Duration,
    audit: &mut AuditLog,
) -> Result<SampleOutcome, SamplingError> {
    validate_identity(identity)?;

    let result = attempt_each(policy, |scope| async move {
        match tokio::time::timeout(timeout, sampler.sample_column(identity, data_type, scope)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "Statement timed out after {:?} ({})",
                timeout,
                scope
            )),
        }
    })
    .await;

    let action = |scope: &SampleScope| match scope {
        SampleScope::Full => AuditAction::FullScanAttempt,
        SampleScope::Rows(_) => AuditAction::SampleAttempt,
    };

    match result {
        Ok(success) => {
            for failure in &success.failures {
                audit.record_failure(
                    action(&failure.param),
                    identity.to_string(),
                    format!("{}: {}", failure.param, truncate_for_display(&failure.error, MAX_ERROR_LENGTH)),
                );
            }
            audit.record_success(action(&success.param), identity.to_string(), success.param.to_string());
            Ok(SampleOutcome {
                statistics: success.value,
                scope: success.param,
                attempts: success.failures.len() + 1,
            })
        }
        Err(exhausted) => {
            for failure in &exhausted.failures {
                audit.record_failure(
                    action(&failure.param),
                    identity.to_string(),
                    format!("{}: {}", failure.param, truncate_for_display(&failure.error, MAX_ERROR_LENGTH)),
                );
            }
            Err(SamplingError::Exhausted {
                attempts: exhausted.failures.len(),
                last_error: truncate_for_display(exhausted.last_error(), MAX_ERROR_LENGTH),
            })
        }
    }
}

/// Adaptive sample: walk the ladder from the largest size down.
pub async fn run_adaptive_sample(
    sampler: &dyn DataSampler,
    identity: &ColumnIdentity,
    data_type: &str,
    policy: &SamplingPolicy,
    audit: &mut AuditLog,
) -> Result<SampleOutcome, SamplingError> {
    run_attempts(sampler, identity, data_type, &policy.ladder, policy.sample_timeout, audit).await
}

/// Single exact-scan attempt with the full-scan timeout.
pub async fn run_full_scan(
    sampler: &dyn DataSampler,
    identity: &ColumnIdentity,
    data_type: &str,
    policy: &SamplingPolicy,
    audit: &mut AuditLog,
) -> Result<SampleOutcome, SamplingError> {
    let single = RetryPolicy::new(vec![SampleScope::Full]);
    run_attempts(sampler, identity, data_type, &single, policy.full_scan_timeout, audit).await
}

// ---------------------------------------------------------------------------
// Cache-aware passes
// ---------------------------------------------------------------------------

/// A failed batch item, kept for the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub candidate: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Outcome counts for one pass over the candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub cache_hits: usize,
    pub newly_analyzed: usize,
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

impl PassReport {
    pub fn succeeded(&self) -> usize {
        self.cache_hits + self.newly_analyzed
    }
}

/// Collaborators shared by the passes
pub struct PassContext<'a> {
    pub catalog: &'a MetadataCatalog,
    pub cache: &'a mut AnalysisCache,
    pub audit: &'a mut AuditLog,
    pub force_reanalysis: bool,
    pub now: DateTime<Utc>,
}

fn attach(candidate: &mut Candidate, statistics: ColumnStatistics) {
    if let Err(e) = candidate.attach_statistics(statistics) {
        log::warn!("{}", e);
    }
}

/// Attach metadata-estimated statistics to every column candidate, reusing
/// any cached result.
pub fn estimate_from_metadata(candidates: &mut [Candidate], ctx: &mut PassContext<'_>) -> PassReport {
    let mut report = PassReport::default();
    for candidate in candidates.iter_mut().filter(|c| c.is_column_level()) {
        let key = candidate.cache_key();
        if !ctx.force_reanalysis {
            if let Some(entry) = ctx.cache.lookup(&key, AnalysisType::MetadataOnly) {
                log::debug!("Cache hit for {} ({:?})", key, entry.analysis_type);
                let statistics = entry.statistics.clone();
                attach(candidate, statistics);
                report.cache_hits += 1;
                continue;
            }
        }
        let Some(column) = ctx.catalog.column(candidate.identity()) else {
            report.skipped += 1;
            report.errors.push(ItemError {
                candidate: key,
                error: "Column metadata not found".to_string(),
                at: ctx.now,
            });
            continue;
        };
        let row_count = ctx.catalog.table(&column.table_key()).and_then(|t| t.row_count);
        let statistics = ColumnStatistics::from_metadata(column, row_count);
        ctx.cache.record(&key, CacheEntry::metadata(statistics.clone(), ctx.now));
        attach(candidate, statistics);
        report.newly_analyzed += 1;
    }
    report
}

async fn analyze_selected(
    candidates: &mut [Candidate],
    selected: impl Fn(&Candidate) -> bool,
    requested: AnalysisType,
    sampler: &dyn DataSampler,
    policy: &SamplingPolicy,
    ctx: &mut PassContext<'_>,
) -> PassReport {
    let mut report = PassReport::default();
    for candidate in candidates.iter_mut() {
        if !candidate.is_column_level() || !selected(candidate) {
            continue;
        }
        let key = candidate.cache_key();
        if !ctx.force_reanalysis {
            if let Some(entry) = ctx.cache.lookup(&key, requested) {
                log::debug!("Cache hit for {} ({:?})", key, entry.analysis_type);
                let statistics = entry.statistics.clone();
                attach(candidate, statistics);
                report.cache_hits += 1;
                continue;
            }
        }

        let identity = candidate.identity().clone();
        let data_type = candidate.data_type.clone().unwrap_or_default();
        let result = match requested {
            AnalysisType::FullScan => {
                run_full_scan(sampler, &identity, &data_type, policy, ctx.audit).await
            }
            _ => run_adaptive_sample(sampler, &identity, &data_type, policy, ctx.audit).await,
        };

        match result {
            Ok(outcome) => {
                let statistics = outcome.statistics.with_column_facts(ctx.catalog.column(&identity));
                ctx.cache.record(&key, CacheEntry::sampled(outcome.scope, statistics.clone(), ctx.now));
                attach(candidate, statistics);
                report.newly_analyzed += 1;
            }
            Err(e) => {
                let error = truncate_for_display(&e.to_string(), MAX_ERROR_LENGTH);
                log::warn!("Skipping {}: {}", identity, error);
                report.skipped += 1;
                report.errors.push(ItemError {
                    candidate: key,
                    error,
                    at: ctx.now,
                });
            }
        }
    }
    report
}

/// Sample every LLM and Extract candidate, skipping cached results.
pub async fn sample_candidates(
    candidates: &mut [Candidate],
    sampler: &dyn DataSampler,
    policy: &SamplingPolicy,
    ctx: &mut PassContext<'_>,
) -> PassReport {
    analyze_selected(candidates, |_| true, AnalysisType::Sample, sampler, policy, ctx).await
}

/// Exact-scan the listed candidates, skipping cached full scans.
pub async fn full_scan_candidates(
    candidates: &mut [Candidate],
    top: &[ColumnIdentity],
    sampler: &dyn DataSampler,
    policy: &SamplingPolicy,
    ctx: &mut PassContext<'_>,
) -> PassReport {
    let keys: HashSet<String> = top.iter().map(|i| i.cache_key()).collect();
    analyze_selected(
        candidates,
        |c| keys.contains(&c.cache_key()),
        AnalysisType::FullScan,
        sampler,
        policy,
        ctx,
    )
    .await
}

/// Column candidates ranked by total score, highest first, ties in input order.
pub fn identify_top_candidates(candidates: &[Candidate], limit: usize) -> Vec<ColumnIdentity> {
    let mut ranked: Vec<&Candidate> = candidates.iter().filter(|c| c.is_column_level()).collect();
    ranked.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
    ranked
        .into_iter()
        .take(limit)
        .map(|c| c.identity().clone())
        .collect()
}
