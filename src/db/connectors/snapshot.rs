use super::{ConnectionConfig, DataSampler, MetadataSource, SampleScope};
use crate::analysis::statistics::{
    probe_json_values, probe_natural_language, AnalysisType, ColumnStatistics, NumericProfile,
    ProfilingThresholds,
};
use crate::db::schema::{ColumnIdentity, Row};
use crate::db::type_mapper::{is_llm_text_type, is_semi_structured_type};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Values longer than this are eligible for the natural-language probe.
const PROBE_MIN_VALUE_LENGTH: usize = 20;
/// Values drawn for the natural-language probe.
const PROBE_VALUE_LIMIT: usize = 10;

/// Recorded observations for one column, standing in for live data access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleRecord {
    pub total_count: u64,
    pub non_null_count: u64,
    pub avg_length: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub approx_distinct: Option<u64>,
    pub numeric: Option<NumericProfile>,
    /// Raw text values for the natural-language probe
    pub text_samples: Vec<String>,
    /// Raw semi-structured values for the JSON probe
    pub json_values: Vec<String>,
}

/// On-disk snapshot of a warehouse's metadata views
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSnapshot {
    pub columns: Vec<Row>,
    pub tables: Vec<Row>,
    pub constraints: Vec<Row>,
    pub storage: Vec<Row>,
    /// Keyed by `database.schema.table.column`
    pub samples: HashMap<String, SampleRecord>,
}

/// Read-only connector backed by a JSON metadata snapshot
pub struct SnapshotConnector {
    config: ConnectionConfig,
    thresholds: ProfilingThresholds,
    snapshot: Option<MetadataSnapshot>,
}

impl SnapshotConnector {
    pub fn new(config: ConnectionConfig, thresholds: ProfilingThresholds) -> Self {
        Self {
            config,
            thresholds,
            snapshot: None,
        }
    }

    /// Connector over an in-memory snapshot, already connected.
    pub fn from_snapshot(snapshot: MetadataSnapshot, thresholds: ProfilingThresholds) -> Self {
        Self {
            config: ConnectionConfig::default(),
            thresholds,
            snapshot: Some(snapshot),
        }
    }

    fn snapshot(&self) -> anyhow::Result<&MetadataSnapshot> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| anyhow!("Snapshot connector is not connected"))
    }

    fn path(&self) -> anyhow::Result<&PathBuf> {
        self.config
            .snapshot_path
            .as_ref()
            .ok_or_else(|| anyhow!("No snapshot path configured"))
    }

    fn build_statistics(
        &self,
        record: &SampleRecord,
        data_type: &str,
        scope: SampleScope,
    ) -> ColumnStatistics {
        let (source, total, non_null) = match scope {
            SampleScope::Full => (AnalysisType::FullScan, record.total_count, record.non_null_count),
            SampleScope::Rows(n) if n < record.total_count => {
                let ratio = record.non_null_count as f64 / record.total_count as f64;
                (AnalysisType::Sample, n, (n as f64 * ratio).round() as u64)
            }
            SampleScope::Rows(_) => (AnalysisType::Sample, record.total_count, record.non_null_count),
        };

        let mut stats = ColumnStatistics::from_counts(source, total, non_null);
        stats.avg_length = record.avg_length;
        stats.min_length = record.min_length;
        stats.max_length_actual = record.max_length;
        stats.approx_distinct = record.approx_distinct;
        stats.numeric = record.numeric.clone();

        if is_llm_text_type(data_type) && self.thresholds.wants_content_probe(stats.avg_length) {
            let values: Vec<&str> = record
                .text_samples
                .iter()
                .map(String::as_str)
                .filter(|v| v.len() > PROBE_MIN_VALUE_LENGTH)
                .take(PROBE_VALUE_LIMIT)
                .collect();
            stats.content = probe_natural_language(&values);
        }
        if is_semi_structured_type(data_type) {
            stats.is_semi_structured = true;
            stats.json_structure = probe_json_values(&record.json_values);
        }
        stats
    }
}

#[async_trait]
impl MetadataSource for SnapshotConnector {
    async fn connect(&mut self) -> anyhow::Result<()> {
        let path = self.path()?.clone();
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read metadata snapshot {}", path.display()))?;
        let snapshot: MetadataSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse metadata snapshot {}", path.display()))?;
        log::info!(
            "Loaded snapshot {} ({} column rows, {} table rows)",
            path.display(),
            snapshot.columns.len(),
            snapshot.tables.len()
        );
        self.snapshot = Some(snapshot);
        Ok(())
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.snapshot.is_some()
    }

    fn source_name(&self) -> String {
        match &self.config.snapshot_path {
            Some(path) => format!("snapshot:{}", path.display()),
            None => "snapshot:<memory>".to_string(),
        }
    }

    async fn fetch_columns(&self) -> anyhow::Result<Vec<Row>> {
        Ok(self.snapshot()?.columns.clone())
    }

    async fn fetch_tables(&self) -> anyhow::Result<Vec<Row>> {
        Ok(self.snapshot()?.tables.clone())
    }

    async fn fetch_constraints(&self) -> anyhow::Result<Vec<Row>> {
        Ok(self.snapshot()?.constraints.clone())
    }

    async fn fetch_storage_metrics(&self) -> anyhow::Result<Vec<Row>> {
        Ok(self.snapshot()?.storage.clone())
    }
}

#[async_trait]
impl DataSampler for SnapshotConnector {
    async fn sample_column(
        &self,
        identity: &ColumnIdentity,
        data_type: &str,
        scope: SampleScope,
    ) -> anyhow::Result<ColumnStatistics> {
        let key = identity.cache_key();
        let record = self
            .snapshot()?
            .samples
            .get(&key)
            .ok_or_else(|| anyhow!("No recorded data for {}", identity))?;

        Ok(self.build_statistics(record, data_type, scope))
    }
}
