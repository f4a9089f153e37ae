pub mod snapshot;

use crate::analysis::statistics::ColumnStatistics;
use crate::db::schema::{ColumnIdentity, Row};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection configuration for the metadata source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// JSON metadata snapshot read by [`snapshot::SnapshotConnector`]
    pub snapshot_path: Option<PathBuf>,
    pub connection_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            connection_timeout_secs: 30,
        }
    }
}

/// How much of a table one sampling attempt reads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleScope {
    Rows(u64),
    Full,
}

impl std::fmt::Display for SampleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleScope::Rows(n) => write!(f, "{} rows", n),
            SampleScope::Full => write!(f, "full table"),
        }
    }
}

/// Source of catalog metadata. Each fetch returns tuple rows in the
/// information-schema field order.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Connect to the source
    async fn connect(&mut self) -> anyhow::Result<()>;

    /// Disconnect from the source
    async fn disconnect(&mut self) -> anyhow::Result<()>;

    /// Check if the connection is active
    async fn is_connected(&self) -> bool;

    /// Human-readable name of the source, for logs and the audit trail
    fn source_name(&self) -> String;

    /// `(db, schema, table, column, ordinal, data_type, char_max_len, num_prec, num_scale, is_nullable, comment)`
    async fn fetch_columns(&self) -> anyhow::Result<Vec<Row>>;

    /// `(db, schema, table, table_type, row_count, bytes, comment, created, last_altered, clustering_key)`
    async fn fetch_tables(&self) -> anyhow::Result<Vec<Row>>;

    /// `(db, schema, table, constraint_type, constraint_name)`
    async fn fetch_constraints(&self) -> anyhow::Result<Vec<Row>>;

    /// `(db, schema, table, active_bytes, time_travel_bytes, failsafe_bytes, clone_bytes)`
    async fn fetch_storage_metrics(&self) -> anyhow::Result<Vec<Row>>;
}

/// Issues a single bounded data-access attempt for one column. Retries and
/// timeouts are applied by the caller.
#[async_trait]
pub trait DataSampler: Send + Sync {
    async fn sample_column(
        &self,
        identity: &ColumnIdentity,
        data_type: &str,
        scope: SampleScope,
    ) -> anyhow::Result<ColumnStatistics>;
}
