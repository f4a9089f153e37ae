use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::statistics::round2;
use crate::db::schema::{
    ColumnMetadata, ConstraintType, MetadataCatalog, StorageMetrics, TableKey, TableMetadata,
};
use crate::db::type_mapper::{type_family, type_credit, TypeFamily};

// Dimension weights, summing to 100
pub const WEIGHT_COMMENTS: f64 = 25.0;
pub const WEIGHT_DATA_TYPES: f64 = 20.0;
pub const WEIGHT_FRESHNESS: f64 = 25.0;
pub const WEIGHT_CLUSTERING: f64 = 15.0;
pub const WEIGHT_CONSTRAINTS: f64 = 15.0;

/// Active storage above which clustering matters (1 GiB)
pub const LARGE_TABLE_BYTES: i64 = 1_073_741_824;

/// Per-dimension scores, each 0–100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub comments: f64,
    pub data_types: f64,
    pub freshness: f64,
    pub clustering: f64,
    pub constraints: f64,
}

impl DimensionScores {
    pub fn weighted_total(&self) -> f64 {
        self.comments * WEIGHT_COMMENTS / 100.0
            + self.data_types * WEIGHT_DATA_TYPES / 100.0
            + self.freshness * WEIGHT_FRESHNESS / 100.0
            + self.clustering * WEIGHT_CLUSTERING / 100.0
            + self.constraints * WEIGHT_CONSTRAINTS / 100.0
    }
}

/// Evidence behind the dimension scores, for reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDetails {
    pub table_comment: bool,
    pub columns_with_comments: usize,
    pub total_columns: usize,
    pub comment_coverage_pct: f64,
    pub unsupported_type_columns: Vec<String>,
    pub last_altered: Option<DateTime<Utc>>,
    pub clustering_key: Option<String>,
    pub constraint_types: Vec<ConstraintType>,
    pub row_count: Option<i64>,
    pub bytes: Option<i64>,
}

/// Table-level readiness on a 0–100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReadinessScore {
    pub table_key: TableKey,
    pub total_score: f64,
    pub dimension_scores: DimensionScores,
    pub details: DimensionDetails,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessLevel {
    High,
    Medium,
    Low,
}

impl ReadinessLevel {
    pub fn for_score(total_score: f64) -> Self {
        if total_score >= 70.0 {
            ReadinessLevel::High
        } else if total_score >= 40.0 {
            ReadinessLevel::Medium
        } else {
            ReadinessLevel::Low
        }
    }
}

impl AggregateReadinessScore {
    pub fn level(&self) -> ReadinessLevel {
        ReadinessLevel::for_score(self.total_score)
    }
}

// ---------------------------------------------------------------------------
// Scorers
// ---------------------------------------------------------------------------

/// 40 for a table comment plus up to 60 for column comment coverage.
pub fn score_comments(table: Option<&TableMetadata>, columns: &[&ColumnMetadata]) -> f64 {
    let mut score = 0.0;
    if table.map(|t| t.has_comment()).unwrap_or(false) {
        score += 40.0;
    }
    if !columns.is_empty() {
        let commented = columns.iter().filter(|c| c.has_comment()).count();
        score += commented as f64 / columns.len() as f64 * 60.0;
    }
    round2(score).min(100.0)
}

/// Average per-column type credit, scaled to 100. Columns without a type get full credit.
pub fn score_data_types(columns: &[&ColumnMetadata]) -> f64 {
    if columns.is_empty() {
        return 0.0;
    }
    let credits: f64 = columns
        .iter()
        .map(|c| c.data_type.as_deref().map(type_credit).unwrap_or(1.0))
        .sum();
    round2(credits / columns.len() as f64 * 100.0).min(100.0)
}

pub fn score_freshness(last_altered: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last_altered) = last_altered else {
        return 0.0;
    };
    let age_days = (now - last_altered).num_days();
    match age_days {
        d if d <= 7 => 100.0,
        d if d <= 30 => 80.0,
        d if d <= 90 => 50.0,
        d if d <= 180 => 25.0,
        _ => 10.0,
    }
}

/// 70 for a clustering key; large tables add 30 when clustered, 10 when not.
pub fn score_clustering(table: Option<&TableMetadata>, storage: Option<&StorageMetrics>) -> f64 {
    let clustered = table.map(|t| t.is_clustered()).unwrap_or(false);
    let mut score = if clustered { 70.0 } else { 0.0 };
    let active_bytes = storage.map(|s| s.active_bytes).unwrap_or(0);
    if active_bytes > LARGE_TABLE_BYTES {
        score += if clustered { 30.0 } else { 10.0 };
    }
    f64::min(score, 100.0)
}

pub fn score_constraints(types: &HashSet<ConstraintType>) -> f64 {
    let mut score = 0.0;
    if types.contains(&ConstraintType::PrimaryKey) {
        score += 50.0;
    }
    if types.contains(&ConstraintType::ForeignKey) {
        score += 30.0;
    }
    if types.contains(&ConstraintType::Unique) {
        score += 20.0;
    }
    f64::min(score, 100.0)
}

/// Score one table from whatever metadata the catalog holds for it.
pub fn compute_table_score(
    catalog: &MetadataCatalog,
    key: &TableKey,
    now: DateTime<Utc>,
) -> AggregateReadinessScore {
    let table = catalog.table(key);
    let columns = catalog.columns_for(key);
    let constraint_types = catalog.constraint_types_for(key);
    let storage = catalog.storage_for(key);

    let dimension_scores = DimensionScores {
        comments: score_comments(table, &columns),
        data_types: score_data_types(&columns),
        freshness: score_freshness(table.and_then(|t| t.last_altered), now),
        clustering: score_clustering(table, storage),
        constraints: score_constraints(&constraint_types),
    };

    let columns_with_comments = columns.iter().filter(|c| c.has_comment()).count();
    let total_columns = columns.len();
    let mut types: Vec<ConstraintType> = constraint_types.into_iter().collect();
    types.sort_by_key(|t| match t {
        ConstraintType::PrimaryKey => 0,
        ConstraintType::ForeignKey => 1,
        ConstraintType::Unique => 2,
    });

    let details = DimensionDetails {
        table_comment: table.map(|t| t.has_comment()).unwrap_or(false),
        columns_with_comments,
        total_columns,
        comment_coverage_pct: if total_columns > 0 {
            (columns_with_comments as f64 / total_columns as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        },
        unsupported_type_columns: columns
            .iter()
            .filter_map(|c| {
                let dt = c.data_type.as_deref()?;
                (type_family(dt) == TypeFamily::Unsupported).then(|| format!("{} ({})", c.column, dt))
            })
            .collect(),
        last_altered: table.and_then(|t| t.last_altered),
        clustering_key: table.and_then(|t| t.clustering_key.clone()),
        constraint_types: types,
        row_count: table.and_then(|t| t.row_count),
        bytes: table.and_then(|t| t.bytes),
    };

    AggregateReadinessScore {
        table_key: key.clone(),
        total_score: round2(dimension_scores.weighted_total()),
        dimension_scores,
        details,
    }
}

/// Score every table known from table rows or column rows, highest first.
/// Ties keep discovery order.
pub fn compute_all(catalog: &MetadataCatalog, now: DateTime<Utc>) -> Vec<AggregateReadinessScore> {
    let mut seen = HashSet::new();
    let keys: Vec<TableKey> = catalog
        .tables()
        .iter()
        .map(|t| t.key())
        .chain(catalog.columns().iter().map(|c| c.table_key()))
        .filter(|k| seen.insert(k.clone()))
        .collect();

    let mut scores: Vec<AggregateReadinessScore> =
        keys.iter().map(|k| compute_table_score(catalog, k, now)).collect();
    scores.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    scores
}

/// Bucketed overview of table readiness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadinessSummary {
    pub total_tables: usize,
    pub average_score: f64,
    pub high_readiness_count: usize,
    pub medium_readiness_count: usize,
    pub low_readiness_count: usize,
    pub total_columns_analyzed: usize,
    pub total_constraints_found: usize,
    pub queries_executed: u32,
}

pub fn summarize(scores: &[AggregateReadinessScore], catalog: &MetadataCatalog) -> ReadinessSummary {
    let count_level = |level: ReadinessLevel| scores.iter().filter(|s| s.level() == level).count();
    let average_score = if scores.is_empty() {
        0.0
    } else {
        round2(scores.iter().map(|s| s.total_score).sum::<f64>() / scores.len() as f64)
    };
    ReadinessSummary {
        total_tables: scores.len(),
        average_score,
        high_readiness_count: count_level(ReadinessLevel::High),
        medium_readiness_count: count_level(ReadinessLevel::Medium),
        low_readiness_count: count_level(ReadinessLevel::Low),
        total_columns_analyzed: catalog.columns().len(),
        total_constraints_found: catalog.constraints().len(),
        queries_executed: catalog.queries_executed,
    }
}
