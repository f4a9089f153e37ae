use serde::{Deserialize, Serialize};

use crate::db::schema::ColumnMetadata;
use crate::db::type_mapper::{is_semi_structured_type, is_stats_text_type};

/// How a set of column statistics was obtained. Ordered by strength:
/// `MetadataOnly < Sample < FullScan`.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    MetadataOnly,
    Sample,
    FullScan,
}

impl AnalysisType {
    /// Whether a result of this type is good enough for a `requested` lookup.
    pub fn satisfies(&self, requested: AnalysisType) -> bool {
        *self >= requested
    }
}

/// Numeric value distribution for numeric columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericProfile {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub median: Option<f64>,
    pub p95: Option<f64>,
    pub stddev: Option<f64>,
}

/// Natural-language probe of a small sample of text values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProfile {
    pub is_natural_language: Option<bool>,
    pub sample_with_spaces_rate: Option<f64>,
}

/// JSON validity probe of a semi-structured column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonStructure {
    pub valid_json_rate: f64,
    pub object_rate: f64,
    pub array_rate: f64,
    pub is_valid_structure: bool,
}

/// Column statistics from either provenance mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnStatistics {
    pub row_count: u64,
    pub non_null_count: u64,
    pub null_percentage: Option<f64>,
    pub avg_length: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length_actual: Option<u64>,
    pub approx_distinct: Option<u64>,
    pub numeric: Option<NumericProfile>,
    pub content: Option<ContentProfile>,
    pub json_structure: Option<JsonStructure>,
    pub has_comment: bool,
    pub is_nullable: Option<bool>,
    pub is_semi_structured: bool,
    pub source: AnalysisType,
}

/// Declared max length assumed for text columns without one.
pub const DEFAULT_TEXT_MAX_LENGTH: u64 = 16_777_216;

const NULLABLE_NULL_ESTIMATE: f64 = 20.0;

impl ColumnStatistics {
    /// Estimate statistics from catalog metadata alone.
    pub fn from_metadata(column: &ColumnMetadata, row_count: Option<i64>) -> Self {
        let row_count = row_count.unwrap_or(0).max(0) as u64;
        let (null_percentage, non_null_count) = if column.is_nullable {
            (NULLABLE_NULL_ESTIMATE, (row_count as f64 * 0.8) as u64)
        } else {
            (0.0, row_count)
        };

        let mut stats = Self {
            row_count,
            non_null_count,
            null_percentage: Some(null_percentage),
            has_comment: column.has_comment(),
            is_nullable: Some(column.is_nullable),
            source: AnalysisType::MetadataOnly,
            ..Default::default()
        };

        let data_type = column.data_type.as_deref().unwrap_or("");
        if is_stats_text_type(data_type) {
            match column.char_max_length.filter(|l| *l > 0) {
                Some(len) => {
                    stats.avg_length = Some(round2((len as f64 * 0.3).min(5000.0)));
                    stats.max_length_actual = Some(len as u64);
                }
                None => {
                    stats.avg_length = Some(100.0);
                    stats.max_length_actual = Some(DEFAULT_TEXT_MAX_LENGTH);
                }
            }
            stats.min_length = Some(0);
        } else if is_semi_structured_type(data_type) {
            stats.is_semi_structured = true;
        }
        stats
    }

    /// Statistics from a sampled or full count. A zero total reads as 100% NULL.
    pub fn from_counts(source: AnalysisType, total_count: u64, non_null_count: u64) -> Self {
        let non_null_count = non_null_count.min(total_count);
        let null_percentage = if total_count > 0 {
            round2((total_count - non_null_count) as f64 / total_count as f64 * 100.0)
        } else {
            100.0
        };
        Self {
            row_count: total_count,
            non_null_count,
            null_percentage: Some(null_percentage),
            source,
            ..Default::default()
        }
    }

    /// Sampled statistics carry no catalog facts; fold in the column's comment
    /// and nullability so both modes score the same way.
    pub fn with_column_facts(mut self, column: Option<&ColumnMetadata>) -> Self {
        if let Some(column) = column {
            self.has_comment = column.has_comment();
            self.is_nullable = Some(column.is_nullable);
        }
        self
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Column-level data readiness on a 0–5 scale.
pub fn compute_data_readiness_score(stats: &ColumnStatistics) -> f64 {
    let null_points = match stats.null_percentage {
        Some(p) if p <= 10.0 => 2.0,
        Some(p) if p <= 30.0 => 1.5,
        Some(p) if p <= 50.0 => 1.0,
        Some(p) if p <= 70.0 => 0.5,
        _ => 0.0,
    };

    let length_points = match stats.avg_length {
        Some(l) if l >= 200.0 => 2.0,
        Some(l) if l >= 100.0 => 1.5,
        Some(l) if l >= 50.0 => 1.0,
        Some(l) if l > 0.0 => 0.5,
        _ => 0.0,
    };

    let not_null = stats.is_nullable == Some(false);
    let documentation_points = match (stats.has_comment, not_null) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.5,
        (false, false) => 0.0,
    };

    round2(null_points + length_points + documentation_points).min(5.0)
}

// ---------------------------------------------------------------------------
// Profiling classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparsityThresholds {
    pub low_threshold: f64,
    pub medium_threshold: f64,
    pub high_threshold: f64,
}

impl Default for SparsityThresholds {
    fn default() -> Self {
        Self {
            low_threshold: 10.0,
            medium_threshold: 30.0,
            high_threshold: 70.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityThresholds {
    pub low_threshold: f64,
    pub high_threshold: f64,
}

impl Default for CardinalityThresholds {
    fn default() -> Self {
        Self {
            low_threshold: 0.01,
            high_threshold: 0.90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTypeThresholds {
    pub min_meaningful_length: f64,
    pub min_rich_content_length: f64,
    /// Rows drawn for the natural-language probe
    pub content_sample_size: u64,
}

impl Default for ContentTypeThresholds {
    fn default() -> Self {
        Self {
            min_meaningful_length: 50.0,
            min_rich_content_length: 200.0,
            content_sample_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingThresholds {
    pub sparsity: SparsityThresholds,
    pub cardinality: CardinalityThresholds,
    pub content_type: ContentTypeThresholds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SparsityClass {
    Low,
    Medium,
    High,
    VeryHigh,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityClass {
    Low,
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    Code,
    ShortText,
    MeaningfulText,
    RichContent,
    Unknown,
}

impl ProfilingThresholds {
    pub fn classify_sparsity(&self, null_percentage: Option<f64>) -> SparsityClass {
        let t = &self.sparsity;
        match null_percentage {
            None => SparsityClass::Unknown,
            Some(p) if p <= t.low_threshold => SparsityClass::Low,
            Some(p) if p <= t.medium_threshold => SparsityClass::Medium,
            Some(p) if p <= t.high_threshold => SparsityClass::High,
            Some(_) => SparsityClass::VeryHigh,
        }
    }

    pub fn classify_cardinality(&self, stats: &ColumnStatistics) -> CardinalityClass {
        let Some(distinct) = stats.approx_distinct else {
            return CardinalityClass::Unknown;
        };
        let ratio = if stats.non_null_count > 0 {
            distinct as f64 / stats.non_null_count as f64
        } else {
            0.0
        };
        if ratio <= self.cardinality.low_threshold {
            CardinalityClass::Low
        } else if ratio >= self.cardinality.high_threshold {
            CardinalityClass::High
        } else {
            CardinalityClass::Medium
        }
    }

    pub fn classify_content(&self, avg_length: Option<f64>) -> ContentClass {
        let t = &self.content_type;
        match avg_length {
            None => ContentClass::Unknown,
            Some(l) if l < 10.0 => ContentClass::Code,
            Some(l) if l < t.min_meaningful_length => ContentClass::ShortText,
            Some(l) if l < t.min_rich_content_length => ContentClass::MeaningfulText,
            Some(_) => ContentClass::RichContent,
        }
    }

    /// Whether a column's average length warrants the natural-language probe.
    pub fn wants_content_probe(&self, avg_length: Option<f64>) -> bool {
        avg_length
            .map(|l| l >= self.content_type.min_meaningful_length)
            .unwrap_or(false)
    }
}

/// Natural-language heuristic: at least half of the sampled values contain a space.
pub fn probe_natural_language<S: AsRef<str>>(samples: &[S]) -> Option<ContentProfile> {
    if samples.is_empty() {
        return None;
    }
    let with_spaces = samples.iter().filter(|s| s.as_ref().contains(' ')).count();
    let rate = with_spaces as f64 / samples.len() as f64;
    Some(ContentProfile {
        is_natural_language: Some(rate >= 0.5),
        sample_with_spaces_rate: Some(round2(rate * 100.0)),
    })
}

/// JSON validity from probe counts. Valid when at least 90% parse.
pub fn json_structure_from_counts(
    total: u64,
    valid_json: u64,
    objects: u64,
    arrays: u64,
) -> Option<JsonStructure> {
    if total == 0 {
        return None;
    }
    let rate = |n: u64| round2(n as f64 / total as f64 * 100.0);
    Some(JsonStructure {
        valid_json_rate: rate(valid_json),
        object_rate: rate(objects),
        array_rate: rate(arrays),
        is_valid_structure: valid_json as f64 / total as f64 >= 0.9,
    })
}

/// Probe a set of raw values as JSON.
pub fn probe_json_values<S: AsRef<str>>(values: &[S]) -> Option<JsonStructure> {
    let mut valid = 0u64;
    let mut objects = 0u64;
    let mut arrays = 0u64;
    for value in values {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(value.as_ref()) {
            valid += 1;
            match parsed {
                serde_json::Value::Object(_) => objects += 1,
                serde_json::Value::Array(_) => arrays += 1,
                _ => {}
            }
        }
    }
    json_structure_from_counts(values.len() as u64, valid, objects, arrays)
}
