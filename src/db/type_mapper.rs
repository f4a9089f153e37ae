use serde::{Deserialize, Serialize};

/// Family of a warehouse column type, as far as readiness scoring cares
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TypeFamily {
    Text,
    Numeric,
    Temporal,
    SemiStructured,
    Unsupported,
    Other,
}

const UNSUPPORTED_TYPES: &[&str] = &["BINARY", "VARBINARY", "GEOGRAPHY", "GEOMETRY"];

const SEMI_STRUCTURED_TYPES: &[&str] = &["VARIANT", "OBJECT", "ARRAY"];

const TEXT_TYPES: &[&str] = &["VARCHAR", "TEXT", "STRING", "CHAR", "CHARACTER"];

const NUMERIC_TYPES: &[&str] = &[
    "NUMBER", "DECIMAL", "NUMERIC", "INT", "INTEGER", "BIGINT", "SMALLINT", "TINYINT", "BYTEINT",
    "FLOAT", "FLOAT4", "FLOAT8", "DOUBLE", "DOUBLE PRECISION", "REAL",
];

const TEMPORAL_TYPES: &[&str] = &[
    "DATE", "DATETIME", "TIME", "TIMESTAMP", "TIMESTAMP_LTZ", "TIMESTAMP_NTZ", "TIMESTAMP_TZ",
];

/// Substrings that mark a declared type as text for LLM classification.
const LLM_TEXT_MARKERS: &[&str] = &["VARCHAR", "TEXT", "STRING", "CHAR"];

/// Substrings that mark a declared type as text for search classification.
const SEARCH_TEXT_MARKERS: &[&str] = &["VARCHAR", "TEXT", "STRING"];

/// Substrings that mark a declared type as numeric for ML classification.
const ML_NUMERIC_MARKERS: &[&str] = &["NUMBER", "FLOAT", "DECIMAL", "INTEGER", "DOUBLE"];

/// Substrings that mark a declared type as numeric for column statistics.
const STATS_NUMERIC_MARKERS: &[&str] = &["NUMBER", "INT", "FLOAT", "DOUBLE", "DECIMAL"];

/// Strip a parenthesised precision/length suffix and normalise case:
/// `"number(38, 0)"` becomes `"NUMBER"`.
pub fn base_type(data_type: &str) -> String {
    let upper = data_type.trim().to_uppercase();
    match upper.find('(') {
        Some(idx) => upper[..idx].trim_end().to_string(),
        None => upper,
    }
}

/// Classify a declared type by its base type.
pub fn type_family(data_type: &str) -> TypeFamily {
    let base = base_type(data_type);
    let base = base.as_str();
    if UNSUPPORTED_TYPES.contains(&base) {
        TypeFamily::Unsupported
    } else if SEMI_STRUCTURED_TYPES.contains(&base) {
        TypeFamily::SemiStructured
    } else if TEXT_TYPES.contains(&base) {
        TypeFamily::Text
    } else if NUMERIC_TYPES.contains(&base) {
        TypeFamily::Numeric
    } else if TEMPORAL_TYPES.contains(&base) {
        TypeFamily::Temporal
    } else {
        TypeFamily::Other
    }
}

/// Data-type dimension credit: 0 for unsupported, 0.5 for semi-structured, 1 otherwise.
pub fn type_credit(data_type: &str) -> f64 {
    match type_family(data_type) {
        TypeFamily::Unsupported => 0.0,
        TypeFamily::SemiStructured => 0.5,
        _ => 1.0,
    }
}

fn contains_any(data_type: &str, markers: &[&str]) -> bool {
    let upper = data_type.to_uppercase();
    markers.iter().any(|m| upper.contains(m))
}

pub fn is_llm_text_type(data_type: &str) -> bool {
    contains_any(data_type, LLM_TEXT_MARKERS)
}

pub fn is_search_text_type(data_type: &str) -> bool {
    contains_any(data_type, SEARCH_TEXT_MARKERS)
}

pub fn is_ml_numeric_type(data_type: &str) -> bool {
    contains_any(data_type, ML_NUMERIC_MARKERS)
}

/// `TIMESTAMP` or `DATE` anywhere in the declared type.
pub fn is_temporal_type(data_type: &str) -> bool {
    contains_any(data_type, &["TIMESTAMP", "DATE"])
}

/// Exactly `VARIANT`, `OBJECT` or `ARRAY`, case-insensitive.
pub fn is_semi_structured_type(data_type: &str) -> bool {
    let upper = data_type.trim().to_uppercase();
    SEMI_STRUCTURED_TYPES.contains(&upper.as_str())
}

/// Text for the purpose of length statistics (family or substring match).
pub fn is_stats_text_type(data_type: &str) -> bool {
    type_family(data_type) == TypeFamily::Text || is_llm_text_type(&base_type(data_type))
}

pub fn is_stats_numeric_type(data_type: &str) -> bool {
    type_family(data_type) == TypeFamily::Numeric
        || contains_any(&base_type(data_type), STATS_NUMERIC_MARKERS)
}
