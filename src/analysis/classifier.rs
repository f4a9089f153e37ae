use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use crate::db::schema::{group_by_table, ColumnMetadata};
use crate::db::type_mapper::{
    is_llm_text_type, is_ml_numeric_type, is_search_text_type, is_semi_structured_type,
    is_temporal_type,
};

/// Maximum number of supporting column names reported per table candidate.
const MAX_SUPPORTING_COLUMNS: usize = 5;

/// Rule parameters for the classifier bank
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Case-insensitive column-name substrings that mark semantic text
    pub text_indicators: Vec<String>,
    /// Declared length at which a text column counts as long text
    pub min_text_column_length: i64,
    /// Declared length at which a text column counts toward search candidacy
    pub min_search_text_length: i64,
    pub min_text_columns_for_search: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            text_indicators: [
                "DESCRIPTION",
                "CONTENT",
                "MESSAGE",
                "NOTE",
                "SUMMARY",
                "DETAIL",
                "BODY",
                "TEXT",
                "COMMENT",
                "FEEDBACK",
                "REVIEW",
                "ABSTRACT",
                "BIO",
                "NARRATIVE",
                "TITLE",
                "SUBJECT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_text_column_length: 500,
            min_search_text_length: 200,
            min_text_columns_for_search: 2,
        }
    }
}

/// Text columns that are long or carry a semantic name.
pub fn classify_llm(columns: &[ColumnMetadata], config: &ClassifierConfig) -> Vec<Candidate> {
    columns
        .iter()
        .filter_map(|column| {
            let data_type = column.data_type.as_deref()?;
            if !is_llm_text_type(data_type) {
                return None;
            }
            let is_long_text = column
                .char_max_length
                .map(|len| len >= config.min_text_column_length)
                .unwrap_or(false);
            let name = column.column.to_uppercase();
            let has_indicator = config
                .text_indicators
                .iter()
                .any(|ind| name.contains(&ind.to_uppercase()));
            if !is_long_text && !has_indicator {
                return None;
            }
            let trigger = if is_long_text { "long text" } else { "semantic name" };
            Some(Candidate::llm(
                column,
                format!("Text column ({}) - {}", data_type, trigger),
            ))
        })
        .collect()
}

/// Semi-structured columns always qualify.
pub fn classify_extract(columns: &[ColumnMetadata]) -> Vec<Candidate> {
    columns
        .iter()
        .filter_map(|column| {
            let data_type = column.data_type.as_deref()?;
            is_semi_structured_type(data_type)
                .then(|| Candidate::extract(column, format!("Semi-structured {} column", data_type)))
        })
        .collect()
}

/// Tables with a timestamp column and at least one numeric column.
pub fn classify_ml(columns: &[ColumnMetadata]) -> Vec<Candidate> {
    group_by_table(columns)
        .into_iter()
        .filter_map(|(key, cols)| {
            let has_timestamp = cols
                .iter()
                .any(|c| c.data_type.as_deref().map(is_temporal_type).unwrap_or(false));
            let numeric: Vec<&str> = cols
                .iter()
                .filter(|c| c.data_type.as_deref().map(is_ml_numeric_type).unwrap_or(false))
                .map(|c| c.column.as_str())
                .collect();
            if !has_timestamp || numeric.is_empty() {
                return None;
            }
            let supporting: Vec<String> = numeric
                .iter()
                .take(MAX_SUPPORTING_COLUMNS)
                .map(|s| s.to_string())
                .collect();
            let reason = format!(
                "Has timestamp + {} numeric columns ({})",
                numeric.len(),
                supporting.join(", ")
            );
            Some(Candidate::ml(&key, reason, supporting))
        })
        .collect()
}

/// Tables with enough declared-long text columns for retrieval.
pub fn classify_search(columns: &[ColumnMetadata], config: &ClassifierConfig) -> Vec<Candidate> {
    group_by_table(columns)
        .into_iter()
        .filter_map(|(key, cols)| {
            let long_text: Vec<&str> = cols
                .iter()
                .filter(|c| c.data_type.as_deref().map(is_search_text_type).unwrap_or(false))
                .filter(|c| c.char_max_length.unwrap_or(0) >= config.min_search_text_length)
                .map(|c| c.column.as_str())
                .collect();
            if long_text.len() < config.min_text_columns_for_search.max(1) {
                return None;
            }
            let supporting: Vec<String> = long_text
                .iter()
                .take(MAX_SUPPORTING_COLUMNS)
                .map(|s| s.to_string())
                .collect();
            let reason = format!(
                "{} substantial text columns ({})",
                long_text.len(),
                supporting.join(", ")
            );
            Some(Candidate::search(&key, reason, supporting))
        })
        .collect()
}

/// Run every classifier. Output order: LLM, Extract, ML, Search.
pub fn classify_all(columns: &[ColumnMetadata], config: &ClassifierConfig) -> Vec<Candidate> {
    let mut candidates = classify_llm(columns, config);
    candidates.extend(classify_extract(columns));
    candidates.extend(classify_ml(columns));
    candidates.extend(classify_search(columns, config));
    candidates
}
