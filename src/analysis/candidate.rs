use serde::{Deserialize, Serialize};

use super::confirmation::{confirm, Confirmation, ConfirmationThresholds};
use super::statistics::{compute_data_readiness_score, ColumnStatistics};
use crate::db::schema::{is_present, ColumnIdentity, ColumnMetadata, TableKey};

/// AI feature category a candidate qualifies for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AiFeature {
    #[serde(rename = "LLM")]
    Llm,
    Extract,
    #[serde(rename = "ML")]
    Ml,
    Search,
}

impl AiFeature {
    pub const ALL: [AiFeature; 4] = [AiFeature::Llm, AiFeature::Extract, AiFeature::Ml, AiFeature::Search];

    /// LLM and Extract candidates are columns; ML and Search are tables.
    pub fn is_column_level(&self) -> bool {
        matches!(self, AiFeature::Llm | AiFeature::Extract)
    }

    /// Fixed business-potential score for this feature.
    pub fn business_potential(&self) -> f64 {
        match self {
            AiFeature::Llm => 4.0,
            AiFeature::Extract => 3.0,
            AiFeature::Ml => 5.0,
            AiFeature::Search => 4.0,
        }
    }

    pub fn product_label(&self) -> &'static str {
        match self {
            AiFeature::Llm => "Cortex LLM",
            AiFeature::Extract => "Cortex Extract",
            AiFeature::Ml => "Cortex ML (Forecasting/Anomaly)",
            AiFeature::Search => "Cortex Search / RAG",
        }
    }
}

impl std::fmt::Display for AiFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiFeature::Llm => write!(f, "LLM"),
            AiFeature::Extract => write!(f, "Extract"),
            AiFeature::Ml => write!(f, "ML"),
            AiFeature::Search => write!(f, "Search"),
        }
    }
}

/// The four scoring dimensions, each 0–5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScores {
    pub business_potential: f64,
    pub data_readiness: f64,
    pub metadata_quality: f64,
    pub governance_risk: f64,
}

impl CandidateScores {
    pub fn total(&self) -> f64 {
        self.business_potential + self.data_readiness + self.metadata_quality + self.governance_risk
    }
}

/// Readiness assumed for candidates without column statistics
pub const DEFAULT_DATA_READINESS: f64 = 3.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CandidateError {
    #[error("{feature} candidates must name a column: {identity}")]
    MissingColumn { feature: AiFeature, identity: String },
    #[error("{feature} candidates are table-level and cannot name a column: {identity}")]
    UnexpectedColumn { feature: AiFeature, identity: String },
    #[error("table-level candidate {0} cannot carry column statistics")]
    StatisticsOnTable(String),
}

/// A column or table flagged for one AI feature, with its scores and
/// confirmation verdict. The total score and the verdict are derived and
/// cannot be set directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CandidateRecord", into = "CandidateRecord")]
pub struct Candidate {
    identity: ColumnIdentity,
    ai_feature: AiFeature,
    pub reason: String,
    pub data_type: Option<String>,
    pub max_length: Option<i64>,
    pub comment: Option<String>,
    /// Supporting column names for table-level candidates
    pub supporting_columns: Vec<String>,
    statistics: Option<ColumnStatistics>,
    scores: Option<CandidateScores>,
    confirmation: Option<Confirmation>,
}

impl Candidate {
    /// Build a candidate, rejecting identities that do not match the
    /// feature's granularity.
    pub fn new(
        identity: ColumnIdentity,
        ai_feature: AiFeature,
        reason: impl Into<String>,
    ) -> Result<Self, CandidateError> {
        match (ai_feature.is_column_level(), identity.column.is_some()) {
            (true, false) => {
                return Err(CandidateError::MissingColumn {
                    feature: ai_feature,
                    identity: identity.to_string(),
                })
            }
            (false, true) => {
                return Err(CandidateError::UnexpectedColumn {
                    feature: ai_feature,
                    identity: identity.to_string(),
                })
            }
            _ => {}
        }
        Ok(Self {
            identity,
            ai_feature,
            reason: reason.into(),
            data_type: None,
            max_length: None,
            comment: None,
            supporting_columns: Vec::new(),
            statistics: None,
            scores: None,
            confirmation: None,
        })
    }

    fn from_column(column: &ColumnMetadata, ai_feature: AiFeature, reason: String) -> Self {
        Self {
            identity: column.identity(),
            ai_feature,
            reason,
            data_type: column.data_type.clone(),
            max_length: column.char_max_length,
            comment: column.comment.clone(),
            supporting_columns: Vec::new(),
            statistics: None,
            scores: None,
            confirmation: None,
        }
    }

    fn from_table(key: &TableKey, ai_feature: AiFeature, reason: String, supporting: Vec<String>) -> Self {
        Self {
            identity: ColumnIdentity::table(key),
            ai_feature,
            reason,
            data_type: None,
            max_length: None,
            comment: None,
            supporting_columns: supporting,
            statistics: None,
            scores: None,
            confirmation: None,
        }
    }

    pub fn llm(column: &ColumnMetadata, reason: String) -> Self {
        Self::from_column(column, AiFeature::Llm, reason)
    }

    pub fn extract(column: &ColumnMetadata, reason: String) -> Self {
        Self::from_column(column, AiFeature::Extract, reason)
    }

    pub fn ml(key: &TableKey, reason: String, numeric_columns: Vec<String>) -> Self {
        Self::from_table(key, AiFeature::Ml, reason, numeric_columns)
    }

    pub fn search(key: &TableKey, reason: String, text_columns: Vec<String>) -> Self {
        Self::from_table(key, AiFeature::Search, reason, text_columns)
    }

    pub fn identity(&self) -> &ColumnIdentity {
        &self.identity
    }

    pub fn ai_feature(&self) -> AiFeature {
        self.ai_feature
    }

    pub fn cache_key(&self) -> String {
        self.identity.cache_key()
    }

    pub fn is_column_level(&self) -> bool {
        self.identity.column.is_some()
    }

    pub fn statistics(&self) -> Option<&ColumnStatistics> {
        self.statistics.as_ref()
    }

    pub fn scores(&self) -> Option<&CandidateScores> {
        self.scores.as_ref()
    }

    /// Sum of the four dimension scores, 0 until scored.
    pub fn total_score(&self) -> f64 {
        self.scores.map(|s| s.total()).unwrap_or(0.0)
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmation.as_ref().map(|c| c.is_confirmed).unwrap_or(false)
    }

    pub fn has_comment(&self) -> bool {
        is_present(&self.comment)
    }

    /// Assign the metadata-based scores. Data readiness comes from attached
    /// statistics when present, otherwise the default.
    pub fn score_metadata(&mut self, pii_indicators: &[String]) {
        let data_readiness = self
            .statistics
            .as_ref()
            .map(compute_data_readiness_score)
            .unwrap_or(DEFAULT_DATA_READINESS);
        self.scores = Some(CandidateScores {
            business_potential: self.ai_feature.business_potential(),
            data_readiness,
            metadata_quality: if self.has_comment() { 4.0 } else { 2.0 },
            governance_risk: if self.matches_pii(pii_indicators) { 5.0 } else { 2.0 },
        });
        self.confirmation = None;
    }

    /// Attach new statistics, re-deriving data readiness and clearing any
    /// previous verdict.
    pub fn attach_statistics(&mut self, statistics: ColumnStatistics) -> Result<(), CandidateError> {
        if !self.is_column_level() {
            return Err(CandidateError::StatisticsOnTable(self.identity.to_string()));
        }
        let readiness = compute_data_readiness_score(&statistics);
        self.statistics = Some(statistics);
        if let Some(scores) = self.scores.as_mut() {
            scores.data_readiness = readiness;
        }
        self.confirmation = None;
        Ok(())
    }

    pub fn evaluate_confirmation(&mut self, thresholds: &ConfirmationThresholds) -> &Confirmation {
        let verdict = confirm(self, thresholds);
        self.confirmation.insert(verdict)
    }

    fn matches_pii(&self, indicators: &[String]) -> bool {
        let column = self.identity.column.as_deref().unwrap_or("").to_uppercase();
        let table = self.identity.table.to_uppercase();
        indicators.iter().any(|ind| {
            let ind = ind.to_uppercase();
            column.contains(&ind) || table.contains(&ind)
        })
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// Serialized candidate. `total_score` is written for readers and ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub database: String,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub column: Option<String>,
    pub ai_feature: AiFeature,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub max_length: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_columns: Vec<String>,
    #[serde(default)]
    pub statistics: Option<ColumnStatistics>,
    #[serde(default)]
    pub scores: Option<CandidateScores>,
    #[serde(default)]
    pub total_score: f64,
    #[serde(default)]
    pub is_confirmed_candidate: bool,
    #[serde(default)]
    pub confirmation_reasons: Vec<String>,
}

impl TryFrom<CandidateRecord> for Candidate {
    type Error = CandidateError;

    fn try_from(record: CandidateRecord) -> Result<Self, Self::Error> {
        let identity = ColumnIdentity {
            database: record.database,
            schema: record.schema,
            table: record.table,
            column: record.column.filter(|c| !c.is_empty()),
        };
        let mut candidate = Candidate::new(identity, record.ai_feature, record.reason)?;
        candidate.data_type = record.data_type;
        candidate.max_length = record.max_length;
        candidate.comment = record.comment;
        candidate.supporting_columns = record.supporting_columns;
        candidate.statistics = record.statistics;
        candidate.scores = record.scores;
        if record.is_confirmed_candidate || !record.confirmation_reasons.is_empty() {
            candidate.confirmation = Some(Confirmation {
                is_confirmed: record.is_confirmed_candidate,
                reasons: record.confirmation_reasons,
            });
        }
        Ok(candidate)
    }
}

impl From<Candidate> for CandidateRecord {
    fn from(candidate: Candidate) -> Self {
        let total_score = candidate.total_score();
        let (is_confirmed_candidate, confirmation_reasons) = match candidate.confirmation {
            Some(c) => (c.is_confirmed, c.reasons),
            None => (false, Vec::new()),
        };
        Self {
            database: candidate.identity.database,
            schema: candidate.identity.schema,
            table: candidate.identity.table,
            column: candidate.identity.column,
            ai_feature: candidate.ai_feature,
            reason: candidate.reason,
            data_type: candidate.data_type,
            max_length: candidate.max_length,
            comment: candidate.comment,
            supporting_columns: candidate.supporting_columns,
            statistics: candidate.statistics,
            scores: candidate.scores,
            total_score,
            is_confirmed_candidate,
            confirmation_reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::statistics::AnalysisType;
    use crate::config::PiiConfig;

    fn column(name: &str, comment: Option<&str>) -> ColumnMetadata {
        ColumnMetadata {
            database: "DB".to_string(),
            schema: "SCH".to_string(),
            table: "CUSTOMERS".to_string(),
            column: name.to_string(),
            ordinal_position: 1,
            data_type: Some("VARCHAR".to_string()),
            char_max_length: Some(2000),
            numeric_precision: None,
            numeric_scale: None,
            is_nullable: false,
            comment: comment.map(|c| c.to_string()),
        }
    }

    #[test]
    fn test_new_enforces_granularity() {
        let table = ColumnIdentity::table(&TableKey::new("DB", "S", "T"));
        let col = ColumnIdentity::column("DB", "S", "T", "C");
        assert!(Candidate::new(table.clone(), AiFeature::Ml, "ok").is_ok());
        assert!(matches!(
            Candidate::new(col.clone(), AiFeature::Search, "x"),
            Err(CandidateError::UnexpectedColumn { .. })
        ));
        assert!(matches!(
            Candidate::new(table, AiFeature::Llm, "x"),
            Err(CandidateError::MissingColumn { .. })
        ));
        assert!(Candidate::new(col, AiFeature::Extract, "ok").is_ok());
    }

    #[test]
    fn test_metadata_scores() {
        let pii = PiiConfig::default().indicators;
        let mut plain = Candidate::llm(&column("NOTES", Some("free text")), "r".to_string());
        plain.score_metadata(&pii);
        let scores = plain.scores().unwrap();
        assert_eq!(scores.business_potential, 4.0);
        assert_eq!(scores.data_readiness, DEFAULT_DATA_READINESS);
        assert_eq!(scores.metadata_quality, 4.0);
        assert_eq!(scores.governance_risk, 2.0);
        assert_eq!(plain.total_score(), 13.0);

        let mut email = Candidate::llm(&column("EMAIL_BODY", Some("  ")), "r".to_string());
        email.score_metadata(&pii);
        assert_eq!(email.scores().unwrap().governance_risk, 5.0);
        assert_eq!(email.scores().unwrap().metadata_quality, 2.0);

        let mut ml = Candidate::ml(&TableKey::new("DB", "S", "PHONE_CALLS"), "r".to_string(), vec![]);
        ml.score_metadata(&pii);
        assert_eq!(ml.scores().unwrap().governance_risk, 5.0);
        assert_eq!(ml.total_score(), 5.0 + 3.0 + 2.0 + 5.0);
    }

    #[test]
    fn test_attach_statistics_rescores_and_resets() {
        let mut c = Candidate::llm(&column("NOTES", None), "r".to_string());
        c.score_metadata(&[]);
        c.evaluate_confirmation(&ConfirmationThresholds::default());
        assert!(c.confirmation().is_some());

        let stats = ColumnStatistics {
            null_percentage: Some(5.0),
            avg_length: Some(250.0),
            has_comment: true,
            is_nullable: Some(false),
            source: AnalysisType::Sample,
            ..Default::default()
        };
        c.attach_statistics(stats).unwrap();
        assert_eq!(c.scores().unwrap().data_readiness, 5.0);
        assert!(c.confirmation().is_none());
        let scores = c.scores().unwrap();
        assert_eq!(c.total_score(), scores.total());

        let mut t = Candidate::search(&TableKey::new("DB", "S", "T"), "r".to_string(), vec![]);
        assert!(t.attach_statistics(ColumnStatistics::default()).is_err());
    }

    #[test]
    fn test_wire_recomputes_total() {
        let mut c = Candidate::llm(&column("NOTES", None), "r".to_string());
        c.score_metadata(&[]);
        let mut value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["total_score"], serde_json::json!(11.0));
        value["total_score"] = serde_json::json!(99.0);
        let loaded: Candidate = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.total_score(), 11.0);
        assert_eq!(loaded, c);
    }

    #[test]
    fn test_wire_rejects_column_on_table_feature() {
        let json = serde_json::json!({
            "database": "DB", "schema": "S", "table": "T", "column": "C",
            "ai_feature": "ML", "reason": "x"
        });
        assert!(serde_json::from_value::<Candidate>(json).is_err());

        let empty_column = serde_json::json!({
            "database": "DB", "schema": "S", "table": "T", "column": "",
            "ai_feature": "Search", "reason": "x"
        });
        let c: Candidate = serde_json::from_value(empty_column).unwrap();
        assert_eq!(c.cache_key(), "DB.S.T.");
    }
}
