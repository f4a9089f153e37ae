pub mod cache;
pub mod history;
pub mod state;

use serde::{Deserialize, Serialize};

/// A stage of the analysis pipeline. Stages are totally ordered; a run
/// started at stage `S` executes every stage `>= S`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Discovery,
    Classification,
    MetadataScoring,
    Sampling,
    FullScan,
    Confirmation,
    Reporting,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 7] = [
        PipelineStage::Discovery,
        PipelineStage::Classification,
        PipelineStage::MetadataScoring,
        PipelineStage::Sampling,
        PipelineStage::FullScan,
        PipelineStage::Confirmation,
        PipelineStage::Reporting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Discovery => "discovery",
            PipelineStage::Classification => "classification",
            PipelineStage::MetadataScoring => "metadata_scoring",
            PipelineStage::Sampling => "sampling",
            PipelineStage::FullScan => "full_scan",
            PipelineStage::Confirmation => "confirmation",
            PipelineStage::Reporting => "reporting",
        }
    }

    /// Whether this stage executes in a run that starts at `start`.
    pub fn runs_from(&self, start: PipelineStage) -> bool {
        *self >= start
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;

    /// Accepts stage names and the numbered stage codes used by older runs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        let stage = match normalized.as_str() {
            "discovery" | "1" => PipelineStage::Discovery,
            "classification" | "2" => PipelineStage::Classification,
            "metadata_scoring" | "2a" | "2b" => PipelineStage::MetadataScoring,
            "sampling" | "2c" => PipelineStage::Sampling,
            "full_scan" | "2d" | "2e" => PipelineStage::FullScan,
            "confirmation" | "2f" | "3" | "4" | "5" | "5b" => PipelineStage::Confirmation,
            "reporting" | "6" => PipelineStage::Reporting,
            _ => return Err(format!("Unknown pipeline stage: {}", s)),
        };
        Ok(stage)
    }
}

/// Whether a run supersedes or extends previous outputs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Fresh,
    Append,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fresh" => Ok(RunMode::Fresh),
            "append" => Ok(RunMode::Append),
            other => Err(format!("Unknown run mode: {}", other)),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Fresh => write!(f, "fresh"),
            RunMode::Append => write!(f, "append"),
        }
    }
}

/// How append-mode runs combine new candidates with the previous run's
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppendStrategy {
    /// Keep existing entries, append only unseen identities
    #[default]
    Merge,
    /// Concatenate without de-duplication
    Add,
}
