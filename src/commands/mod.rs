pub mod analyze;
pub mod report;

pub use analyze::{AnalysisPipeline, PipelineError, RunOptions, RunOutcome};
