pub mod candidate;
pub mod classifier;
pub mod confirmation;
pub mod dimensions;
pub mod sampling;
pub mod statistics;
pub mod summary;

pub use candidate::{AiFeature, Candidate, CandidateError, CandidateScores};
pub use classifier::{classify_all, ClassifierConfig};
pub use confirmation::{confirm, Confirmation, ConfirmationThresholds};
pub use dimensions::{compute_all, AggregateReadinessScore, ReadinessLevel, ReadinessSummary};
pub use sampling::{identify_top_candidates, ItemError, PassReport, SamplingPolicy};
pub use statistics::{AnalysisType, ColumnStatistics, ProfilingThresholds};
pub use summary::{CandidateSummary, PassCounts, RunSummary, ScopeReport};
