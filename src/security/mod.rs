pub mod audit;
pub mod validation;

use serde::{Deserialize, Serialize};

// Re-export key types and functions for convenient access
pub use audit::{AuditError, AuditFilter, AuditLog};
pub use validation::{
    sanitize_for_display, truncate_for_display, validate_identifier, validate_identity,
    ValidationError,
};

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub run_id: String,
    pub timestamp: String,
    pub action: AuditAction,
    pub target: String,
    pub success: bool,
    pub details: Option<String>,
}

/// Types of auditable actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Connected,
    Disconnected,
    MetadataQueried,
    SampleAttempt,
    FullScanAttempt,
    CacheLoaded,
    CacheSaved,
    CheckpointWritten,
    CheckpointLoaded,
    BackupCreated,
    ReportWritten,
    StageCompleted,
}
