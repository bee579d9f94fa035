//! Error types for DRIFTMEND operations.

use thiserror::Error;

// ============================================================================
// SNAPSHOT / CAPTURE ERRORS
// ============================================================================

/// Snapshot construction errors (name-uniqueness invariants).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Duplicate table in snapshot: {table}")]
    DuplicateTable { table: String },

    #[error("Duplicate column in table {table}: {column}")]
    DuplicateColumn { table: String, column: String },
}

/// Snapshot capture errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Data store unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Malformed introspection metadata: {reason}")]
    Introspection { reason: String },
}

impl From<SnapshotError> for CaptureError {
    fn from(err: SnapshotError) -> Self {
        CaptureError::Introspection {
            reason: err.to_string(),
        }
    }
}

impl CaptureError {
    /// Whether this failure may clear on its own and is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

// ============================================================================
// PROPOSAL ERRORS
// ============================================================================

/// Errors from the mapping-proposal collaborator boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("No mapping proposer configured")]
    NotConfigured,

    #[error("Proposal request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Proposal transport failed: {reason}")]
    Transport { reason: String },

    #[error("Proposer returned unusable output: {reason}")]
    Malformed { reason: String },

    #[error("Proposal cancelled by shutdown")]
    Cancelled,
}

impl ProposalError {
    /// Timeouts and transport failures are retried with backoff; malformed
    /// output and missing configuration are terminal for the attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

// ============================================================================
// VALIDATION ERRORS
// ============================================================================

/// A single validation violation in a candidate mapping update.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingViolation {
    #[error("Unknown table referenced by {entry}: {table}")]
    UnknownTable { entry: String, table: String },

    #[error("Unknown column referenced by {entry}: {table}.{column}")]
    UnknownColumn {
        entry: String,
        table: String,
        column: String,
    },

    #[error("Duplicate concept mapping: {concept}")]
    DuplicateConcept { concept: String },

    #[error("Duplicate property mapping: {property}")]
    DuplicateProperty { property: String },

    #[error("Change not covered by any mapping entry: {change}")]
    UncoveredChange { change: String },
}

/// Terminal validation outcome: the candidate may not be applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Mapping update failed validation with {} violation(s)", .violations.len())]
pub struct ValidationFailure {
    pub violations: Vec<MappingViolation>,
}

impl ValidationFailure {
    pub fn new(violations: Vec<MappingViolation>) -> Self {
        Self { violations }
    }

    /// All violations joined for log and audit output.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ============================================================================
// STORE / RELOAD / AUDIT / ALERT ERRORS
// ============================================================================

/// Mapping store collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingStoreError {
    #[error("Mapping store rejected a concurrent write: {reason}")]
    Conflict { reason: String },

    #[error("Mapping store unavailable: {reason}")]
    Io { reason: String },
}

impl MappingStoreError {
    /// Conflicts are fatal for the attempt; IO failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Reload-signal collaborator error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Reload signal failed: {reason}")]
pub struct ReloadError {
    pub reason: String,
}

/// Audit log errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit log lock poisoned")]
    LockPoisoned,

    #[error("Audit log append failed: {reason}")]
    Append { reason: String },
}

/// Alert collaborator error (best-effort, never propagated to the loop).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Alert emission failed: {reason}")]
pub struct AlertError {
    pub reason: String,
}

/// Errors from the orchestrator's external control surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("No mapping update is awaiting approval")]
    NothingPending,

    #[error("Orchestrator is no longer running")]
    Disconnected,
}

// ============================================================================
// CONFIG ERRORS
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

// ============================================================================
// MASTER ERROR TYPE
// ============================================================================

/// Master error type for all DRIFTMEND errors.
#[derive(Debug, Clone, Error)]
pub enum DriftmendError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Proposal error: {0}")]
    Proposal(#[from] ProposalError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Mapping store error: {0}")]
    Store(#[from] MappingStoreError),

    #[error("Reload error: {0}")]
    Reload(#[from] ReloadError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for DRIFTMEND operations.
pub type DriftmendResult<T> = Result<T, DriftmendError>;

// =============================================================================
// TESTS
// =============================================================================
