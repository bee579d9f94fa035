//! Alert collaborator boundary and alert composition.
//!
//! Alerts are best-effort: the orchestrator bounds every emission with a
//! short timeout and never lets a slow or failing alert channel stall the
//! healing loop. Delivery mechanics (webhooks, chat channels) live behind
//! the `AlertSink` trait and are not this crate's concern.

use async_trait::async_trait;
use driftmend_core::{AlertError, AttemptId, ChangeSet, Generation};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SEVERITY
// ============================================================================

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Structured context attached to an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Healing attempt the alert belongs to, if any
    pub attempt_id: Option<AttemptId>,
    /// Snapshot generation at emission time
    pub generation: Option<Generation>,
    /// Number of change records involved
    pub change_count: Option<usize>,
    /// Free-form extra detail (error text, change summary)
    pub detail: Option<String>,
}

impl AlertContext {
    pub fn for_attempt(attempt_id: AttemptId, generation: Generation) -> Self {
        Self {
            attempt_id: Some(attempt_id),
            generation: Some(generation),
            ..Self::default()
        }
    }

    pub fn with_change_count(mut self, count: usize) -> Self {
        self.change_count = Some(count);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SINK TRAIT
// ============================================================================

/// Trait for alert collaborators.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Emit one alert. Best-effort; callers bound this with a timeout.
    async fn emit(
        &self,
        severity: AlertSeverity,
        message: &str,
        context: &AlertContext,
    ) -> Result<(), AlertError>;
}

/// Fallback sink that routes alerts into the process log. Used when no
/// external alert channel is wired up.
#[derive(Debug, Clone, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn emit(
        &self,
        severity: AlertSeverity,
        message: &str,
        context: &AlertContext,
    ) -> Result<(), AlertError> {
        match severity {
            AlertSeverity::Info => {
                tracing::info!(severity = %severity, context = ?context, "{message}")
            }
            AlertSeverity::Warning => {
                tracing::warn!(severity = %severity, context = ?context, "{message}")
            }
            AlertSeverity::Error | AlertSeverity::Critical => {
                tracing::error!(severity = %severity, context = ?context, "{message}")
            }
        }
        Ok(())
    }
}

// ============================================================================
// ALERT COMPOSITION
// ============================================================================

/// Severity of a drift alert: any removal escalates to Error because
/// existing mapping entries may now dangle; pure additions are a Warning.
pub fn drift_severity(change_set: &ChangeSet) -> AlertSeverity {
    if change_set.records.iter().any(|r| r.is_removal()) {
        AlertSeverity::Error
    } else {
        AlertSeverity::Warning
    }
}

/// Human-readable drift alert message.
pub fn drift_message(change_set: &ChangeSet) -> String {
    format!(
        "Schema change detected: {} change(s)\n{}",
        change_set.len(),
        change_set
    )
}

// =============================================================================
// TESTS
// =============================================================================
