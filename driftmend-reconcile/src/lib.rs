//! DRIFTMEND Reconcile - Self-Healing Orchestration
//!
//! Ties the engine together: the snapshot capturer polls a data store's
//! structure, the orchestrator detects drift by content hash, diffs against
//! the last known good snapshot, asks the proposal collaborator for a
//! mapping update, validates it, optionally waits for approval, applies it
//! atomically, and signals dependent consumers to reload. Every transition
//! is audited; terminal failures are alerted; the control loop never dies.
//!
//! One logical orchestrator instance runs per monitored data store. This is
//! a single-writer design: running several unsynchronized instances against
//! the same mapping store is not safe and requires external leader
//! election.

pub mod alert;
pub mod capture;
pub mod metrics;
pub mod orchestrator;
pub mod store;
pub mod validate;

pub use alert::{drift_message, drift_severity, AlertContext, AlertSeverity, AlertSink, TracingAlertSink};
pub use capture::{SchemaIntrospector, SnapshotCapturer};
pub use metrics::{MetricsSnapshot, ReconcilerMetrics};
pub use orchestrator::{
    OrchestratorState, PendingApproval, Reconciler, ReconcilerDeps, ReconcilerHandle,
};
pub use store::{MappingStore, ReloadSignal};
pub use validate::validate;
