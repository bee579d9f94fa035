//! DRIFTMEND Test Utilities
//!
//! Centralized test infrastructure for the DRIFTMEND workspace:
//! - Scriptable mock collaborators for every orchestrator boundary
//! - Snapshot and mapping fixtures for common scenarios

// Re-export core types for convenience
pub use driftmend_core::{
    compute_content_hash, new_entity_id, AttemptId, CaptureError, ChangeRecord, ChangeSet,
    ColumnDescriptor, ColumnRef, ConceptMapping, ContentHash, DroppedMapping, HealingEvent,
    HealingStatus, Mapping, MappingStoreError, MappingUpdate, ProposalError, PropertyMapping,
    ReconcilerConfig, ReloadError, RetryConfig, StructuralSnapshot, TableDescriptor,
};
pub use driftmend_events::{AuditHub, AuditLog, InMemoryAuditLog};

use async_trait::async_trait;
use driftmend_core::AlertError;
use driftmend_propose::MappingProposer;
use driftmend_reconcile::{
    AlertContext, AlertSeverity, AlertSink, MappingStore, ReloadSignal, SchemaIntrospector,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// MOCK INTROSPECTOR
// ============================================================================

/// Scriptable data-store introspector.
///
/// Each `describe` call pops the next scripted outcome; once the script is
/// exhausted, the last outcome repeats. That models a data store whose
/// structure stays put between scripted changes.
pub struct MockIntrospector {
    script: Mutex<VecDeque<Result<Vec<TableDescriptor>, CaptureError>>>,
    last: Mutex<Result<Vec<TableDescriptor>, CaptureError>>,
    calls: AtomicU32,
}

impl MockIntrospector {
    /// Introspector that always reports the given tables.
    pub fn with_schema(tables: Vec<TableDescriptor>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Ok(tables)),
            calls: AtomicU32::new(0),
        }
    }

    /// Queue the next schema to report.
    pub fn queue_schema(&self, tables: Vec<TableDescriptor>) {
        self.script.lock().unwrap().push_back(Ok(tables));
    }

    /// Queue a capture failure.
    pub fn queue_failure(&self, err: CaptureError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    /// Number of describe calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaIntrospector for MockIntrospector {
    async fn describe(&self) -> Result<Vec<TableDescriptor>, CaptureError> {
        let result = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(next) => {
                    *self.last.lock().unwrap() = next.clone();
                    next
                }
                None => self.last.lock().unwrap().clone(),
            }
        };
        // Incremented after the script pop so callers observing the count
        // can safely queue the next outcome.
        self.calls.fetch_add(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// MOCK PROPOSER
// ============================================================================

/// Scriptable mapping proposer.
///
/// Pops scripted outcomes per call; once the script is exhausted, the
/// fallback outcome repeats. Records the change sets it was asked about.
pub struct MockProposer {
    script: Mutex<VecDeque<Result<MappingUpdate, ProposalError>>>,
    last: Mutex<Result<MappingUpdate, ProposalError>>,
    requests: Mutex<Vec<ChangeSet>>,
}

impl MockProposer {
    /// Proposer that always returns the given update.
    pub fn returning(update: MappingUpdate) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Ok(update)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Proposer that always fails with the given error.
    pub fn failing(err: ProposalError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Err(err)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next outcome.
    pub fn queue(&self, outcome: Result<MappingUpdate, ProposalError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Change sets received so far, in call order.
    pub fn requests(&self) -> Vec<ChangeSet> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of propose calls so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl MappingProposer for MockProposer {
    async fn propose(
        &self,
        change_set: &ChangeSet,
        _current_mapping: &Mapping,
    ) -> Result<MappingUpdate, ProposalError> {
        self.requests.lock().unwrap().push(change_set.clone());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.last.lock().unwrap().clone()
    }

    fn proposer_id(&self) -> &str {
        "mock-proposer"
    }
}

// ============================================================================
// MOCK MAPPING STORE
// ============================================================================

/// In-memory mapping store with scriptable apply outcomes.
///
/// Successful applies merge the update into the held mapping: concepts and
/// properties are inserted or re-pointed, dropped acknowledgements remove
/// their entries.
pub struct MockMappingStore {
    mapping: Mutex<Mapping>,
    apply_script: Mutex<VecDeque<Result<(), MappingStoreError>>>,
    applied: Mutex<Vec<MappingUpdate>>,
}

impl MockMappingStore {
    /// Store starting from the given mapping.
    pub fn with_mapping(mapping: Mapping) -> Self {
        Self {
            mapping: Mutex::new(mapping),
            apply_script: Mutex::new(VecDeque::new()),
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Store starting empty.
    pub fn empty() -> Self {
        Self::with_mapping(Mapping::empty())
    }

    /// Queue an apply outcome ahead of the default success.
    pub fn queue_apply(&self, outcome: Result<(), MappingStoreError>) {
        self.apply_script.lock().unwrap().push_back(outcome);
    }

    /// Updates applied so far, in order.
    pub fn applied(&self) -> Vec<MappingUpdate> {
        self.applied.lock().unwrap().clone()
    }

    /// The currently committed mapping.
    pub fn current(&self) -> Mapping {
        self.mapping.lock().unwrap().clone()
    }
}

#[async_trait]
impl MappingStore for MockMappingStore {
    async fn read_current(&self) -> Result<Mapping, MappingStoreError> {
        Ok(self.mapping.lock().unwrap().clone())
    }

    async fn atomic_apply(&self, update: &MappingUpdate) -> Result<(), MappingStoreError> {
        if let Some(outcome) = self.apply_script.lock().unwrap().pop_front() {
            outcome?;
        }

        let mut mapping = self.mapping.lock().unwrap();
        for concept in &update.concepts {
            mapping
                .concepts
                .insert(concept.concept.clone(), concept.table.clone());
        }
        for property in &update.properties {
            mapping.properties.insert(
                property.property.clone(),
                ColumnRef::new(property.table.clone(), property.column.clone()),
            );
        }
        for dropped in &update.dropped {
            match &dropped.column {
                None => {
                    mapping.concepts.retain(|_, table| table != &dropped.table);
                    mapping
                        .properties
                        .retain(|_, col| col.table != dropped.table);
                }
                Some(column) => {
                    mapping
                        .properties
                        .retain(|_, col| !(col.table == dropped.table && &col.column == column));
                }
            }
        }

        self.applied.lock().unwrap().push(update.clone());
        Ok(())
    }
}

// ============================================================================
// MOCK RELOAD SIGNAL
// ============================================================================

/// Reload signal that counts notifications; outcomes are scriptable.
pub struct MockReloadSignal {
    script: Mutex<VecDeque<Result<(), ReloadError>>>,
    notifications: AtomicU32,
}

impl MockReloadSignal {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            notifications: AtomicU32::new(0),
        }
    }

    /// Queue a reload outcome ahead of the default success.
    pub fn queue(&self, outcome: Result<(), ReloadError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Number of reload notifications so far.
    pub fn notifications(&self) -> u32 {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl Default for MockReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReloadSignal for MockReloadSignal {
    async fn notify_reload(&self) -> Result<(), ReloadError> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

// ============================================================================
// MOCK ALERT SINK
// ============================================================================

/// Alert sink that records every emission.
#[derive(Default)]
pub struct MockAlertSink {
    alerts: Mutex<Vec<(AlertSeverity, String)>>,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts recorded so far as (severity, message) pairs.
    pub fn alerts(&self) -> Vec<(AlertSeverity, String)> {
        self.alerts.lock().unwrap().clone()
    }

    /// Whether any recorded alert message contains the fragment.
    pub fn saw_message(&self, fragment: &str) -> bool {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .any(|(_, message)| message.contains(fragment))
    }
}

#[async_trait]
impl AlertSink for MockAlertSink {
    async fn emit(
        &self,
        severity: AlertSeverity,
        message: &str,
        _context: &AlertContext,
    ) -> Result<(), AlertError> {
        self.alerts
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
        Ok(())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// `orders` with `id` and `total`.
pub fn orders_v1() -> Vec<TableDescriptor> {
    vec![TableDescriptor::new(
        "orders",
        vec![
            ColumnDescriptor::new("id", "INTEGER", false, 1),
            ColumnDescriptor::new("total", "NUMERIC", true, 2),
        ],
    )]
}

/// `orders` with `id`, `total`, and a newly added `status`.
pub fn orders_v2() -> Vec<TableDescriptor> {
    vec![TableDescriptor::new(
        "orders",
        vec![
            ColumnDescriptor::new("id", "INTEGER", false, 1),
            ColumnDescriptor::new("total", "NUMERIC", true, 2),
            ColumnDescriptor::new("status", "TEXT", true, 3),
        ],
    )]
}

/// `orders_v2` plus a second new column `priority`.
pub fn orders_v3() -> Vec<TableDescriptor> {
    vec![TableDescriptor::new(
        "orders",
        vec![
            ColumnDescriptor::new("id", "INTEGER", false, 1),
            ColumnDescriptor::new("total", "NUMERIC", true, 2),
            ColumnDescriptor::new("status", "TEXT", true, 3),
            ColumnDescriptor::new("priority", "INTEGER", true, 4),
        ],
    )]
}

/// Build a snapshot from descriptors, panicking on invalid fixtures.
pub fn snapshot_of(tables: Vec<TableDescriptor>) -> StructuralSnapshot {
    StructuralSnapshot::new(tables, chrono::Utc::now()).expect("fixture snapshot must be valid")
}

/// The committed mapping matching `orders_v1`.
pub fn orders_mapping() -> Mapping {
    let mut mapping = Mapping::empty();
    mapping
        .concepts
        .insert("Order".to_string(), "orders".to_string());
    mapping
        .properties
        .insert("hasId".to_string(), ColumnRef::new("orders", "id"));
    mapping
        .properties
        .insert("hasTotal".to_string(), ColumnRef::new("orders", "total"));
    mapping
}

/// Update covering the `status` column addition of `orders_v2`.
pub fn status_update() -> MappingUpdate {
    MappingUpdate {
        properties: vec![PropertyMapping {
            property: "hasStatus".to_string(),
            table: "orders".to_string(),
            column: "status".to_string(),
        }],
        ..Default::default()
    }
}

/// Update covering both new columns of `orders_v3`.
pub fn status_and_priority_update() -> MappingUpdate {
    MappingUpdate {
        properties: vec![
            PropertyMapping {
                property: "hasStatus".to_string(),
                table: "orders".to_string(),
                column: "status".to_string(),
            },
            PropertyMapping {
                property: "hasPriority".to_string(),
                table: "orders".to_string(),
                column: "priority".to_string(),
            },
        ],
        ..Default::default()
    }
}

/// A fresh audit hub over an in-memory log.
pub fn audit_hub() -> AuditHub {
    AuditHub::new(Arc::new(InMemoryAuditLog::new()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_introspector_repeats_last_schema() {
        let introspector = MockIntrospector::with_schema(orders_v1());
        introspector.queue_schema(orders_v2());

        let first = introspector.describe().await.unwrap();
        assert_eq!(first[0].columns.len(), 3);
        let second = introspector.describe().await.unwrap();
        assert_eq!(second[0].columns.len(), 3);
        assert_eq!(introspector.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_store_merges_applied_updates() {
        let store = MockMappingStore::with_mapping(orders_mapping());
        store.atomic_apply(&status_update()).await.unwrap();

        let mapping = store.current();
        assert_eq!(
            mapping.properties.get("hasStatus"),
            Some(&ColumnRef::new("orders", "status"))
        );
        assert_eq!(store.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_drop_removes_entries() {
        let store = MockMappingStore::with_mapping(orders_mapping());
        let update = MappingUpdate {
            dropped: vec![DroppedMapping {
                table: "orders".to_string(),
                column: Some("total".to_string()),
                reason: "column removed".to_string(),
            }],
            ..Default::default()
        };
        store.atomic_apply(&update).await.unwrap();
        assert!(store.current().properties.get("hasTotal").is_none());
        assert!(store.current().properties.get("hasId").is_some());
    }

    #[tokio::test]
    async fn test_mock_store_scripted_conflict() {
        let store = MockMappingStore::empty();
        store.queue_apply(Err(MappingStoreError::Conflict {
            reason: "concurrent writer".to_string(),
        }));

        let err = store.atomic_apply(&status_update()).await.unwrap_err();
        assert!(matches!(err, MappingStoreError::Conflict { .. }));
        assert!(store.applied().is_empty());

        store.atomic_apply(&status_update()).await.unwrap();
        assert_eq!(store.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_alert_sink_records() {
        let sink = MockAlertSink::new();
        sink.emit(
            AlertSeverity::Warning,
            "Schema change detected: 1 change(s)",
            &AlertContext::default(),
        )
        .await
        .unwrap();
        assert!(sink.saw_message("Schema change detected"));
        assert_eq!(sink.alerts().len(), 1);
    }
}
