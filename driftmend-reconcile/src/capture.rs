//! Snapshot capture from the data-store introspection collaborator.

use async_trait::async_trait;
use driftmend_core::{short_hash, CaptureError, StructuralSnapshot, TableDescriptor};
use std::sync::Arc;

// ============================================================================
// INTROSPECTION COLLABORATOR
// ============================================================================

/// Trait for data-store introspection collaborators.
/// Implementations must be thread-safe (Send + Sync).
///
/// `describe` is a pure read of external state: no side effects beyond the
/// introspection queries themselves. Partial metadata (a table with zero
/// columns) must be returned as-is, not dropped.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Describe every table currently visible in the data store.
    ///
    /// # Errors
    /// `CaptureError::SourceUnavailable` when the store cannot be reached.
    async fn describe(&self) -> Result<Vec<TableDescriptor>, CaptureError>;
}

// ============================================================================
// SNAPSHOT CAPTURER
// ============================================================================

/// Captures structural snapshots through an introspector.
///
/// The capturer owns hashing: raw descriptors from the collaborator are
/// normalized into an immutable [`StructuralSnapshot`] whose content hash
/// is independent of discovery order.
#[derive(Clone)]
pub struct SnapshotCapturer {
    introspector: Arc<dyn SchemaIntrospector>,
}

impl SnapshotCapturer {
    /// Create a capturer over the given introspector.
    pub fn new(introspector: Arc<dyn SchemaIntrospector>) -> Self {
        Self { introspector }
    }

    /// Capture a snapshot of the data store's current structure.
    ///
    /// # Errors
    /// - `CaptureError::SourceUnavailable` when the store is unreachable
    /// - `CaptureError::Introspection` when returned metadata violates the
    ///   name-uniqueness invariants
    pub async fn capture(&self) -> Result<StructuralSnapshot, CaptureError> {
        let tables = self.introspector.describe().await?;
        let snapshot = StructuralSnapshot::new(tables, chrono::Utc::now())?;
        tracing::debug!(
            tables = snapshot.table_count(),
            hash = %short_hash(&snapshot.content_hash),
            "snapshot captured"
        );
        Ok(snapshot)
    }
}

// =============================================================================
// TESTS
// =============================================================================
