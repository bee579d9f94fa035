//! Mapping store and reload-signal collaborator boundaries.

use async_trait::async_trait;
use driftmend_core::{Mapping, MappingStoreError, MappingUpdate, ReloadError};

/// Trait for the mapping store collaborator.
/// Implementations must be thread-safe (Send + Sync).
///
/// `atomic_apply` must be atomic with respect to readers: either the store
/// swaps a whole new mapping in one step or it stages then commits. A
/// half-applied mapping must never be observable. A concurrent writer is
/// reported as `MappingStoreError::Conflict`, never silently merged.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Read the currently committed mapping.
    async fn read_current(&self) -> Result<Mapping, MappingStoreError>;

    /// Apply a validated update atomically.
    async fn atomic_apply(&self, update: &MappingUpdate) -> Result<(), MappingStoreError>;
}

/// Trait for the reload-signal collaborator.
///
/// Idempotent; fire-and-forget delivery is acceptable. A failed signal
/// leaves the mapping correct but dependent consumers stale, so callers
/// treat failure as degraded rather than fatal.
#[async_trait]
pub trait ReloadSignal: Send + Sync {
    /// Ask dependent consumers to reload the mapping.
    async fn notify_reload(&self) -> Result<(), ReloadError>;
}
