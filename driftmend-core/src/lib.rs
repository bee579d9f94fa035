//! DRIFTMEND Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no monitoring, diffing, or
//! orchestration logic.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod change;
pub mod config;
pub mod error;
pub mod healing;
pub mod mapping;
pub mod snapshot;

pub use change::{ChangeRecord, ChangeSet};
pub use config::{ReconcilerConfig, RetryConfig};
pub use error::{
    AlertError, AuditError, CaptureError, ConfigError, ControlError, DriftmendError,
    DriftmendResult, MappingStoreError, MappingViolation, ProposalError, ReloadError,
    SnapshotError, ValidationFailure,
};
pub use healing::{AttemptId, HealingEvent, HealingStatus};
pub use mapping::{ColumnRef, ConceptMapping, DroppedMapping, Mapping, MappingUpdate, PropertyMapping};
pub use snapshot::{ColumnDescriptor, StructuralSnapshot, TableDescriptor};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Identifier for a single audit event.
pub type EventId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// SHA-256 content hash for structural change detection.
pub type ContentHash = [u8; 32];

/// Monotonically increasing counter marking acceptance of a snapshot as current.
pub type Generation = u64;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Short hex form of a content hash for log output.
pub fn short_hash(hash: &ContentHash) -> String {
    hex::encode(&hash[..8])
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = compute_content_hash(b"orders");
        let b = compute_content_hash(b"orders");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_differs_on_content() {
        let a = compute_content_hash(b"orders");
        let b = compute_content_hash(b"customers");
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_hash_is_sixteen_hex_chars() {
        let hash = compute_content_hash(b"orders");
        let short = short_hash(&hash);
        assert_eq!(short.len(), 16);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_entity_ids_are_sortable_by_creation() {
        let first = new_entity_id();
        let second = new_entity_id();
        assert!(first <= second);
    }
}
