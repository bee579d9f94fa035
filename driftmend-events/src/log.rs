//! Audit log trait and in-memory implementation.

use driftmend_core::{AttemptId, AuditError, HealingEvent};
use std::sync::{Arc, RwLock};

// ============================================================================
// AUDIT LOG TRAIT
// ============================================================================

/// Append-only storage for healing events.
///
/// Implementations must preserve append order and never mutate stored
/// events. Reads return copies; the log itself is the source of truth for
/// the healing history.
pub trait AuditLog: Send + Sync {
    /// Append an event. Events are never updated or deleted afterwards.
    fn append(&self, event: HealingEvent) -> Result<(), AuditError>;

    /// All events in append order.
    fn events(&self) -> Result<Vec<HealingEvent>, AuditError>;

    /// Events belonging to one healing attempt, in append order.
    fn events_for_attempt(&self, attempt_id: AttemptId) -> Result<Vec<HealingEvent>, AuditError> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.attempt_id == attempt_id)
            .collect())
    }

    /// Number of stored events.
    fn len(&self) -> Result<usize, AuditError> {
        Ok(self.events()?.len())
    }
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-memory audit log behind an `RwLock`.
///
/// Suitable for tests and for processes that ship the log elsewhere through
/// the event stream. Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    events: Arc<RwLock<Vec<HealingEvent>>>,
}

impl InMemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, event: HealingEvent) -> Result<(), AuditError> {
        let mut events = self.events.write().map_err(|_| AuditError::LockPoisoned)?;
        events.push(event);
        Ok(())
    }

    fn events(&self) -> Result<Vec<HealingEvent>, AuditError> {
        let events = self.events.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(events.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use driftmend_core::{new_entity_id, HealingStatus};

    #[test]
    fn test_append_preserves_order() {
        let log = InMemoryAuditLog::new();
        let first =
            HealingEvent::initial(new_entity_id(), 1, HealingStatus::DriftDetected, "drift");
        let second = first.follow(HealingStatus::ChangeSetComputed, "2 changes");

        log.append(first.clone()).unwrap();
        log.append(second.clone()).unwrap();

        let events = log.events().unwrap();
        assert_eq!(events, vec![first, second]);
    }

    #[test]
    fn test_events_for_attempt_filters() {
        let log = InMemoryAuditLog::new();
        let attempt_a = new_entity_id();
        let attempt_b = new_entity_id();

        log.append(HealingEvent::initial(
            attempt_a,
            1,
            HealingStatus::DriftDetected,
            "",
        ))
        .unwrap();
        log.append(HealingEvent::initial(
            attempt_b,
            2,
            HealingStatus::DriftDetected,
            "",
        ))
        .unwrap();
        log.append(HealingEvent::initial(attempt_a, 1, HealingStatus::Failed, ""))
            .unwrap();

        let events = log.events_for_attempt(attempt_a).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.attempt_id == attempt_a));
    }

    #[test]
    fn test_clone_shares_storage() {
        let log = InMemoryAuditLog::new();
        let view = log.clone();
        log.append(HealingEvent::initial(
            new_entity_id(),
            1,
            HealingStatus::DriftDetected,
            "",
        ))
        .unwrap();
        assert_eq!(view.len().unwrap(), 1);
    }
}
