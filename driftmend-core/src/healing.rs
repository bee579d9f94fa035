//! Healing attempt events.
//!
//! Every orchestrator state transition appends one `HealingEvent` to the
//! audit log before the state changes, so the log always reflects at least
//! the attempted transition even if the following step crashes. Events are
//! never mutated: each transition is a new event referencing the prior one,
//! forming a linear history per healing attempt.

use crate::{new_entity_id, ContentHash, EntityId, EventId, Generation, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for one healing attempt (one drift-to-resolution cycle).
pub type AttemptId = EntityId;

// ============================================================================
// HEALING STATUS
// ============================================================================

/// Where a healing attempt stood when an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingStatus {
    /// A snapshot hash mismatch was confirmed and the snapshot adopted
    DriftDetected,
    /// The diff engine produced the triggering change set
    ChangeSetComputed,
    /// The proposal collaborator returned a candidate mapping update
    Proposed,
    /// The candidate passed validation
    Validated,
    /// A pending update was accepted by an external approver
    Approved,
    /// A pending update was rejected by an external approver
    Rejected,
    /// The update was written to the mapping store
    Applied,
    /// Dependent consumers were signalled to reload
    Reloaded,
    /// The mapping applied but the reload signal failed (degraded, not rolled back)
    ReloadFailed,
    /// The attempt ended in a terminal failure
    Failed,
    /// The attempt was discarded because a newer drift superseded it
    Stale,
}

impl HealingStatus {
    /// Whether this status ends the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Reloaded | Self::ReloadFailed | Self::Rejected | Self::Failed | Self::Stale
        )
    }
}

impl fmt::Display for HealingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DriftDetected => "drift_detected",
            Self::ChangeSetComputed => "change_set_computed",
            Self::Proposed => "proposed",
            Self::Validated => "validated",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Reloaded => "reloaded",
            Self::ReloadFailed => "reload_failed",
            Self::Failed => "failed",
            Self::Stale => "stale",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// HEALING EVENT
// ============================================================================

/// One append-only audit record of a healing attempt transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingEvent {
    /// Unique event id (UUIDv7, creation-ordered)
    pub event_id: EventId,
    /// The healing attempt this event belongs to
    pub attempt_id: AttemptId,
    /// Generation of the snapshot the attempt was computed against
    pub generation: Generation,
    /// Digest of the triggering change set, once one exists
    pub change_set: Option<ContentHash>,
    /// The previous event in this attempt's history
    pub prior: Option<EventId>,
    /// Attempt status at the moment of recording
    pub status: HealingStatus,
    /// When the event was recorded
    pub occurred_at: Timestamp,
    /// Human-readable context (error text, drift summary, approval notes)
    pub detail: String,
}

impl HealingEvent {
    /// Record the first event of a new attempt.
    pub fn initial(
        attempt_id: AttemptId,
        generation: Generation,
        status: HealingStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            event_id: new_entity_id(),
            attempt_id,
            generation,
            change_set: None,
            prior: None,
            status,
            occurred_at: chrono::Utc::now(),
            detail: detail.into(),
        }
    }

    /// Record the next event in this attempt's history.
    pub fn follow(&self, status: HealingStatus, detail: impl Into<String>) -> Self {
        Self {
            event_id: new_entity_id(),
            attempt_id: self.attempt_id,
            generation: self.generation,
            change_set: self.change_set,
            prior: Some(self.event_id),
            status,
            occurred_at: chrono::Utc::now(),
            detail: detail.into(),
        }
    }

    /// Attach the triggering change set digest.
    pub fn with_change_set(mut self, digest: ContentHash) -> Self {
        self.change_set = Some(digest);
        self
    }

    /// Override the recorded generation (staleness re-checks advance it).
    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_links_prior_event() {
        let first = HealingEvent::initial(new_entity_id(), 3, HealingStatus::DriftDetected, "drift");
        let second = first.follow(HealingStatus::ChangeSetComputed, "1 change");
        assert_eq!(second.prior, Some(first.event_id));
        assert_eq!(second.attempt_id, first.attempt_id);
        assert_eq!(second.generation, 3);
        assert_ne!(second.event_id, first.event_id);
    }

    #[test]
    fn test_change_set_digest_carries_forward() {
        let digest = crate::compute_content_hash(b"column_added: orders.status (TEXT)");
        let first = HealingEvent::initial(new_entity_id(), 1, HealingStatus::DriftDetected, "")
            .with_change_set(digest);
        let second = first.follow(HealingStatus::Proposed, "");
        assert_eq!(second.change_set, Some(digest));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(HealingStatus::Failed.is_terminal());
        assert!(HealingStatus::Stale.is_terminal());
        assert!(HealingStatus::Reloaded.is_terminal());
        assert!(HealingStatus::Rejected.is_terminal());
        assert!(!HealingStatus::Proposed.is_terminal());
        assert!(!HealingStatus::Applied.is_terminal());
    }

    #[test]
    fn test_status_display_is_snake_case() {
        assert_eq!(HealingStatus::DriftDetected.to_string(), "drift_detected");
        assert_eq!(HealingStatus::ReloadFailed.to_string(), "reload_failed");
    }
}
