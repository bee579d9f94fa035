//! Audit hub: durable append plus live broadcast.
//!
//! The hub is what the orchestrator writes through. Each `record()` call
//! appends to the underlying log first and only then broadcasts to live
//! subscribers; a lagging or absent subscriber never loses the durable
//! record.

use crate::log::AuditLog;
use driftmend_core::{AuditError, HealingEvent};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel. Slow subscribers past this
/// lag receive `RecvError::Lagged` and can re-read the log.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Couples an audit log with a broadcast stream of appended events.
#[derive(Clone)]
pub struct AuditHub {
    log: Arc<dyn AuditLog>,
    sender: broadcast::Sender<HealingEvent>,
}

impl AuditHub {
    /// Create a hub over the given log with the default channel capacity.
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self::with_capacity(log, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Create a hub with an explicit broadcast capacity.
    pub fn with_capacity(log: Arc<dyn AuditLog>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { log, sender }
    }

    /// Append the event, then broadcast it to subscribers.
    ///
    /// The append is the authoritative write; broadcast delivery is
    /// best-effort and a closed or empty channel is not an error.
    pub fn record(&self, event: HealingEvent) -> Result<(), AuditError> {
        self.log.append(event.clone())?;
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(
                status = %event.status,
                "no live audit subscribers for healing event"
            );
        }
        Ok(())
    }

    /// Subscribe to events recorded after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<HealingEvent> {
        self.sender.subscribe()
    }

    /// The underlying log, for history reads.
    pub fn log(&self) -> &Arc<dyn AuditLog> {
        &self.log
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::InMemoryAuditLog;
    use driftmend_core::{new_entity_id, HealingStatus};

    fn hub() -> AuditHub {
        AuditHub::new(Arc::new(InMemoryAuditLog::new()))
    }

    #[tokio::test]
    async fn test_record_appends_and_broadcasts() {
        let hub = hub();
        let mut stream = hub.subscribe();

        let event =
            HealingEvent::initial(new_entity_id(), 1, HealingStatus::DriftDetected, "drift");
        hub.record(event.clone()).unwrap();

        assert_eq!(hub.log().len().unwrap(), 1);
        let received = stream.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_record_without_subscribers_still_appends() {
        let hub = hub();
        hub.record(HealingEvent::initial(
            new_entity_id(),
            1,
            HealingStatus::Failed,
            "proposer unreachable",
        ))
        .unwrap();
        assert_eq!(hub.log().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_events_in_order() {
        let hub = hub();
        let mut stream = hub.subscribe();

        let first =
            HealingEvent::initial(new_entity_id(), 1, HealingStatus::DriftDetected, "");
        let second = first.follow(HealingStatus::ChangeSetComputed, "");
        hub.record(first.clone()).unwrap();
        hub.record(second.clone()).unwrap();

        assert_eq!(stream.recv().await.unwrap(), first);
        assert_eq!(stream.recv().await.unwrap(), second);
    }
}
