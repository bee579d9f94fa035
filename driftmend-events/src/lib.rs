//! DRIFTMEND Events - Healing Audit Trail
//!
//! Append-only record of every detection, proposal, validation outcome, and
//! applied change. The orchestrator appends an event before each state
//! transition, so the log always reflects at least the attempted transition
//! even if the following step crashes.
//!
//! The `AuditLog` trait is the persistence boundary; `InMemoryAuditLog` is
//! the bundled implementation. `AuditHub` couples a log with a broadcast
//! channel so external consumers can follow healing activity as a read-only
//! stream.

pub mod hub;
pub mod log;

pub use hub::{AuditHub, DEFAULT_EVENT_CHANNEL_CAPACITY};
pub use log::{AuditLog, InMemoryAuditLog};
