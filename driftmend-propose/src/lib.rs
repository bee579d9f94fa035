//! DRIFTMEND Propose - Mapping Proposal Boundary
//!
//! The proposal collaborator is the external service (typically LLM-backed)
//! that turns a structural change set plus the current mapping into a
//! candidate mapping update. This crate defines the trait that collaborator
//! must implement, an explicit registry, deterministic prompt rendering for
//! text-based proposers, tolerant response parsing, and the bounded
//! retry/timeout wrapper the orchestrator calls through.
//!
//! Proposer output is never trusted directly: everything returned here goes
//! through mapping validation before it can be applied.

use async_trait::async_trait;
use driftmend_core::{ChangeSet, Mapping, MappingUpdate, ProposalError};
use std::sync::Arc;

pub mod prompt;
pub mod retry;

pub use prompt::{parse_mapping_update, ProposalPrompt};
pub use retry::propose_with_retry;

// ============================================================================
// PROPOSER TRAIT
// ============================================================================

/// Trait for mapping-proposal collaborators.
/// Implementations must be thread-safe (Send + Sync).
///
/// The collaborator may be slow, may fail, and may return unusable output;
/// callers bound every call with a timeout and validate the result. Retries
/// are allowed; any side effects of a retried call are the collaborator's
/// own responsibility.
#[async_trait]
pub trait MappingProposer: Send + Sync {
    /// Propose a mapping update addressing `change_set`, given the
    /// currently committed mapping.
    async fn propose(
        &self,
        change_set: &ChangeSet,
        current_mapping: &Mapping,
    ) -> Result<MappingUpdate, ProposalError>;

    /// Identifier for logs and audit detail (e.g. a model name).
    fn proposer_id(&self) -> &str;
}

// ============================================================================
// PROPOSER REGISTRY
// ============================================================================

/// Registry for the mapping proposer.
/// Proposers must be explicitly registered - no auto-discovery.
#[derive(Default)]
pub struct ProposerRegistry {
    proposer: Option<Arc<dyn MappingProposer>>,
}

impl ProposerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proposer, replacing any previous registration.
    pub fn register(&mut self, proposer: Box<dyn MappingProposer>) {
        self.proposer = Some(Arc::from(proposer));
    }

    /// The registered proposer.
    ///
    /// # Errors
    /// `ProposalError::NotConfigured` when nothing is registered.
    pub fn proposer(&self) -> Result<Arc<dyn MappingProposer>, ProposalError> {
        self.proposer.clone().ok_or(ProposalError::NotConfigured)
    }

    /// Whether a proposer is registered.
    pub fn is_configured(&self) -> bool {
        self.proposer.is_some()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProposer;

    #[async_trait]
    impl MappingProposer for EchoProposer {
        async fn propose(
            &self,
            _change_set: &ChangeSet,
            _current_mapping: &Mapping,
        ) -> Result<MappingUpdate, ProposalError> {
            Ok(MappingUpdate::default())
        }

        fn proposer_id(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_registry_starts_unconfigured() {
        let registry = ProposerRegistry::new();
        assert!(!registry.is_configured());
        assert!(matches!(
            registry.proposer().map(|_| ()),
            Err(ProposalError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_registry_returns_registered_proposer() {
        let mut registry = ProposerRegistry::new();
        registry.register(Box::new(EchoProposer));
        assert!(registry.is_configured());

        let proposer = registry.proposer().unwrap();
        let update = proposer
            .propose(&ChangeSet::empty(), &Mapping::empty())
            .await
            .unwrap();
        assert!(update.is_empty());
        assert_eq!(proposer.proposer_id(), "echo");
    }
}
