//! Bounded retry wrapper for proposal calls.
//!
//! The proposal collaborator is an external, potentially costly service:
//! calls carry an explicit timeout, transient failures are retried with
//! exponential backoff up to a configured bound, and the whole wait is
//! cancellable through the shutdown watch. Malformed output is terminal
//! immediately; retrying a proposer that misunderstands the request only
//! spends money.

use crate::MappingProposer;
use driftmend_core::{ChangeSet, Mapping, MappingUpdate, ProposalError, RetryConfig};
use std::time::Duration;
use tokio::sync::watch;

/// Call the proposer with a per-call timeout and bounded retries.
///
/// Returns `ProposalError::Cancelled` when the shutdown watch flips during
/// a call or a backoff wait; the caller must not apply anything after that.
pub async fn propose_with_retry(
    proposer: &dyn MappingProposer,
    change_set: &ChangeSet,
    current_mapping: &Mapping,
    timeout: Duration,
    retry: &RetryConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<MappingUpdate, ProposalError> {
    let mut retries = 0u32;

    loop {
        let outcome = cancellable_call(
            proposer,
            change_set,
            current_mapping,
            timeout,
            shutdown,
        )
        .await;

        let err = match outcome {
            Ok(update) => return Ok(update),
            Err(err) => err,
        };

        if !err.is_transient() || retries >= retry.max_retries {
            return Err(err);
        }

        retries += 1;
        let backoff = retry.backoff_for(retries);
        tracing::warn!(
            proposer = proposer.proposer_id(),
            retry = retries,
            max_retries = retry.max_retries,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "proposal call failed, retrying"
        );
        if !cancellable_sleep(backoff, shutdown).await {
            return Err(ProposalError::Cancelled);
        }
    }
}

/// One timed proposal call, cancellable via the shutdown watch.
async fn cancellable_call(
    proposer: &dyn MappingProposer,
    change_set: &ChangeSet,
    current_mapping: &Mapping,
    timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<MappingUpdate, ProposalError> {
    let call = tokio::time::timeout(timeout, proposer.propose(change_set, current_mapping));
    tokio::pin!(call);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Err(ProposalError::Cancelled);
                }
            }
            result = &mut call => {
                return match result {
                    Ok(inner) => inner,
                    Err(_) => Err(ProposalError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
            }
        }
    }
}

/// Sleep unless shutdown fires first. Returns false on shutdown.
async fn cancellable_sleep(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
            _ = &mut sleep => return true,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
