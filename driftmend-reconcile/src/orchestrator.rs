//! Reconciliation orchestrator.
//!
//! A single cooperative control loop owns the last known good snapshot, the
//! generation counter, and every state transition. Timer ticks and external
//! "check now" triggers serialize through one command queue, so at most one
//! detection/healing attempt is in flight at a time; triggers arriving
//! mid-attempt coalesce.
//!
//! # State Transition Diagram
//!
//! ```text
//! Idle ── tick/trigger ──▶ Detecting ── hash mismatch ──▶ Diffing
//!   ▲                          │                             │
//!   │                     hash equal                         ▼
//!   │◀─────────────────────────┘                     ProposingMapping
//!   │                                                        │
//!   │◀── Failed ◀── retries exhausted / malformed ───────────┤
//!   │                                                        ▼
//!   │◀── Failed ◀── validation errors ─────────────── Validating ── stale ──▶ Detecting
//!   │                                                        │
//!   │                             auto-apply off             ▼
//!   │◀── Failed ◀── rejected ◀─────────────────────── AwaitingApproval
//!   │                                                        │ approved
//!   │                                                        ▼
//!   │◀── Failed ◀── apply conflict ──────────────────── Applying
//!   │                                                        │
//!   │                                                        ▼
//!   └──────────────────────────────────────────────────  Reloading
//! ```
//!
//! Every transition appends one `HealingEvent` to the audit log before the
//! state changes. The tick-level entry into Detecting and the no-op return
//! to Idle are debug-logged only; audit events begin once drift is
//! confirmed.

use crate::alert::{drift_message, drift_severity, AlertContext, AlertSeverity, AlertSink};
use crate::capture::{SchemaIntrospector, SnapshotCapturer};
use crate::metrics::{MetricsSnapshot, ReconcilerMetrics};
use crate::store::{MappingStore, ReloadSignal};
use crate::validate::validate;
use driftmend_core::{
    new_entity_id, short_hash, AttemptId, CaptureError, ControlError, Generation, HealingEvent,
    HealingStatus, Mapping, MappingStoreError, MappingUpdate, ProposalError, ReconcilerConfig,
    ReloadError, StructuralSnapshot,
};
use driftmend_diff::{DiffEngine, DiffOptions};
use driftmend_events::AuditHub;
use driftmend_propose::{propose_with_retry, MappingProposer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Capacity of the command queue. Commands are tiny and coalesce; a small
/// queue is enough.
const COMMAND_QUEUE_CAPACITY: usize = 16;

// ============================================================================
// STATE
// ============================================================================

/// Orchestrator state, observable through [`ReconcilerHandle::current_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestratorState {
    Idle,
    Detecting,
    Diffing,
    ProposingMapping,
    Validating,
    AwaitingApproval,
    Applying,
    Reloading,
    /// Terminal for the attempt only; the loop returns to Idle and keeps
    /// monitoring.
    Failed,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Detecting => "detecting",
            Self::Diffing => "diffing",
            Self::ProposingMapping => "proposing_mapping",
            Self::Validating => "validating",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Applying => "applying",
            Self::Reloading => "reloading",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// COMMANDS AND APPROVAL
// ============================================================================

/// Commands accepted by the control loop.
#[derive(Debug, Clone)]
enum Command {
    CheckNow,
    Approve { attempt_id: AttemptId },
    Reject { attempt_id: AttemptId, reason: String },
}

/// A validated mapping update waiting for external approval.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub attempt_id: AttemptId,
    pub update: MappingUpdate,
}

enum ApprovalOutcome {
    Approved,
    Rejected { reason: String },
    Abandoned,
}

// ============================================================================
// DEPENDENCIES
// ============================================================================

/// External collaborators the orchestrator drives.
#[derive(Clone)]
pub struct ReconcilerDeps {
    pub introspector: Arc<dyn SchemaIntrospector>,
    pub proposer: Arc<dyn MappingProposer>,
    pub mapping_store: Arc<dyn MappingStore>,
    pub reload: Arc<dyn ReloadSignal>,
    pub alerts: Arc<dyn AlertSink>,
    pub audit: AuditHub,
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable handle to a running reconciler.
#[derive(Clone)]
pub struct ReconcilerHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<OrchestratorState>,
    pending_rx: watch::Receiver<Option<PendingApproval>>,
    audit: AuditHub,
    metrics: Arc<ReconcilerMetrics>,
}

impl ReconcilerHandle {
    /// Current orchestrator state.
    pub fn current_state(&self) -> OrchestratorState {
        *self.state_rx.borrow()
    }

    /// A watch stream of state changes.
    pub fn state_stream(&self) -> watch::Receiver<OrchestratorState> {
        self.state_rx.clone()
    }

    /// Request an immediate drift check. Coalesced if a check is already
    /// queued or in flight.
    pub async fn trigger_check_now(&self) -> Result<(), ControlError> {
        self.cmd_tx
            .send(Command::CheckNow)
            .await
            .map_err(|_| ControlError::Disconnected)
    }

    /// The mapping update currently awaiting approval, if any.
    pub fn pending_approval(&self) -> Option<MappingUpdate> {
        self.pending_rx.borrow().clone().map(|p| p.update)
    }

    /// A watch stream of the pending approval slot.
    pub fn pending_stream(&self) -> watch::Receiver<Option<PendingApproval>> {
        self.pending_rx.clone()
    }

    /// Approve the pending mapping update.
    pub async fn approve(&self) -> Result<(), ControlError> {
        let pending = self
            .pending_rx
            .borrow()
            .clone()
            .ok_or(ControlError::NothingPending)?;
        self.cmd_tx
            .send(Command::Approve {
                attempt_id: pending.attempt_id,
            })
            .await
            .map_err(|_| ControlError::Disconnected)
    }

    /// Reject the pending mapping update.
    pub async fn reject(&self, reason: impl Into<String>) -> Result<(), ControlError> {
        let pending = self
            .pending_rx
            .borrow()
            .clone()
            .ok_or(ControlError::NothingPending)?;
        self.cmd_tx
            .send(Command::Reject {
                attempt_id: pending.attempt_id,
                reason: reason.into(),
            })
            .await
            .map_err(|_| ControlError::Disconnected)
    }

    /// Subscribe to the read-only healing event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<HealingEvent> {
        self.audit.subscribe()
    }

    /// The audit hub backing this reconciler, for history reads.
    pub fn audit(&self) -> &AuditHub {
        &self.audit
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// The reconciliation orchestrator. Owns all mutable healing state; consumed
/// by [`Reconciler::run`].
pub struct Reconciler {
    deps: ReconcilerDeps,
    config: ReconcilerConfig,
    capturer: SnapshotCapturer,
    diff_engine: DiffEngine,
    last_known: Option<StructuralSnapshot>,
    generation: Generation,
    state_tx: watch::Sender<OrchestratorState>,
    pending_tx: watch::Sender<Option<PendingApproval>>,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: mpsc::Receiver<Command>,
    metrics: Arc<ReconcilerMetrics>,
}

impl Reconciler {
    /// Build a reconciler and its handle.
    pub fn new(deps: ReconcilerDeps, config: ReconcilerConfig) -> (Self, ReconcilerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(OrchestratorState::Idle);
        let (pending_tx, pending_rx) = watch::channel(None);
        let metrics = Arc::new(ReconcilerMetrics::new());

        let capturer = SnapshotCapturer::new(Arc::clone(&deps.introspector));
        let diff_engine = DiffEngine::new(DiffOptions {
            detect_renames: config.detect_renames,
            rename_threshold: config.rename_threshold,
        });

        let handle = ReconcilerHandle {
            cmd_tx: cmd_tx.clone(),
            state_rx,
            pending_rx,
            audit: deps.audit.clone(),
            metrics: Arc::clone(&metrics),
        };

        let reconciler = Self {
            deps,
            config,
            capturer,
            diff_engine,
            last_known: None,
            generation: 0,
            state_tx,
            pending_tx,
            cmd_tx,
            cmd_rx,
            metrics,
        };

        (reconciler, handle)
    }

    /// Run the control loop until the shutdown watch flips.
    ///
    /// The first timer tick fires immediately and establishes the baseline
    /// snapshot. Returns the accumulated metrics.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Arc<ReconcilerMetrics> {
        let mut tick = interval(self.config.check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            check_interval_secs = self.config.check_interval.as_secs(),
            auto_apply = self.config.auto_apply,
            detect_renames = self.config.detect_renames,
            "reconciler started"
        );

        loop {
            // A cycle may have observed the shutdown flag itself (cancelled
            // proposal, abandoned approval); re-check before waiting.
            if *shutdown.borrow() {
                tracing::info!("reconciler shutting down");
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("reconciler shutting down");
                        break;
                    }
                }

                _ = tick.tick() => {
                    self.run_cycle(&mut shutdown).await;
                }

                Some(cmd) = self.cmd_rx.recv() => match cmd {
                    Command::CheckNow => {
                        self.drain_queued_checks();
                        self.run_cycle(&mut shutdown).await;
                    }
                    Command::Approve { .. } | Command::Reject { .. } => {
                        // No attempt is awaiting approval at this point; the
                        // command raced a completed or discarded attempt.
                        tracing::warn!("approval command arrived with nothing pending, ignored");
                    }
                },
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            cycles = snapshot.cycles,
            drifts_detected = snapshot.drifts_detected,
            healings_applied = snapshot.healings_applied,
            attempts_failed = snapshot.attempts_failed,
            stale_discards = snapshot.stale_discards,
            "reconciler stopped"
        );

        self.metrics
    }

    /// Coalesce queued CheckNow commands into the cycle about to run.
    fn drain_queued_checks(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Command::CheckNow => continue,
                Command::Approve { .. } | Command::Reject { .. } => {
                    tracing::warn!("approval command arrived with nothing pending, ignored");
                }
            }
        }
    }

    fn set_state(&self, state: OrchestratorState) {
        self.state_tx.send_replace(state);
        tracing::debug!(state = %state, "orchestrator state changed");
    }

    /// Append to the audit log. Log-then-transition: callers record before
    /// calling `set_state`. An append failure is logged but never stops the
    /// loop.
    fn record(&self, event: &HealingEvent) {
        if let Err(err) = self.deps.audit.record(event.clone()) {
            tracing::error!(error = %err, status = %event.status, "audit append failed");
        }
    }

    /// Best-effort alert emission, bounded by the configured timeout.
    async fn alert(&self, severity: AlertSeverity, message: &str, context: AlertContext) {
        let emit = self.deps.alerts.emit(severity, message, &context);
        match tokio::time::timeout(self.config.alert_timeout, emit).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "alert emission failed"),
            Err(_) => tracing::warn!(
                timeout_ms = self.config.alert_timeout.as_millis() as u64,
                "alert emission timed out"
            ),
        }
    }

    // ========================================================================
    // DETECTION / HEALING CYCLE
    // ========================================================================

    /// One detection cycle: capture, compare, and heal when drift is found.
    /// Single-flight: runs to completion (or abandonment) before the loop
    /// looks at the queue again.
    async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) {
        ReconcilerMetrics::bump(&self.metrics.cycles);
        self.set_state(OrchestratorState::Detecting);

        let snapshot = match self.capture_with_retry(shutdown).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if !*shutdown.borrow() {
                    ReconcilerMetrics::bump(&self.metrics.captures_failed);
                    tracing::error!(error = %err, "snapshot capture failed, will retry next tick");
                    self.alert(
                        AlertSeverity::Error,
                        &format!("Snapshot capture failed: {err}"),
                        AlertContext::default().with_detail(err.to_string()),
                    )
                    .await;
                }
                self.set_state(OrchestratorState::Idle);
                return;
            }
        };

        let Some(last_known) = self.last_known.clone() else {
            // First successful capture is the baseline; nothing to heal.
            self.generation = 1;
            tracing::info!(
                hash = %short_hash(&snapshot.content_hash),
                tables = snapshot.table_count(),
                generation = self.generation,
                "baseline snapshot accepted"
            );
            self.last_known = Some(snapshot);
            self.set_state(OrchestratorState::Idle);
            return;
        };

        if snapshot.same_structure(&last_known) {
            tracing::debug!(hash = %short_hash(&snapshot.content_hash), "no drift detected");
            self.set_state(OrchestratorState::Idle);
            return;
        }

        self.heal(last_known, snapshot, shutdown).await;
    }

    /// Drive one healing attempt from a confirmed hash mismatch.
    async fn heal(
        &mut self,
        last_known: StructuralSnapshot,
        snapshot: StructuralSnapshot,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        self.generation += 1;
        let attempt_id = new_entity_id();
        ReconcilerMetrics::bump(&self.metrics.drifts_detected);
        tracing::info!(
            attempt_id = %attempt_id,
            generation = self.generation,
            old_hash = %short_hash(&last_known.content_hash),
            new_hash = %short_hash(&snapshot.content_hash),
            "schema drift detected"
        );

        // Detecting -> Diffing
        let event = HealingEvent::initial(
            attempt_id,
            self.generation,
            HealingStatus::DriftDetected,
            format!(
                "content hash moved {} -> {}",
                short_hash(&last_known.content_hash),
                short_hash(&snapshot.content_hash)
            ),
        );
        self.record(&event);
        self.set_state(OrchestratorState::Diffing);

        let change_set = self.diff_engine.diff(&last_known, &snapshot);

        // Diffing -> ProposingMapping
        let event = event
            .follow(
                HealingStatus::ChangeSetComputed,
                format!("{} change(s) detected", change_set.len()),
            )
            .with_change_set(change_set.digest());
        self.record(&event);
        self.set_state(OrchestratorState::ProposingMapping);

        self.alert(
            drift_severity(&change_set),
            &drift_message(&change_set),
            AlertContext::for_attempt(attempt_id, self.generation)
                .with_change_count(change_set.len()),
        )
        .await;

        let current_mapping = match self.read_mapping_with_retry().await {
            Ok(mapping) => mapping,
            Err(err) => {
                self.fail_attempt(&event, format!("mapping store read failed: {err}"))
                    .await;
                return;
            }
        };

        let update = match propose_with_retry(
            self.deps.proposer.as_ref(),
            &change_set,
            &current_mapping,
            self.config.proposal_timeout,
            &self.config.proposal_retry,
            shutdown,
        )
        .await
        {
            Ok(update) => update,
            Err(ProposalError::Cancelled) => {
                tracing::info!(attempt_id = %attempt_id, "attempt abandoned by shutdown");
                self.set_state(OrchestratorState::Idle);
                return;
            }
            Err(err) => {
                self.fail_attempt(&event, format!("mapping proposal failed: {err}"))
                    .await;
                return;
            }
        };

        // The proposal may have taken a while. Re-capture: if the structure
        // moved again mid-flight, the proposal is only usable if it also
        // covers the newer drift.
        let mut active_snapshot = snapshot;
        let mut active_change_set = change_set;
        let mut generation_advanced = false;
        let mut event = event;

        match self.capturer.capture().await {
            Ok(latest) if !latest.same_structure(&active_snapshot) => {
                self.generation += 1;
                generation_advanced = true;
                tracing::info!(
                    attempt_id = %attempt_id,
                    generation = self.generation,
                    "newer drift detected while proposal was in flight"
                );
                active_change_set = self.diff_engine.diff(&last_known, &latest);
                active_snapshot = latest;
                event = event
                    .with_generation(self.generation)
                    .with_change_set(active_change_set.digest());
            }
            Ok(_) => {}
            Err(err) => {
                // Cannot tell whether the structure moved; proceed against
                // the attempt snapshot and let the next tick reconcile.
                tracing::warn!(error = %err, "staleness re-check capture failed");
            }
        }

        // ProposingMapping -> Validating
        let event = event.follow(
            HealingStatus::Proposed,
            format!("proposer returned {} mapping entries", update.len()),
        );
        self.record(&event);
        self.set_state(OrchestratorState::Validating);

        if let Err(failure) = validate(&update, &active_snapshot, &active_change_set) {
            if generation_advanced {
                // Stale proposal: it cannot cover the newer drift. Discard,
                // never apply, and re-enter detection immediately.
                ReconcilerMetrics::bump(&self.metrics.stale_discards);
                let event = event.follow(
                    HealingStatus::Stale,
                    format!(
                        "proposal superseded by newer drift: {}",
                        failure.summary()
                    ),
                );
                self.record(&event);
                tracing::info!(attempt_id = %attempt_id, "stale proposal discarded");
                self.set_state(OrchestratorState::Detecting);
                self.enqueue_check();
                self.set_state(OrchestratorState::Idle);
                return;
            }

            self.fail_attempt(&event, format!("validation failed: {}", failure.summary()))
                .await;
            return;
        }

        // Validating -> Applying | AwaitingApproval
        let event = if self.config.auto_apply {
            let event = event.follow(HealingStatus::Validated, "validated, auto-apply enabled");
            self.record(&event);
            self.set_state(OrchestratorState::Applying);
            event
        } else {
            let event = event.follow(HealingStatus::Validated, "validated, awaiting approval");
            self.record(&event);
            self.set_state(OrchestratorState::AwaitingApproval);
            self.pending_tx.send_replace(Some(PendingApproval {
                attempt_id,
                update: update.clone(),
            }));

            let outcome = self.wait_for_approval(attempt_id, shutdown).await;
            self.pending_tx.send_replace(None);
            match outcome {
                ApprovalOutcome::Approved => {
                    let event = event.follow(HealingStatus::Approved, "update approved");
                    self.record(&event);
                    self.set_state(OrchestratorState::Applying);
                    event
                }
                ApprovalOutcome::Rejected { reason } => {
                    ReconcilerMetrics::bump(&self.metrics.attempts_failed);
                    let event = event.follow(
                        HealingStatus::Rejected,
                        format!("update rejected: {reason}"),
                    );
                    self.record(&event);
                    self.set_state(OrchestratorState::Failed);
                    self.alert(
                        AlertSeverity::Warning,
                        "Mapping update rejected by approver",
                        AlertContext::for_attempt(attempt_id, self.generation)
                            .with_detail(reason),
                    )
                    .await;
                    self.set_state(OrchestratorState::Idle);
                    return;
                }
                ApprovalOutcome::Abandoned => {
                    tracing::info!(attempt_id = %attempt_id, "approval wait abandoned");
                    self.set_state(OrchestratorState::Idle);
                    return;
                }
            }
        };

        // Applying -> Reloading. Short non-cancellable critical section: a
        // shutdown request is honored only after the store write settles.
        if let Err(err) = self.apply_with_retry(&update).await {
            let conflict = matches!(err, MappingStoreError::Conflict { .. });
            self.fail_attempt(&event, format!("mapping apply failed: {err}"))
                .await;
            if conflict {
                // Another writer won; re-detect against whatever is live now.
                self.enqueue_check();
            }
            return;
        }

        ReconcilerMetrics::bump(&self.metrics.healings_applied);
        self.last_known = Some(active_snapshot);
        let event = event.follow(
            HealingStatus::Applied,
            format!("mapping update applied ({} entries)", update.len()),
        );
        self.record(&event);
        self.set_state(OrchestratorState::Reloading);

        // Reloading -> Idle
        let reload = tokio::time::timeout(
            self.config.reload_timeout,
            self.deps.reload.notify_reload(),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ReloadError {
                reason: format!(
                    "timed out after {}ms",
                    self.config.reload_timeout.as_millis() as u64
                ),
            })
        });

        match reload {
            Ok(()) => {
                let event = event.follow(HealingStatus::Reloaded, "consumers signalled to reload");
                self.record(&event);
                self.alert(
                    AlertSeverity::Info,
                    &format!(
                        "Mapping auto-healing successful: {} schema change(s) healed",
                        active_change_set.len()
                    ),
                    AlertContext::for_attempt(attempt_id, self.generation)
                        .with_change_count(active_change_set.len()),
                )
                .await;
            }
            Err(err) => {
                // The mapping is already durably applied; a failed reload
                // leaves consumers stale but correct-on-restart. Not rolled
                // back.
                ReconcilerMetrics::bump(&self.metrics.reload_failures);
                let event = event.follow(
                    HealingStatus::ReloadFailed,
                    format!("mapping applied but reload signal failed: {err}"),
                );
                self.record(&event);
                tracing::warn!(error = %err, "reload signal failed after apply, consumers stale");
                self.alert(
                    AlertSeverity::Warning,
                    "Mapping applied but consumer reload failed",
                    AlertContext::for_attempt(attempt_id, self.generation)
                        .with_detail(err.to_string()),
                )
                .await;
            }
        }

        self.set_state(OrchestratorState::Idle);
    }

    /// Record a terminal failure, alert, and return the loop to Idle.
    async fn fail_attempt(&mut self, prior: &HealingEvent, detail: String) {
        ReconcilerMetrics::bump(&self.metrics.attempts_failed);
        tracing::error!(attempt_id = %prior.attempt_id, detail = %detail, "healing attempt failed");

        let event = prior.follow(HealingStatus::Failed, detail.clone());
        self.record(&event);
        self.set_state(OrchestratorState::Failed);

        self.alert(
            AlertSeverity::Error,
            &format!("Mapping auto-healing failed: {detail}"),
            AlertContext::for_attempt(prior.attempt_id, prior.generation).with_detail(detail),
        )
        .await;

        self.set_state(OrchestratorState::Idle);
    }

    /// Queue an internal re-check. Dropped silently if the queue is full:
    /// a check is already pending in that case.
    fn enqueue_check(&self) {
        let _ = self.cmd_tx.try_send(Command::CheckNow);
    }

    // ========================================================================
    // COLLABORATOR CALLS WITH RETRY
    // ========================================================================

    /// Capture with bounded retries on transient failures. Gives up early
    /// when shutdown flips.
    async fn capture_with_retry(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<StructuralSnapshot, CaptureError> {
        let retry = &self.config.capture_retry;
        let mut retries = 0u32;

        loop {
            let err = match self.capturer.capture().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => err,
            };

            if !err.is_transient() || retries >= retry.max_retries || *shutdown.borrow() {
                return Err(err);
            }

            retries += 1;
            tracing::warn!(
                error = %err,
                retry = retries,
                max_retries = retry.max_retries,
                "snapshot capture failed, retrying"
            );
            tokio::time::sleep(retry.backoff_for(retries)).await;
        }
    }

    /// Read the committed mapping with bounded retries on transient IO.
    async fn read_mapping_with_retry(&self) -> Result<Mapping, MappingStoreError> {
        let retry = &self.config.capture_retry;
        let mut retries = 0u32;

        loop {
            let read = tokio::time::timeout(
                self.config.store_timeout,
                self.deps.mapping_store.read_current(),
            )
            .await
            .unwrap_or_else(|_| {
                Err(MappingStoreError::Io {
                    reason: format!(
                        "read timed out after {}ms",
                        self.config.store_timeout.as_millis() as u64
                    ),
                })
            });

            let err = match read {
                Ok(mapping) => return Ok(mapping),
                Err(err) => err,
            };

            if !err.is_transient() || retries >= retry.max_retries {
                return Err(err);
            }

            retries += 1;
            tracing::warn!(error = %err, retry = retries, "mapping read failed, retrying");
            tokio::time::sleep(retry.backoff_for(retries)).await;
        }
    }

    /// Apply the update with bounded retries on transient IO. Conflicts are
    /// returned immediately; they mean a concurrent writer, not a flaky
    /// store.
    async fn apply_with_retry(&self, update: &MappingUpdate) -> Result<(), MappingStoreError> {
        let retry = &self.config.capture_retry;
        let mut retries = 0u32;

        loop {
            let applied = tokio::time::timeout(
                self.config.store_timeout,
                self.deps.mapping_store.atomic_apply(update),
            )
            .await
            .unwrap_or_else(|_| {
                Err(MappingStoreError::Io {
                    reason: format!(
                        "apply timed out after {}ms",
                        self.config.store_timeout.as_millis() as u64
                    ),
                })
            });

            let err = match applied {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if !err.is_transient() || retries >= retry.max_retries {
                return Err(err);
            }

            retries += 1;
            tracing::warn!(error = %err, retry = retries, "mapping apply failed, retrying");
            tokio::time::sleep(retry.backoff_for(retries)).await;
        }
    }

    // ========================================================================
    // APPROVAL WAIT
    // ========================================================================

    /// Wait for an approval verdict on the given attempt. Check triggers
    /// arriving meanwhile coalesce into no-ops; shutdown abandons the
    /// attempt with nothing applied.
    async fn wait_for_approval(
        &mut self,
        attempt_id: AttemptId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ApprovalOutcome {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return ApprovalOutcome::Abandoned;
                    }
                }

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Approve { attempt_id: target }) if target == attempt_id => {
                        return ApprovalOutcome::Approved;
                    }
                    Some(Command::Reject { attempt_id: target, reason }) if target == attempt_id => {
                        return ApprovalOutcome::Rejected { reason };
                    }
                    Some(Command::Approve { .. }) | Some(Command::Reject { .. }) => {
                        tracing::warn!("approval command for a superseded attempt, ignored");
                    }
                    Some(Command::CheckNow) => {
                        tracing::debug!("check trigger coalesced while awaiting approval");
                    }
                    None => {
                        // Command channel closed; no verdict can arrive.
                        tracing::warn!("command channel closed while awaiting approval");
                        return ApprovalOutcome::Abandoned;
                    }
                },
            }
        }
    }
}
