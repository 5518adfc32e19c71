//! Plan board: pending proposal, active plan, and bounded history.
//!
//! Driven entirely by `planning.*` events from the router. All updates are
//! tolerant: an event naming a plan or step the board does not know is a
//! debug-level no-op, never an error — the server may reference work that
//! predates this connection.
//!
//! Step and plan statuses are monotonic: once terminal, later events for
//! the same step or plan are absorbed. A finished plan is unshifted into
//! history immediately, but the active view keeps it for a grace period so
//! the operator sees the final state; `plan_started` for a new plan cancels
//! the grace timer and replaces it at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_core::{
    Plan, PlanId, PlanStatus, PlanningEvent, PendingApproval, StepSpec, StepStatus,
};

/// Snapshot of all plan state.
#[derive(Clone, Debug, Default)]
pub struct PlanSnapshot {
    /// Proposal awaiting accept/reject, at most one (last proposal wins).
    pub pending: Option<PendingApproval>,
    /// The plan currently executing, or recently finished and within the
    /// grace window.
    pub active: Option<Plan>,
    /// Finished plans, most recent first, capped. A finished plan appears
    /// here immediately, while it is still visible as `active`.
    pub history: Vec<Plan>,
}

/// Owns plan state and the archive grace timer.
pub struct PlanBoard {
    tx: watch::Sender<PlanSnapshot>,
    history_limit: usize,
    grace_delay: Duration,
    /// Cancels the pending archive of a finished active plan.
    grace: Mutex<CancellationToken>,
}

impl PlanBoard {
    #[must_use]
    pub fn new(history_limit: usize, grace_delay: Duration) -> Arc<Self> {
        let (tx, _) = watch::channel(PlanSnapshot::default());
        Arc::new(Self {
            tx,
            history_limit,
            grace_delay,
            grace: Mutex::new(CancellationToken::new()),
        })
    }

    /// Subscribe to plan snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PlanSnapshot> {
        self.tx.subscribe()
    }

    /// ID of the proposal awaiting a decision, if any.
    #[must_use]
    pub fn pending_id(&self) -> Option<PlanId> {
        self.tx.borrow().pending.as_ref().map(|p| p.id.clone())
    }

    /// Optimistically clear the pending proposal after the operator
    /// decides. Returns `false` when `plan_id` is not the current
    /// proposal (it was superseded or already resolved).
    pub fn resolve_pending(&self, plan_id: &PlanId, approved: bool) -> bool {
        let mut resolved = false;
        self.tx.send_modify(|snapshot| {
            if snapshot.pending.as_ref().map(|p| &p.id) == Some(plan_id) {
                snapshot.pending = None;
                resolved = true;
            }
        });
        if resolved {
            info!(plan_id = %plan_id, approved, "plan decision recorded");
        } else {
            debug!(plan_id = %plan_id, "decision for a proposal no longer pending");
        }
        resolved
    }

    /// Apply one `planning.*` event.
    pub fn handle(self: &Arc<Self>, event: PlanningEvent) {
        match event {
            PlanningEvent::PlanCreated(outline) => {
                let replaced = self.tx.borrow().pending.is_some();
                if replaced {
                    warn!(plan_id = %outline.plan_id, "new proposal supersedes the pending one");
                }
                let pending = PendingApproval {
                    id: outline.plan_id,
                    description: outline.description,
                    steps: StepSpec::into_steps(outline.steps),
                    created_at: Utc::now(),
                };
                self.tx.send_modify(|snapshot| snapshot.pending = Some(pending));
            }
            PlanningEvent::PlanApproved | PlanningEvent::PlanRejected => {
                // The server resolved the proposal (possibly from another
                // console). Either way it is no longer pending here.
                self.tx.send_modify(|snapshot| snapshot.pending = None);
            }
            PlanningEvent::PlanStarted(outline) => self.plan_started(outline),
            PlanningEvent::StepStarted(event) => self.with_active(|plan| {
                let Some(step) = plan.step_mut(&event.step_id) else {
                    debug!(step_id = %event.step_id, "step_started for unknown step");
                    return;
                };
                if step.status.is_terminal() {
                    debug!(step_id = %event.step_id, "step_started after terminal status");
                    return;
                }
                step.status = StepStatus::InProgress;
                step.started_at = Some(Utc::now());
                if let Some(description) = event.description {
                    step.description = description;
                }
            }),
            PlanningEvent::StepProgress(event) => self.with_active(|plan| {
                let Some(step) = plan.step_mut(&event.step_id) else {
                    debug!(step_id = %event.step_id, "step_progress for unknown step");
                    return;
                };
                if step.status.is_terminal() {
                    return;
                }
                if let Some(progress) = event.progress {
                    step.progress = Some(progress.clamp(0.0, 1.0));
                }
                if event.current_action.is_some() {
                    step.current_action = event.current_action;
                }
            }),
            PlanningEvent::StepCompleted(event) => self.with_active(|plan| {
                let Some(step) = plan.step_mut(&event.step_id) else {
                    debug!(step_id = %event.step_id, "step_completed for unknown step");
                    return;
                };
                if step.status.is_terminal() {
                    return;
                }
                step.status = StepStatus::Completed;
                step.progress = Some(1.0);
                step.result = event.result;
                step.finished_at = Some(Utc::now());
            }),
            PlanningEvent::StepFailed(event) => self.with_active(|plan| {
                let Some(step) = plan.step_mut(&event.step_id) else {
                    debug!(step_id = %event.step_id, "step_failed for unknown step");
                    return;
                };
                if step.status.is_terminal() {
                    return;
                }
                step.status = StepStatus::Failed;
                step.error = Some(event.error);
                step.finished_at = Some(Utc::now());
            }),
            PlanningEvent::PlanCompleted(event) => {
                self.finish_active(&event.plan_id, PlanStatus::Completed, None);
            }
            PlanningEvent::PlanFailed(event) => {
                self.finish_active(&event.plan_id, PlanStatus::Failed, Some(event.error));
            }
        }
    }

    /// Cancel any running grace timer (teardown).
    pub fn shutdown(&self) {
        self.grace.lock().cancel();
    }

    // ─── internals ───────────────────────────────────────────────────────

    /// Install the active plan from a `plan_started` payload. The pending
    /// proposal is untouched: only `plan_approved` / `plan_rejected` (or a
    /// local decision) clear it.
    fn plan_started(self: &Arc<Self>, outline: vigil_core::PlanOutline) {
        // Starting a new plan supersedes the grace window of the last one.
        self.grace.lock().cancel();
        self.tx.send_modify(|snapshot| {
            if let Some(previous) = snapshot.active.take() {
                if previous.status.is_terminal() {
                    // Already unshifted into history when it finished.
                } else {
                    warn!(plan_id = %previous.id, "plan_started while a plan was still running");
                    Self::push_history(snapshot, previous, self.history_limit);
                }
            }

            let steps = StepSpec::into_steps(outline.steps);
            info!(plan_id = %outline.plan_id, steps = steps.len(), "plan started");
            snapshot.active = Some(Plan::started(outline.plan_id, outline.description, steps));
        });
    }

    fn with_active(&self, apply: impl FnOnce(&mut Plan)) {
        let mut applied = false;
        self.tx.send_modify(|snapshot| {
            if let Some(plan) = snapshot.active.as_mut() {
                apply(plan);
                applied = true;
            }
        });
        if !applied {
            debug!("step event with no active plan");
        }
    }

    fn finish_active(self: &Arc<Self>, plan_id: &PlanId, status: PlanStatus, error: Option<String>) {
        let mut finished = false;
        self.tx.send_modify(|snapshot| {
            let Some(plan) = snapshot.active.as_mut() else {
                return;
            };
            if &plan.id != plan_id {
                debug!(plan_id = %plan_id, "terminal event for a plan that is not active");
                return;
            }
            if plan.status.is_terminal() {
                return;
            }
            plan.status = status;
            plan.error = error.clone();
            plan.finished_at = Some(Utc::now());
            // Into history at once; the active slot keeps showing it
            // until the grace timer clears it.
            let archived = plan.clone();
            Self::push_history(snapshot, archived, self.history_limit);
            finished = true;
        });

        if !finished {
            return;
        }
        match status {
            PlanStatus::Failed => warn!(plan_id = %plan_id, error = ?error, "plan failed"),
            _ => info!(plan_id = %plan_id, "plan completed"),
        }

        // Leave the finished plan visible for a grace period before the
        // active view is cleared.
        let token = CancellationToken::new();
        {
            let mut guard = self.grace.lock();
            guard.cancel();
            *guard = token.clone();
        }
        let board = Arc::clone(self);
        let plan_id = plan_id.clone();
        drop(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(board.grace_delay) => board.clear_active(&plan_id),
                () = token.cancelled() => {}
            }
        }));
    }

    /// Clear the active view, provided it still shows the same terminal
    /// plan the timer was armed for. The plan is already in history.
    fn clear_active(&self, plan_id: &PlanId) {
        self.tx.send_modify(|snapshot| {
            let cleared = snapshot
                .active
                .take_if(|p| &p.id == plan_id && p.status.is_terminal());
            if let Some(plan) = cleared {
                debug!(plan_id = %plan.id, "active plan view cleared");
            }
        });
    }

    fn push_history(snapshot: &mut PlanSnapshot, plan: Plan, limit: usize) {
        snapshot.history.insert(0, plan);
        snapshot.history.truncate(limit);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
