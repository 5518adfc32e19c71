//! Interaction desk: the single live question and its resolution record.
//!
//! A `planning.needs_input` event presents a question; at most one is live
//! at a time, and a newer question preempts an unanswered one. The
//! countdown here is display-only — the deadline is fixed when the question
//! is presented and the server remains authoritative for timeouts, which it
//! announces through a log event. Answering, timing out, preemption, and
//! the owning plan finishing all retire the live question to history.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vigil_core::{ClientFrame, Interaction, InteractionId, InteractionResponse, PlanId};

/// How a question left the desk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// The operator answered.
    Answered {
        /// The chosen action tag.
        action: String,
    },
    /// The server reported its timeout lapsed.
    TimedOut,
    /// A newer question replaced it unanswered.
    Preempted,
    /// The owning plan finished before an answer.
    Cancelled,
}

/// The question currently awaiting an answer.
#[derive(Clone, Debug)]
pub struct LiveInteraction {
    /// The question as presented.
    pub interaction: Interaction,
    /// Fixed countdown deadline, when the question carries a timeout.
    /// Derived once at presentation; re-renders recompute the remaining
    /// time from this instant rather than restarting the countdown.
    pub deadline: Option<Instant>,
}

impl LiveInteraction {
    /// Time left on the countdown. `None` when the question has no
    /// timeout; zero once the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// A retired question and how it was resolved.
#[derive(Clone, Debug)]
pub struct ResolvedInteraction {
    /// The question.
    pub interaction: Interaction,
    /// How it left the desk.
    pub outcome: InteractionOutcome,
}

/// Snapshot of interaction state.
#[derive(Clone, Debug, Default)]
pub struct InteractionSnapshot {
    /// The live question, if one is awaiting an answer.
    pub live: Option<LiveInteraction>,
    /// Retired questions, most recent first. Append-only within a
    /// session.
    pub history: Vec<ResolvedInteraction>,
}

/// Owns the live question slot.
pub struct InteractionDesk {
    tx: watch::Sender<InteractionSnapshot>,
}

impl Default for InteractionDesk {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionDesk {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(InteractionSnapshot::default());
        Self { tx }
    }

    /// Subscribe to interaction snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<InteractionSnapshot> {
        self.tx.subscribe()
    }

    /// Present a new question, preempting any unanswered one.
    pub fn present(&self, interaction: Interaction) {
        let deadline = interaction
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        info!(
            interaction_id = %interaction.id,
            plan_id = %interaction.plan_id,
            risk = ?interaction.risk_level,
            "question presented"
        );
        self.tx.send_modify(|snapshot| {
            if let Some(previous) = snapshot.live.take() {
                warn!(
                    interaction_id = %previous.interaction.id,
                    "unanswered question preempted"
                );
                Self::retire(snapshot, previous, InteractionOutcome::Preempted);
            }
            snapshot.live = Some(LiveInteraction {
                interaction,
                deadline,
            });
        });
    }

    /// Answer the live question. Returns the response frame to transmit,
    /// or `None` when `id` is not the live question (it was preempted,
    /// timed out, or already answered).
    pub fn resolve(
        &self,
        id: &InteractionId,
        response: InteractionResponse,
    ) -> Option<ClientFrame> {
        let mut frame = None;
        self.tx.send_modify(|snapshot| {
            let Some(live) = snapshot.live.take_if(|live| &live.interaction.id == id) else {
                return;
            };
            frame = Some(ClientFrame::InteractionResponse {
                interaction_id: live.interaction.id.clone(),
                action: response.action.clone(),
                value: response.value.clone(),
            });
            Self::retire(
                snapshot,
                live,
                InteractionOutcome::Answered {
                    action: response.action.clone(),
                },
            );
        });
        if frame.is_some() {
            info!(interaction_id = %id, "question answered");
        } else {
            warn!(interaction_id = %id, "answer for a question that is no longer live");
        }
        frame
    }

    /// Retire the live question because the server reported its timeout.
    pub fn expire(&self, id: &InteractionId) {
        let mut expired = false;
        self.tx.send_modify(|snapshot| {
            let Some(live) = snapshot.live.take_if(|live| &live.interaction.id == id) else {
                return;
            };
            Self::retire(snapshot, live, InteractionOutcome::TimedOut);
            expired = true;
        });
        if expired {
            info!(interaction_id = %id, "question timed out on the server");
        } else {
            debug!(interaction_id = %id, "timeout notice for a question no longer live");
        }
    }

    /// Retire the live question because its owning plan finished.
    pub fn plan_closed(&self, plan_id: &PlanId) {
        self.tx.send_modify(|snapshot| {
            let Some(live) = snapshot
                .live
                .take_if(|live| &live.interaction.plan_id == plan_id)
            else {
                return;
            };
            debug!(
                interaction_id = %live.interaction.id,
                plan_id = %plan_id,
                "question cancelled by plan completion"
            );
            Self::retire(snapshot, live, InteractionOutcome::Cancelled);
        });
    }

    fn retire(
        snapshot: &mut InteractionSnapshot,
        live: LiveInteraction,
        outcome: InteractionOutcome,
    ) {
        snapshot.history.insert(
            0,
            ResolvedInteraction {
                interaction: live.interaction,
                outcome,
            },
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
