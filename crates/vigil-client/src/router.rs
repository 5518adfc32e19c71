//! Message router: classifies every inbound frame and dispatches it to the
//! owning store.
//!
//! The router is the only consumer of the raw inbound channel. Dispatch is
//! total: every frame ends in exactly one of {applied, logged-and-dropped}.
//! A frame the client cannot parse is logged and dropped — inbound traffic
//! never takes the connection down, and an event referencing an unknown
//! plan, step, or interaction is a quiet no-op in the store it reaches.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vigil_core::{
    IntentClassified, Interaction, LogRecord, MemoryOpKind, OobEnvelope, PlanningEvent, RawFrame,
    SearchEvent, ServerFrame, SystemStatus,
};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::conversation::Conversation;
use crate::interaction::InteractionDesk;
use crate::plan::PlanBoard;
use crate::telemetry::Telemetry;

/// Server log category marking an interaction timeout notice.
const INTERACTION_TIMEOUT_CATEGORY: &str = "INTERACTION_TIMEOUT";

/// Dispatches classified frames to the state stores.
pub struct Router {
    connection: Arc<ConnectionManager>,
    conversation: Arc<Conversation>,
    plans: Arc<PlanBoard>,
    interactions: Arc<InteractionDesk>,
    telemetry: Arc<Telemetry>,
}

impl Router {
    #[must_use]
    pub fn new(
        connection: Arc<ConnectionManager>,
        conversation: Arc<Conversation>,
        plans: Arc<PlanBoard>,
        interactions: Arc<InteractionDesk>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            connection,
            conversation,
            plans,
            interactions,
            telemetry,
        }
    }

    /// Pump the inbound channel until the connection manager drops its end.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<String>) {
        while let Some(raw) = inbound.recv().await {
            self.dispatch(&raw);
        }
        debug!("inbound channel closed, router stopping");
    }

    /// Classify and apply one raw text frame.
    pub fn dispatch(&self, raw: &str) {
        match RawFrame::parse(raw) {
            Ok(RawFrame::InBand(frame)) => self.dispatch_inband(frame),
            Ok(RawFrame::Oob(envelope)) => self.dispatch_oob(envelope),
            Ok(RawFrame::UnknownInBand { frame_type }) => {
                warn!(%frame_type, "dropping in-band frame of unknown type");
            }
            Err(error) => {
                warn!(%error, "dropping unparseable frame");
            }
        }
    }

    // ─── in-band ─────────────────────────────────────────────────────────

    fn dispatch_inband(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::ConnectionEstablished { user } => {
                self.conversation.set_user(user);
                self.connection.mark_established();
            }
            ServerFrame::AssistantMessage { content, timestamp } => {
                self.conversation.push_assistant(content, timestamp);
            }
            ServerFrame::PlanApprovalReceived { plan_id, approved } => {
                debug!(?plan_id, approved, "plan decision acknowledged");
                let decision = if approved { "approved" } else { "rejected" };
                self.conversation
                    .push_system(format!("plan decision recorded: {decision}"));
            }
            ServerFrame::Error { error } => {
                // An error during the handshake is an auth verdict and
                // must not be blind-retried.
                if self.connection.state() == ConnectionState::Authenticating {
                    self.connection.auth_failed(error);
                } else {
                    self.conversation.push_system(format!("server error: {error}"));
                    self.conversation.settle();
                }
            }
        }
    }

    // ─── out-of-band ─────────────────────────────────────────────────────

    fn dispatch_oob(&self, envelope: OobEnvelope) {
        let Some(kind) = envelope.kind().map(str::to_owned) else {
            warn!(event = %envelope.event, "oob event without a namespace, dropping");
            return;
        };
        let kind = kind.as_str();

        match envelope.namespace().to_owned().as_str() {
            "planning" => self.dispatch_planning(kind, envelope.data),
            "search" => match SearchEvent::parse(kind, &envelope.data) {
                Ok(event) => self.telemetry.record_search(event),
                Err(error) => debug!(%error, "unrecognized search event"),
            },
            "intent" => {
                if kind == "classified" {
                    match serde_json::from_value::<IntentClassified>(envelope.data) {
                        Ok(event) => self.telemetry.record_intent(event),
                        Err(e) => warn!(error = %e, "bad intent.classified payload"),
                    }
                } else {
                    debug!(%kind, "unrecognized intent event");
                }
            }
            "memory" => match MemoryOpKind::parse(kind) {
                Ok(op) => {
                    let detail = envelope
                        .data
                        .get("content")
                        .and_then(serde_json::Value::as_str)
                        .map_or_else(|| envelope.data.to_string(), ToOwned::to_owned);
                    self.telemetry.record_memory(op, detail);
                }
                Err(error) => debug!(%error, "unrecognized memory event"),
            },
            "system" => {
                if kind == "status" {
                    match serde_json::from_value::<SystemStatus>(envelope.data) {
                        Ok(status) => self.telemetry.record_system(status),
                        Err(e) => warn!(error = %e, "bad system.status payload"),
                    }
                } else {
                    debug!(%kind, "unrecognized system event");
                }
            }
            "log" => match serde_json::from_value::<LogRecord>(envelope.data) {
                Ok(record) => {
                    if record.category == INTERACTION_TIMEOUT_CATEGORY {
                        if let Some(id) = record.interaction_id.as_ref() {
                            self.interactions.expire(id);
                        }
                    }
                    self.telemetry.record_log(record);
                }
                Err(e) => warn!(error = %e, "bad log payload"),
            },
            other => {
                debug!(namespace = %other, "oob event in unknown namespace, dropping");
            }
        }
    }

    fn dispatch_planning(&self, kind: &str, data: serde_json::Value) {
        // `needs_input` carries a full interaction payload and routes to
        // the desk, not the plan board.
        if kind == "needs_input" {
            match serde_json::from_value::<Interaction>(data) {
                Ok(interaction) => self.interactions.present(interaction),
                Err(e) => warn!(error = %e, "bad planning.needs_input payload"),
            }
            return;
        }

        match PlanningEvent::parse(kind, data) {
            Ok(event) => {
                // A finished plan also retires its unanswered question.
                let closed_plan = match &event {
                    PlanningEvent::PlanCompleted(done) => Some(done.plan_id.clone()),
                    PlanningEvent::PlanFailed(failed) => Some(failed.plan_id.clone()),
                    _ => None,
                };
                self.plans.handle(event);
                if let Some(plan_id) = closed_plan {
                    self.interactions.plan_closed(&plan_id);
                }
            }
            Err(error) => debug!(%error, "unrecognized planning event"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
