//! Composition root: one connection, one router, one of each state store.
//!
//! [`VigilClient`] wires the pieces together and exposes the operator
//! surface: connect/disconnect, send a chat turn, decide a plan, answer a
//! question. Reads go through the per-store watch channels so a
//! presentation layer can subscribe to exactly the state it renders.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use vigil_core::{ClientFrame, InteractionId, InteractionResponse, PlanId};
use vigil_settings::VigilSettings;

use crate::connection::{ConnectionInfo, ConnectionManager, ConnectionState};
use crate::conversation::{Conversation, ConversationSnapshot};
use crate::errors::ClientError;
use crate::interaction::{InteractionDesk, InteractionSnapshot};
use crate::plan::{PlanBoard, PlanSnapshot};
use crate::router::Router;
use crate::telemetry::{Telemetry, TelemetryLimits, TelemetrySnapshot};

/// The synchronization core, fully wired.
pub struct VigilClient {
    connection: Arc<ConnectionManager>,
    conversation: Arc<Conversation>,
    plans: Arc<PlanBoard>,
    interactions: Arc<InteractionDesk>,
    telemetry: Arc<Telemetry>,
    router_task: JoinHandle<()>,
}

impl VigilClient {
    /// Build a client from settings. Must be called within a tokio
    /// runtime: the router pump starts immediately.
    #[must_use]
    pub fn new(settings: &VigilSettings) -> Self {
        let (connection, inbound) =
            ConnectionManager::new(settings.server.url.clone(), settings.connection.backoff());
        let conversation = Arc::new(Conversation::new());
        let plans = PlanBoard::new(
            settings.plans.history_limit,
            Duration::from_millis(settings.plans.grace_delay_ms),
        );
        let interactions = Arc::new(InteractionDesk::new());
        let telemetry = Arc::new(Telemetry::new(TelemetryLimits {
            search_log: settings.telemetry.search_log_limit,
            memory_log: settings.telemetry.memory_log_limit,
            system_log: settings.telemetry.system_log_limit,
        }));

        let router = Router::new(
            Arc::clone(&connection),
            Arc::clone(&conversation),
            Arc::clone(&plans),
            Arc::clone(&interactions),
            Arc::clone(&telemetry),
        );
        let router_task = tokio::spawn(router.run(inbound));

        Self {
            connection,
            conversation,
            plans,
            interactions,
            telemetry,
            router_task,
        }
    }

    // ─── lifecycle ───────────────────────────────────────────────────────

    /// Open the connection with a bearer token. Idempotent while a
    /// session is active.
    pub fn connect(&self, token: impl Into<String>) {
        self.connection.connect(token);
    }

    /// End the session. No automatic retry follows.
    pub fn disconnect(&self) {
        self.plans.shutdown();
        self.connection.disconnect();
    }

    // ─── operator actions ────────────────────────────────────────────────

    /// Send a chat turn. The turn is appended locally and the busy flag
    /// raised before transmission.
    pub fn send_message(&self, content: impl Into<String>) -> Result<(), ClientError> {
        let content = content.into();
        if self.connection.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        self.conversation.push_user(content.clone());
        if self.connection.send(&ClientFrame::UserMessage { content }) {
            Ok(())
        } else {
            self.conversation.settle();
            Err(ClientError::NotConnected)
        }
    }

    /// Accept or reject a proposed plan. The proposal is cleared locally;
    /// the server's own `planning.plan_approved` / `plan_rejected` echo is
    /// then a no-op.
    pub fn decide_plan(&self, plan_id: &PlanId, approved: bool) -> Result<(), ClientError> {
        if self.connection.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let _ = self.plans.resolve_pending(plan_id, approved);
        let sent = self.connection.send(&ClientFrame::PlanApproval {
            plan_id: plan_id.clone(),
            approved,
        });
        if sent { Ok(()) } else { Err(ClientError::NotConnected) }
    }

    /// Answer the live question. A stale answer (the question was
    /// preempted or already resolved) is dropped without transmitting.
    pub fn answer_question(
        &self,
        id: &InteractionId,
        response: InteractionResponse,
    ) -> Result<(), ClientError> {
        if self.connection.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let Some(frame) = self.interactions.resolve(id, response) else {
            debug!(interaction_id = %id, "stale answer dropped");
            return Ok(());
        };
        if self.connection.send(&frame) {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Send an administrative command. The server enforces the required
    /// auth level; an insufficient one comes back as an in-band error.
    pub fn system_command(&self, command: impl Into<String>) -> Result<(), ClientError> {
        if self.connection.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let sent = self.connection.send(&ClientFrame::SystemCommand {
            command: command.into(),
        });
        if sent { Ok(()) } else { Err(ClientError::NotConnected) }
    }

    /// Drop the local transcript. Purely local; the server keeps its own
    /// conversation state.
    pub fn clear_transcript(&self) {
        self.conversation.clear();
    }

    /// Zero the telemetry aggregates.
    pub fn clear_telemetry(&self) {
        self.telemetry.clear();
    }

    // ─── state subscriptions ─────────────────────────────────────────────

    /// Connection snapshots.
    #[must_use]
    pub fn connection(&self) -> watch::Receiver<ConnectionInfo> {
        self.connection.watch()
    }

    /// Transcript snapshots.
    #[must_use]
    pub fn conversation(&self) -> watch::Receiver<ConversationSnapshot> {
        self.conversation.watch()
    }

    /// Plan snapshots.
    #[must_use]
    pub fn plans(&self) -> watch::Receiver<PlanSnapshot> {
        self.plans.watch()
    }

    /// Interaction snapshots.
    #[must_use]
    pub fn interactions(&self) -> watch::Receiver<InteractionSnapshot> {
        self.interactions.watch()
    }

    /// Telemetry snapshots.
    #[must_use]
    pub fn telemetry(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.telemetry.watch()
    }
}

impl Drop for VigilClient {
    fn drop(&mut self) {
        self.plans.shutdown();
        self.connection.disconnect();
        self.router_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn actions_require_a_connection() {
        let client = VigilClient::new(&VigilSettings::default());
        assert_matches!(client.send_message("hi"), Err(ClientError::NotConnected));
        assert_matches!(
            client.decide_plan(&PlanId::from("p1"), true),
            Err(ClientError::NotConnected)
        );
        assert_matches!(
            client.answer_question(
                &InteractionId::from("i1"),
                InteractionResponse {
                    action: "yes".into(),
                    value: None
                }
            ),
            Err(ClientError::NotConnected)
        );
        assert_matches!(client.system_command("restart"), Err(ClientError::NotConnected));
        assert!(client.conversation().borrow().turns.is_empty());
    }

    #[tokio::test]
    async fn snapshots_start_empty() {
        let client = VigilClient::new(&VigilSettings::default());
        assert_eq!(client.connection().borrow().state, ConnectionState::Disconnected);
        assert!(client.plans().borrow().active.is_none());
        assert!(client.interactions().borrow().live.is_none());
        assert_eq!(client.telemetry().borrow().search.queries, 0);
    }
}
