//! Conversation state: the transcript, the identity of the authenticated
//! user, and the busy flag covering a turn in flight.

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use vigil_core::{ChatTurn, Role, UserInfo};

/// Snapshot of the conversation surface.
#[derive(Clone, Debug, Default)]
pub struct ConversationSnapshot {
    /// Transcript in arrival order.
    pub turns: Vec<ChatTurn>,
    /// Identity confirmed by the handshake, if any.
    pub user: Option<UserInfo>,
    /// True between submitting a user turn and the assistant's reply.
    pub busy: bool,
}

/// Owns the transcript. Mutations are published through a watch channel so
/// consumers re-render on change.
pub struct Conversation {
    tx: watch::Sender<ConversationSnapshot>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConversationSnapshot::default());
        Self { tx }
    }

    /// Subscribe to transcript snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConversationSnapshot> {
        self.tx.subscribe()
    }

    /// Record an outgoing user turn and raise the busy flag.
    pub fn push_user(&self, content: impl Into<String>) {
        let turn = ChatTurn::now(Role::User, content);
        self.tx.send_modify(|snapshot| {
            snapshot.turns.push(turn);
            snapshot.busy = true;
        });
    }

    /// Record an assistant reply and clear the busy flag. The timestamp is
    /// the server's when it supplied one.
    pub fn push_assistant(&self, content: impl Into<String>, timestamp: Option<String>) {
        let when = timestamp
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(Utc::now);
        let turn = ChatTurn::at(Role::Assistant, content, when);
        self.tx.send_modify(|snapshot| {
            snapshot.turns.push(turn);
            snapshot.busy = false;
        });
    }

    /// Record a system notice (errors, status lines). Does not touch the
    /// busy flag.
    pub fn push_system(&self, content: impl Into<String>) {
        let turn = ChatTurn::now(Role::System, content);
        self.tx.send_modify(|snapshot| snapshot.turns.push(turn));
    }

    /// Store the identity confirmed by the handshake.
    pub fn set_user(&self, user: UserInfo) {
        debug!(username = %user.username, "user confirmed");
        self.tx.send_modify(|snapshot| snapshot.user = Some(user));
    }

    /// Clear the busy flag without adding a turn (e.g. the turn failed).
    pub fn settle(&self) {
        self.tx.send_modify(|snapshot| snapshot.busy = false);
    }

    /// Drop the whole transcript. The only deletion the log supports.
    pub fn clear(&self) {
        self.tx.send_modify(|snapshot| {
            snapshot.turns.clear();
            snapshot.busy = false;
        });
    }
}
