//! Chat turns and the user identity echoed back at connect time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TurnId;

/// Author of a chat turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed by the operator.
    User,
    /// Produced by the remote assistant.
    Assistant,
    /// Local notes (connection changes, approvals, errors).
    System,
}

/// One entry in the ordered conversation log.
///
/// Turns are immutable once created; the log only ever appends, except for
/// a full clear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Unique turn ID (UUID v7, so ties within one timestamp cannot collide).
    pub id: TurnId,
    /// Who authored the turn.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Create a turn stamped with the current time.
    #[must_use]
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a turn with an explicit timestamp (server-provided).
    #[must_use]
    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content: content.into(),
            timestamp,
        }
    }
}

/// The authenticated user, as confirmed by `connection_established`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Server-side user ID.
    pub id: String,
    /// Login name.
    pub username: String,
    /// Authorization level (gates which OOB events the server sends).
    #[serde(default)]
    pub auth_level: u8,
}
