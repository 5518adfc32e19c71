//! Human-in-the-loop interaction types.
//!
//! The server classifies a question before emitting `planning.needs_input`:
//! what kind of answer it wants, how risky acting on a default would be,
//! and whether a timeout applies. The client displays the question and a
//! countdown; the authoritative timeout resolution stays on the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InteractionId, PlanId};

/// What kind of answer the question expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Yes/no approval of an action.
    Approval,
    /// Explicit confirmation of something already decided.
    Confirmation,
    /// A factual answer is needed.
    Information,
    /// Pick one of the suggested actions.
    Choice,
    /// Free-form answer.
    OpenEnded,
}

/// How risky it is to proceed on a default answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Safe to default.
    Low,
    /// Defaultable with a visible note.
    Medium,
    /// Requires attention; long or no timeout.
    High,
    /// Never auto-answered; no timeout.
    Critical,
}

/// A question from the assistant awaiting an operator response.
///
/// At most one interaction is live at a time; a newer question preempts an
/// unanswered one (the preempted question is still recorded to history).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Interaction ID, referenced by the response frame.
    #[serde(alias = "interaction_id")]
    pub id: InteractionId,
    /// Plan that is asking.
    pub plan_id: PlanId,
    /// The question text.
    pub question: String,
    /// Expected answer shape.
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Risk of acting on a default.
    pub risk_level: RiskLevel,
    /// Display countdown duration; `None` means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Action the server will take if the countdown lapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_action: Option<String>,
    /// Whether an explicit answer is required (no default ever applied).
    #[serde(default)]
    pub require_explicit: bool,
    /// Candidate answers for choice questions.
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    /// Sensitive domain tag (`financial`, `medical`, ...), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// When the question was asked.
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// An operator's answer: an action tag plus an optional free-form value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionResponse {
    /// Chosen action (`yes`, `no`, `skip`, a suggested action, ...).
    pub action: String,
    /// Free-form value for open-ended questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}
