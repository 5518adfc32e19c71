//! Wire envelopes for the console connection.
//!
//! Two classes of traffic share one UTF-8 JSON text-frame transport:
//!
//! - **In-band**: direct chat/control frames tagged by a top-level `type`
//!   field ([`ClientFrame`] outbound, [`ServerFrame`] inbound).
//! - **Out-of-band**: lifecycle events wrapped in `{channel:"oob",
//!   type:"<namespace>.<event>", data, timestamp}` ([`OobEnvelope`]),
//!   dispatched by dotted namespace prefix.
//!
//! [`RawFrame::parse`] performs the classification. Parse failures are
//! reported as [`WireError`] and the frame is dropped by the router; a
//! malformed frame never takes the connection down.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::UserInfo;
use crate::errors::WireError;
use crate::ids::{InteractionId, PlanId, StepId};
use crate::plan::StepSpec;

// ─────────────────────────────────────────────────────────────────────────────
// Client → server
// ─────────────────────────────────────────────────────────────────────────────

/// Frames the client transmits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authentication handshake, sent immediately after socket open.
    Auth {
        /// Opaque bearer token from the credential supplier.
        token: String,
    },
    /// A chat turn typed by the operator.
    UserMessage {
        /// Message text.
        content: String,
    },
    /// Accept or reject a proposed plan.
    PlanApproval {
        /// Plan being decided.
        plan_id: PlanId,
        /// `true` to approve.
        approved: bool,
    },
    /// Answer to a pending `planning.needs_input` question.
    InteractionResponse {
        /// Interaction being answered.
        interaction_id: InteractionId,
        /// Chosen action tag.
        action: String,
        /// Optional free-form value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    /// Administrative command (admin auth level only).
    SystemCommand {
        /// Command name.
        command: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → client, in-band
// ─────────────────────────────────────────────────────────────────────────────

/// In-band frames the server transmits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Auth accepted; the connection is now usable.
    ConnectionEstablished {
        /// The authenticated user.
        user: UserInfo,
    },
    /// A chat turn from the assistant.
    AssistantMessage {
        /// Message text.
        content: String,
        /// Server-side timestamp (ISO 8601), when provided.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Acknowledgement of a plan approval decision.
    PlanApprovalReceived {
        /// Plan that was decided (older servers omit it).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan_id: Option<PlanId>,
        /// The recorded decision.
        approved: bool,
    },
    /// Server-side error report.
    Error {
        /// Error description.
        error: String,
    },
}

/// In-band `type` values this client understands. A frame with one of
/// these types that still fails to deserialize is malformed, not merely
/// unrecognized.
const KNOWN_INBAND_TYPES: &[&str] = &[
    "connection_established",
    "assistant_message",
    "plan_approval_received",
    "error",
];

// ─────────────────────────────────────────────────────────────────────────────
// Out-of-band envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope for asynchronous lifecycle events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OobEnvelope {
    /// Always `"oob"`.
    pub channel: String,
    /// Dotted event name, e.g. `planning.step_started`.
    #[serde(rename = "type")]
    pub event: String,
    /// Event payload; deserialized into a typed struct at dispatch time.
    #[serde(default)]
    pub data: Value,
    /// Server-side timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl OobEnvelope {
    /// The namespace prefix before the first dot (`planning`, `search`,
    /// `intent`, `memory`, `system`, `log`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.event.split('.').next().unwrap_or(&self.event)
    }

    /// The event name after the first dot, when present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.event.split_once('.').map(|(_, kind)| kind)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum RawFrame {
    /// Out-of-band lifecycle event.
    Oob(OobEnvelope),
    /// In-band frame of a known type.
    InBand(ServerFrame),
    /// In-band frame whose `type` this client does not recognize.
    /// Logged as a warning by the router, never an error.
    UnknownInBand {
        /// The unrecognized `type` value.
        frame_type: String,
    },
}

impl RawFrame {
    /// Parse and classify a raw text frame.
    ///
    /// A frame with `channel:"oob"` is out-of-band; everything else is
    /// in-band and keyed by the top-level `type` field.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| WireError::Malformed {
            detail: e.to_string(),
        })?;

        if value.get("channel").and_then(Value::as_str) == Some("oob") {
            let envelope: OobEnvelope =
                serde_json::from_value(value).map_err(|e| WireError::Malformed {
                    detail: format!("bad oob envelope: {e}"),
                })?;
            return Ok(Self::Oob(envelope));
        }

        let Some(frame_type) = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            return Err(WireError::Malformed {
                detail: "in-band frame missing `type` field".into(),
            });
        };

        if !KNOWN_INBAND_TYPES.contains(&frame_type.as_str()) {
            return Ok(Self::UnknownInBand { frame_type });
        }

        let frame: ServerFrame =
            serde_json::from_value(value).map_err(|e| WireError::Malformed {
                detail: format!("bad {frame_type} frame: {e}"),
            })?;
        Ok(Self::InBand(frame))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// planning.* payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Typed `planning.*` events, minus `needs_input` (which carries a full
/// [`crate::interaction::Interaction`] and is routed to interaction state).
#[derive(Clone, Debug, PartialEq)]
pub enum PlanningEvent {
    /// A plan proposal awaiting approval.
    PlanCreated(PlanOutline),
    /// The proposal was approved (by this operator or elsewhere).
    PlanApproved,
    /// The proposal was rejected.
    PlanRejected,
    /// Execution began; this creates the active plan.
    PlanStarted(PlanOutline),
    /// A step began executing.
    StepStarted(StepStarted),
    /// Progress update for an in-flight step.
    StepProgress(StepProgress),
    /// A step finished successfully.
    StepCompleted(StepCompleted),
    /// A step finished with an error.
    StepFailed(StepFailed),
    /// The active plan finished successfully.
    PlanCompleted(PlanCompleted),
    /// The active plan aborted.
    PlanFailed(PlanFailed),
}

impl PlanningEvent {
    /// Deserialize a `planning.<kind>` payload into its typed event.
    pub fn parse(kind: &str, data: Value) -> Result<Self, WireError> {
        fn payload<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T, WireError> {
            serde_json::from_value(data).map_err(|e| WireError::Malformed {
                detail: format!("bad planning.{kind} payload: {e}"),
            })
        }

        match kind {
            "plan_created" => Ok(Self::PlanCreated(payload(kind, data)?)),
            "plan_approved" => Ok(Self::PlanApproved),
            "plan_rejected" => Ok(Self::PlanRejected),
            "plan_started" => Ok(Self::PlanStarted(payload(kind, data)?)),
            "step_started" => Ok(Self::StepStarted(payload(kind, data)?)),
            "step_progress" => Ok(Self::StepProgress(payload(kind, data)?)),
            "step_completed" => Ok(Self::StepCompleted(payload(kind, data)?)),
            "step_failed" => Ok(Self::StepFailed(payload(kind, data)?)),
            "plan_completed" => Ok(Self::PlanCompleted(payload(kind, data)?)),
            "plan_failed" => Ok(Self::PlanFailed(payload(kind, data)?)),
            other => Err(WireError::UnknownEvent {
                event: format!("planning.{other}"),
            }),
        }
    }
}

/// Shared payload of `plan_created` and `plan_started`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanOutline {
    /// Plan ID.
    pub plan_id: PlanId,
    /// What the plan does.
    #[serde(default)]
    pub description: String,
    /// Step outline; may omit IDs.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// `planning.step_started` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepStarted {
    /// Step being started.
    pub step_id: StepId,
    /// Refined description, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `planning.step_progress` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    /// Step being updated.
    pub step_id: StepId,
    /// Progress ratio in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// What the step is doing right now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_action: Option<String>,
}

/// `planning.step_completed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepCompleted {
    /// Step that finished.
    pub step_id: StepId,
    /// Result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Execution duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// `planning.step_failed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepFailed {
    /// Step that failed.
    pub step_id: StepId,
    /// Error text.
    #[serde(default)]
    pub error: String,
}

/// `planning.plan_completed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanCompleted {
    /// Plan that finished.
    pub plan_id: PlanId,
    /// Total execution duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// `planning.plan_failed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanFailed {
    /// Plan that failed.
    pub plan_id: PlanId,
    /// Error text.
    #[serde(default)]
    pub error: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry namespaces
// ─────────────────────────────────────────────────────────────────────────────

/// `search.*` payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchEvent {
    /// A search was issued.
    Query {
        /// Query text.
        query: String,
    },
    /// Results came back.
    Results {
        /// Query text.
        query: String,
        /// Number of results.
        results_count: u64,
        /// Search duration.
        duration_ms: u64,
    },
    /// The query was served from cache.
    CacheHit {
        /// Query text.
        query: String,
    },
    /// The search failed.
    Failed {
        /// Query text.
        query: String,
        /// Error text.
        error: String,
    },
}

impl SearchEvent {
    /// Deserialize a `search.<kind>` payload.
    pub fn parse(kind: &str, data: &Value) -> Result<Self, WireError> {
        let query = data
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        match kind {
            "query" => Ok(Self::Query { query }),
            "results" => Ok(Self::Results {
                query,
                results_count: data
                    .get("results_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                duration_ms: data.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
            }),
            "cache_hit" => Ok(Self::CacheHit { query }),
            "failed" => Ok(Self::Failed {
                query,
                error: data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }),
            other => Err(WireError::UnknownEvent {
                event: format!("search.{other}"),
            }),
        }
    }
}

/// `intent.classified` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentClassified {
    /// The classified user input.
    #[serde(default)]
    pub input: String,
    /// Detected intent label.
    pub intent: String,
    /// Classifier confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    /// Whether the cheap fast path was used (vs. the deliberate path).
    #[serde(default)]
    pub fast_path_used: bool,
}

/// Memory mutation kind, from the `memory.<op>` suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOpKind {
    /// A memory was stored.
    Create,
    /// A memory was retrieved.
    Read,
    /// A memory was modified.
    Update,
    /// A memory was removed.
    Delete,
}

impl MemoryOpKind {
    /// Parse the `memory.<op>` suffix.
    pub fn parse(kind: &str) -> Result<Self, WireError> {
        match kind {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(WireError::UnknownEvent {
                event: format!("memory.{other}"),
            }),
        }
    }
}

/// `system.status` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Assistant process state label.
    #[serde(default)]
    pub state: String,
    /// Pending task queue depth.
    #[serde(default)]
    pub queue_size: u64,
    /// Number of plans currently executing.
    #[serde(default)]
    pub active_plans: u64,
    /// Connected terminal/console count.
    #[serde(default)]
    pub terminal_count: u64,
}

/// `log.*` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity label as sent by the server (`ERROR`, `WARNING`, ...).
    #[serde(default)]
    pub level: String,
    /// Log category tag.
    #[serde(default)]
    pub category: String,
    /// Message text.
    #[serde(default)]
    pub message: String,
    /// Interaction reference for timeout notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<InteractionId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn client_frames_serialize_with_type_tag() {
        let frame = ClientFrame::Auth {
            token: "tok".into(),
        };
        let v: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "auth");
        assert_eq!(v["token"], "tok");

        let frame = ClientFrame::PlanApproval {
            plan_id: PlanId::from("p1"),
            approved: true,
        };
        let v: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "plan_approval");
        assert_eq!(v["approved"], true);
    }

    #[test]
    fn classifies_oob_by_channel_marker() {
        let raw = r#"{"channel":"oob","type":"planning.step_started","data":{"step_id":"1"},"timestamp":"t"}"#;
        let frame = RawFrame::parse(raw).unwrap();
        let RawFrame::Oob(envelope) = frame else {
            panic!("expected oob frame");
        };
        assert_eq!(envelope.namespace(), "planning");
        assert_eq!(envelope.kind(), Some("step_started"));
    }

    #[test]
    fn classifies_inband_by_type() {
        let raw = r#"{"type":"assistant_message","content":"hi","timestamp":"2026-05-01T12:00:00Z"}"#;
        let frame = RawFrame::parse(raw).unwrap();
        assert_matches!(
            frame,
            RawFrame::InBand(ServerFrame::AssistantMessage { content, .. }) if content == "hi"
        );
    }

    #[test]
    fn unknown_inband_type_is_not_an_error() {
        let raw = r#"{"type":"system_response","command":"restart","result":"ok"}"#;
        let frame = RawFrame::parse(raw).unwrap();
        assert_matches!(
            frame,
            RawFrame::UnknownInBand { frame_type } if frame_type == "system_response"
        );
    }

    #[test]
    fn malformed_json_is_a_wire_error() {
        assert_matches!(
            RawFrame::parse("{not json"),
            Err(WireError::Malformed { .. })
        );
    }

    #[test]
    fn known_type_with_bad_shape_is_malformed() {
        // `error` frame requires a string `error` field.
        let raw = r#"{"type":"error"}"#;
        assert_matches!(RawFrame::parse(raw), Err(WireError::Malformed { .. }));
    }

    #[test]
    fn missing_type_field_is_malformed() {
        assert_matches!(
            RawFrame::parse(r#"{"content":"hi"}"#),
            Err(WireError::Malformed { .. })
        );
    }

    #[test]
    fn planning_event_parse_dispatches_by_kind() {
        let event = PlanningEvent::parse(
            "plan_created",
            json!({"plan_id":"p1","description":"d","steps":[{"description":"s1"}]}),
        )
        .unwrap();
        assert_matches!(event, PlanningEvent::PlanCreated(outline) => {
            assert_eq!(outline.plan_id.as_str(), "p1");
            assert_eq!(outline.steps.len(), 1);
        });
    }

    #[test]
    fn planning_event_unknown_kind() {
        assert_matches!(
            PlanningEvent::parse("plan_paused", json!({})),
            Err(WireError::UnknownEvent { .. })
        );
    }

    #[test]
    fn search_event_parse_is_lenient_about_missing_fields() {
        let event = SearchEvent::parse("results", &json!({"query":"rust"})).unwrap();
        assert_matches!(event, SearchEvent::Results { results_count: 0, duration_ms: 0, .. });
    }

    #[test]
    fn memory_op_kind_covers_crud() {
        for (s, k) in [
            ("create", MemoryOpKind::Create),
            ("read", MemoryOpKind::Read),
            ("update", MemoryOpKind::Update),
            ("delete", MemoryOpKind::Delete),
        ] {
            assert_eq!(MemoryOpKind::parse(s).unwrap(), k);
        }
        assert_matches!(
            MemoryOpKind::parse("compact"),
            Err(WireError::UnknownEvent { .. })
        );
    }
}
