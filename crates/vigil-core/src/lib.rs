//! # vigil-core
//!
//! Foundation types shared by every Vigil crate.
//!
//! Vigil is the client-side synchronization layer for an assistant operator
//! console: a persistent WebSocket connection carrying direct chat turns plus
//! a side-channel of asynchronous lifecycle events. This crate provides the
//! shared vocabulary:
//!
//! - **Branded IDs**: `PlanId`, `StepId`, `TurnId`, `InteractionId` as
//!   newtypes for type safety
//! - **Chat**: `ChatTurn` / `Role` for the ordered conversation log
//! - **Plans**: `Plan`, `Step`, `PendingApproval` with monotonic statuses
//! - **Interactions**: human-in-the-loop questions with risk levels and
//!   display-only timeouts
//! - **Wire**: the in-band `ClientFrame` / `ServerFrame` envelopes and the
//!   out-of-band dotted-namespace event envelope
//! - **Backoff**: exponential reconnect delay math

#![deny(unsafe_code)]

pub mod backoff;
pub mod chat;
pub mod errors;
pub mod ids;
pub mod interaction;
pub mod plan;
pub mod wire;

pub use backoff::BackoffPolicy;
pub use chat::{ChatTurn, Role, UserInfo};
pub use errors::WireError;
pub use ids::{InteractionId, PlanId, StepId, TurnId};
pub use interaction::{Interaction, InteractionResponse, QuestionType, RiskLevel};
pub use plan::{PendingApproval, Plan, PlanStatus, Step, StepSpec, StepStatus};
pub use wire::{
    ClientFrame, IntentClassified, LogRecord, MemoryOpKind, OobEnvelope, PlanOutline,
    PlanningEvent, RawFrame, SearchEvent, ServerFrame, SystemStatus,
};
