//! Plan and step models for the plan state machine.
//!
//! A plan proposal arrives as a [`PendingApproval`]; only after the server
//! reports `plan_started` does an active [`Plan`] exist. Step statuses are
//! monotonic within a run: `Pending → InProgress → {Completed | Failed}`,
//! and a terminal step never regresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{PlanId, StepId};

// ─────────────────────────────────────────────────────────────────────────────
// Step
// ─────────────────────────────────────────────────────────────────────────────

/// Execution status of a single step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl StepStatus {
    /// Whether this status is terminal (absorbs all later events).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One step of a plan. Belongs to exactly one plan; its ID is unique
/// within that plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step ID, unique within the owning plan.
    pub id: StepId,
    /// Human-readable description.
    pub description: String,
    /// Current status (monotonic).
    pub status: StepStatus,
    /// Progress ratio in `[0, 1]` when the server reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Label for what the step is doing right now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<String>,
    /// Result payload once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When execution started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Create a pending step.
    #[must_use]
    pub fn pending(id: StepId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: StepStatus::Pending,
            progress: None,
            current_action: None,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Step outline as carried by `plan_created` / `plan_started` payloads.
///
/// The server may omit IDs, in which case steps are numbered 1-based in
/// payload order (matching how it later addresses them).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Explicit step ID, if the server assigned one.
    #[serde(default, alias = "step_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<StepId>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl StepSpec {
    /// Materialize the specs into pending steps, assigning 1-based ordinal
    /// IDs where the server omitted them.
    #[must_use]
    pub fn into_steps(specs: Vec<Self>) -> Vec<Step> {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| {
                let id = spec
                    .id
                    .unwrap_or_else(|| StepId::from((i + 1).to_string()));
                Step::pending(id, spec.description)
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Proposed, awaiting operator approval.
    PendingApproval,
    /// Approved and executing.
    InProgress,
    /// All steps finished.
    Completed,
    /// Aborted with an error.
    Failed,
}

impl PlanStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An executing (or recently finished) plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Server-assigned plan ID.
    pub id: PlanId,
    /// What the plan is for.
    pub description: String,
    /// Lifecycle status.
    pub status: PlanStatus,
    /// Ordered steps; IDs unique within the plan.
    pub steps: Vec<Step>,
    /// When the client first saw the plan.
    pub created_at: DateTime<Utc>,
    /// When the plan reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error text for failed plans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Plan {
    /// Create an in-progress plan from a `plan_started` payload.
    #[must_use]
    pub fn started(id: PlanId, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id,
            description: description.into(),
            status: PlanStatus::InProgress,
            steps,
            created_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Look up a step by ID. IDs are unique within a plan, so the first
    /// match is the only match.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Mutable step lookup by ID.
    pub fn step_mut(&mut self, id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == id)
    }
}

/// A plan proposal awaiting accept/reject. Distinct from the active plan:
/// a plan only becomes active once the server reports `plan_started`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Proposed plan ID.
    pub id: PlanId,
    /// What the plan would do.
    pub description: String,
    /// Proposed steps.
    pub steps: Vec<Step>,
    /// When the proposal arrived.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
    }

    #[test]
    fn step_lookup_by_id() {
        let steps = vec![
            Step::pending(StepId::from("1"), "first"),
            Step::pending(StepId::from("2"), "second"),
        ];
        let plan = Plan::started(PlanId::from("p1"), "demo", steps);
        assert_eq!(plan.step(&StepId::from("2")).unwrap().description, "second");
        assert!(plan.step(&StepId::from("9")).is_none());
    }

    #[test]
    fn specs_without_ids_get_ordinals() {
        let specs: Vec<StepSpec> = serde_json::from_str(
            r#"[{"description":"a"},{"description":"b"}]"#,
        )
        .unwrap();
        let steps = StepSpec::into_steps(specs);
        assert_eq!(steps[0].id.as_str(), "1");
        assert_eq!(steps[1].id.as_str(), "2");
    }

    #[test]
    fn specs_with_explicit_ids_keep_them() {
        let specs: Vec<StepSpec> = serde_json::from_str(
            r#"[{"step_id":"fetch","description":"a"}]"#,
        )
        .unwrap();
        let steps = StepSpec::into_steps(specs);
        assert_eq!(steps[0].id.as_str(), "fetch");
    }
}
