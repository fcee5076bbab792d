//! Ledger record types and their status machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockpilot_analysis::RootCause;
use stockpilot_core::{AlertId, ExecutionId, Priority, SubjectId, TenantId};
use stockpilot_monitor::{AlertKind, TriggerReason};

/// Unique workflow step identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alert lifecycle: `Detected → Analyzing → Resolved`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Detected,
    Analyzing,
    Resolved,
}

impl AlertStatus {
    /// Active alerts absorb further disruptions on the same subject.
    pub fn is_active(&self) -> bool {
        matches!(self, AlertStatus::Detected | AlertStatus::Analyzing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Detected => "detected",
            AlertStatus::Analyzing => "analyzing",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// A detected disruption for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub tenant_id: TenantId,
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub kind: AlertKind,
    pub priority: Priority,
    pub status: AlertStatus,
    pub observed_quantity: i64,
    pub required_quantity: i64,
    pub trigger_reason: TriggerReason,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        subject_id: SubjectId,
        subject_name: impl Into<String>,
        kind: AlertKind,
        priority: Priority,
        trigger_reason: TriggerReason,
        observed_quantity: i64,
        required_quantity: i64,
    ) -> Self {
        Self {
            id: AlertId::new(),
            tenant_id,
            subject_id,
            subject_name: subject_name.into(),
            kind,
            priority,
            status: AlertStatus::Detected,
            observed_quantity,
            required_quantity,
            trigger_reason,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Execution lifecycle: `Started → Completed | PartialSuccess | Failed`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Started,
    Completed,
    PartialSuccess,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Started => "started",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::PartialSuccess => "partial_success",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// One pipeline run against an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub alert_id: AlertId,
    pub tenant_id: TenantId,
    pub status: ExecutionStatus,
    pub root_cause: Option<RootCause>,
    /// In [0, 1] once analysis has run.
    pub confidence_score: Option<f64>,
    pub analysis_snapshot: JsonValue,
    pub solution_snapshot: JsonValue,
    pub orchestration_snapshot: JsonValue,
    pub summary: JsonValue,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(tenant_id: TenantId, alert_id: AlertId) -> Self {
        Self {
            id: ExecutionId::new(),
            alert_id,
            tenant_id,
            status: ExecutionStatus::Started,
            root_cause: None,
            confidence_score: None,
            analysis_snapshot: JsonValue::Null,
            solution_snapshot: JsonValue::Null,
            orchestration_snapshot: JsonValue::Null,
            summary: JsonValue::Null,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Terminal state handed to `finalize_execution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub root_cause: Option<RootCause>,
    pub confidence_score: Option<f64>,
    pub analysis_snapshot: JsonValue,
    pub solution_snapshot: JsonValue,
    pub orchestration_snapshot: JsonValue,
    pub summary: JsonValue,
}

impl ExecutionOutcome {
    /// Outcome for a run that never produced a plan.
    pub fn failed(summary: JsonValue) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            root_cause: None,
            confidence_score: None,
            analysis_snapshot: JsonValue::Null,
            solution_snapshot: JsonValue::Null,
            orchestration_snapshot: JsonValue::Null,
            summary,
        }
    }
}

/// Workflow step lifecycle: `Pending → InProgress → Completed | Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepStatus {
    Pending,
    InProgress,
    Completed,
    Failed { error: String },
}

impl WorkflowStepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStepStatus::Completed | WorkflowStepStatus::Failed { .. }
        )
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            WorkflowStepStatus::Pending => "pending",
            WorkflowStepStatus::InProgress => "in_progress",
            WorkflowStepStatus::Completed => "completed",
            WorkflowStepStatus::Failed { .. } => "failed",
        }
    }
}

/// One external-effect step within an execution.
///
/// Steps are append-only once an execution starts; a failed step never
/// deletes or skips the steps after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub execution_id: ExecutionId,
    /// 1-based, strictly increasing, never reordered.
    pub step_number: u32,
    pub name: String,
    pub status: WorkflowStepStatus,
    pub input_snapshot: JsonValue,
    pub output_snapshot: Option<JsonValue>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_statuses_classify_active() {
        assert!(AlertStatus::Detected.is_active());
        assert!(AlertStatus::Analyzing.is_active());
        assert!(!AlertStatus::Resolved.is_active());
    }

    #[test]
    fn execution_statuses_classify_terminal() {
        assert!(!ExecutionStatus::Started.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::PartialSuccess.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn execution_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::PartialSuccess).unwrap(),
            "\"partial_success\""
        );
    }

    #[test]
    fn new_execution_starts_open() {
        let execution = Execution::new(TenantId::new(), AlertId::new());
        assert_eq!(execution.status, ExecutionStatus::Started);
        assert!(execution.completed_at.is_none());
        assert!(execution.root_cause.is_none());
    }
}
