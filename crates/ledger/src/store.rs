//! Ledger storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use stockpilot_core::{AlertId, ExecutionId, SubjectId, TenantId};

use crate::records::{
    Alert, AlertStatus, Execution, ExecutionOutcome, ExecutionStatus, WorkflowStep,
};

/// Ledger operation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("tenant isolation violation")]
    TenantIsolation,

    /// The dedup invariant: at most one active alert per subject.
    #[error("subject {0} already has an active alert")]
    ActiveAlertExists(SubjectId),

    /// The concurrency guard: at most one active execution per alert.
    #[error("alert {0} already has an active execution")]
    ActiveExecutionExists(AlertId),

    /// Steps may only be appended to a still-running execution.
    #[error("execution {0} is already finalized")]
    ExecutionFinalized(ExecutionId),

    #[error("step ordering violated: expected step {expected}, got {got}")]
    StepOrder { expected: u32, got: u32 },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-tenant ledger counters for status reporting.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LedgerStats {
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub resolved_alerts: usize,
    pub total_executions: usize,
    pub completed_executions: usize,
    pub partial_executions: usize,
    pub failed_executions: usize,
    pub total_steps: usize,
}

/// Durable record of alerts, executions and per-step outcomes.
///
/// Implementations enforce the two guards that make the write path safe
/// without extra locking: `create_alert` rejects a subject with an active
/// alert, and `create_execution` rejects an alert with an open execution.
pub trait ExecutionLedger: Send + Sync {
    fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError>;

    fn find_active_alert(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
    ) -> Result<Option<Alert>, LedgerError>;

    fn get_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Option<Alert>, LedgerError>;

    fn mark_alert_analyzing(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Alert, LedgerError>;

    /// Alerts are resolved, never deleted (audit requirement).
    fn resolve_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Alert, LedgerError>;

    fn create_execution(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Execution, LedgerError>;

    /// Append a step; step numbers must be 1..N with no gaps or reordering.
    fn append_step(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<WorkflowStep, LedgerError>;

    fn finalize_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<Execution, LedgerError>;

    fn get_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError>;

    fn list_alerts(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Alert>, LedgerError>;

    fn list_executions_for_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError>;

    fn list_steps(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError>;

    fn stats(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError>;
}

impl<S> ExecutionLedger for Arc<S>
where
    S: ExecutionLedger + ?Sized,
{
    fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError> {
        (**self).create_alert(alert)
    }

    fn find_active_alert(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
    ) -> Result<Option<Alert>, LedgerError> {
        (**self).find_active_alert(tenant_id, subject_id)
    }

    fn get_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Option<Alert>, LedgerError> {
        (**self).get_alert(tenant_id, alert_id)
    }

    fn mark_alert_analyzing(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Alert, LedgerError> {
        (**self).mark_alert_analyzing(tenant_id, alert_id)
    }

    fn resolve_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Alert, LedgerError> {
        (**self).resolve_alert(tenant_id, alert_id)
    }

    fn create_execution(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Execution, LedgerError> {
        (**self).create_execution(tenant_id, alert_id)
    }

    fn append_step(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<WorkflowStep, LedgerError> {
        (**self).append_step(tenant_id, execution_id, step)
    }

    fn finalize_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<Execution, LedgerError> {
        (**self).finalize_execution(tenant_id, execution_id, outcome)
    }

    fn get_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError> {
        (**self).get_execution(tenant_id, execution_id)
    }

    fn list_alerts(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Alert>, LedgerError> {
        (**self).list_alerts(tenant_id, limit)
    }

    fn list_executions_for_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError> {
        (**self).list_executions_for_alert(tenant_id, alert_id)
    }

    fn list_steps(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError> {
        (**self).list_steps(tenant_id, execution_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError> {
        (**self).stats(tenant_id)
    }
}

/// In-memory ledger for tests/dev.
///
/// One `RwLock` write section covers check-then-insert for both guards, so
/// the dedup invariant holds against concurrent observers.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    alerts: RwLock<HashMap<AlertId, Alert>>,
    executions: RwLock<HashMap<ExecutionId, Execution>>,
    steps: RwLock<HashMap<ExecutionId, Vec<WorkflowStep>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn checked_alert(
        alerts: &HashMap<AlertId, Alert>,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Option<Alert>, LedgerError> {
        match alerts.get(&alert_id) {
            Some(alert) if alert.tenant_id == tenant_id => Ok(Some(alert.clone())),
            Some(_) => Err(LedgerError::TenantIsolation),
            None => Ok(None),
        }
    }
}

impl ExecutionLedger for InMemoryLedger {
    fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let duplicate = alerts.values().any(|a| {
            a.tenant_id == alert.tenant_id
                && a.subject_id == alert.subject_id
                && a.status.is_active()
        });
        if duplicate {
            return Err(LedgerError::ActiveAlertExists(alert.subject_id));
        }

        alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    fn find_active_alert(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
    ) -> Result<Option<Alert>, LedgerError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(alerts
            .values()
            .find(|a| {
                a.tenant_id == tenant_id && a.subject_id == subject_id && a.status.is_active()
            })
            .cloned())
    }

    fn get_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Option<Alert>, LedgerError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Self::checked_alert(&alerts, tenant_id, alert_id)
    }

    fn mark_alert_analyzing(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Alert, LedgerError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let alert = alerts
            .get_mut(&alert_id)
            .ok_or(LedgerError::AlertNotFound(alert_id))?;
        if alert.tenant_id != tenant_id {
            return Err(LedgerError::TenantIsolation);
        }
        alert.status = AlertStatus::Analyzing;
        Ok(alert.clone())
    }

    fn resolve_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Alert, LedgerError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let alert = alerts
            .get_mut(&alert_id)
            .ok_or(LedgerError::AlertNotFound(alert_id))?;
        if alert.tenant_id != tenant_id {
            return Err(LedgerError::TenantIsolation);
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(Utc::now());
        Ok(alert.clone())
    }

    fn create_execution(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Execution, LedgerError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Self::checked_alert(&alerts, tenant_id, alert_id)?
            .ok_or(LedgerError::AlertNotFound(alert_id))?;
        drop(alerts);

        let mut executions = self
            .executions
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let active = executions
            .values()
            .any(|e| e.alert_id == alert_id && !e.status.is_terminal());
        if active {
            return Err(LedgerError::ActiveExecutionExists(alert_id));
        }

        let execution = Execution::new(tenant_id, alert_id);
        executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    fn append_step(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<WorkflowStep, LedgerError> {
        let executions = self
            .executions
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let execution = executions
            .get(&execution_id)
            .ok_or(LedgerError::ExecutionNotFound(execution_id))?;
        if execution.tenant_id != tenant_id {
            return Err(LedgerError::TenantIsolation);
        }
        if execution.status.is_terminal() {
            return Err(LedgerError::ExecutionFinalized(execution_id));
        }
        drop(executions);

        let mut steps = self
            .steps
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let entry = steps.entry(execution_id).or_default();
        let expected = entry.len() as u32 + 1;
        if step.step_number != expected {
            return Err(LedgerError::StepOrder {
                expected,
                got: step.step_number,
            });
        }
        entry.push(step.clone());
        Ok(step)
    }

    fn finalize_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<Execution, LedgerError> {
        let mut executions = self
            .executions
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(LedgerError::ExecutionNotFound(execution_id))?;
        if execution.tenant_id != tenant_id {
            return Err(LedgerError::TenantIsolation);
        }
        if execution.status.is_terminal() {
            return Err(LedgerError::ExecutionFinalized(execution_id));
        }

        execution.status = outcome.status;
        execution.root_cause = outcome.root_cause;
        execution.confidence_score = outcome.confidence_score;
        execution.analysis_snapshot = outcome.analysis_snapshot;
        execution.solution_snapshot = outcome.solution_snapshot;
        execution.orchestration_snapshot = outcome.orchestration_snapshot;
        execution.summary = outcome.summary;
        execution.completed_at = Some(Utc::now());
        Ok(execution.clone())
    }

    fn get_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError> {
        let executions = self
            .executions
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        match executions.get(&execution_id) {
            Some(e) if e.tenant_id == tenant_id => Ok(Some(e.clone())),
            Some(_) => Err(LedgerError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn list_alerts(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Alert>, LedgerError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let mut result: Vec<_> = alerts
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        result.sort_by_key(|a| a.detected_at);
        result.truncate(limit);
        Ok(result)
    }

    fn list_executions_for_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError> {
        let executions = self
            .executions
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let mut result: Vec<_> = executions
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.alert_id == alert_id)
            .cloned()
            .collect();
        result.sort_by_key(|e| e.started_at);
        Ok(result)
    }

    fn list_steps(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError> {
        // Tenant check goes through the owning execution.
        if self.get_execution(tenant_id, execution_id)?.is_none() {
            return Ok(Vec::new());
        }
        let steps = self
            .steps
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(steps.get(&execution_id).cloned().unwrap_or_default())
    }

    fn stats(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let executions = self
            .executions
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let steps = self
            .steps
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let mut stats = LedgerStats::default();
        for alert in alerts.values().filter(|a| a.tenant_id == tenant_id) {
            stats.total_alerts += 1;
            if alert.status.is_active() {
                stats.active_alerts += 1;
            } else {
                stats.resolved_alerts += 1;
            }
        }
        for execution in executions.values().filter(|e| e.tenant_id == tenant_id) {
            stats.total_executions += 1;
            match execution.status {
                ExecutionStatus::Completed => stats.completed_executions += 1,
                ExecutionStatus::PartialSuccess => stats.partial_executions += 1,
                ExecutionStatus::Failed => stats.failed_executions += 1,
                ExecutionStatus::Started => {}
            }
        }
        for (execution_id, entry) in steps.iter() {
            let owned = executions
                .get(execution_id)
                .map(|e| e.tenant_id == tenant_id)
                .unwrap_or(false);
            if owned {
                stats.total_steps += entry.len();
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::WorkflowStepStatus;
    use stockpilot_core::Priority;
    use stockpilot_monitor::{AlertKind, TriggerReason};

    fn alert(tenant: TenantId, subject: SubjectId) -> Alert {
        Alert::new(
            tenant,
            subject,
            "coal",
            AlertKind::LowInventory,
            Priority::Critical,
            TriggerReason::StockDroppedBelowThreshold,
            3,
            0,
        )
    }

    fn step(execution_id: ExecutionId, number: u32) -> WorkflowStep {
        WorkflowStep {
            id: crate::records::StepId::new(),
            execution_id,
            step_number: number,
            name: format!("step_{number}"),
            status: WorkflowStepStatus::Completed,
            input_snapshot: serde_json::json!({}),
            output_snapshot: None,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn second_active_alert_for_subject_is_rejected() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let subject = SubjectId::new();

        ledger.create_alert(alert(tenant, subject)).unwrap();
        let err = ledger.create_alert(alert(tenant, subject)).unwrap_err();
        assert!(matches!(err, LedgerError::ActiveAlertExists(s) if s == subject));
    }

    #[test]
    fn resolved_alert_frees_the_subject() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let subject = SubjectId::new();

        let first = ledger.create_alert(alert(tenant, subject)).unwrap();
        ledger.resolve_alert(tenant, first.id).unwrap();

        assert!(ledger.find_active_alert(tenant, subject).unwrap().is_none());
        ledger.create_alert(alert(tenant, subject)).unwrap();
    }

    #[test]
    fn same_subject_under_other_tenant_is_independent() {
        let ledger = InMemoryLedger::new();
        let subject = SubjectId::new();

        ledger.create_alert(alert(TenantId::new(), subject)).unwrap();
        ledger.create_alert(alert(TenantId::new(), subject)).unwrap();
    }

    #[test]
    fn tenant_isolation_on_reads() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let other = TenantId::new();
        let created = ledger.create_alert(alert(tenant, SubjectId::new())).unwrap();

        assert!(matches!(
            ledger.get_alert(other, created.id),
            Err(LedgerError::TenantIsolation)
        ));
    }

    #[test]
    fn second_active_execution_is_rejected() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let created = ledger.create_alert(alert(tenant, SubjectId::new())).unwrap();

        let execution = ledger.create_execution(tenant, created.id).unwrap();
        let err = ledger.create_execution(tenant, created.id).unwrap_err();
        assert!(matches!(err, LedgerError::ActiveExecutionExists(a) if a == created.id));

        // Finalizing the first unblocks a later run.
        ledger
            .finalize_execution(
                tenant,
                execution.id,
                ExecutionOutcome::failed(serde_json::json!({"reason": "test"})),
            )
            .unwrap();
        ledger.create_execution(tenant, created.id).unwrap();
    }

    #[test]
    fn steps_must_be_appended_in_order() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let created = ledger.create_alert(alert(tenant, SubjectId::new())).unwrap();
        let execution = ledger.create_execution(tenant, created.id).unwrap();

        ledger.append_step(tenant, execution.id, step(execution.id, 1)).unwrap();
        let err = ledger
            .append_step(tenant, execution.id, step(execution.id, 3))
            .unwrap_err();
        assert!(matches!(err, LedgerError::StepOrder { expected: 2, got: 3 }));

        ledger.append_step(tenant, execution.id, step(execution.id, 2)).unwrap();
        assert_eq!(ledger.list_steps(tenant, execution.id).unwrap().len(), 2);
    }

    #[test]
    fn finalized_execution_accepts_no_more_steps() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let created = ledger.create_alert(alert(tenant, SubjectId::new())).unwrap();
        let execution = ledger.create_execution(tenant, created.id).unwrap();

        ledger
            .finalize_execution(
                tenant,
                execution.id,
                ExecutionOutcome::failed(serde_json::json!({})),
            )
            .unwrap();

        let err = ledger
            .append_step(tenant, execution.id, step(execution.id, 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::ExecutionFinalized(_)));
    }

    #[test]
    fn finalize_records_outcome_fields() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let created = ledger.create_alert(alert(tenant, SubjectId::new())).unwrap();
        let execution = ledger.create_execution(tenant, created.id).unwrap();

        let finalized = ledger
            .finalize_execution(
                tenant,
                execution.id,
                ExecutionOutcome {
                    status: ExecutionStatus::PartialSuccess,
                    root_cause: Some(stockpilot_analysis::RootCause::DemandSurge),
                    confidence_score: Some(0.8),
                    analysis_snapshot: serde_json::json!({"change": 60.0}),
                    solution_snapshot: serde_json::json!({"net": 333}),
                    orchestration_snapshot: serde_json::json!({"steps": 6}),
                    summary: serde_json::json!({"steps_completed": "5/6"}),
                },
            )
            .unwrap();

        assert_eq!(finalized.status, ExecutionStatus::PartialSuccess);
        assert_eq!(finalized.confidence_score, Some(0.8));
        assert!(finalized.completed_at.is_some());
    }

    #[test]
    fn stats_count_per_tenant() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new();
        let created = ledger.create_alert(alert(tenant, SubjectId::new())).unwrap();
        let execution = ledger.create_execution(tenant, created.id).unwrap();
        ledger.append_step(tenant, execution.id, step(execution.id, 1)).unwrap();

        // Unrelated tenant noise.
        ledger
            .create_alert(alert(TenantId::new(), SubjectId::new()))
            .unwrap();

        let stats = ledger.stats(tenant).unwrap();
        assert_eq!(stats.total_alerts, 1);
        assert_eq!(stats.active_alerts, 1);
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.total_steps, 1);
    }
}
