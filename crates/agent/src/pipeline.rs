//! The dependency-injected pipeline object.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use stockpilot_analysis::{AnalysisReport, HistoryStore, RootCause, RootCauseAnalyzer};
use stockpilot_core::{AlertId, DomainError, TenantId};
use stockpilot_ledger::{
    Alert, Execution, ExecutionLedger, ExecutionOutcome, ExecutionStatus, LedgerError, StepId,
    WorkflowStep, WorkflowStepStatus,
};
use stockpilot_monitor::{evaluate, StockObservation};
use stockpilot_orchestration::{
    OrchestrationReport, OrchestrationStatus, Orchestrator, StepContext, StepStatus, ToolInvoker,
};
use stockpilot_planning::{PlanRequest, ReplenishmentPlan, ReplenishmentPlanner};
use stockpilot_policy::ThresholdStore;

use crate::queue::{AlertQueue, QueuedAlert};

/// Pipeline-level failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    /// The alert already has an open execution; the run was rejected.
    #[error("alert {0} is already being executed")]
    ExecutionAlreadyActive(AlertId),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result of feeding one observation into the trigger path.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// No disruption condition holds (or an active alert absorbed it).
    NoAction,
    /// A new alert was opened and queued for execution.
    Triggered(Alert),
}

/// Human-readable execution summary, persisted with the execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub subject: String,
    pub execution_status: ExecutionStatus,
    /// "succeeded/total" over the external-effect steps.
    pub steps_completed: String,
    pub root_cause: RootCause,
    pub confidence: f64,
    pub replenishment_qty: i64,
    pub actions_taken: Vec<String>,
}

impl ExecutionSummary {
    fn build(
        analysis: &AnalysisReport,
        plan: &ReplenishmentPlan,
        orchestration: &OrchestrationReport,
        status: ExecutionStatus,
    ) -> Self {
        let mut actions_taken = vec![
            format!("Identified root cause: {}", analysis.root_cause),
            format!(
                "Generated replenishment plan for {} units",
                plan.net_requirement
            ),
        ];
        for step in &orchestration.steps {
            if step.status.is_completed() {
                actions_taken.push(format!("Completed: {}", step.name));
            }
        }

        Self {
            subject: analysis.subject_name.clone(),
            execution_status: status,
            steps_completed: format!(
                "{}/{}",
                orchestration.succeeded_count(),
                orchestration.steps.len()
            ),
            root_cause: analysis.root_cause,
            confidence: analysis.confidence,
            replenishment_qty: plan.net_requirement,
            actions_taken,
        }
    }
}

/// The disruption pipeline: trigger → analyze → plan → orchestrate → record.
///
/// Explicitly constructed per process; holds no global mutable state.
pub struct DisruptionPipeline<L, H, S> {
    ledger: L,
    thresholds: S,
    analyzer: RootCauseAnalyzer<H>,
    planner: ReplenishmentPlanner,
    orchestrator: Orchestrator,
    queue: Arc<AlertQueue>,
}

impl<L, H, S> DisruptionPipeline<L, H, S>
where
    L: ExecutionLedger,
    H: HistoryStore,
    S: ThresholdStore,
{
    pub fn new(ledger: L, history: H, thresholds: S, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            ledger,
            thresholds,
            analyzer: RootCauseAnalyzer::new(history),
            planner: ReplenishmentPlanner::new(),
            orchestrator: Orchestrator::new(invoker),
            queue: AlertQueue::arc(),
        }
    }

    /// Replace the analyzer (e.g. to tune the deviation threshold).
    pub fn with_analyzer(mut self, analyzer: RootCauseAnalyzer<H>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Replace the orchestrator (e.g. to tighten the per-step timeout).
    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// The queue feeding the background worker.
    pub fn queue(&self) -> Arc<AlertQueue> {
        Arc::clone(&self.queue)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Synchronous trigger path: classify an observation, open an alert if a
    /// disruption condition holds, and enqueue it for execution.
    ///
    /// Never calls external services; safe to run inside the inventory
    /// write's transaction boundary.
    pub fn observe(&self, observation: &StockObservation) -> Result<Observed, PipelineError> {
        observation.validate()?;

        let config = self.thresholds.get_or_init(observation.tenant_id);
        let active = self
            .ledger
            .find_active_alert(observation.tenant_id, observation.subject_id)?;

        let Some(decision) = evaluate(observation, &config, active.is_some()) else {
            return Ok(Observed::NoAction);
        };

        let alert = Alert::new(
            observation.tenant_id,
            observation.subject_id,
            observation.subject_name.clone(),
            decision.kind,
            decision.priority,
            decision.reason,
            observation.new_quantity,
            observation.required_quantity,
        );

        let created = match self.ledger.create_alert(alert) {
            Ok(alert) => alert,
            // Lost a race with a concurrent observer; the invariant held.
            Err(LedgerError::ActiveAlertExists(_)) => return Ok(Observed::NoAction),
            Err(e) => return Err(e.into()),
        };

        info!(
            alert_id = %created.id,
            subject_id = %created.subject_id,
            reason = %created.trigger_reason,
            priority = %created.priority,
            quantity = created.observed_quantity,
            "disruption alert opened"
        );

        self.queue.enqueue(QueuedAlert {
            tenant_id: created.tenant_id,
            alert_id: created.id,
        });

        Ok(Observed::Triggered(created))
    }

    /// Asynchronous execution path: analyze, plan, orchestrate and record.
    ///
    /// The alert always ends `Resolved` once its execution reaches a terminal
    /// state, whatever the success/failure mix.
    pub fn run_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Execution, PipelineError> {
        let alert = self
            .ledger
            .get_alert(tenant_id, alert_id)?
            .ok_or(PipelineError::AlertNotFound(alert_id))?;

        self.ledger.mark_alert_analyzing(tenant_id, alert_id)?;

        let execution = match self.ledger.create_execution(tenant_id, alert_id) {
            Ok(execution) => execution,
            Err(LedgerError::ActiveExecutionExists(_)) => {
                return Err(PipelineError::ExecutionAlreadyActive(alert_id));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            execution_id = %execution.id,
            alert_id = %alert_id,
            subject = %alert.subject_name,
            "pipeline execution started"
        );

        let now = Utc::now();
        let analysis = self.analyzer.analyze(tenant_id, alert.subject_id, now);

        if !analysis.subject_found {
            // Pipeline-start failure: no plan can be produced. This is the
            // only class that yields a failed execution.
            warn!(
                execution_id = %execution.id,
                subject_id = %alert.subject_id,
                "subject unknown to the records store; failing execution"
            );
            let summary = json!({
                "subject": alert.subject_name,
                "execution_status": ExecutionStatus::Failed,
                "error": "subject not found in historical records",
                "retryable": false,
            });
            let finalized = self.ledger.finalize_execution(
                tenant_id,
                execution.id,
                ExecutionOutcome::failed(summary),
            )?;
            self.ledger.resolve_alert(tenant_id, alert_id)?;
            return Ok(finalized);
        }

        let plan = self.planner.plan(
            &PlanRequest {
                subject_id: alert.subject_id,
                subject_name: alert.subject_name.clone(),
                current_stock: alert.observed_quantity,
                priority: alert.priority,
                root_cause: analysis.root_cause,
                evidence: analysis.evidence.clone(),
            },
            now,
        );

        let config = self.thresholds.get_or_init(tenant_id);
        let context = StepContext {
            tenant_id,
            alert_id,
            execution_id: execution.id,
            subject_id: alert.subject_id,
            subject_name: alert.subject_name.clone(),
            current_stock: alert.observed_quantity,
            required_quantity: alert.required_quantity,
            priority: alert.priority,
            root_cause: analysis.root_cause,
            confidence: analysis.confidence,
            recipients: config.notification_targets.clone(),
        };

        let ledger = &self.ledger;
        let execution_id = execution.id;
        let orchestration = self.orchestrator.execute(&context, &plan, |outcome| {
            let step = WorkflowStep {
                id: StepId::new(),
                execution_id,
                step_number: outcome.step_number,
                name: outcome.name.as_str().to_string(),
                status: match &outcome.status {
                    StepStatus::Completed => WorkflowStepStatus::Completed,
                    StepStatus::Failed { error } => WorkflowStepStatus::Failed {
                        error: error.clone(),
                    },
                },
                input_snapshot: outcome.input.clone(),
                output_snapshot: outcome.output.clone(),
                started_at: Some(outcome.started_at),
                completed_at: Some(outcome.completed_at),
            };
            // Step persistence failures are recorded in the log, not allowed
            // to abort the remaining steps.
            if let Err(e) = ledger.append_step(tenant_id, execution_id, step) {
                error!(
                    execution_id = %execution_id,
                    step_number = outcome.step_number,
                    error = %e,
                    "failed to persist workflow step"
                );
            }
        });

        let status = match orchestration.status {
            OrchestrationStatus::Completed => ExecutionStatus::Completed,
            OrchestrationStatus::PartialSuccess => ExecutionStatus::PartialSuccess,
        };

        let summary = ExecutionSummary::build(&analysis, &plan, &orchestration, status);
        let outcome = ExecutionOutcome {
            status,
            root_cause: Some(analysis.root_cause),
            confidence_score: Some(analysis.confidence),
            analysis_snapshot: serde_json::to_value(&analysis)
                .unwrap_or(serde_json::Value::Null),
            solution_snapshot: serde_json::to_value(&plan).unwrap_or(serde_json::Value::Null),
            orchestration_snapshot: serde_json::to_value(&orchestration)
                .unwrap_or(serde_json::Value::Null),
            summary: serde_json::to_value(&summary).unwrap_or(serde_json::Value::Null),
        };

        let finalized = self
            .ledger
            .finalize_execution(tenant_id, execution.id, outcome)?;
        self.ledger.resolve_alert(tenant_id, alert_id)?;

        info!(
            execution_id = %finalized.id,
            status = finalized.status.as_str(),
            steps = %summary.steps_completed,
            "pipeline execution finished"
        );

        Ok(finalized)
    }
}
