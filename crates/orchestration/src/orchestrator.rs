//! Step execution and final status derivation.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use stockpilot_planning::ReplenishmentPlan;

use crate::invoker::{ToolError, ToolInvoker};
use crate::steps::{step_params, StepContext, StepName};

/// Default budget for a single external call.
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal status of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed { error: String },
}

impl StepStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepStatus::Completed)
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 1-based position in the fixed step order.
    pub step_number: u32,
    pub name: StepName,
    pub status: StepStatus,
    pub input: JsonValue,
    pub output: Option<JsonValue>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Overall orchestration status.
///
/// `Completed` requires every step to succeed. Anything else, including a
/// run where every external step failed, is `PartialSuccess`: the plan and
/// audit record still exist. `Failed` executions are produced one level up,
/// when the pipeline could not start orchestration at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Completed,
    PartialSuccess,
}

/// Full record of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub status: OrchestrationStatus,
    pub steps: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub summary: String,
}

impl OrchestrationReport {
    pub fn succeeded_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status.is_completed())
            .count()
    }
}

/// Executes the fixed step template against a tool invoker.
pub struct Orchestrator {
    invoker: Arc<dyn ToolInvoker>,
    step_timeout: Duration,
}

impl Orchestrator {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Run every step in order, reporting each finished step through
    /// `on_step` before moving to the next.
    ///
    /// A step failure is recorded and the remaining steps still run.
    pub fn execute(
        &self,
        context: &StepContext,
        plan: &ReplenishmentPlan,
        mut on_step: impl FnMut(&StepOutcome),
    ) -> OrchestrationReport {
        let started_at = Utc::now();
        let mut steps = Vec::with_capacity(StepName::ALL.len());

        for (index, name) in StepName::ALL.iter().enumerate() {
            let step_number = index as u32 + 1;
            let params = step_params(*name, context, plan, Utc::now());
            let step_started = Utc::now();

            let result = invoke_with_timeout(
                Arc::clone(&self.invoker),
                name.as_str(),
                params.clone(),
                self.step_timeout,
            );

            let outcome = match result {
                Ok(output) => {
                    info!(
                        execution_id = %context.execution_id,
                        step = %name,
                        step_number,
                        "orchestration step completed"
                    );
                    StepOutcome {
                        step_number,
                        name: *name,
                        status: StepStatus::Completed,
                        input: params,
                        output: Some(output),
                        started_at: step_started,
                        completed_at: Utc::now(),
                    }
                }
                Err(error) => {
                    warn!(
                        execution_id = %context.execution_id,
                        step = %name,
                        step_number,
                        error = %error,
                        "orchestration step failed; continuing"
                    );
                    StepOutcome {
                        step_number,
                        name: *name,
                        status: StepStatus::Failed {
                            error: error.to_string(),
                        },
                        input: params,
                        output: None,
                        started_at: step_started,
                        completed_at: Utc::now(),
                    }
                }
            };

            on_step(&outcome);
            steps.push(outcome);
        }

        let succeeded = steps.iter().filter(|s| s.status.is_completed()).count();
        let status = if succeeded == steps.len() {
            OrchestrationStatus::Completed
        } else {
            OrchestrationStatus::PartialSuccess
        };

        let summary = format!(
            "Replenishment workflow for {}: {}/{} steps successful",
            context.subject_name,
            succeeded,
            steps.len()
        );

        OrchestrationReport {
            status,
            steps,
            started_at,
            completed_at: Utc::now(),
            summary,
        }
    }
}

/// Run one invocation on its own thread, bounded by `timeout`.
///
/// A call that never returns is abandoned: its eventual result is discarded
/// and the step is recorded as a timeout failure like any other.
fn invoke_with_timeout(
    invoker: Arc<dyn ToolInvoker>,
    action: &str,
    params: JsonValue,
    timeout: Duration,
) -> Result<JsonValue, ToolError> {
    let (tx, rx) = mpsc::channel();
    let action_owned = action.to_string();

    thread::spawn(move || {
        let result = invoker.invoke(&action_owned, &params);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(ToolError::Timeout {
            action: action.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::RecordingToolInvoker;
    use stockpilot_analysis::{Evidence, RootCause};
    use stockpilot_core::{AlertId, ExecutionId, Priority, SubjectId, TenantId};
    use stockpilot_planning::{PlanRequest, ReplenishmentPlanner};

    fn context() -> StepContext {
        StepContext {
            tenant_id: TenantId::new(),
            alert_id: AlertId::new(),
            execution_id: ExecutionId::new(),
            subject_id: SubjectId::new(),
            subject_name: "rebar".to_string(),
            current_stock: 3,
            required_quantity: 25,
            priority: Priority::Critical,
            root_cause: RootCause::DemandSurge,
            confidence: 0.8,
            recipients: Vec::new(),
        }
    }

    fn plan(ctx: &StepContext) -> ReplenishmentPlan {
        ReplenishmentPlanner::new().plan(
            &PlanRequest {
                subject_id: ctx.subject_id,
                subject_name: ctx.subject_name.clone(),
                current_stock: ctx.current_stock,
                priority: ctx.priority,
                root_cause: ctx.root_cause,
                evidence: Evidence::default(),
            },
            Utc::now(),
        )
    }

    struct HangingInvoker;

    impl ToolInvoker for HangingInvoker {
        fn invoke(&self, _action: &str, _params: &JsonValue) -> Result<JsonValue, ToolError> {
            thread::sleep(Duration::from_secs(60));
            Ok(JsonValue::Null)
        }
    }

    #[test]
    fn all_steps_succeed_means_completed() {
        let invoker = RecordingToolInvoker::arc();
        let orchestrator = Orchestrator::new(invoker.clone());
        let ctx = context();

        let report = orchestrator.execute(&ctx, &plan(&ctx), |_| {});

        assert_eq!(report.status, OrchestrationStatus::Completed);
        assert_eq!(report.steps.len(), 6);
        assert_eq!(report.succeeded_count(), 6);
        assert_eq!(
            invoker.invoked_actions(),
            StepName::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn one_failure_is_partial_success_and_later_steps_still_run() {
        let invoker = RecordingToolInvoker::arc();
        invoker.fail_action("post_team_alert");
        let orchestrator = Orchestrator::new(invoker.clone());
        let ctx = context();

        let report = orchestrator.execute(&ctx, &plan(&ctx), |_| {});

        assert_eq!(report.status, OrchestrationStatus::PartialSuccess);
        assert_eq!(report.succeeded_count(), 5);
        // All six steps were attempted despite the failure at step 2.
        assert_eq!(invoker.invocations().len(), 6);
        assert!(matches!(report.steps[1].status, StepStatus::Failed { .. }));
        assert!(report.steps[2].status.is_completed());
    }

    #[test]
    fn all_failures_is_still_partial_success() {
        let invoker = RecordingToolInvoker::arc();
        for name in StepName::ALL {
            invoker.fail_action(name.as_str());
        }
        let orchestrator = Orchestrator::new(invoker);
        let ctx = context();

        let report = orchestrator.execute(&ctx, &plan(&ctx), |_| {});

        // The plan was produced; failed delivery of every step is partial.
        assert_eq!(report.status, OrchestrationStatus::PartialSuccess);
        assert_eq!(report.succeeded_count(), 0);
    }

    #[test]
    fn step_numbers_are_strictly_increasing() {
        let orchestrator = Orchestrator::new(RecordingToolInvoker::arc());
        let ctx = context();
        let mut observed = Vec::new();

        let report = orchestrator.execute(&ctx, &plan(&ctx), |s| observed.push(s.step_number));

        assert_eq!(observed, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(
            report.steps.iter().map(|s| s.step_number).collect::<Vec<_>>(),
            observed
        );
    }

    #[test]
    fn hanging_step_times_out_and_is_recorded_as_failed() {
        let orchestrator = Orchestrator::new(Arc::new(HangingInvoker))
            .with_step_timeout(Duration::from_millis(50));
        let ctx = context();

        let report = orchestrator.execute(&ctx, &plan(&ctx), |_| {});

        assert_eq!(report.status, OrchestrationStatus::PartialSuccess);
        assert_eq!(report.succeeded_count(), 0);
        for step in &report.steps {
            match &step.status {
                StepStatus::Failed { error } => assert!(error.contains("timed out")),
                StepStatus::Completed => panic!("hanging step should not complete"),
            }
        }
    }

    #[test]
    fn summary_counts_successes() {
        let invoker = RecordingToolInvoker::arc();
        invoker.fail_action("append_tracking_log");
        let orchestrator = Orchestrator::new(invoker);
        let ctx = context();

        let report = orchestrator.execute(&ctx, &plan(&ctx), |_| {});
        assert!(report.summary.contains("5/6 steps successful"));
    }
}
