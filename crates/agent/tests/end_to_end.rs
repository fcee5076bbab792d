//! Black-box run of the full pipeline: a stock drop on a surging subject
//! triggers an alert, the analyzer explains it, the planner sizes the
//! replenishment, the orchestrator drives the external actions, and the
//! ledger closes the loop.

use std::sync::Arc;

use chrono::{Duration, Utc};

use stockpilot_agent::{DisruptionPipeline, Observed, PipelineWorker};
use stockpilot_analysis::{
    InMemoryHistoryStore, OrderRecord, OrderStatus, RootCause, SubjectRecord,
};
use stockpilot_core::{Priority, SubjectId, TenantId};
use stockpilot_ledger::{
    AlertStatus, ExecutionLedger, ExecutionStatus, InMemoryLedger, WorkflowStepStatus,
};
use stockpilot_monitor::{StockObservation, TriggerReason};
use stockpilot_orchestration::{RecordingToolInvoker, ToolInvoker};
use stockpilot_policy::InMemoryThresholdStore;

struct World {
    pipeline: Arc<
        DisruptionPipeline<
            Arc<InMemoryLedger>,
            Arc<InMemoryHistoryStore>,
            Arc<InMemoryThresholdStore>,
        >,
    >,
    ledger: Arc<InMemoryLedger>,
    invoker: Arc<RecordingToolInvoker>,
    tenant: TenantId,
    subject: SubjectId,
}

/// Subject at 3 units with a 60% consumption surge in its history.
fn world() -> World {
    stockpilot_observability::init_with_filter("warn");

    let ledger = InMemoryLedger::arc();
    let history = InMemoryHistoryStore::arc();
    let thresholds = InMemoryThresholdStore::arc();
    let invoker = RecordingToolInvoker::arc();

    let tenant = TenantId::new();
    let subject = SubjectId::new();
    let now = Utc::now();

    history.put_subject(
        tenant,
        SubjectRecord {
            subject_id: subject,
            name: "portland cement".to_string(),
            available_quantity: 3,
        },
    );
    // Recent window: 112 units over 7 days (16/day).
    history.record_order(
        tenant,
        subject,
        OrderRecord {
            quantity: 112,
            ordered_at: now - Duration::days(2),
            status: OrderStatus::Delivered,
        },
    );
    // Historical window: 230 units over 23 days (10/day): a 60% surge.
    history.record_order(
        tenant,
        subject,
        OrderRecord {
            quantity: 230,
            ordered_at: now - Duration::days(15),
            status: OrderStatus::Delivered,
        },
    );

    let pipeline = DisruptionPipeline::new(
        Arc::clone(&ledger),
        Arc::clone(&history),
        thresholds,
        invoker.clone() as Arc<dyn ToolInvoker>,
    );

    World {
        pipeline: Arc::new(pipeline),
        ledger,
        invoker,
        tenant,
        subject,
    }
}

fn drop_below_threshold(world: &World) -> stockpilot_ledger::Alert {
    let observed = world
        .pipeline
        .observe(&StockObservation {
            tenant_id: world.tenant,
            subject_id: world.subject,
            subject_name: "portland cement".to_string(),
            previous_quantity: Some(30),
            new_quantity: 3,
            required_quantity: 0,
            is_new_subject: false,
        })
        .expect("observe");

    match observed {
        Observed::Triggered(alert) => alert,
        Observed::NoAction => panic!("expected the drop to trigger an alert"),
    }
}

#[test]
fn disruption_is_detected_explained_planned_and_resolved() {
    let world = world();

    // One scripted failure among the external actions.
    world.invoker.fail_action("schedule_coordination_meeting");

    let alert = drop_below_threshold(&world);
    assert_eq!(alert.priority, Priority::Critical);
    assert_eq!(alert.trigger_reason, TriggerReason::StockDroppedBelowThreshold);

    // A second mutation while the alert is active is absorbed.
    let absorbed = world
        .pipeline
        .observe(&StockObservation {
            tenant_id: world.tenant,
            subject_id: world.subject,
            subject_name: "portland cement".to_string(),
            previous_quantity: Some(3),
            new_quantity: 1,
            required_quantity: 0,
            is_new_subject: false,
        })
        .expect("observe");
    assert_eq!(absorbed, Observed::NoAction);
    assert_eq!(world.ledger.list_alerts(world.tenant, 10).unwrap().len(), 1);

    // Drain the queue the way the background worker would.
    let worker = PipelineWorker::new(Arc::clone(&world.pipeline));
    let status = worker
        .process_next()
        .expect("queued alert")
        .expect("pipeline run");
    assert_eq!(status, ExecutionStatus::PartialSuccess);
    assert!(worker.process_next().is_none());

    // The execution record carries the analysis, plan and step trail.
    let executions = world
        .ledger
        .list_executions_for_alert(world.tenant, alert.id)
        .unwrap();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];

    assert_eq!(execution.status, ExecutionStatus::PartialSuccess);
    assert_eq!(execution.root_cause, Some(RootCause::DemandSurge));
    assert_eq!(execution.confidence_score, Some(0.8));

    // Plan snapshot: critical priority → 14-day horizon; surge → 1.5 factor;
    // 16/day * 14 * 1.5 = 336, minus 3 on hand.
    let plan = &execution.solution_snapshot;
    assert_eq!(plan["horizon_days"], 14);
    assert_eq!(plan["safety_factor"], 1.5);
    assert_eq!(plan["net_requirement"], 333);

    // Step trail: six ordered steps, exactly one failed, later ones ran.
    let steps = world.ledger.list_steps(world.tenant, execution.id).unwrap();
    assert_eq!(steps.len(), 6);
    assert_eq!(
        steps.iter().map(|s| s.step_number).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );
    let failed: Vec<_> = steps
        .iter()
        .filter(|s| matches!(s.status, WorkflowStepStatus::Failed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "schedule_coordination_meeting");
    assert!(steps[5].status.is_terminal());

    // Summary names what happened and what didn't.
    assert_eq!(execution.summary["steps_completed"], "5/6");
    assert_eq!(execution.summary["root_cause"], "demand_surge");

    // The alert is closed, and the subject can alert again later.
    let alert = world
        .ledger
        .get_alert(world.tenant, alert.id)
        .unwrap()
        .unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert!(alert.resolved_at.is_some());
    assert!(world
        .ledger
        .find_active_alert(world.tenant, world.subject)
        .unwrap()
        .is_none());

    // All six external actions were attempted exactly once.
    assert_eq!(world.invoker.invocations().len(), 6);

    let stats = world.ledger.stats(world.tenant).unwrap();
    assert_eq!(stats.total_alerts, 1);
    assert_eq!(stats.resolved_alerts, 1);
    assert_eq!(stats.partial_executions, 1);
    assert_eq!(stats.total_steps, 6);
}

#[test]
fn clean_run_completes_and_reuses_nothing() {
    let world = world();

    let alert = drop_below_threshold(&world);
    let execution = world
        .pipeline
        .run_alert(world.tenant, alert.id)
        .expect("pipeline run");

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.summary["steps_completed"], "6/6");

    // Stock recovers, then breaches again: a fresh alert opens.
    let reopened = world
        .pipeline
        .observe(&StockObservation {
            tenant_id: world.tenant,
            subject_id: world.subject,
            subject_name: "portland cement".to_string(),
            previous_quantity: Some(50),
            new_quantity: 4,
            required_quantity: 0,
            is_new_subject: false,
        })
        .expect("observe");

    let Observed::Triggered(second) = reopened else {
        panic!("resolved subject should be able to alert again");
    };
    assert_ne!(second.id, alert.id);
    assert_eq!(world.ledger.list_alerts(world.tenant, 10).unwrap().len(), 2);
}
