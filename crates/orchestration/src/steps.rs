//! The fixed step template and its parameter payloads.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use stockpilot_analysis::RootCause;
use stockpilot_core::{AlertId, ExecutionId, Priority, SubjectId, TenantId};
use stockpilot_planning::ReplenishmentPlan;

/// Contacts used when a tenant has no notification targets configured.
pub const FALLBACK_RECIPIENTS: [&str; 2] =
    ["procurement@company.example", "operations@company.example"];

/// The ordered, fixed set of external actions per execution.
///
/// The order is part of the contract: step numbers are assigned from this
/// sequence and never reordered or skipped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    NotifySuppliers,
    PostTeamAlert,
    CreateTrackingProject,
    ScheduleCoordinationMeeting,
    DraftReplenishmentOrders,
    AppendTrackingLog,
}

impl StepName {
    pub const ALL: [StepName; 6] = [
        StepName::NotifySuppliers,
        StepName::PostTeamAlert,
        StepName::CreateTrackingProject,
        StepName::ScheduleCoordinationMeeting,
        StepName::DraftReplenishmentOrders,
        StepName::AppendTrackingLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::NotifySuppliers => "notify_suppliers",
            StepName::PostTeamAlert => "post_team_alert",
            StepName::CreateTrackingProject => "create_tracking_project",
            StepName::ScheduleCoordinationMeeting => "schedule_coordination_meeting",
            StepName::DraftReplenishmentOrders => "draft_replenishment_orders",
            StepName::AppendTrackingLog => "append_tracking_log",
        }
    }
}

impl core::fmt::Display for StepName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a step payload needs to know about the disruption being
/// handled, beyond the plan itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub tenant_id: TenantId,
    pub alert_id: AlertId,
    pub execution_id: ExecutionId,
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub current_stock: i64,
    pub required_quantity: i64,
    pub priority: Priority,
    pub root_cause: RootCause,
    pub confidence: f64,
    /// Tenant-configured notification targets; may be empty.
    pub recipients: Vec<String>,
}

impl StepContext {
    fn recipients_or_fallback(&self) -> Vec<String> {
        if self.recipients.is_empty() {
            FALLBACK_RECIPIENTS.iter().map(|s| s.to_string()).collect()
        } else {
            self.recipients.clone()
        }
    }
}

/// Build the parameter map for one step.
pub fn step_params(
    name: StepName,
    context: &StepContext,
    plan: &ReplenishmentPlan,
    now: DateTime<Utc>,
) -> JsonValue {
    match name {
        StepName::NotifySuppliers => json!({
            "to": context.recipients_or_fallback(),
            "subject": format!(
                "URGENT: Critical stock shortage - {}",
                context.subject_name
            ),
            "body": format!(
                "Product: {}\nCurrent stock: {} units\nRequired quantity: {} units\n\
                 Priority: {}\n\nPlease confirm availability, earliest delivery for \
                 {} units, and current pricing.",
                context.subject_name,
                context.current_stock,
                context.required_quantity,
                context.priority,
                plan.net_requirement,
            ),
            "priority": context.priority,
        }),
        StepName::PostTeamAlert => {
            let channel = if context.priority == Priority::Critical {
                "#supply-chain-alerts"
            } else {
                "#supply-chain-updates"
            };
            json!({
                "channel": channel,
                "message": format!(
                    "STOCK ALERT [{}] {}: {} units on hand, root cause {}, \
                     replenishment of {} units initiated (execution {})",
                    context.priority,
                    context.subject_name,
                    context.current_stock,
                    context.root_cause,
                    plan.net_requirement,
                    context.execution_id,
                ),
            })
        }
        StepName::CreateTrackingProject => json!({
            "name": format!(
                "EMERGENCY_REPLENISHMENT_{}_{}",
                context.subject_name.to_uppercase().replace(' ', "_"),
                context.subject_id,
            ),
            "notes": format!(
                "Current stock: {} units. Root cause: {} (confidence {:.0}%).",
                context.current_stock,
                context.root_cause,
                context.confidence * 100.0,
            ),
            "tasks": plan
                .action_items
                .iter()
                .map(|item| json!({
                    "name": item.description,
                    "priority": item.priority,
                    "due_on": item.deadline.map(|d| d.date_naive().to_string()),
                }))
                .collect::<Vec<_>>(),
        }),
        StepName::ScheduleCoordinationMeeting => {
            let start = next_business_day_morning(now);
            json!({
                "subject": format!(
                    "URGENT: Emergency briefing - {} stock shortage",
                    context.subject_name
                ),
                "start": start,
                "end": start + Duration::minutes(30),
                "attendees": context.recipients_or_fallback(),
                "location": "Virtual",
                "is_online_meeting": true,
                "importance": "high",
            })
        }
        StepName::DraftReplenishmentOrders => {
            let mut orders = Vec::new();
            let (primary_qty, backup_qty) = if plan.sourcing.split_order {
                let backup = plan.net_requirement / 2;
                (plan.net_requirement - backup, backup)
            } else {
                (plan.net_requirement, 0)
            };

            orders.push(json!({
                "type": "primary_order",
                "subject_id": context.subject_id,
                "quantity": primary_qty,
                "source": plan.sourcing.primary_source,
                "shipping_method": plan.sourcing.shipping_method,
                "status": "draft_pending_approval",
            }));
            if backup_qty > 0 {
                orders.push(json!({
                    "type": "backup_order",
                    "subject_id": context.subject_id,
                    "quantity": backup_qty,
                    "source": "alternative_supplier",
                    "shipping_method": "standard",
                    "status": "draft_pending_approval",
                }));
            }

            json!({
                "orders": orders,
                "total_quantity": plan.net_requirement,
                "approval_required": true,
            })
        }
        StepName::AppendTrackingLog => json!({
            "range": "Inventory_Alerts!A:G",
            "values": [[
                now.to_rfc3339(),
                context.subject_name,
                context.current_stock,
                context.required_quantity,
                context.priority.as_str(),
                context.execution_id.to_string(),
                "auto-alert",
            ]],
        }),
    }
}

/// 09:00 UTC on the next weekday.
fn next_business_day_morning(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut day = now + Duration::days(1);
    while matches!(day.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
        day += Duration::days(1);
    }
    day.with_hour(9)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(day)
}
