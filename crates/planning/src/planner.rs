//! Replenishment plan computation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_analysis::{Evidence, RootCause};
use stockpilot_core::{Priority, SubjectId};

use crate::plan::{
    ActionItem, ActionKind, ReplenishmentPlan, ShippingMethod, SourceKind, SourcingStrategy,
    Timeline,
};

/// Daily rate substituted when the consumption evidence has no data at all.
const FALLBACK_DAILY_RATE: f64 = 10.0;

/// Net requirements above this force a split order even at lower priorities.
const SPLIT_ORDER_QTY: i64 = 1000;

/// Everything the planner needs to know about one disruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub current_stock: i64,
    pub priority: Priority,
    pub root_cause: RootCause,
    pub evidence: Evidence,
}

/// Pure replenishment planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplenishmentPlanner;

impl ReplenishmentPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Compute the plan for a disruption as of `now`.
    pub fn plan(&self, request: &PlanRequest, now: DateTime<Utc>) -> ReplenishmentPlan {
        let horizon_days = horizon_days(request.priority);
        let daily_rate = daily_rate(&request.evidence);
        let safety_factor = safety_factor(request.root_cause);

        let base_quantity = daily_rate * horizon_days as f64;
        let total_replenishment_qty = (base_quantity * safety_factor).round() as i64;
        let net_requirement = (total_replenishment_qty - request.current_stock).max(0);

        let sourcing = sourcing_strategy(net_requirement, request.priority, request.root_cause);
        let timeline = timeline(&sourcing, now);
        let action_items = action_items(request, net_requirement, &sourcing, &timeline, now);

        let estimated_stockout = if daily_rate > 0.0 {
            let days_left = request.current_stock as f64 / daily_rate;
            Some(now + Duration::seconds((days_left * 86_400.0) as i64))
        } else {
            None
        };

        ReplenishmentPlan {
            subject_id: request.subject_id,
            subject_name: request.subject_name.clone(),
            current_stock: request.current_stock,
            priority: request.priority,
            root_cause: request.root_cause,
            daily_consumption_rate: daily_rate,
            horizon_days,
            safety_factor,
            total_replenishment_qty,
            net_requirement,
            sourcing,
            timeline,
            action_items,
            estimated_stockout,
            confidence_score: confidence_score(&request.evidence),
        }
    }
}

/// Replenishment horizon by priority: the more urgent the disruption, the
/// shorter the window the plan covers.
fn horizon_days(priority: Priority) -> i64 {
    match priority {
        Priority::Critical => 14,
        Priority::High => 21,
        Priority::Medium => 30,
        Priority::Low => 45,
    }
}

fn daily_rate(evidence: &Evidence) -> f64 {
    if evidence.consumption.data_available {
        evidence.consumption.recent_daily_average
    } else {
        FALLBACK_DAILY_RATE
    }
}

/// Safety buffer on top of the base quantity, by root cause.
fn safety_factor(cause: RootCause) -> f64 {
    match cause {
        RootCause::DemandSurge => 1.5,
        RootCause::SupplierDelay => 1.3,
        RootCause::ForecastError => 1.4,
        _ => 1.2,
    }
}

fn sourcing_strategy(
    net_requirement: i64,
    priority: Priority,
    root_cause: RootCause,
) -> SourcingStrategy {
    let mut strategy = SourcingStrategy::default();

    if priority >= Priority::High || net_requirement > SPLIT_ORDER_QTY {
        strategy.split_order = true;
        strategy
            .backup_sources
            .push(SourceKind::AlternativeSupplier);
    }

    if root_cause == RootCause::SupplierDelay {
        strategy.primary_source = SourceKind::AlternativeSupplier;
        strategy.shipping_method = ShippingMethod::Expedited;
    }

    if priority == Priority::Critical {
        strategy.shipping_method = ShippingMethod::Express;
        strategy.backup_sources.push(SourceKind::SpotMarket);
        strategy.backup_sources.push(SourceKind::InternalTransfer);
    }

    strategy
}

fn timeline(sourcing: &SourcingStrategy, now: DateTime<Utc>) -> Timeline {
    let lead_time_days = (sourcing.primary_source.base_lead_time_days()
        + sourcing.shipping_method.lead_time_adjustment_days())
    .max(1);

    Timeline {
        order_placement: now,
        expected_delivery: now + Duration::days(lead_time_days),
        lead_time_days,
        source: sourcing.primary_source,
        shipping_method: sourcing.shipping_method,
    }
}

fn action_items(
    request: &PlanRequest,
    net_requirement: i64,
    sourcing: &SourcingStrategy,
    timeline: &Timeline,
    now: DateTime<Utc>,
) -> Vec<ActionItem> {
    let name = &request.subject_name;
    let mut items = vec![
        ActionItem {
            sequence: 1,
            kind: ActionKind::PlaceReplenishmentOrder,
            description: format!("Place order for {net_requirement} units of {name}"),
            quantity: Some(net_requirement),
            source: Some(sourcing.primary_source),
            priority: Priority::High,
            deadline: Some(timeline.order_placement),
            ongoing: false,
            assigned_team: "procurement".to_string(),
        },
        ActionItem {
            sequence: 2,
            kind: ActionKind::CoordinateLogistics,
            description: format!(
                "Arrange {} shipping for {name}",
                sourcing.shipping_method.as_str()
            ),
            quantity: None,
            source: None,
            priority: Priority::High,
            deadline: Some(timeline.order_placement),
            ongoing: false,
            assigned_team: "logistics".to_string(),
        },
        ActionItem {
            sequence: 3,
            kind: ActionKind::UpdateForecast,
            description: format!("Update inventory forecast for {name}"),
            quantity: None,
            source: None,
            priority: Priority::Medium,
            deadline: Some(now + Duration::days(1)),
            ongoing: false,
            assigned_team: "planning".to_string(),
        },
        ActionItem {
            sequence: 4,
            kind: ActionKind::MonitorStock,
            description: format!("Daily monitoring of {name} stock levels"),
            quantity: None,
            source: None,
            priority: Priority::High,
            deadline: None,
            ongoing: true,
            assigned_team: "inventory".to_string(),
        },
    ];

    if sourcing.split_order {
        let backup_quantity = net_requirement / 2;
        items.push(ActionItem {
            sequence: 5,
            kind: ActionKind::PlaceBackupOrder,
            description: format!("Place backup order for {backup_quantity} units of {name}"),
            quantity: Some(backup_quantity),
            source: Some(SourceKind::AlternativeSupplier),
            priority: Priority::Medium,
            deadline: Some(now + Duration::days(1)),
            ongoing: false,
            assigned_team: "procurement".to_string(),
        });
    }

    items
}

/// Confidence starts at 0.5 and earns bonuses for data quality, capped at 1.
fn confidence_score(evidence: &Evidence) -> f64 {
    let mut score: f64 = 0.5;

    if evidence.consumption.recent_order_count > 5 {
        score += 0.1;
    }
    if evidence.forecast.forecast_accuracy.unwrap_or(0.0) > 70.0 {
        score += 0.2;
    }
    if evidence.consumption.historical_order_count > 20 {
        score += 0.1;
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockpilot_analysis::ConsumptionAnalysis;

    fn evidence_with_rate(rate: f64) -> Evidence {
        Evidence {
            consumption: ConsumptionAnalysis {
                recent_daily_average: rate,
                data_available: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn request(priority: Priority, root_cause: RootCause, stock: i64, rate: f64) -> PlanRequest {
        PlanRequest {
            subject_id: SubjectId::new(),
            subject_name: "quicklime".to_string(),
            current_stock: stock,
            priority,
            root_cause,
            evidence: evidence_with_rate(rate),
        }
    }

    #[test]
    fn critical_demand_surge_plan_matches_policy() {
        let now = Utc::now();
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::Critical, RootCause::DemandSurge, 3, 16.0),
            now,
        );

        assert_eq!(plan.horizon_days, 14);
        assert_eq!(plan.safety_factor, 1.5);
        // 16 * 14 * 1.5 = 336; minus 3 in stock.
        assert_eq!(plan.total_replenishment_qty, 336);
        assert_eq!(plan.net_requirement, 333);
        assert_eq!(plan.sourcing.shipping_method, ShippingMethod::Express);
        assert!(plan.sourcing.split_order);
        assert_eq!(
            plan.sourcing.backup_sources,
            vec![
                SourceKind::AlternativeSupplier,
                SourceKind::SpotMarket,
                SourceKind::InternalTransfer
            ]
        );
        // Existing supplier (7) with express (-4).
        assert_eq!(plan.timeline.lead_time_days, 3);
        assert_eq!(plan.timeline.expected_delivery, now + Duration::days(3));
    }

    #[test]
    fn supplier_delay_switches_source_and_expedites() {
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::Medium, RootCause::SupplierDelay, 50, 4.0),
            Utc::now(),
        );

        assert_eq!(plan.sourcing.primary_source, SourceKind::AlternativeSupplier);
        assert_eq!(plan.sourcing.shipping_method, ShippingMethod::Expedited);
        assert!(!plan.sourcing.split_order);
        // Alternative supplier (10) with expedited (-2).
        assert_eq!(plan.timeline.lead_time_days, 8);
    }

    #[test]
    fn large_net_requirement_forces_split_at_low_priority() {
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::Low, RootCause::NoReplenishment, 0, 30.0),
            Utc::now(),
        );

        // 30 * 45 * 1.2 = 1620 > 1000.
        assert!(plan.net_requirement > SPLIT_ORDER_QTY);
        assert!(plan.sourcing.split_order);
        assert_eq!(plan.action_items.len(), 5);
        let backup = plan.action_items.last().unwrap();
        assert_eq!(backup.kind, ActionKind::PlaceBackupOrder);
        assert_eq!(backup.quantity, Some(plan.net_requirement / 2));
    }

    #[test]
    fn stock_covers_requirement_nets_to_zero() {
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::Low, RootCause::InventoryManagement, 10_000, 2.0),
            Utc::now(),
        );
        assert_eq!(plan.net_requirement, 0);
    }

    #[test]
    fn action_template_is_ordered_and_fixed() {
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::Medium, RootCause::ForecastError, 20, 5.0),
            Utc::now(),
        );

        let kinds: Vec<_> = plan.action_items.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::PlaceReplenishmentOrder,
                ActionKind::CoordinateLogistics,
                ActionKind::UpdateForecast,
                ActionKind::MonitorStock,
            ]
        );
        let sequences: Vec<_> = plan.action_items.iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[test]
    fn zero_rate_means_no_stockout_estimate() {
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::Medium, RootCause::NoReplenishment, 40, 0.0),
            Utc::now(),
        );
        assert!(plan.estimated_stockout.is_none());
    }

    #[test]
    fn stockout_estimate_scales_with_rate() {
        let now = Utc::now();
        let plan = ReplenishmentPlanner::new().plan(
            &request(Priority::High, RootCause::DemandSurge, 40, 8.0),
            now,
        );
        // 40 / 8 = 5 days of stock left.
        assert_eq!(plan.estimated_stockout, Some(now + Duration::days(5)));
    }

    #[test]
    fn missing_consumption_data_uses_fallback_rate() {
        let mut req = request(Priority::High, RootCause::DemandSurge, 0, 0.0);
        req.evidence.consumption.data_available = false;

        let plan = ReplenishmentPlanner::new().plan(&req, Utc::now());
        assert_eq!(plan.daily_consumption_rate, FALLBACK_DAILY_RATE);
        // 10 * 21 * 1.5 = 315.
        assert_eq!(plan.total_replenishment_qty, 315);
    }

    #[test]
    fn confidence_earns_data_quality_bonuses() {
        let mut req = request(Priority::High, RootCause::DemandSurge, 5, 12.0);
        assert_eq!(
            ReplenishmentPlanner::new()
                .plan(&req, Utc::now())
                .confidence_score,
            0.5
        );

        req.evidence.consumption.recent_order_count = 6;
        req.evidence.consumption.historical_order_count = 21;
        req.evidence.forecast.forecast_accuracy = Some(85.0);

        let score = ReplenishmentPlanner::new()
            .plan(&req, Utc::now())
            .confidence_score;
        assert!((score - 0.9).abs() < 1e-9);
    }

    proptest! {
        /// Raising priority shrinks the horizon and never lengthens the
        /// lead time, all else equal.
        #[test]
        fn priority_monotonicity(stock in 0i64..500, rate in 0.5f64..50.0) {
            let now = Utc::now();
            let planner = ReplenishmentPlanner::new();
            let priorities = [Priority::Low, Priority::Medium, Priority::High, Priority::Critical];

            let plans: Vec<_> = priorities
                .iter()
                .map(|p| planner.plan(&request(*p, RootCause::DemandSurge, stock, rate), now))
                .collect();

            for pair in plans.windows(2) {
                prop_assert!(pair[1].horizon_days < pair[0].horizon_days);
                prop_assert!(pair[1].timeline.lead_time_days <= pair[0].timeline.lead_time_days);
            }
        }

        /// Net requirement never goes negative and the split-order backup is
        /// always half of it.
        #[test]
        fn net_requirement_invariants(stock in 0i64..5000, rate in 0.0f64..100.0) {
            let plan = ReplenishmentPlanner::new().plan(
                &request(Priority::Critical, RootCause::DemandSurge, stock, rate),
                Utc::now(),
            );
            prop_assert!(plan.net_requirement >= 0);
            if let Some(backup) = plan
                .action_items
                .iter()
                .find(|a| a.kind == ActionKind::PlaceBackupOrder)
            {
                prop_assert_eq!(backup.quantity, Some(plan.net_requirement / 2));
            }
        }
    }
}
