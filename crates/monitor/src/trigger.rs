//! Trigger classification for stock observations.

use serde::{Deserialize, Serialize};

use stockpilot_core::Priority;
use stockpilot_policy::ThresholdConfig;

use crate::observation::StockObservation;

/// Observed quantities strictly below this always escalate to `Critical`.
const CRITICAL_QUANTITY_FLOOR: i64 = 5;

/// What kind of disruption an alert describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Stock at or below the tenant's critical level.
    LowInventory,
    /// Demand exceeds availability.
    HighDemand,
    /// Both conditions at once.
    Critical,
}

/// Why the monitor decided to open an alert.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    NewSubjectCritical,
    NewSubjectHighDemand,
    NewSubjectLowStock,
    CriticalHighDemandLowStock,
    HighDemandDetected,
    LowStockNoHistory,
    StockDroppedBelowThreshold,
    LowStockDecreasedFurther,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::NewSubjectCritical => "new-subject-critical",
            TriggerReason::NewSubjectHighDemand => "new-subject-high-demand",
            TriggerReason::NewSubjectLowStock => "new-subject-low-stock",
            TriggerReason::CriticalHighDemandLowStock => "critical-high-demand-low-stock",
            TriggerReason::HighDemandDetected => "high-demand-detected",
            TriggerReason::LowStockNoHistory => "low-stock-no-history",
            TriggerReason::StockDroppedBelowThreshold => "stock-dropped-below-threshold",
            TriggerReason::LowStockDecreasedFurther => "low-stock-decreased-further",
        }
    }
}

impl core::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a positive trigger evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub kind: AlertKind,
    pub priority: Priority,
    pub reason: TriggerReason,
}

/// Decide whether an observation warrants opening an alert.
///
/// Returns `None` for "no action". The precedence is fixed:
///
/// 1. an already-active alert absorbs the observation, however severe;
/// 2. new subjects trigger on low stock or high demand;
/// 3. existing subjects are only evaluated when auto-resolution is enabled:
///    high demand always triggers, low stock triggers only on a *worsening*
///    transition. A low reading that is improving never triggers, so alert
///    storms cannot form while stock recovers.
pub fn evaluate(
    observation: &StockObservation,
    config: &ThresholdConfig,
    has_active_alert: bool,
) -> Option<TriggerDecision> {
    let is_low_stock = observation.new_quantity <= config.critical_level;
    let is_high_demand = observation.is_high_demand();

    if has_active_alert {
        return None;
    }

    let reason = if observation.is_new_subject {
        match (is_low_stock, is_high_demand) {
            (true, true) => TriggerReason::NewSubjectCritical,
            (false, true) => TriggerReason::NewSubjectHighDemand,
            (true, false) => TriggerReason::NewSubjectLowStock,
            (false, false) => return None,
        }
    } else {
        if !config.auto_resolution_enabled {
            return None;
        }
        if is_high_demand {
            if is_low_stock {
                TriggerReason::CriticalHighDemandLowStock
            } else {
                TriggerReason::HighDemandDetected
            }
        } else if is_low_stock {
            match observation.previous_quantity {
                None => TriggerReason::LowStockNoHistory,
                Some(prev) if prev > config.critical_level => {
                    TriggerReason::StockDroppedBelowThreshold
                }
                Some(prev) if prev > observation.new_quantity => {
                    TriggerReason::LowStockDecreasedFurther
                }
                // Low but flat or recovering: no trigger.
                Some(_) => return None,
            }
        } else {
            return None;
        }
    };

    let kind = match (is_low_stock, is_high_demand) {
        (true, true) => AlertKind::Critical,
        (false, true) => AlertKind::HighDemand,
        _ => AlertKind::LowInventory,
    };

    let priority = if observation.new_quantity < CRITICAL_QUANTITY_FLOOR {
        Priority::Critical
    } else {
        Priority::High
    };

    Some(TriggerDecision {
        kind,
        priority,
        reason,
    })
}
