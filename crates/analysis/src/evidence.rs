//! Evidence gathered for a disruption, one block per signal.
//!
//! Each block is computed independently and tolerates missing data by
//! defaulting to zero/false, so a subject with no history still produces a
//! complete (if empty) evidence set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{OrderRecord, OrderStatus};

/// Recent vs. historical consumption window lengths, in days.
pub const RECENT_WINDOW_DAYS: i64 = 7;
pub const HISTORICAL_WINDOW_DAYS: i64 = 23;
pub const LOOKBACK_DAYS: i64 = 30;

/// Change above this percentage is a demand surge.
pub const SURGE_CHANGE_PCT: f64 = 50.0;

/// Open orders older than this are considered delayed.
pub const DELAY_AGE_DAYS: f64 = 7.0;

/// Daily-average consumption over the recent window vs. the preceding one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionAnalysis {
    pub recent_consumption_7d: i64,
    pub historical_consumption_23d: i64,
    pub recent_daily_average: f64,
    pub historical_daily_average: f64,
    /// Percent change of recent vs. historical daily average. 100 when the
    /// historical rate is zero but the recent one is not.
    pub change_percentage: f64,
    pub indicates_surge: bool,
    pub data_available: bool,
    pub recent_order_count: usize,
    pub historical_order_count: usize,
}

impl ConsumptionAnalysis {
    pub fn from_orders(recent: &[OrderRecord], historical: &[OrderRecord]) -> Self {
        let recent_total: i64 = recent.iter().map(|o| o.quantity).sum();
        let historical_total: i64 = historical.iter().map(|o| o.quantity).sum();

        let recent_daily = recent_total as f64 / RECENT_WINDOW_DAYS as f64;
        let historical_daily = historical_total as f64 / HISTORICAL_WINDOW_DAYS as f64;

        let change_percentage = if historical_daily > 0.0 {
            (recent_daily - historical_daily) / historical_daily * 100.0
        } else if recent_daily > 0.0 {
            100.0
        } else {
            0.0
        };

        Self {
            recent_consumption_7d: recent_total,
            historical_consumption_23d: historical_total,
            recent_daily_average: recent_daily,
            historical_daily_average: historical_daily,
            change_percentage,
            indicates_surge: change_percentage > SURGE_CHANGE_PCT,
            data_available: recent_total > 0 || historical_total > 0,
            recent_order_count: recent.len(),
            historical_order_count: historical.len(),
        }
    }
}

/// Historical-average forecast vs. actual weekly consumption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastComparison {
    pub forecast_available: bool,
    pub avg_order_size: f64,
    pub order_count_30d: usize,
    pub expected_weekly_orders: f64,
    pub forecasted_weekly_consumption: f64,
    pub actual_weekly_consumption: f64,
    /// `|actual - forecast| / forecast`; zero when no forecast exists.
    pub deviation_ratio: f64,
    pub significant_deviation: bool,
    /// `100 * (1 - deviation_ratio)` clamped to [0, 100], when a forecast
    /// exists. Feeds the planner's confidence score.
    pub forecast_accuracy: Option<f64>,
}

impl ForecastComparison {
    /// Build from the last 30 days' fulfilled orders.
    ///
    /// `deviation_threshold` is the ratio above which the deviation counts
    /// as significant (owned by the analyzer, not hard-coded here).
    pub fn from_orders(
        last_30d: &[OrderRecord],
        actual_weekly_consumption: f64,
        deviation_threshold: f64,
    ) -> Self {
        if last_30d.is_empty() {
            return Self {
                actual_weekly_consumption,
                ..Self::default()
            };
        }

        let order_count = last_30d.len();
        let total: i64 = last_30d.iter().map(|o| o.quantity).sum();
        let avg_order_size = total as f64 / order_count as f64;

        // 30 days is roughly four weeks.
        let expected_weekly_orders = order_count as f64 / 4.0;
        let forecasted = avg_order_size * expected_weekly_orders;

        let deviation_ratio = if forecasted > 0.0 {
            (actual_weekly_consumption - forecasted).abs() / forecasted
        } else {
            0.0
        };

        let forecast_accuracy = if forecasted > 0.0 {
            Some((100.0 * (1.0 - deviation_ratio)).clamp(0.0, 100.0))
        } else {
            None
        };

        Self {
            forecast_available: true,
            avg_order_size,
            order_count_30d: order_count,
            expected_weekly_orders,
            forecasted_weekly_consumption: forecasted,
            actual_weekly_consumption,
            deviation_ratio,
            significant_deviation: forecasted > 0.0 && deviation_ratio > deviation_threshold,
            forecast_accuracy,
        }
    }
}

/// Delayed open orders as a proxy for supplier delivery performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplierPerformance {
    pub delayed_order_count: usize,
    pub avg_processing_days: f64,
    pub issues_detected: bool,
}

impl SupplierPerformance {
    pub fn from_open_orders(open: &[OrderRecord], now: DateTime<Utc>) -> Self {
        let cutoff = now - chrono::Duration::days(LOOKBACK_DAYS);
        let delayed: Vec<f64> = open
            .iter()
            .filter(|o| {
                matches!(o.status, OrderStatus::Pending | OrderStatus::Processing)
                    && o.ordered_at >= cutoff
            })
            .map(|o| (now - o.ordered_at).num_seconds() as f64 / 86_400.0)
            .filter(|age| *age > DELAY_AGE_DAYS)
            .collect();

        let delayed_order_count = delayed.len();
        let avg_processing_days = if delayed.is_empty() {
            0.0
        } else {
            delayed.iter().sum::<f64>() / delayed.len() as f64
        };

        Self {
            delayed_order_count,
            avg_processing_days,
            issues_detected: delayed_order_count > 0 || avg_processing_days > DELAY_AGE_DAYS,
        }
    }
}

/// Replenishment already in flight for the subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingReplenishment {
    pub pending_order_count: usize,
    pub total_pending_quantity: i64,
    pub oldest_pending_order: Option<DateTime<Utc>>,
    pub in_progress: bool,
}

impl PendingReplenishment {
    pub fn from_open_orders(open: &[OrderRecord]) -> Self {
        Self {
            pending_order_count: open.len(),
            total_pending_quantity: open.iter().map(|o| o.quantity).sum(),
            oldest_pending_order: open.iter().map(|o| o.ordered_at).min(),
            in_progress: !open.is_empty(),
        }
    }
}

/// The full evidence set for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub consumption: ConsumptionAnalysis,
    pub forecast: ForecastComparison,
    pub supplier: SupplierPerformance,
    pub replenishment: PendingReplenishment,
}
