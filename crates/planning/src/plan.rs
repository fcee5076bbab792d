//! Replenishment plan records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Priority, SubjectId};
use stockpilot_analysis::RootCause;

/// Where an order is sourced from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ExistingSupplier,
    AlternativeSupplier,
    SpotMarket,
    InternalTransfer,
}

impl SourceKind {
    /// Base lead time before shipping-speed adjustments, in days.
    pub fn base_lead_time_days(&self) -> i64 {
        match self {
            SourceKind::ExistingSupplier => 7,
            SourceKind::AlternativeSupplier => 10,
            SourceKind::SpotMarket => 3,
            SourceKind::InternalTransfer => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ExistingSupplier => "existing_supplier",
            SourceKind::AlternativeSupplier => "alternative_supplier",
            SourceKind::SpotMarket => "spot_market",
            SourceKind::InternalTransfer => "internal_transfer",
        }
    }
}

/// How fast the order ships.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Expedited,
    Express,
}

impl ShippingMethod {
    /// Days shaved off the base lead time.
    pub fn lead_time_adjustment_days(&self) -> i64 {
        match self {
            ShippingMethod::Standard => 0,
            ShippingMethod::Expedited => -2,
            ShippingMethod::Express => -4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Expedited => "expedited",
            ShippingMethod::Express => "express",
        }
    }
}

/// Sourcing decision for the replenishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcingStrategy {
    pub primary_source: SourceKind,
    pub backup_sources: Vec<SourceKind>,
    pub shipping_method: ShippingMethod,
    pub split_order: bool,
}

impl Default for SourcingStrategy {
    fn default() -> Self {
        Self {
            primary_source: SourceKind::ExistingSupplier,
            backup_sources: Vec::new(),
            shipping_method: ShippingMethod::Standard,
            split_order: false,
        }
    }
}

/// Expected order-to-delivery schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub order_placement: DateTime<Utc>,
    pub expected_delivery: DateTime<Utc>,
    pub lead_time_days: i64,
    pub source: SourceKind,
    pub shipping_method: ShippingMethod,
}

/// The kind of work an action item asks for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PlaceReplenishmentOrder,
    CoordinateLogistics,
    UpdateForecast,
    MonitorStock,
    PlaceBackupOrder,
}

/// One entry of the plan's ordered action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub sequence: u32,
    pub kind: ActionKind,
    pub description: String,
    pub quantity: Option<i64>,
    pub source: Option<SourceKind>,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    /// Standing work with no completion date (stock monitoring).
    pub ongoing: bool,
    pub assigned_team: String,
}

/// The optimizer's full output for one disruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplenishmentPlan {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub current_stock: i64,
    pub priority: Priority,
    pub root_cause: RootCause,
    pub daily_consumption_rate: f64,
    pub horizon_days: i64,
    pub safety_factor: f64,
    pub total_replenishment_qty: i64,
    /// Quantity still needed after counting current stock.
    pub net_requirement: i64,
    pub sourcing: SourcingStrategy,
    pub timeline: Timeline,
    pub action_items: Vec<ActionItem>,
    pub estimated_stockout: Option<DateTime<Utc>>,
    pub confidence_score: f64,
}
