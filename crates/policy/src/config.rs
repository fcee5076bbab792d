//! Threshold configuration record and partial updates.

use serde::{Deserialize, Serialize};

/// Per-tenant inventory monitoring thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Stock at or below this level is considered critically low.
    pub critical_level: i64,
    /// Stock at or below this level is worth watching.
    pub warning_level: i64,
    /// Level at which routine reordering should begin.
    pub reorder_point: i64,
    /// Minimum stock the tenant wants to keep on hand.
    pub safety_stock: i64,
    /// When false, existing subjects never auto-trigger the pipeline.
    pub auto_resolution_enabled: bool,
    /// Recipients for stakeholder notifications. May be empty; the
    /// orchestration layer substitutes its fallback contacts.
    pub notification_targets: Vec<String>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            critical_level: 10,
            warning_level: 20,
            reorder_point: 15,
            safety_stock: 5,
            auto_resolution_enabled: true,
            notification_targets: Vec::new(),
        }
    }
}

/// Partial update for a tenant's threshold config.
///
/// Only the fields present are applied; everything else keeps its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPatch {
    pub critical_level: Option<i64>,
    pub warning_level: Option<i64>,
    pub reorder_point: Option<i64>,
    pub safety_stock: Option<i64>,
    pub auto_resolution_enabled: Option<bool>,
    pub notification_targets: Option<Vec<String>>,
}

impl ThresholdConfig {
    /// Apply a patch, returning the updated config.
    pub fn apply(mut self, patch: ThresholdPatch) -> Self {
        if let Some(v) = patch.critical_level {
            self.critical_level = v;
        }
        if let Some(v) = patch.warning_level {
            self.warning_level = v;
        }
        if let Some(v) = patch.reorder_point {
            self.reorder_point = v;
        }
        if let Some(v) = patch.safety_stock {
            self.safety_stock = v;
        }
        if let Some(v) = patch.auto_resolution_enabled {
            self.auto_resolution_enabled = v;
        }
        if let Some(v) = patch.notification_targets {
            self.notification_targets = v;
        }
        self
    }
}
