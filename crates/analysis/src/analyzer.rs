//! Root cause determination from gathered evidence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stockpilot_core::{SubjectId, TenantId};

use crate::evidence::{
    ConsumptionAnalysis, Evidence, ForecastComparison, PendingReplenishment, SupplierPerformance,
    HISTORICAL_WINDOW_DAYS, RECENT_WINDOW_DAYS,
};
use crate::history::HistoryStore;

/// Change percentage above which a weak demand-surge signal is scored.
const WEAK_SURGE_CHANGE_PCT: f64 = 20.0;

/// Default forecast deviation ratio above which the deviation is significant.
const DEFAULT_DEVIATION_THRESHOLD: f64 = 0.25;

/// The analyzer's best explanation for a disruption.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    DemandSurge,
    SupplierDelay,
    ForecastError,
    NoReplenishment,
    InventoryManagement,
    /// The subject could not be found; terminal, non-retryable.
    Unknown,
}

impl RootCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootCause::DemandSurge => "demand_surge",
            RootCause::SupplierDelay => "supplier_delay",
            RootCause::ForecastError => "forecast_error",
            RootCause::NoReplenishment => "no_replenishment",
            RootCause::InventoryManagement => "inventory_management",
            RootCause::Unknown => "unknown",
        }
    }
}

impl core::fmt::Display for RootCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one analysis run.
///
/// `subject_found == false` is a terminal result: confidence is zero, the
/// cause is `Unknown`, and callers must not retry the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub tenant_id: TenantId,
    pub subject_id: SubjectId,
    pub subject_found: bool,
    pub subject_name: String,
    pub observed_quantity: i64,
    pub root_cause: RootCause,
    pub confidence: f64,
    pub evidence: Evidence,
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Root cause analyzer over a history store.
#[derive(Debug, Clone)]
pub struct RootCauseAnalyzer<H> {
    history: H,
    deviation_threshold: f64,
}

impl<H: HistoryStore> RootCauseAnalyzer<H> {
    pub fn new(history: H) -> Self {
        Self {
            history,
            deviation_threshold: DEFAULT_DEVIATION_THRESHOLD,
        }
    }

    /// Override the forecast deviation threshold (ratio, not percent).
    pub fn with_deviation_threshold(mut self, threshold: f64) -> Self {
        self.deviation_threshold = threshold;
        self
    }

    /// Analyze a subject's disruption as of `now`.
    ///
    /// Never fails for a missing subject: that case produces a terminal
    /// report with confidence zero instead.
    pub fn analyze(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        now: DateTime<Utc>,
    ) -> AnalysisReport {
        let Some(subject) = self.history.subject(tenant_id, subject_id) else {
            info!(%tenant_id, %subject_id, "analysis subject not found");
            return AnalysisReport {
                tenant_id,
                subject_id,
                subject_found: false,
                subject_name: String::new(),
                observed_quantity: 0,
                root_cause: RootCause::Unknown,
                confidence: 0.0,
                evidence: Evidence::default(),
                recommendations: Vec::new(),
                analyzed_at: now,
            };
        };

        let evidence = self.gather_evidence(tenant_id, subject_id, now);
        let (root_cause, confidence) = determine_root_cause(&evidence);

        info!(
            %tenant_id,
            %subject_id,
            root_cause = %root_cause,
            confidence,
            "root cause analysis complete"
        );

        AnalysisReport {
            tenant_id,
            subject_id,
            subject_found: true,
            subject_name: subject.name,
            observed_quantity: subject.available_quantity,
            root_cause,
            confidence,
            recommendations: recommendations_for(root_cause),
            evidence,
            analyzed_at: now,
        }
    }

    fn gather_evidence(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
        now: DateTime<Utc>,
    ) -> Evidence {
        let recent_from = now - Duration::days(RECENT_WINDOW_DAYS);
        let historical_from =
            recent_from - Duration::days(HISTORICAL_WINDOW_DAYS);

        let recent = self
            .history
            .fulfilled_orders(tenant_id, subject_id, recent_from, now);
        let historical =
            self.history
                .fulfilled_orders(tenant_id, subject_id, historical_from, recent_from);
        let last_30d = self
            .history
            .fulfilled_orders(tenant_id, subject_id, historical_from, now);
        let open = self.history.open_orders(tenant_id, subject_id);

        let consumption = ConsumptionAnalysis::from_orders(&recent, &historical);
        let actual_weekly = consumption.recent_daily_average * RECENT_WINDOW_DAYS as f64;
        let forecast =
            ForecastComparison::from_orders(&last_30d, actual_weekly, self.deviation_threshold);
        let supplier = SupplierPerformance::from_open_orders(&open, now);
        let replenishment = PendingReplenishment::from_open_orders(&open);

        debug!(
            %subject_id,
            change_pct = consumption.change_percentage,
            delayed = supplier.delayed_order_count,
            pending = replenishment.pending_order_count,
            "evidence gathered"
        );

        Evidence {
            consumption,
            forecast,
            supplier,
            replenishment,
        }
    }
}

/// Score each candidate cause from its supporting evidence and pick the
/// highest. Ties break by table order: demand surge, supplier delay,
/// forecast error, missing replenishment, then the management fallback.
fn determine_root_cause(evidence: &Evidence) -> (RootCause, f64) {
    let mut candidates: Vec<(RootCause, f64)> = Vec::new();

    if evidence.consumption.indicates_surge {
        candidates.push((RootCause::DemandSurge, 0.8));
    } else if evidence.consumption.change_percentage > WEAK_SURGE_CHANGE_PCT {
        candidates.push((RootCause::DemandSurge, 0.5));
    }

    if evidence.supplier.issues_detected {
        candidates.push((RootCause::SupplierDelay, 0.7));
    }

    if evidence.forecast.significant_deviation {
        candidates.push((RootCause::ForecastError, 0.6));
    }

    if !evidence.replenishment.in_progress {
        candidates.push((RootCause::NoReplenishment, 0.5));
    }

    if candidates.is_empty() {
        return (RootCause::InventoryManagement, 0.4);
    }

    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        // Strictly greater: earlier table entries win ties.
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best
}

fn recommendations_for(cause: RootCause) -> Vec<String> {
    let lines: &[&str] = match cause {
        RootCause::DemandSurge => &[
            "Increase safety stock levels for this subject",
            "Review demand forecasting models",
            "Consider expedited ordering from suppliers",
            "Analyze market trends causing the demand increase",
        ],
        RootCause::SupplierDelay => &[
            "Contact suppliers to expedite pending orders",
            "Evaluate alternative suppliers",
            "Implement supplier performance monitoring",
            "Consider emergency procurement options",
        ],
        RootCause::ForecastError => &[
            "Update demand forecasting models",
            "Review historical consumption patterns",
            "Implement more frequent inventory reviews",
            "Consider seasonal demand adjustments",
        ],
        RootCause::NoReplenishment => &[
            "Immediately place replenishment orders",
            "Review reorder point settings",
            "Implement automated reordering",
            "Set up low inventory alerts",
        ],
        RootCause::InventoryManagement => &[
            "Conduct a full inventory audit",
            "Review inventory management processes",
            "Implement better tracking systems",
            "Train staff on inventory procedures",
        ],
        RootCause::Unknown => &[],
    };
    lines.iter().map(|s| s.to_string()).collect()
}
