//! `stockpilot-analysis` — root cause analysis for stock disruptions.
//!
//! Queries historical consumption, forecast, supplier-performance and
//! pending-replenishment signals for a subject and emits a ranked cause with
//! a confidence score. The analyzer reads history, never mutates it, and is
//! deterministic for a fixed store and reference time.

pub mod analyzer;
pub mod evidence;
pub mod history;

pub use analyzer::{AnalysisReport, RootCause, RootCauseAnalyzer};
pub use evidence::{
    ConsumptionAnalysis, Evidence, ForecastComparison, PendingReplenishment, SupplierPerformance,
};
pub use history::{HistoryStore, InMemoryHistoryStore, OrderRecord, OrderStatus, SubjectRecord};
