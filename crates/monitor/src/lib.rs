//! `stockpilot-monitor` — trigger decision policy.
//!
//! Observes inventory-quantity mutations and decides whether a disruption
//! condition now holds. The decision itself is a pure function; deduplication
//! state and alert creation live with the caller and the ledger.

pub mod observation;
pub mod trigger;

pub use observation::StockObservation;
pub use trigger::{evaluate, AlertKind, TriggerDecision, TriggerReason};
