//! `stockpilot-policy` — per-tenant numeric threshold policy.
//!
//! Pure configuration data consumed by the rest of the pipeline. Configs are
//! created lazily with documented defaults on first use, mutated only by
//! explicit patches, and never deleted while the tenant exists.

pub mod config;
pub mod store;

pub use config::{ThresholdConfig, ThresholdPatch};
pub use store::{InMemoryThresholdStore, ThresholdStore};
