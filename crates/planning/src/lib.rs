//! `stockpilot-planning` — replenishment plan computation.
//!
//! Turns a root cause plus consumption evidence into a concrete
//! replenishment quantity, sourcing strategy, delivery timeline and ordered
//! action list. The planner is a pure function of its inputs: no clock
//! access, no I/O, no mutation of external state.

pub mod plan;
pub mod planner;

pub use plan::{
    ActionItem, ActionKind, ReplenishmentPlan, ShippingMethod, SourceKind, SourcingStrategy,
    Timeline,
};
pub use planner::{PlanRequest, ReplenishmentPlanner};
