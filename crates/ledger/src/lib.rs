//! `stockpilot-ledger` — durable record of alerts, executions and steps.
//!
//! The ledger is the source of truth for "is this subject currently being
//! handled": the dedup and single-active-execution guards are enforced here,
//! under one lock (or one database constraint), so no separate concurrency
//! primitive is needed on the trigger path. Records are never hard-deleted.

pub mod postgres;
pub mod records;
pub mod store;

pub use postgres::{LedgerQuery, PostgresLedger};
pub use records::{
    Alert, AlertStatus, Execution, ExecutionOutcome, ExecutionStatus, StepId, WorkflowStep,
    WorkflowStepStatus,
};
pub use store::{ExecutionLedger, InMemoryLedger, LedgerError, LedgerStats};
