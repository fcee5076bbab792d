//! `stockpilot-orchestration` — external-action workflow execution.
//!
//! Executes a replenishment plan as an ordered set of independently-fallible
//! external actions. Every step is wrapped so a failure (error or timeout) is
//! caught and recorded while the remaining steps still run: steps are
//! independent effects, not a rollback-coupled transaction.

pub mod invoker;
pub mod orchestrator;
pub mod steps;

pub use invoker::{RecordingToolInvoker, ToolError, ToolInvoker};
pub use orchestrator::{
    OrchestrationReport, OrchestrationStatus, Orchestrator, StepOutcome, StepStatus,
};
pub use steps::{StepContext, StepName};
