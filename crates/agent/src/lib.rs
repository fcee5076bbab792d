//! `stockpilot-agent` — the disruption detection-and-resolution pipeline.
//!
//! Wires the trigger monitor, analyzer, planner, orchestrator and ledger into
//! one explicitly constructed, dependency-injected pipeline object. The
//! trigger path is synchronous with the inventory write that caused it; the
//! analysis → optimization → orchestration pipeline runs on a background
//! worker fed by an explicit queue, so the write path never blocks on
//! external-service latency.

pub mod pipeline;
pub mod queue;
pub mod worker;

pub use pipeline::{DisruptionPipeline, ExecutionSummary, Observed, PipelineError};
pub use queue::{AlertQueue, QueuedAlert};
pub use worker::{PipelineWorker, WorkerConfig, WorkerHandle, WorkerStats};
