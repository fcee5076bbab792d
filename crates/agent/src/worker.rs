//! Background worker draining the alert queue.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use stockpilot_analysis::HistoryStore;
use stockpilot_ledger::{ExecutionLedger, ExecutionStatus};
use stockpilot_policy::ThresholdStore;

use crate::pipeline::{DisruptionPipeline, PipelineError};
use crate::queue::QueuedAlert;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll the queue when it is empty.
    pub poll_interval: Duration,
    /// Thread name for logging.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "pipeline-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Worker runtime counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub alerts_processed: u64,
    pub completed: u64,
    pub partial_success: u64,
    pub failed: u64,
    /// Pipeline errors (not execution outcomes): rejected reruns, ledger
    /// failures. Observable rather than swallowed.
    pub errors: u64,
    pub uptime_secs: u64,
}

/// Handle to a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Drains the pipeline's alert queue, one execution at a time.
pub struct PipelineWorker<L, H, S> {
    pipeline: Arc<DisruptionPipeline<L, H, S>>,
}

impl<L, H, S> PipelineWorker<L, H, S>
where
    L: ExecutionLedger + 'static,
    H: HistoryStore + 'static,
    S: ThresholdStore + 'static,
{
    pub fn new(pipeline: Arc<DisruptionPipeline<L, H, S>>) -> Self {
        Self { pipeline }
    }

    /// Run the next queued alert, if any. Exposed for synchronous draining
    /// in tests and embedders with their own scheduling.
    pub fn process_next(&self) -> Option<Result<ExecutionStatus, PipelineError>> {
        let QueuedAlert {
            tenant_id,
            alert_id,
        } = self.pipeline.queue().dequeue()?;

        debug!(%alert_id, "worker picked up alert");
        Some(
            self.pipeline
                .run_alert(tenant_id, alert_id)
                .map(|execution| execution.status),
        )
    }

    /// Spawn the worker on a named background thread.
    pub fn spawn(self, config: WorkerConfig) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = Arc::clone(&stats);

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn pipeline worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn worker_loop<L, H, S>(
    worker: PipelineWorker<L, H, S>,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    L: ExecutionLedger + 'static,
    H: HistoryStore + 'static,
    S: ThresholdStore + 'static,
{
    info!(worker = %config.name, "pipeline worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match worker.process_next() {
            Some(result) => {
                if let Ok(mut s) = stats.lock() {
                    s.alerts_processed += 1;
                    match &result {
                        Ok(ExecutionStatus::Completed) => s.completed += 1,
                        Ok(ExecutionStatus::PartialSuccess) => s.partial_success += 1,
                        Ok(ExecutionStatus::Failed) => s.failed += 1,
                        Ok(ExecutionStatus::Started) => {}
                        Err(_) => s.errors += 1,
                    }
                }
                if let Err(e) = result {
                    error!(worker = %config.name, error = %e, "pipeline run failed");
                }
            }
            None => thread::sleep(config.poll_interval),
        }
    }

    info!(worker = %config.name, "pipeline worker stopped");
}
