//! Postgres-backed execution ledger.
//!
//! Persists alerts, executions and workflow steps with tenant isolation and
//! the two pipeline guards enforced at the database level:
//!
//! - a partial unique index on `(tenant_id, subject_id)` over active alerts
//!   backs the dedup invariant (at most one active alert per subject);
//! - a partial unique index on `alert_id` over `started` executions backs
//!   the single-active-execution guard;
//! - `UNIQUE (execution_id, step_number)` keeps step numbering append-only.
//!
//! Full records are stored as JSONB alongside the key columns used for
//! lookups, so the row layout stays stable while the record types evolve.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stockpilot_core::{AlertId, ExecutionId, SubjectId, TenantId};

use crate::records::{Alert, AlertStatus, Execution, ExecutionOutcome, WorkflowStep};
use crate::store::{ExecutionLedger, LedgerError, LedgerStats};

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS agent_alerts (
        alert_id    UUID PRIMARY KEY,
        tenant_id   UUID NOT NULL,
        subject_id  UUID NOT NULL,
        status      TEXT NOT NULL,
        detected_at TIMESTAMPTZ NOT NULL,
        record      JSONB NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS agent_alerts_one_active_per_subject
        ON agent_alerts (tenant_id, subject_id)
        WHERE status IN ('detected', 'analyzing')
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_executions (
        execution_id UUID PRIMARY KEY,
        alert_id     UUID NOT NULL REFERENCES agent_alerts (alert_id),
        tenant_id    UUID NOT NULL,
        status       TEXT NOT NULL,
        started_at   TIMESTAMPTZ NOT NULL,
        record       JSONB NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS agent_executions_one_active_per_alert
        ON agent_executions (alert_id)
        WHERE status = 'started'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_workflow_steps (
        step_id      UUID PRIMARY KEY,
        execution_id UUID NOT NULL REFERENCES agent_executions (execution_id),
        tenant_id    UUID NOT NULL,
        step_number  INTEGER NOT NULL,
        record       JSONB NOT NULL,
        UNIQUE (execution_id, step_number)
    )
    "#,
];

/// Postgres-backed `ExecutionLedger`.
///
/// All operations go through the SQLx pool; the struct is cheap to clone and
/// safe to share across threads.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the ledger tables and guard indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        for statement in DDL {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id))]
    pub async fn create_alert_async(&self, alert: Alert) -> Result<Alert, LedgerError> {
        let record = to_record(&alert)?;
        let result = sqlx::query(
            r#"
            INSERT INTO agent_alerts (alert_id, tenant_id, subject_id, status, detected_at, record)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(alert.id.as_uuid())
        .bind(alert.tenant_id.as_uuid())
        .bind(alert.subject_id.as_uuid())
        .bind(alert.status.as_str())
        .bind(alert.detected_at)
        .bind(&record)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(alert),
            Err(e) if is_unique_violation(&e) => {
                Err(LedgerError::ActiveAlertExists(alert.subject_id))
            }
            Err(e) => Err(map_sqlx_error("create_alert", e)),
        }
    }

    pub async fn find_active_alert_async(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
    ) -> Result<Option<Alert>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT record FROM agent_alerts
            WHERE tenant_id = $1 AND subject_id = $2 AND status IN ('detected', 'analyzing')
            LIMIT 1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_active_alert", e))?;

        row.map(|r| from_record(r.try_get("record"))).transpose()
    }

    pub async fn get_alert_async(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Option<Alert>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT tenant_id, record FROM agent_alerts WHERE alert_id = $1"#,
        )
        .bind(alert_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_alert", e))?;

        let Some(row) = row else { return Ok(None) };
        let owner: uuid::Uuid = row
            .try_get("tenant_id")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if owner != *tenant_id.as_uuid() {
            return Err(LedgerError::TenantIsolation);
        }
        Ok(Some(from_record(row.try_get("record"))?))
    }

    pub async fn mark_alert_analyzing_async(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Alert, LedgerError> {
        self.update_alert(tenant_id, alert_id, |alert| {
            alert.status = AlertStatus::Analyzing;
        })
        .await
    }

    pub async fn resolve_alert_async(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Alert, LedgerError> {
        self.update_alert(tenant_id, alert_id, |alert| {
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(Utc::now());
        })
        .await
    }

    async fn update_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
        mutate: impl FnOnce(&mut Alert),
    ) -> Result<Alert, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("update_alert", e))?;

        let row = sqlx::query(
            r#"SELECT tenant_id, record FROM agent_alerts WHERE alert_id = $1 FOR UPDATE"#,
        )
        .bind(alert_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_alert", e))?
        .ok_or(LedgerError::AlertNotFound(alert_id))?;

        let owner: uuid::Uuid = row
            .try_get("tenant_id")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if owner != *tenant_id.as_uuid() {
            return Err(LedgerError::TenantIsolation);
        }

        let mut alert: Alert = from_record(row.try_get("record"))?;
        mutate(&mut alert);

        sqlx::query(
            r#"UPDATE agent_alerts SET status = $2, record = $3 WHERE alert_id = $1"#,
        )
        .bind(alert_id.as_uuid())
        .bind(alert.status.as_str())
        .bind(to_record(&alert)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_alert", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("update_alert", e))?;
        Ok(alert)
    }

    #[instrument(skip(self))]
    pub async fn create_execution_async(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Execution, LedgerError> {
        // Surfaces AlertNotFound/TenantIsolation before the insert.
        self.get_alert_async(tenant_id, alert_id)
            .await?
            .ok_or(LedgerError::AlertNotFound(alert_id))?;

        let execution = Execution::new(tenant_id, alert_id);
        let result = sqlx::query(
            r#"
            INSERT INTO agent_executions (execution_id, alert_id, tenant_id, status, started_at, record)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(execution.id.as_uuid())
        .bind(alert_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(to_record(&execution)?)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(execution),
            Err(e) if is_unique_violation(&e) => Err(LedgerError::ActiveExecutionExists(alert_id)),
            Err(e) => Err(map_sqlx_error("create_execution", e)),
        }
    }

    pub async fn append_step_async(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<WorkflowStep, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("append_step", e))?;

        let row = sqlx::query(
            r#"SELECT tenant_id, status FROM agent_executions WHERE execution_id = $1 FOR UPDATE"#,
        )
        .bind(execution_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_step", e))?
        .ok_or(LedgerError::ExecutionNotFound(execution_id))?;

        let owner: uuid::Uuid = row
            .try_get("tenant_id")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if owner != *tenant_id.as_uuid() {
            return Err(LedgerError::TenantIsolation);
        }
        let status: String = row
            .try_get("status")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if status != "started" {
            return Err(LedgerError::ExecutionFinalized(execution_id));
        }

        let max_row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(step_number), 0) AS max_step
            FROM agent_workflow_steps WHERE execution_id = $1
            "#,
        )
        .bind(execution_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_step", e))?;

        let max_step: i32 = max_row
            .try_get("max_step")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        let expected = max_step as u32 + 1;
        if step.step_number != expected {
            return Err(LedgerError::StepOrder {
                expected,
                got: step.step_number,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO agent_workflow_steps (step_id, execution_id, tenant_id, step_number, record)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(step.id.0)
        .bind(execution_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(step.step_number as i32)
        .bind(to_record(&step)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_step", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("append_step", e))?;
        Ok(step)
    }

    pub async fn finalize_execution_async(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<Execution, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("finalize_execution", e))?;

        let row = sqlx::query(
            r#"SELECT tenant_id, record FROM agent_executions WHERE execution_id = $1 FOR UPDATE"#,
        )
        .bind(execution_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finalize_execution", e))?
        .ok_or(LedgerError::ExecutionNotFound(execution_id))?;

        let owner: uuid::Uuid = row
            .try_get("tenant_id")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if owner != *tenant_id.as_uuid() {
            return Err(LedgerError::TenantIsolation);
        }

        let mut execution: Execution = from_record(row.try_get("record"))?;
        if execution.status.is_terminal() {
            return Err(LedgerError::ExecutionFinalized(execution_id));
        }

        execution.status = outcome.status;
        execution.root_cause = outcome.root_cause;
        execution.confidence_score = outcome.confidence_score;
        execution.analysis_snapshot = outcome.analysis_snapshot;
        execution.solution_snapshot = outcome.solution_snapshot;
        execution.orchestration_snapshot = outcome.orchestration_snapshot;
        execution.summary = outcome.summary;
        execution.completed_at = Some(Utc::now());

        sqlx::query(
            r#"UPDATE agent_executions SET status = $2, record = $3 WHERE execution_id = $1"#,
        )
        .bind(execution_id.as_uuid())
        .bind(execution.status.as_str())
        .bind(to_record(&execution)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finalize_execution", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("finalize_execution", e))?;
        Ok(execution)
    }

    pub async fn get_execution_async(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT tenant_id, record FROM agent_executions WHERE execution_id = $1"#,
        )
        .bind(execution_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_execution", e))?;

        let Some(row) = row else { return Ok(None) };
        let owner: uuid::Uuid = row
            .try_get("tenant_id")
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        if owner != *tenant_id.as_uuid() {
            return Err(LedgerError::TenantIsolation);
        }
        Ok(Some(from_record(row.try_get("record"))?))
    }

    pub async fn list_alerts_async(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<Alert>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM agent_alerts
            WHERE tenant_id = $1
            ORDER BY detected_at ASC
            LIMIT $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_alerts", e))?;

        rows.into_iter()
            .map(|r| from_record(r.try_get("record")))
            .collect()
    }

    pub async fn list_executions_for_alert_async(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM agent_executions
            WHERE tenant_id = $1 AND alert_id = $2
            ORDER BY started_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(alert_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_executions_for_alert", e))?;

        rows.into_iter()
            .map(|r| from_record(r.try_get("record")))
            .collect()
    }

    pub async fn list_steps_async(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM agent_workflow_steps
            WHERE tenant_id = $1 AND execution_id = $2
            ORDER BY step_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(execution_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_steps", e))?;

        rows.into_iter()
            .map(|r| from_record(r.try_get("record")))
            .collect()
    }

    pub async fn stats_async(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError> {
        let mut stats = LedgerStats::default();

        let alert_rows = sqlx::query(
            r#"SELECT status, COUNT(*) AS n FROM agent_alerts WHERE tenant_id = $1 GROUP BY status"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        for row in alert_rows {
            let status: String = row.try_get("status").unwrap_or_default();
            let n: i64 = row.try_get("n").unwrap_or(0);
            stats.total_alerts += n as usize;
            if status == "resolved" {
                stats.resolved_alerts += n as usize;
            } else {
                stats.active_alerts += n as usize;
            }
        }

        let execution_rows = sqlx::query(
            r#"SELECT status, COUNT(*) AS n FROM agent_executions WHERE tenant_id = $1 GROUP BY status"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        for row in execution_rows {
            let status: String = row.try_get("status").unwrap_or_default();
            let n: i64 = row.try_get("n").unwrap_or(0);
            stats.total_executions += n as usize;
            match status.as_str() {
                "completed" => stats.completed_executions += n as usize,
                "partial_success" => stats.partial_executions += n as usize,
                "failed" => stats.failed_executions += n as usize,
                _ => {}
            }
        }

        let step_row = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM agent_workflow_steps WHERE tenant_id = $1"#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;
        let n: i64 = step_row.try_get("n").unwrap_or(0);
        stats.total_steps = n as usize;

        Ok(stats)
    }
}

/// Async audit/reporting surface, for API layers that are already async.
#[async_trait::async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn alerts(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Alert>, LedgerError>;

    async fn executions_for_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError>;

    async fn steps(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError>;

    async fn ledger_stats(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError>;
}

#[async_trait::async_trait]
impl LedgerQuery for PostgresLedger {
    async fn alerts(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Alert>, LedgerError> {
        self.list_alerts_async(tenant_id, limit).await
    }

    async fn executions_for_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError> {
        self.list_executions_for_alert_async(tenant_id, alert_id).await
    }

    async fn steps(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError> {
        self.list_steps_async(tenant_id, execution_id).await
    }

    async fn ledger_stats(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError> {
        self.stats_async(tenant_id).await
    }
}

// The ExecutionLedger trait is synchronous, but Postgres operations require
// async. We bridge with tokio::runtime::Handle, which works when called from
// a thread inside a tokio runtime (the worker threads the pipeline uses).

fn runtime_handle(op: &str) -> Result<tokio::runtime::Handle, LedgerError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        LedgerError::Storage(format!(
            "{op}: PostgresLedger requires a tokio runtime context"
        ))
    })
}

impl ExecutionLedger for PostgresLedger {
    fn create_alert(&self, alert: Alert) -> Result<Alert, LedgerError> {
        runtime_handle("create_alert")?.block_on(self.create_alert_async(alert))
    }

    fn find_active_alert(
        &self,
        tenant_id: TenantId,
        subject_id: SubjectId,
    ) -> Result<Option<Alert>, LedgerError> {
        runtime_handle("find_active_alert")?
            .block_on(self.find_active_alert_async(tenant_id, subject_id))
    }

    fn get_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Option<Alert>, LedgerError> {
        runtime_handle("get_alert")?.block_on(self.get_alert_async(tenant_id, alert_id))
    }

    fn mark_alert_analyzing(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Alert, LedgerError> {
        runtime_handle("mark_alert_analyzing")?
            .block_on(self.mark_alert_analyzing_async(tenant_id, alert_id))
    }

    fn resolve_alert(&self, tenant_id: TenantId, alert_id: AlertId) -> Result<Alert, LedgerError> {
        runtime_handle("resolve_alert")?.block_on(self.resolve_alert_async(tenant_id, alert_id))
    }

    fn create_execution(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Execution, LedgerError> {
        runtime_handle("create_execution")?
            .block_on(self.create_execution_async(tenant_id, alert_id))
    }

    fn append_step(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        step: WorkflowStep,
    ) -> Result<WorkflowStep, LedgerError> {
        runtime_handle("append_step")?
            .block_on(self.append_step_async(tenant_id, execution_id, step))
    }

    fn finalize_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<Execution, LedgerError> {
        runtime_handle("finalize_execution")?
            .block_on(self.finalize_execution_async(tenant_id, execution_id, outcome))
    }

    fn get_execution(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Option<Execution>, LedgerError> {
        runtime_handle("get_execution")?
            .block_on(self.get_execution_async(tenant_id, execution_id))
    }

    fn list_alerts(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Alert>, LedgerError> {
        runtime_handle("list_alerts")?.block_on(self.list_alerts_async(tenant_id, limit))
    }

    fn list_executions_for_alert(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
    ) -> Result<Vec<Execution>, LedgerError> {
        runtime_handle("list_executions_for_alert")?
            .block_on(self.list_executions_for_alert_async(tenant_id, alert_id))
    }

    fn list_steps(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
    ) -> Result<Vec<WorkflowStep>, LedgerError> {
        runtime_handle("list_steps")?.block_on(self.list_steps_async(tenant_id, execution_id))
    }

    fn stats(&self, tenant_id: TenantId) -> Result<LedgerStats, LedgerError> {
        runtime_handle("stats")?.block_on(self.stats_async(tenant_id))
    }
}

fn to_record<T: serde::Serialize>(value: &T) -> Result<JsonValue, LedgerError> {
    serde_json::to_value(value).map_err(|e| LedgerError::Storage(e.to_string()))
}

fn from_record<T: serde::de::DeserializeOwned>(
    column: Result<JsonValue, sqlx::Error>,
) -> Result<T, LedgerError> {
    let value = column.map_err(|e| LedgerError::Storage(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| LedgerError::Storage(e.to_string()))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().and_then(|d| d.code()).as_deref(),
        Some("23505")
    )
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(format!("{op}: {e}"))
}
