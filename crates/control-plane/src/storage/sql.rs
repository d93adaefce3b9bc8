use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contracts::{
    ApiError,
    audit::AuditEvent,
    job::{Job, JobStatus},
    policy::Policy,
    session::{Session, SessionStatus, SessionStep, SessionStepStatus},
    workflow::{Workflow, WorkflowStatus},
    Runtime,
};
use sqlx::{AnyPool, Row};

use crate::{audit::AuditStore, orchestration::WorkflowStore};

use super::{JobStore, PolicyStore, SessionStepStore, SessionStore};

/// Backs every control-plane table through `sqlx::Any`, so the same queries
/// run unmodified against either Postgres or SQLite — the two drivers named
/// in `DATABASE_DRIVER`. Timestamps and enums are stored as text rather than
/// driver-native types, since `Any` doesn't unify those across backends.
pub struct SqlStore {
    pool: AnyPool,
}

impl SqlStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                policy_id TEXT NOT NULL,
                runtime TEXT NOT NULL,
                ttl_seconds BIGINT NOT NULL,
                expires_at TEXT NOT NULL,
                status TEXT NOT NULL,
                runtime_id TEXT,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_steps (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                sequence BIGINT NOT NULL,
                command TEXT NOT NULL,
                status TEXT NOT NULL,
                stdout TEXT NOT NULL,
                stderr TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS policies (
                id TEXT PRIMARY KEY,
                version BIGINT NOT NULL,
                ruleset TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                language TEXT NOT NULL,
                exit_status INT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS idempotency_keys (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                document TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                action TEXT NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT NOT NULL,
                time TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn workflow_status_text(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Queued => "queued",
        WorkflowStatus::Running => "running",
        WorkflowStatus::Finished => "finished",
        WorkflowStatus::Failed => "failed",
    }
}

#[async_trait]
impl WorkflowStore for SqlStore {
    async fn create(&self, workflow: Workflow) -> Result<(), ApiError> {
        let document = serde_json::to_string(&workflow)?;
        sqlx::query("INSERT INTO workflows (id, tenant_id, status, document) VALUES (?, ?, ?, ?)")
            .bind(&workflow.id)
            .bind(&workflow.tenant_id)
            .bind(workflow_status_text(workflow.status))
            .bind(document)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(&self, workflow: Workflow) -> Result<(), ApiError> {
        let document = serde_json::to_string(&workflow)?;
        sqlx::query("UPDATE workflows SET status = ?, document = ? WHERE id = ?")
            .bind(workflow_status_text(workflow.status))
            .bind(document)
            .bind(&workflow.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn status_text(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Expired => "expired",
        SessionStatus::Terminated => "terminated",
    }
}

fn parse_status(text: &str) -> SessionStatus {
    match text {
        "expired" => SessionStatus::Expired,
        "terminated" => SessionStatus::Terminated,
        _ => SessionStatus::Active,
    }
}

fn row_to_session(row: &sqlx::any::AnyRow) -> Result<Session, ApiError> {
    let runtime: String = row.try_get("runtime")?;
    let expires_at: String = row.try_get("expires_at")?;
    let created_at: String = row.try_get("created_at")?;
    let last_activity: String = row.try_get("last_activity")?;
    let status: String = row.try_get("status")?;

    Ok(Session {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        agent_id: row.try_get("agent_id")?,
        policy_id: row.try_get("policy_id")?,
        runtime: runtime
            .parse::<Runtime>()
            .map_err(|e| ApiError::internal(format!("corrupt runtime column: {e}")))?,
        ttl_seconds: row.try_get("ttl_seconds")?,
        expires_at: parse_rfc3339(&expires_at)?,
        status: parse_status(&status),
        runtime_id: row.try_get("runtime_id")?,
        created_at: parse_rfc3339(&created_at)?,
        last_activity: parse_rfc3339(&last_activity)?,
    })
}

fn parse_rfc3339(text: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApiError::internal(format!("corrupt timestamp column: {e}")))
}

#[async_trait]
impl SessionStore for SqlStore {
    async fn create(&self, session: Session) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO sessions
                (id, tenant_id, agent_id, policy_id, runtime, ttl_seconds, expires_at, status, runtime_id, created_at, last_activity)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(session.tenant_id)
        .bind(session.agent_id)
        .bind(session.policy_id)
        .bind(session.runtime.as_str())
        .bind(session.ttl_seconds)
        .bind(session.expires_at.to_rfc3339())
        .bind(status_text(session.status))
        .bind(session.runtime_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_activity.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, ApiError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET status = ? WHERE id = ?")
            .bind(status_text(status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_expired(&self, before: DateTime<Utc>) -> Result<Vec<Session>, ApiError> {
        let rows = sqlx::query("SELECT * FROM sessions WHERE status = ? AND expires_at <= ?")
            .bind(status_text(SessionStatus::Active))
            .bind(before.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_session).collect()
    }
}

fn step_status_text(status: SessionStepStatus) -> &'static str {
    match status {
        SessionStepStatus::Accepted => "accepted",
        SessionStepStatus::Completed => "completed",
        SessionStepStatus::Failed => "failed",
    }
}

fn parse_step_status(text: &str) -> SessionStepStatus {
    match text {
        "completed" => SessionStepStatus::Completed,
        "failed" => SessionStepStatus::Failed,
        _ => SessionStepStatus::Accepted,
    }
}

#[async_trait]
impl SessionStepStore for SqlStore {
    async fn append(&self, step: SessionStep) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO session_steps
                (id, session_id, sequence, command, status, stdout, stderr, started_at, finished_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(step.id)
        .bind(step.session_id)
        .bind(step.sequence as i64)
        .bind(step.command)
        .bind(step_status_text(step.status))
        .bind(step.stdout)
        .bind(step.stderr)
        .bind(step.started_at.to_rfc3339())
        .bind(step.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<SessionStep>, ApiError> {
        let rows = sqlx::query("SELECT * FROM session_steps WHERE session_id = ? ORDER BY sequence")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                let started_at: String = row.try_get("started_at")?;
                let finished_at: Option<String> = row.try_get("finished_at")?;
                Ok(SessionStep {
                    id: row.try_get("id")?,
                    session_id: row.try_get("session_id")?,
                    sequence: row.try_get::<i64, _>("sequence")? as u64,
                    command: row.try_get("command")?,
                    status: parse_step_status(&status),
                    stdout: row.try_get("stdout")?,
                    stderr: row.try_get("stderr")?,
                    started_at: parse_rfc3339(&started_at)?,
                    finished_at: finished_at.map(|t| parse_rfc3339(&t)).transpose()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PolicyStore for SqlStore {
    async fn upsert(&self, policy: Policy) -> Result<(), ApiError> {
        let existing: Option<i64> = sqlx::query("SELECT version FROM policies WHERE id = ?")
            .bind(&policy.id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.try_get::<i64, _>("version"))
            .transpose()?;

        if let Some(existing_version) = existing {
            if policy.version as i64 <= existing_version {
                return Err(ApiError::conflict(format!(
                    "policy {} version {} is not newer than stored version {existing_version}",
                    policy.id, policy.version
                )));
            }
            sqlx::query("UPDATE policies SET version = ?, ruleset = ? WHERE id = ?")
                .bind(policy.version as i64)
                .bind(policy.ruleset)
                .bind(policy.id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO policies (id, version, ruleset) VALUES (?, ?, ?)")
                .bind(policy.id)
                .bind(policy.version as i64)
                .bind(policy.ruleset)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Policy>, ApiError> {
        let row = sqlx::query("SELECT * FROM policies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Policy {
                id: row.try_get("id")?,
                version: row.try_get::<i64, _>("version")? as u64,
                ruleset: row.try_get("ruleset")?,
            })
        })
        .transpose()
    }
}

fn job_status_text(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

#[async_trait]
impl JobStore for SqlStore {
    async fn create(&self, job: Job) -> Result<(), ApiError> {
        sqlx::query("INSERT INTO jobs (id, tenant_id, status, language, exit_status) VALUES (?, ?, ?, ?, ?)")
            .bind(job.id)
            .bind(job.tenant_id)
            .bind(job_status_text(job.status))
            .bind(job.language)
            .bind(job.exit_status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: JobStatus) -> Result<(), ApiError> {
        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(job_status_text(status))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_audit_event(row: &sqlx::any::AnyRow) -> Result<AuditEvent, ApiError> {
    let time: String = row.try_get("time")?;
    Ok(AuditEvent {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        actor_id: row.try_get("actor_id")?,
        action: row.try_get("action")?,
        outcome: row.try_get("outcome")?,
        detail: row.try_get("detail")?,
        time: parse_rfc3339(&time)?,
    })
}

#[async_trait]
impl AuditStore for SqlStore {
    async fn append(&self, event: AuditEvent) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO audit_events (id, tenant_id, actor_id, action, outcome, detail, time)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id)
        .bind(event.tenant_id)
        .bind(event.actor_id)
        .bind(event.action)
        .bind(event.outcome)
        .bind(event.detail)
        .bind(event.time.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        tenant_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>, ApiError> {
        // `Any` doesn't support dynamic placeholder lists well, so filter
        // the full table in memory rather than building the WHERE clause
        // conditionally — audit volume here is modest and this matches
        // `InMemoryAuditStore::query`'s semantics exactly.
        let rows = sqlx::query("SELECT * FROM audit_events ORDER BY time")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(row_to_audit_event)
            .collect::<Result<Vec<_>, _>>()
            .map(|events| {
                events
                    .into_iter()
                    .filter(|event| tenant_id.is_none_or(|t| event.tenant_id == t))
                    .filter(|event| since.is_none_or(|s| event.time >= s))
                    .filter(|event| until.is_none_or(|u| event.time <= u))
                    .collect()
            })
    }
}
