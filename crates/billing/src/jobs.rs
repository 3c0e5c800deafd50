//! Provisioning job queue.
//!
//! Postgres-backed queue that decouples webhook ingestion from slow
//! panel calls. The webhook handler enqueues; the worker claims due
//! jobs with `FOR UPDATE SKIP LOCKED`, executes them against the
//! panel, and records the outcome. Retries are bounded; an exhausted
//! job goes `dead` and waits for manual requeue.

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use pixelhost_shared::JobKind;

use crate::error::{BillingError, BillingResult};

/// Default retry budget for a job.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Minutes to wait before re-running a job after its n-th failed
/// attempt: 1, 5, 25.
pub fn backoff_minutes(attempt: i32) -> i64 {
    match attempt {
        i32::MIN..=1 => 1,
        2 => 5,
        _ => 25,
    }
}

/// A claimed job, ready to execute.
#[derive(Debug, Clone)]
pub struct ProvisionJob {
    pub id: Uuid,
    pub server_id: Uuid,
    pub kind: JobKind,
    /// Attempts including the current one.
    pub attempts: i32,
    pub max_attempts: i32,
}

impl ProvisionJob {
    /// Whether the current attempt is the last one in the budget.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Enqueue a job for a server. Idempotent: if an identical job is
/// already queued, nothing is inserted and `None` is returned.
///
/// Takes an executor so callers can enqueue inside their own
/// transaction (the state machine does).
pub async fn enqueue<'e, E>(
    executor: E,
    server_id: Uuid,
    kind: JobKind,
) -> BillingResult<Option<Uuid>>
where
    E: PgExecutor<'e>,
{
    let id = Uuid::new_v4();
    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO provision_jobs (id, server_id, kind, status, attempts, max_attempts, run_at)
        VALUES ($1, $2, $3, 'queued', 0, $4, NOW())
        ON CONFLICT (server_id, kind) WHERE status = 'queued' DO NOTHING
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(server_id)
    .bind(kind.as_str())
    .bind(DEFAULT_MAX_ATTEMPTS)
    .fetch_optional(executor)
    .await?;

    match &inserted {
        Some((id,)) => {
            tracing::info!(job_id = %id, server_id = %server_id, kind = %kind, "Job enqueued")
        }
        None => tracing::debug!(
            server_id = %server_id,
            kind = %kind,
            "Identical job already queued, skipping"
        ),
    }

    Ok(inserted.map(|(id,)| id))
}

/// Worker-side view of the queue.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim up to `limit` due jobs. Claimed jobs move to `running`
    /// with their attempt counter bumped; SKIP LOCKED keeps multiple
    /// workers from fighting over the same rows.
    pub async fn claim_due(&self, limit: i64) -> BillingResult<Vec<ProvisionJob>> {
        let rows: Vec<(Uuid, Uuid, String, i32, i32)> = sqlx::query_as(
            r#"
            UPDATE provision_jobs SET
                status = 'running',
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM provision_jobs
                WHERE status = 'queued' AND run_at <= NOW()
                ORDER BY run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, server_id, kind, attempts, max_attempts
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (id, server_id, kind, attempts, max_attempts) in rows {
            match JobKind::parse(&kind) {
                Some(kind) => jobs.push(ProvisionJob {
                    id,
                    server_id,
                    kind,
                    attempts,
                    max_attempts,
                }),
                None => {
                    // Unknown kind means a schema/code mismatch; park
                    // the job instead of crashing the sweep.
                    tracing::error!(job_id = %id, kind = %kind, "Unknown job kind, marking dead");
                    self.mark_dead(id, &format!("unknown job kind '{}'", kind))
                        .await?;
                }
            }
        }
        Ok(jobs)
    }

    pub async fn complete(&self, job_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE provision_jobs SET status = 'done', last_error = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt. Requeues with backoff while the
    /// budget lasts; otherwise the job goes `dead`. Returns whether
    /// the failure was terminal.
    pub async fn fail(&self, job: &ProvisionJob, error: &str) -> BillingResult<bool> {
        if job.is_final_attempt() {
            self.mark_dead(job.id, error).await?;
            tracing::error!(
                job_id = %job.id,
                server_id = %job.server_id,
                kind = %job.kind,
                attempts = job.attempts,
                error = %error,
                "Job exhausted its retry budget, manual intervention required"
            );
            return Ok(true);
        }

        let delay = backoff_minutes(job.attempts);
        sqlx::query(
            r#"
            UPDATE provision_jobs SET
                status = 'queued',
                last_error = $1,
                run_at = NOW() + ($2 || ' minutes')::INTERVAL,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(error)
        .bind(delay.to_string())
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            job_id = %job.id,
            server_id = %job.server_id,
            kind = %job.kind,
            attempt = job.attempts,
            retry_in_minutes = delay,
            error = %error,
            "Job attempt failed, requeued with backoff"
        );
        Ok(false)
    }

    async fn mark_dead(&self, job_id: Uuid, error: &str) -> BillingResult<()> {
        sqlx::query(
            "UPDATE provision_jobs SET status = 'dead', last_error = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Operator tool: put a dead job back in the queue with a fresh
    /// attempt budget.
    pub async fn requeue_dead(&self, job_id: Uuid) -> BillingResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE provision_jobs SET
                status = 'queued', attempts = 0, run_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'dead'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(BillingError::NotFound(format!("dead job {}", job_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(backoff_minutes(1), 1);
        assert_eq!(backoff_minutes(2), 5);
        assert_eq!(backoff_minutes(3), 25);
        assert_eq!(backoff_minutes(7), 25);
    }

    #[test]
    fn final_attempt_detection() {
        let job = ProvisionJob {
            id: Uuid::new_v4(),
            server_id: Uuid::new_v4(),
            kind: JobKind::Provision,
            attempts: 3,
            max_attempts: 3,
        };
        assert!(job.is_final_attempt());
        let earlier = ProvisionJob { attempts: 2, ..job };
        assert!(!earlier.is_final_attempt());
    }
}
