//! Provisioning job execution.
//!
//! Pulls claimed jobs from the queue and runs them against the panel.
//! Every branch is idempotent: re-running a job after a crash or a
//! duplicate claim converges on the same panel and database state.

use rand::Rng;
use sqlx::PgPool;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{error, info, warn};
use uuid::Uuid;

use pixelhost_billing::{JobQueue, ProvisionJob, ServerLifecycle, ServerRecord};
use pixelhost_panel::{CreateServerParams, CreateUserParams, PanelClient, PanelError};
use pixelhost_shared::{JobKind, ProvisionStatus};

/// Jobs claimed per sweep.
const CLAIM_BATCH: i64 = 10;

pub struct Provisioner {
    pool: PgPool,
    queue: JobQueue,
    lifecycle: ServerLifecycle,
    panel: PanelClient,
}

impl Provisioner {
    pub fn new(
        pool: PgPool,
        queue: JobQueue,
        lifecycle: ServerLifecycle,
        panel: PanelClient,
    ) -> Self {
        Self {
            pool,
            queue,
            lifecycle,
            panel,
        }
    }

    /// One queue sweep: claim due jobs and execute them in order.
    pub async fn sweep(&self) {
        let jobs = match self.queue.claim_due(CLAIM_BATCH).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to claim provisioning jobs");
                return;
            }
        };
        if jobs.is_empty() {
            return;
        }

        info!(count = jobs.len(), "Claimed provisioning jobs");
        for job in jobs {
            self.run_job(&job).await;
        }
    }

    async fn run_job(&self, job: &ProvisionJob) {
        match self.execute(job).await {
            Ok(()) => {
                if let Err(e) = self.queue.complete(job.id).await {
                    error!(job_id = %job.id, error = %e, "Failed to mark job done");
                }
            }
            Err(e) => {
                let message = e.to_string();
                match self.queue.fail(job, &message).await {
                    Ok(terminal) => {
                        if terminal && job.kind == JobKind::Provision {
                            if let Err(e) = self
                                .lifecycle
                                .record_provision_failure(job.server_id, &message)
                                .await
                            {
                                error!(
                                    server_id = %job.server_id,
                                    error = %e,
                                    "Failed to record terminal provisioning failure"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to record job failure");
                    }
                }
            }
        }
    }

    async fn execute(&self, job: &ProvisionJob) -> anyhow::Result<()> {
        let server = self.lifecycle.server_for_provisioning(job.server_id).await?;

        // A deleted server has nothing left to act on; the delete job
        // itself is the exception.
        if server.status == "deleted" && job.kind != JobKind::Delete {
            info!(server_id = %server.id, kind = %job.kind, "Server already deleted, dropping job");
            return Ok(());
        }

        match job.kind {
            JobKind::Provision => self.provision(&server).await,
            JobKind::Suspend => self.suspend(&server).await,
            JobKind::Unsuspend => self.unsuspend(&server).await,
            JobKind::Delete => self.delete(&server).await,
        }
    }

    async fn provision(&self, server: &ServerRecord) -> anyhow::Result<()> {
        if ProvisionStatus::parse(&server.provision_status) == Some(ProvisionStatus::Provisioned) {
            info!(server_id = %server.id, "Server already provisioned, nothing to do");
            return Ok(());
        }

        self.lifecycle.begin_provision(server.id).await?;

        let panel_user_id = self.ensure_panel_user(server.user_id).await?;

        let params = CreateServerParams {
            name: server.name.clone(),
            panel_user_id,
            external_id: server.external_id.clone(),
            plan_key: server.plan_key.clone(),
            game: server.game.clone(),
            variant: server.variant.clone(),
            region: server.region.clone(),
        };
        let created = with_panel_retry(|| self.panel.create_server(&params)).await?;

        self.lifecycle
            .record_provision_success(
                server.id,
                i64::from(created.id),
                created.uuid,
                &created.identifier,
            )
            .await?;
        Ok(())
    }

    async fn suspend(&self, server: &ServerRecord) -> anyhow::Result<()> {
        let Some(raw_id) = server.panel_server_id else {
            // Never provisioned; there is nothing remote to suspend.
            warn!(server_id = %server.id, "Suspend requested for unprovisioned server, skipping");
            return Ok(());
        };
        let panel_server_id = panel_id(raw_id)?;
        with_panel_retry(|| self.panel.suspend_server(panel_server_id)).await?;
        self.lifecycle.record_suspension(server.id, true).await?;
        info!(server_id = %server.id, panel_server_id, "Server suspended");
        Ok(())
    }

    async fn unsuspend(&self, server: &ServerRecord) -> anyhow::Result<()> {
        let Some(raw_id) = server.panel_server_id else {
            warn!(server_id = %server.id, "Unsuspend requested for unprovisioned server, skipping");
            return Ok(());
        };
        let panel_server_id = panel_id(raw_id)?;
        with_panel_retry(|| self.panel.unsuspend_server(panel_server_id)).await?;
        self.lifecycle.record_suspension(server.id, false).await?;
        info!(server_id = %server.id, panel_server_id, "Server unsuspended");
        Ok(())
    }

    async fn delete(&self, server: &ServerRecord) -> anyhow::Result<()> {
        if let Some(raw_id) = server.panel_server_id {
            let panel_server_id = panel_id(raw_id)?;
            with_panel_retry(|| self.panel.force_delete_server(panel_server_id)).await?;
        }
        self.lifecycle.record_deletion(server.id).await?;
        info!(server_id = %server.id, "Server deleted");
        Ok(())
    }

    /// Resolve the user's panel account id, creating the account on
    /// first need.
    async fn ensure_panel_user(&self, user_id: Uuid) -> anyhow::Result<u32> {
        let row: Option<(Option<i64>, String, String)> = sqlx::query_as(
            "SELECT panel_user_id, email, display_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((panel_user_id, email, display_name)) = row else {
            anyhow::bail!("user {} not found", user_id);
        };
        if let Some(id) = panel_user_id {
            return panel_id(id);
        }

        let params = CreateUserParams {
            email,
            name: display_name,
            password: random_password(),
        };
        let panel_user = with_panel_retry(|| self.panel.create_user(&params)).await?;

        sqlx::query(
            "UPDATE users SET panel_user_id = $1, panel_username = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(i64::from(panel_user.id))
        .bind(&panel_user.username)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        info!(user_id = %user_id, panel_user_id = panel_user.id, "Panel user created");
        Ok(panel_user.id)
    }
}

/// Stored panel ids are BIGINT; the panel API speaks u32.
fn panel_id(raw: i64) -> anyhow::Result<u32> {
    u32::try_from(raw).map_err(|_| anyhow::anyhow!("stored panel id {} out of range", raw))
}

/// Short in-process retry for transient panel failures. Persistent
/// failures bubble up to the queue's longer backoff.
async fn with_panel_retry<T, F, Fut>(call: F) -> Result<T, PanelError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, PanelError>>,
{
    let strategy = ExponentialBackoff::from_millis(500).map(jitter).take(2);
    RetryIf::spawn(strategy, call, is_transient).await
}

fn is_transient(error: &PanelError) -> bool {
    matches!(
        error,
        PanelError::Timeout | PanelError::Transport(_) | PanelError::Api { status: 500..=599, .. }
    )
}

fn random_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();
    (0..24)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(is_transient(&PanelError::Timeout));
        assert!(is_transient(&PanelError::Transport("reset".to_string())));
        assert!(is_transient(&PanelError::Api {
            status: 502,
            message: "bad gateway".to_string()
        }));
        assert!(!is_transient(&PanelError::Auth));
        assert!(!is_transient(&PanelError::Validation("bad egg".to_string())));
        assert!(!is_transient(&PanelError::Api {
            status: 422,
            message: "invalid".to_string()
        }));
    }

    #[test]
    fn random_password_shape() {
        let p = random_password();
        assert_eq!(p.len(), 24);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
