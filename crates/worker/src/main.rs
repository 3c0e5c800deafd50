//! Pixelhost Background Worker
//!
//! Handles scheduled jobs:
//! - Provisioning queue sweep (every minute)
//! - Catalog drift check against Stripe (daily at 3:00 UTC, dry-run)
//! - Health check heartbeat (every 5 minutes)

mod provisioner;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use pixelhost_billing::{default_catalog, BillingService, LifecycleConfig, ServerLifecycle, StripeClient};
use pixelhost_panel::PanelClient;

use crate::provisioner::Provisioner;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Pixelhost Worker");

    let pool = create_db_pool().await?;

    let stripe = StripeClient::from_env()?;
    let billing = Arc::new(BillingService::new(
        stripe.clone(),
        pool.clone(),
        LifecycleConfig::from_env(),
    ));
    let panel = PanelClient::from_env()?;

    let lifecycle = ServerLifecycle::new(stripe, pool.clone(), LifecycleConfig::from_env());
    let provisioner = Arc::new(Provisioner::new(
        pool.clone(),
        billing.jobs.clone(),
        lifecycle,
        panel,
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Provisioning queue sweep (every minute)
    let sweep_provisioner = provisioner.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let provisioner = sweep_provisioner.clone();
            Box::pin(async move {
                provisioner.sweep().await;
            })
        })?)
        .await?;
    info!("Scheduled: Provisioning queue sweep (every minute)");

    // Job 2: Catalog drift check (daily at 3:00 UTC)
    // Dry-run sync against Stripe; drift is reported, never applied
    // automatically.
    let drift_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let billing = drift_billing.clone();
            Box::pin(async move {
                info!("Running daily catalog drift check (dry-run)");
                match billing.catalog.sync(&default_catalog(), true).await {
                    Ok(report) if report.in_sync() => {
                        info!(unchanged = report.unchanged, "Catalog is in sync with Stripe");
                    }
                    Ok(report) => {
                        error!(
                            products_created = report.products_created,
                            prices_created = report.prices_created,
                            prices_deactivated = report.prices_deactivated,
                            actions = ?report.actions,
                            "Catalog drift detected, run a real sync to reconcile"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Catalog drift check failed");
                    }
                }
            })
        })?)
        .await?;
    info!("Scheduled: Catalog drift check (daily at 3:00 UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Pixelhost Worker started successfully with {} scheduled jobs", 3);

    // Keep the main task running; the scheduler runs jobs in
    // background tasks.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
