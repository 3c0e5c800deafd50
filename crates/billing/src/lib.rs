// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::field_reassign_with_default)] // Used for conditional struct field setting
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pixelhost Billing Module
//!
//! Handles Stripe integration for plan subscriptions and the server
//! lifecycle they drive.
//!
//! ## Features
//!
//! - **Catalog Sync**: Reconcile the declarative plan/price list with
//!   Stripe and the local database, with dry-run drift detection
//! - **Checkout**: Hosted Stripe Checkout sessions carrying
//!   provisioning metadata
//! - **Webhooks**: Signature-verified, deduplicated Stripe event
//!   ingestion
//! - **Server Lifecycle**: Subscription state mapped onto game-server
//!   rows (active, past_due, suspended, canceled, deleted)
//! - **Job Queue**: Postgres-backed provisioning queue with bounded
//!   retries and dead-lettering

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Catalog
pub use catalog::{default_catalog, CatalogService, PlanSpec, SyncReport};

// Checkout
pub use checkout::{CheckoutRequest, CheckoutResponse, CheckoutService};

// Client
pub use client::{StripeClient, StripeConfig};

// Errors
pub use error::{BillingError, BillingResult};

// Jobs
pub use jobs::{JobQueue, ProvisionJob, DEFAULT_MAX_ATTEMPTS};

// Lifecycle
pub use lifecycle::{LifecycleConfig, ServerLifecycle, ServerMetadata, ServerRecord};

// Webhooks
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Bundle of all billing services over one pool and Stripe client.
///
/// The API and worker construct this once at startup and hand out the
/// pieces they need.
pub struct BillingService {
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub lifecycle: ServerLifecycle,
    pub webhooks: WebhookHandler,
    pub jobs: JobQueue,
}

impl BillingService {
    pub fn new(stripe: StripeClient, pool: PgPool, lifecycle_config: LifecycleConfig) -> Self {
        let catalog = CatalogService::new(stripe.clone(), pool.clone());
        let checkout = CheckoutService::new(stripe.clone(), pool.clone());
        let lifecycle = ServerLifecycle::new(stripe.clone(), pool.clone(), lifecycle_config.clone());
        let webhook_lifecycle = ServerLifecycle::new(stripe.clone(), pool.clone(), lifecycle_config);
        let webhooks = WebhookHandler::new(stripe.clone(), pool.clone(), webhook_lifecycle);
        let jobs = JobQueue::new(pool);

        Self {
            catalog,
            checkout,
            lifecycle,
            webhooks,
            jobs,
        }
    }

    /// Construct from `STRIPE_*` / `BILLING_*` environment variables.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::new(stripe, pool, LifecycleConfig::from_env()))
    }
}
