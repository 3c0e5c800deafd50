//! Checkout orchestration.
//!
//! Turns a user's plan/cycle selection into a hosted Stripe Checkout
//! session. The session (and its subscription) carries everything
//! needed to provision after payment in metadata, so the webhook path
//! never depends on client-supplied state after redirect. The success
//! return path does NOT provision; provisioning is driven exclusively
//! by the webhook stream to avoid a double-provision race between the
//! redirect and the webhook.

use std::collections::HashMap;

use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData,
};
use uuid::Uuid;

use pixelhost_shared::{game_variant, plan_resources, BillingCycle};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

// Metadata keys shared between session creation and webhook-side
// server construction. The webhook reads exactly these.
pub const META_USER_ID: &str = "user_id";
pub const META_PLAN: &str = "plan";
pub const META_GAME: &str = "game";
pub const META_VARIANT: &str = "variant";
pub const META_REGION: &str = "region";
pub const META_SERVER_NAME: &str = "server_name";
pub const META_BILLING_CYCLE: &str = "billing_cycle";

/// A user's plan selection, as received by the checkout endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    pub billing_cycle: String,
    pub game: String,
    pub variant: String,
    pub region: String,
    pub server_name: String,
}

/// Hosted checkout session handle returned to the client.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

/// Creates hosted checkout sessions for plan purchases.
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    pub async fn create_session(
        &self,
        user_id: Uuid,
        req: &CheckoutRequest,
    ) -> BillingResult<CheckoutResponse> {
        // User-input validation happens before any side effect.
        let cycle = BillingCycle::parse(&req.billing_cycle)
            .ok_or_else(|| BillingError::InvalidBillingCycle(req.billing_cycle.clone()))?;
        if game_variant(&req.game, &req.variant).is_none() {
            return Err(BillingError::InvalidInput(format!(
                "unknown game variant '{}/{}'",
                req.game, req.variant
            )));
        }
        if plan_resources(&req.plan).is_none() {
            return Err(BillingError::InvalidInput(format!(
                "unknown plan '{}'",
                req.plan
            )));
        }
        let server_name = req.server_name.trim();
        if server_name.is_empty() || server_name.len() > 48 {
            return Err(BillingError::InvalidInput(
                "server name must be 1-48 characters".to_string(),
            ));
        }

        let price_id = self.active_price_id(&req.plan, cycle).await?;

        let mut metadata = HashMap::new();
        metadata.insert(META_USER_ID.to_string(), user_id.to_string());
        metadata.insert(META_PLAN.to_string(), req.plan.clone());
        metadata.insert(META_GAME.to_string(), req.game.clone());
        metadata.insert(META_VARIANT.to_string(), req.variant.clone());
        metadata.insert(META_REGION.to_string(), req.region.clone());
        metadata.insert(META_SERVER_NAME.to_string(), server_name.to_string());
        metadata.insert(META_BILLING_CYCLE.to_string(), cycle.as_str().to_string());

        let config = self.stripe.config();
        let user_id_str = user_id.to_string();

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&config.checkout_success_url);
        params.cancel_url = Some(&config.checkout_cancel_url);
        params.client_reference_id = Some(&user_id_str);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(metadata.clone());
        // Mirror the metadata onto the subscription so subscription.*
        // events can stand alone.
        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(metadata),
            ..Default::default()
        });

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        let checkout_url = session.url.ok_or_else(|| {
            BillingError::Internal("Stripe returned a session with no URL".to_string())
        })?;

        tracing::info!(
            user_id = %user_id,
            plan = %req.plan,
            billing_cycle = %cycle,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CheckoutResponse {
            checkout_url,
            session_id: session.id.to_string(),
        })
    }

    /// Resolve the single active price for (plan, cycle, currency).
    /// Absence for a published plan is a catalog bug surfaced as a
    /// server error, never a user error.
    async fn active_price_id(&self, plan: &str, cycle: BillingCycle) -> BillingResult<String> {
        let currency = self.stripe.config().currency.to_string();
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT pp.stripe_price_id
            FROM plan_prices pp
            JOIN plans p ON p.id = pp.plan_id
            WHERE p.key = $1 AND pp.billing_cycle = $2 AND pp.currency = $3
              AND pp.active AND p.active
            "#,
        )
        .bind(plan)
        .bind(cycle.as_str())
        .bind(&currency)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id,)| id)
            .ok_or_else(|| BillingError::PlanNotPurchasable {
                plan: plan.to_string(),
                cycle: cycle.as_str().to_string(),
            })
    }
}
