//! Subscription/server state machine.
//!
//! The single auditable code path for every `servers` row transition.
//! Webhook events come in, local billing state and provisioning jobs
//! come out. Each transition opens a transaction and takes the server
//! row with `SELECT ... FOR UPDATE` so concurrent deliveries for the
//! same subscription serialize their read-modify-write.
//!
//! Billing truth and provisioning truth are allowed to diverge: a
//! failed panel call never rolls back what Stripe says the customer
//! paid for. Failed provisioning is recorded on the row
//! (`provision_status=failed`, `provision_error`) for operator
//! remediation after the bounded retry budget runs out.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::{PgPool, Postgres, Transaction};
use stripe::{
    CheckoutSession, Expandable, Invoice, RecurringInterval, Subscription, SubscriptionId,
    SubscriptionStatus as StripeSubStatus, UpdateSubscription,
};
use uuid::Uuid;

use pixelhost_shared::{BillingCycle, JobKind, ProvisionStatus, RecurrenceUnit, ServerStatus};

use crate::checkout::{
    META_BILLING_CYCLE, META_GAME, META_PLAN, META_REGION, META_SERVER_NAME, META_USER_ID,
    META_VARIANT,
};
use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::jobs;

/// Tunables for the state machine.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Consecutive failed invoice payments before a suspend job is
    /// queued. The grace period up to that point is Stripe's retry
    /// schedule.
    pub past_due_suspend_after: i32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            past_due_suspend_after: 3,
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        let past_due_suspend_after = std::env::var("BILLING_PAST_DUE_SUSPEND_AFTER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        Self {
            past_due_suspend_after,
        }
    }
}

/// Checkout/subscription metadata needed to build a server row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMetadata {
    pub user_id: Uuid,
    pub plan: String,
    pub game: String,
    pub variant: String,
    pub region: String,
    pub server_name: String,
    pub billing_cycle: BillingCycle,
}

impl ServerMetadata {
    /// Parse provisioning metadata out of a Stripe metadata map.
    ///
    /// Returns `Ok(None)` when the map carries no `user_id` at all
    /// (an event for some other product, acknowledged and ignored);
    /// a present-but-broken map is an error worth surfacing.
    pub fn from_map(map: &HashMap<String, String>) -> BillingResult<Option<Self>> {
        let Some(user_id_str) = map.get(META_USER_ID) else {
            return Ok(None);
        };

        let user_id = Uuid::parse_str(user_id_str)
            .map_err(|e| BillingError::Internal(format!("malformed user_id metadata: {}", e)))?;

        let field = |key: &str| -> BillingResult<String> {
            map.get(key)
                .cloned()
                .ok_or_else(|| BillingError::Internal(format!("missing '{}' metadata", key)))
        };

        let cycle_str = field(META_BILLING_CYCLE)?;
        let billing_cycle = BillingCycle::parse(&cycle_str)
            .ok_or_else(|| BillingError::Config(format!("unknown billing cycle '{}'", cycle_str)))?;

        Ok(Some(Self {
            user_id,
            plan: field(META_PLAN)?,
            game: field(META_GAME)?,
            variant: field(META_VARIANT)?,
            region: field(META_REGION)?,
            server_name: field(META_SERVER_NAME)?,
            billing_cycle,
        }))
    }
}

/// A `servers` row as the API and worker see it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub plan_key: String,
    pub game: String,
    pub variant: String,
    pub region: String,
    pub billing_cycle: String,
    pub pending_billing_cycle: Option<String>,
    pub external_id: String,
    pub stripe_subscription_id: Option<String>,
    pub panel_server_id: Option<i64>,
    pub panel_server_uuid: Option<Uuid>,
    pub panel_server_identifier: Option<String>,
    pub status: String,
    pub provision_status: String,
    pub provision_error: Option<String>,
}

const SERVER_COLUMNS: &str = "id, user_id, name, plan_key, game, variant, region, billing_cycle, \
     pending_billing_cycle, external_id, stripe_subscription_id, panel_server_id, \
     panel_server_uuid, panel_server_identifier, status, provision_status, provision_error";

/// Maps subscription webhook events to local server state and
/// provisioning actions.
pub struct ServerLifecycle {
    stripe: StripeClient,
    pool: PgPool,
    config: LifecycleConfig,
}

impl ServerLifecycle {
    pub fn new(stripe: StripeClient, pool: PgPool, config: LifecycleConfig) -> Self {
        Self {
            stripe,
            pool,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Webhook-driven transitions
    // ------------------------------------------------------------------

    /// `checkout.session.completed`: create the server row from
    /// session metadata (webhook-first creation, so abandoned
    /// checkouts leave no orphans) and queue provisioning. Repeat
    /// events for an already-provisioned server are no-ops.
    pub async fn handle_checkout_completed(&self, session: &CheckoutSession) -> BillingResult<()> {
        let Some(metadata) = &session.metadata else {
            tracing::debug!(session_id = %session.id, "Checkout session has no metadata, ignoring");
            return Ok(());
        };
        let Some(meta) = ServerMetadata::from_map(metadata)? else {
            tracing::debug!(session_id = %session.id, "Checkout session is not a server purchase, ignoring");
            return Ok(());
        };

        let subscription_id = session.subscription.as_ref().map(expandable_id);
        self.ensure_server(&meta, Some(session.id.as_str()), subscription_id.as_deref())
            .await
    }

    /// `customer.subscription.created`: same creation path keyed on
    /// the subscription id, for when this event beats the checkout
    /// event. The mirrored subscription metadata makes it
    /// self-sufficient.
    pub async fn handle_subscription_created(&self, sub: &Subscription) -> BillingResult<()> {
        let Some(meta) = ServerMetadata::from_map(&sub.metadata)? else {
            tracing::debug!(subscription_id = %sub.id, "Subscription is not a server purchase, ignoring");
            return Ok(());
        };
        self.ensure_server(&meta, None, Some(sub.id.as_str())).await
    }

    async fn ensure_server(
        &self,
        meta: &ServerMetadata,
        checkout_session_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let server_id = Uuid::new_v4();
        let external_id = format!("srv-{}", server_id);

        // Idempotent creation: unique constraints on the checkout
        // session and subscription ids catch every replay/racing
        // variant of this purchase.
        sqlx::query(
            r#"
            INSERT INTO servers (
                id, user_id, name, plan_key, game, variant, region, billing_cycle,
                stripe_checkout_session_id, stripe_subscription_id, external_id,
                status, provision_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'active', 'pending')
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(server_id)
        .bind(meta.user_id)
        .bind(&meta.server_name)
        .bind(&meta.plan)
        .bind(&meta.game)
        .bind(&meta.variant)
        .bind(&meta.region)
        .bind(meta.billing_cycle.as_str())
        .bind(checkout_session_id)
        .bind(subscription_id)
        .bind(&external_id)
        .execute(&mut *tx)
        .await?;

        // Re-read whichever row now represents this purchase, locked.
        let row: Option<(Uuid, Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT id, stripe_subscription_id, provision_status FROM servers
            WHERE stripe_checkout_session_id = $1 OR stripe_subscription_id = $2
            FOR UPDATE
            "#,
        )
        .bind(checkout_session_id)
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, existing_sub, provision_status)) = row else {
            return Err(BillingError::Internal(
                "server row missing right after idempotent insert".to_string(),
            ));
        };

        // A later event may carry the subscription id the first one
        // lacked; backfill it.
        if existing_sub.is_none() {
            if let Some(sub_id) = subscription_id {
                sqlx::query(
                    "UPDATE servers SET stripe_subscription_id = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(sub_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if ProvisionStatus::parse(&provision_status) == Some(ProvisionStatus::Provisioned) {
            tracing::info!(server_id = %id, "Server already provisioned, duplicate event is a no-op");
            tx.commit().await?;
            return Ok(());
        }

        jobs::enqueue(&mut *tx, id, JobKind::Provision).await?;
        tx.commit().await?;

        tracing::info!(
            server_id = %id,
            user_id = %meta.user_id,
            plan = %meta.plan,
            game = %meta.game,
            region = %meta.region,
            "Server row ensured, provisioning queued"
        );
        Ok(())
    }

    /// `invoice.paid` (renewal): apply any staged billing-cycle
    /// change, mark active, reset the failure streak. A payment that
    /// clears a suspension queues the panel-side unsuspend; canceled
    /// rows are never resurrected by a late invoice.
    pub async fn handle_invoice_paid(&self, invoice: &Invoice) -> BillingResult<()> {
        let Some(sub_id) = invoice.subscription.as_ref().map(expandable_id) else {
            tracing::debug!(invoice_id = %invoice.id, "Invoice has no subscription, ignoring");
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        let Some((server_id, status, pending)) =
            self.lock_by_subscription(&mut tx, &sub_id).await?
        else {
            tracing::debug!(subscription_id = %sub_id, "No server for subscription, ignoring invoice");
            return Ok(());
        };

        if let Some(pending_cycle) = &pending {
            sqlx::query(
                r#"
                UPDATE servers SET
                    billing_cycle = pending_billing_cycle,
                    pending_billing_cycle = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(server_id)
            .execute(&mut *tx)
            .await?;
            tracing::info!(
                server_id = %server_id,
                new_cycle = %pending_cycle,
                "Applied staged billing-cycle change at renewal"
            );
        }

        match ServerStatus::parse(&status).and_then(payment_clears) {
            Some(unsuspend) => {
                sqlx::query(
                    "UPDATE servers SET status = 'active', payment_failures = 0, updated_at = NOW() WHERE id = $1",
                )
                .bind(server_id)
                .execute(&mut *tx)
                .await?;
                if unsuspend {
                    jobs::enqueue(&mut *tx, server_id, JobKind::Unsuspend).await?;
                }
                tx.commit().await?;
                tracing::info!(
                    server_id = %server_id,
                    subscription_id = %sub_id,
                    unsuspending = unsuspend,
                    "Invoice paid, server active"
                );
            }
            None => {
                tx.commit().await?;
                tracing::info!(
                    server_id = %server_id,
                    subscription_id = %sub_id,
                    status = %status,
                    "Invoice paid for a server outside billing flow, status untouched"
                );
            }
        }
        Ok(())
    }

    /// `invoice.payment_failed`: past_due immediately; suspension only
    /// after the configured failure streak.
    pub async fn handle_invoice_payment_failed(&self, invoice: &Invoice) -> BillingResult<()> {
        let Some(sub_id) = invoice.subscription.as_ref().map(expandable_id) else {
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        let Some((server_id, status, _)) = self.lock_by_subscription(&mut tx, &sub_id).await?
        else {
            return Ok(());
        };

        // A canceled or suspended row keeps its status; only the
        // failure streak is tracked.
        if !matches!(status.as_str(), "pending" | "active" | "past_due") {
            sqlx::query(
                "UPDATE servers SET payment_failures = payment_failures + 1, updated_at = NOW() WHERE id = $1",
            )
            .bind(server_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::debug!(
                server_id = %server_id,
                status = %status,
                "Payment failure for a server outside billing flow"
            );
            return Ok(());
        }

        let (failures,): (i32,) = sqlx::query_as(
            r#"
            UPDATE servers SET
                status = 'past_due',
                payment_failures = payment_failures + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING payment_failures
            "#,
        )
        .bind(server_id)
        .fetch_one(&mut *tx)
        .await?;

        let suspend = failures >= self.config.past_due_suspend_after;
        if suspend {
            jobs::enqueue(&mut *tx, server_id, JobKind::Suspend).await?;
        }
        tx.commit().await?;

        tracing::warn!(
            server_id = %server_id,
            subscription_id = %sub_id,
            consecutive_failures = failures,
            suspending = suspend,
            "Invoice payment failed"
        );
        Ok(())
    }

    /// `customer.subscription.updated`: stage a billing-cycle change
    /// if the item's price maps to a different interval (applied at
    /// next renewal, never mid-cycle), and mirror billing status.
    pub async fn handle_subscription_updated(&self, sub: &Subscription) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;
        let sub_id = sub.id.to_string();
        let Some((server_id, current_status_str, _)) =
            self.lock_by_subscription(&mut tx, &sub_id).await?
        else {
            tracing::debug!(subscription_id = %sub.id, "No server for updated subscription, ignoring");
            return Ok(());
        };

        let (current_cycle_str,): (String,) =
            sqlx::query_as("SELECT billing_cycle FROM servers WHERE id = $1")
                .bind(server_id)
                .fetch_one(&mut *tx)
                .await?;

        if let Some(new_cycle) = subscription_cycle(sub) {
            let current_cycle = BillingCycle::parse(&current_cycle_str).ok_or_else(|| {
                BillingError::Internal(format!("corrupt billing_cycle '{}'", current_cycle_str))
            })?;
            let staged = staged_cycle(current_cycle, new_cycle);
            sqlx::query(
                "UPDATE servers SET pending_billing_cycle = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(staged.map(|c| c.as_str()))
            .bind(server_id)
            .execute(&mut *tx)
            .await?;
            if let Some(staged) = staged {
                tracing::info!(
                    server_id = %server_id,
                    staged_cycle = %staged,
                    "Billing-cycle change staged for next renewal"
                );
            }
        }

        if let Some(current) = ServerStatus::parse(&current_status_str) {
            if let Some(next) = mirrored_status(current, sub.status) {
                sqlx::query("UPDATE servers SET status = $1, updated_at = NOW() WHERE id = $2")
                    .bind(next.as_str())
                    .bind(server_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// `customer.subscription.deleted`: canceled + suspend job.
    /// Deletion stays a distinct, user/admin-initiated, irreversible
    /// action with its own confirmation flow.
    pub async fn handle_subscription_deleted(&self, sub: &Subscription) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;
        let sub_id = sub.id.to_string();
        let Some((server_id, _, _)) = self.lock_by_subscription(&mut tx, &sub_id).await? else {
            return Ok(());
        };

        sqlx::query("UPDATE servers SET status = 'canceled', updated_at = NOW() WHERE id = $1")
            .bind(server_id)
            .execute(&mut *tx)
            .await?;
        jobs::enqueue(&mut *tx, server_id, JobKind::Suspend).await?;
        tx.commit().await?;

        tracing::info!(
            server_id = %server_id,
            subscription_id = %sub.id,
            "Subscription canceled, suspension queued"
        );
        Ok(())
    }

    async fn lock_by_subscription(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        subscription_id: &str,
    ) -> BillingResult<Option<(Uuid, String, Option<String>)>> {
        let row: Option<(Uuid, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, status, pending_billing_cycle FROM servers
            WHERE stripe_subscription_id = $1 AND status != 'deleted'
            FOR UPDATE
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Provisioning outcome recording (worker-side)
    // ------------------------------------------------------------------

    /// Load everything the worker needs to execute a job.
    pub async fn server_for_provisioning(&self, server_id: Uuid) -> BillingResult<ServerRecord> {
        let row: Option<ServerRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM servers WHERE id = $1",
            SERVER_COLUMNS
        ))
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| BillingError::NotFound(format!("server {}", server_id)))
    }

    /// Mark the provisioning call dispatched.
    pub async fn begin_provision(&self, server_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE servers SET provision_status = 'provisioning', updated_at = NOW() WHERE id = $1",
        )
        .bind(server_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist remote identifiers after the panel call succeeded. The
    /// local row only changes after remote success.
    pub async fn record_provision_success(
        &self,
        server_id: Uuid,
        panel_server_id: i64,
        panel_server_uuid: Uuid,
        panel_server_identifier: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE servers SET
                provision_status = 'provisioned',
                provision_error = NULL,
                panel_server_id = $1,
                panel_server_uuid = $2,
                panel_server_identifier = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(panel_server_id)
        .bind(panel_server_uuid)
        .bind(panel_server_identifier)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            server_id = %server_id,
            panel_server_id,
            identifier = %panel_server_identifier,
            "Server provisioned"
        );
        Ok(())
    }

    /// Record a failed provisioning attempt. Billing status stays
    /// whatever Stripe says; the failure is surfaced for operators,
    /// not rolled back.
    pub async fn record_provision_failure(
        &self,
        server_id: Uuid,
        error: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE servers SET
                provision_status = 'failed',
                provision_error = $1,
                provision_attempts = provision_attempts + 1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(server_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a server suspended/unsuspended after the panel call
    /// succeeded. A canceled or deleted row keeps its status; only
    /// the billing-driven states flip.
    pub async fn record_suspension(&self, server_id: Uuid, suspended: bool) -> BillingResult<()> {
        if suspended {
            sqlx::query(
                r#"
                UPDATE servers SET status = 'suspended', updated_at = NOW()
                WHERE id = $1 AND status IN ('pending', 'active', 'past_due')
                "#,
            )
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE servers SET status = 'active', updated_at = NOW()
                WHERE id = $1 AND status = 'suspended'
                "#,
            )
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // User/admin-initiated operations (API-side)
    // ------------------------------------------------------------------

    /// Fetch a server, enforcing ownership.
    pub async fn owned_server(&self, user_id: Uuid, server_id: Uuid) -> BillingResult<ServerRecord> {
        let row: Option<ServerRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM servers WHERE id = $1 AND user_id = $2 AND status != 'deleted'",
            SERVER_COLUMNS
        ))
        .bind(server_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| BillingError::NotFound(format!("server {}", server_id)))
    }

    /// User-initiated cancel: stop renewals upstream, mark canceled,
    /// queue suspension. The remote server is suspended, not deleted.
    pub async fn cancel_server(&self, user_id: Uuid, server_id: Uuid) -> BillingResult<()> {
        let server = self.owned_server(user_id, server_id).await?;

        if let Some(sub_id) = &server.stripe_subscription_id {
            let parsed = SubscriptionId::from_str(sub_id)
                .map_err(|e| BillingError::Internal(format!("bad subscription id: {}", e)))?;
            let params = UpdateSubscription {
                cancel_at_period_end: Some(true),
                ..Default::default()
            };
            Subscription::update(self.stripe.inner(), &parsed, params).await?;
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE servers SET status = 'canceled', updated_at = NOW() WHERE id = $1")
            .bind(server_id)
            .execute(&mut *tx)
            .await?;
        jobs::enqueue(&mut *tx, server_id, JobKind::Suspend).await?;
        tx.commit().await?;

        tracing::info!(server_id = %server_id, user_id = %user_id, "Server canceled by user");
        Ok(())
    }

    /// Mark a server deleted after the remote force-delete succeeded.
    /// Callers must NOT invoke this if the panel call failed, or local
    /// and remote state diverge.
    pub async fn record_deletion(&self, server_id: Uuid) -> BillingResult<()> {
        sqlx::query("UPDATE servers SET status = 'deleted', updated_at = NOW() WHERE id = $1")
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Extract the plain id from an expandable reference.
fn expandable_id<T>(e: &Expandable<T>) -> String
where
    T: stripe::Object,
    T::Id: ToString,
{
    match e {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(obj) => obj.id().to_string(),
    }
}

/// Billing cycle implied by a subscription's first item price, if the
/// recurrence maps to one of ours.
fn subscription_cycle(sub: &Subscription) -> Option<BillingCycle> {
    let recurring = sub
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .and_then(|price| price.recurring.as_ref())?;

    let unit = match recurring.interval {
        RecurringInterval::Month => RecurrenceUnit::Month,
        RecurringInterval::Year => RecurrenceUnit::Year,
        _ => return None,
    };
    BillingCycle::from_recurrence(recurring.interval_count, unit)
}

/// What to stage as the pending cycle: a differing incoming cycle, or
/// nothing (which also clears a stale staged change when the user
/// reverts before renewal).
fn staged_cycle(current: BillingCycle, incoming: BillingCycle) -> Option<BillingCycle> {
    (incoming != current).then_some(incoming)
}

/// Effect of a paid invoice on the server's status. `Some(unsuspend)`
/// means the row goes active, with `unsuspend` requesting the
/// panel-side lift for a previously suspended server. `None` leaves
/// the row alone: a late renewal invoice must not resurrect a
/// canceled or deleted server.
fn payment_clears(current: ServerStatus) -> Option<bool> {
    match current {
        ServerStatus::Pending | ServerStatus::Active | ServerStatus::PastDue => Some(false),
        ServerStatus::Suspended => Some(true),
        ServerStatus::Canceled | ServerStatus::Deleted => None,
    }
}

/// Billing status to mirror from a subscription event, if any. Only
/// the billing-driven states move; suspended/canceled/deleted rows are
/// left for their own flows.
fn mirrored_status(current: ServerStatus, incoming: StripeSubStatus) -> Option<ServerStatus> {
    let movable = matches!(
        current,
        ServerStatus::Pending | ServerStatus::Active | ServerStatus::PastDue
    );
    if !movable {
        return None;
    }
    let next = match incoming {
        StripeSubStatus::Active => ServerStatus::Active,
        StripeSubStatus::PastDue | StripeSubStatus::Unpaid => ServerStatus::PastDue,
        StripeSubStatus::Canceled => ServerStatus::Canceled,
        _ => return None,
    };
    (next != current).then_some(next)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn full_metadata() -> HashMap<String, String> {
        HashMap::from([
            ("user_id".to_string(), Uuid::new_v4().to_string()),
            ("plan".to_string(), "core".to_string()),
            ("game".to_string(), "minecraft".to_string()),
            ("variant".to_string(), "paper".to_string()),
            ("region".to_string(), "eu-central".to_string()),
            ("server_name".to_string(), "my smp".to_string()),
            ("billing_cycle".to_string(), "monthly".to_string()),
        ])
    }

    #[test]
    fn metadata_parses_when_complete() {
        let meta = ServerMetadata::from_map(&full_metadata()).unwrap().unwrap();
        assert_eq!(meta.plan, "core");
        assert_eq!(meta.billing_cycle, BillingCycle::Monthly);
    }

    #[test]
    fn foreign_metadata_is_ignored_not_an_error() {
        let map = HashMap::from([("checkout_type".to_string(), "gift_card".to_string())]);
        assert!(ServerMetadata::from_map(&map).unwrap().is_none());
    }

    #[test]
    fn broken_metadata_is_an_error() {
        let mut map = full_metadata();
        map.remove("plan");
        assert!(ServerMetadata::from_map(&map).is_err());

        let mut map = full_metadata();
        map.insert("billing_cycle".to_string(), "fortnightly".to_string());
        assert!(matches!(
            ServerMetadata::from_map(&map),
            Err(BillingError::Config(_))
        ));
    }

    #[test]
    fn cycle_staging_only_on_change() {
        assert_eq!(
            staged_cycle(BillingCycle::Monthly, BillingCycle::Annual),
            Some(BillingCycle::Annual)
        );
        assert_eq!(staged_cycle(BillingCycle::Monthly, BillingCycle::Monthly), None);
    }

    #[test]
    fn status_mirror_moves_billing_states_only() {
        assert_eq!(
            mirrored_status(ServerStatus::Active, StripeSubStatus::PastDue),
            Some(ServerStatus::PastDue)
        );
        assert_eq!(
            mirrored_status(ServerStatus::PastDue, StripeSubStatus::Active),
            Some(ServerStatus::Active)
        );
        // No-op when already there.
        assert_eq!(
            mirrored_status(ServerStatus::Active, StripeSubStatus::Active),
            None
        );
        // Suspended rows belong to the suspension flow.
        assert_eq!(
            mirrored_status(ServerStatus::Suspended, StripeSubStatus::Active),
            None
        );
        // Trialing and friends don't map.
        assert_eq!(
            mirrored_status(ServerStatus::Active, StripeSubStatus::Trialing),
            None
        );
    }

    #[test]
    fn paid_invoice_reactivates_billing_states() {
        assert_eq!(payment_clears(ServerStatus::Pending), Some(false));
        assert_eq!(payment_clears(ServerStatus::Active), Some(false));
        assert_eq!(payment_clears(ServerStatus::PastDue), Some(false));
    }

    #[test]
    fn paid_invoice_lifts_suspension_via_worker() {
        assert_eq!(payment_clears(ServerStatus::Suspended), Some(true));
    }

    #[test]
    fn paid_invoice_never_resurrects_terminal_states() {
        assert_eq!(payment_clears(ServerStatus::Canceled), None);
        assert_eq!(payment_clears(ServerStatus::Deleted), None);
    }

    #[test]
    fn unpaid_counts_as_past_due() {
        assert_eq!(
            mirrored_status(ServerStatus::Active, StripeSubStatus::Unpaid),
            Some(ServerStatus::PastDue)
        );
    }
}
