//! Plan/price catalog sync.
//!
//! Reconciles the declarative price list against Stripe Product/Price
//! objects and local `plans` / `plan_prices` rows. Stripe prices are
//! immutable upstream: an amount change always means a new Price
//! object, deactivating the old local row and inserting a new active
//! one. At most one active row per (plan, cycle, currency) at any
//! time.
//!
//! The whole sync runs in a single transaction; a mid-sync failure
//! rolls back everything so local state never references external
//! objects that don't exist. Dry-run performs the same reads and
//! decisions, issues no Stripe mutations, and rolls the local writes
//! back.

use std::str::FromStr;

use sqlx::{PgPool, Postgres, Transaction};
use stripe::{
    CreatePrice, CreatePriceRecurring, CreatePriceRecurringInterval, CreateProduct, IdOrCreate,
    Price, Product, ProductId, UpdateProduct,
};
use uuid::Uuid;

use pixelhost_shared::{BillingCycle, RecurrenceUnit};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// One plan in the declarative catalog.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub key: String,
    pub name: String,
    /// Cycle to minor-unit amount, in catalog order.
    pub prices: Vec<(BillingCycle, i64)>,
}

/// The published catalog. Amounts are minor units in the configured
/// currency.
pub fn default_catalog() -> Vec<PlanSpec> {
    vec![
        PlanSpec {
            key: "core".to_string(),
            name: "Core".to_string(),
            prices: vec![
                (BillingCycle::Monthly, 1099),
                (BillingCycle::Quarterly, 2999),
                (BillingCycle::SemiAnnual, 5699),
                (BillingCycle::Annual, 10599),
            ],
        },
        PlanSpec {
            key: "boost".to_string(),
            name: "Boost".to_string(),
            prices: vec![
                (BillingCycle::Monthly, 1999),
                (BillingCycle::Quarterly, 5499),
                (BillingCycle::SemiAnnual, 10499),
                (BillingCycle::Annual, 19499),
            ],
        },
        PlanSpec {
            key: "ultra".to_string(),
            name: "Ultra".to_string(),
            prices: vec![
                (BillingCycle::Monthly, 3699),
                (BillingCycle::Quarterly, 10199),
                (BillingCycle::SemiAnnual, 19499),
                (BillingCycle::Annual, 36499),
            ],
        },
    ]
}

/// What a sync run did (or, in dry-run, would do).
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub products_created: usize,
    pub prices_created: usize,
    pub prices_deactivated: usize,
    pub unchanged: usize,
    /// Human-readable action log for operator review.
    pub actions: Vec<String>,
}

impl SyncReport {
    pub fn in_sync(&self) -> bool {
        self.products_created == 0 && self.prices_created == 0 && self.prices_deactivated == 0
    }
}

/// Catalog reconciliation service.
pub struct CatalogService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CatalogService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Reconcile the given plan specs. `dry_run` previews drift
    /// without committing anything, locally or remotely.
    pub async fn sync(&self, specs: &[PlanSpec], dry_run: bool) -> BillingResult<SyncReport> {
        let mut report = SyncReport {
            dry_run,
            ..SyncReport::default()
        };
        let currency = self.stripe.config().currency.to_string();

        let mut tx = self.pool.begin().await?;

        for spec in specs {
            self.sync_plan(&mut tx, spec, &currency, dry_run, &mut report)
                .await?;
        }

        if dry_run {
            tx.rollback().await?;
            tracing::info!(
                actions = report.actions.len(),
                "Catalog dry-run complete, local changes rolled back"
            );
        } else {
            tx.commit().await?;
            tracing::info!(
                products_created = report.products_created,
                prices_created = report.prices_created,
                prices_deactivated = report.prices_deactivated,
                unchanged = report.unchanged,
                "Catalog sync committed"
            );
        }

        Ok(report)
    }

    async fn sync_plan(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        spec: &PlanSpec,
        currency: &str,
        dry_run: bool,
        report: &mut SyncReport,
    ) -> BillingResult<()> {
        // Fetch-or-create the local plan row, locked for the duration
        // of the sync.
        let existing: Option<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, stripe_product_id FROM plans WHERE key = $1 FOR UPDATE")
                .bind(&spec.key)
                .fetch_optional(&mut **tx)
                .await?;

        let (plan_id, product_id) = match existing {
            Some((id, product_id)) => {
                sqlx::query("UPDATE plans SET name = $1, updated_at = NOW() WHERE id = $2")
                    .bind(&spec.name)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                (id, product_id)
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO plans (id, key, name, active) VALUES ($1, $2, $3, TRUE)",
                )
                .bind(id)
                .bind(&spec.key)
                .bind(&spec.name)
                .execute(&mut **tx)
                .await?;
                report.actions.push(format!("create plan '{}'", spec.key));
                (id, None)
            }
        };

        // stripe_product_id is set at most once, lazily on first sync.
        let product_id = match product_id {
            Some(pid) => {
                if !dry_run {
                    self.push_product_update(&pid, spec).await;
                }
                pid
            }
            None => {
                let pid = if dry_run {
                    format!("dry_run_prod_{}", spec.key)
                } else {
                    let mut params = CreateProduct::new(&spec.name);
                    params.metadata = Some(std::collections::HashMap::from([(
                        "plan_key".to_string(),
                        spec.key.clone(),
                    )]));
                    let product = Product::create(self.stripe.inner(), params).await?;
                    product.id.to_string()
                };
                sqlx::query("UPDATE plans SET stripe_product_id = $1, updated_at = NOW() WHERE id = $2")
                    .bind(&pid)
                    .bind(plan_id)
                    .execute(&mut **tx)
                    .await?;
                report.products_created += 1;
                report
                    .actions
                    .push(format!("create stripe product for '{}'", spec.key));
                pid
            }
        };

        for (cycle, amount) in &spec.prices {
            self.sync_price(tx, spec, plan_id, &product_id, *cycle, *amount, currency, dry_run, report)
                .await?;
        }

        Ok(())
    }

    /// Best-effort remote name/active push for an existing product.
    /// Failures are logged, not retried inline, and never abort the
    /// sync.
    async fn push_product_update(&self, product_id: &str, spec: &PlanSpec) {
        let parsed = match ProductId::from_str(product_id) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    plan = %spec.key,
                    stripe_product_id = %product_id,
                    error = %e,
                    "Stored product id failed to parse, skipping remote update"
                );
                return;
            }
        };

        let mut params = UpdateProduct::new();
        params.name = Some(&spec.name);
        params.active = Some(true);

        if let Err(e) = Product::update(self.stripe.inner(), &parsed, params).await {
            tracing::warn!(
                plan = %spec.key,
                error = %e,
                "Failed to push product update to Stripe (non-fatal)"
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_price(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        spec: &PlanSpec,
        plan_id: Uuid,
        product_id: &str,
        cycle: BillingCycle,
        amount: i64,
        currency: &str,
        dry_run: bool,
        report: &mut SyncReport,
    ) -> BillingResult<()> {
        let active: Option<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT id, unit_amount FROM plan_prices
            WHERE plan_id = $1 AND billing_cycle = $2 AND currency = $3 AND active
            "#,
        )
        .bind(plan_id)
        .bind(cycle.as_str())
        .bind(currency)
        .fetch_optional(&mut **tx)
        .await?;

        match price_action(active.map(|(_, existing)| existing), amount) {
            PriceAction::Keep => {
                report.unchanged += 1;
                return Ok(());
            }
            PriceAction::Create | PriceAction::Replace => {}
        }

        // New Stripe Price, retire any old local row, insert the new
        // one as active. Deactivation precedes the insert so the
        // partial unique index on active rows is never violated.
        let stripe_price_id = if dry_run {
            format!("dry_run_price_{}_{}", spec.key, cycle)
        } else {
            let price = self.create_stripe_price(product_id, cycle, amount).await?;
            price.id.to_string()
        };

        let deactivated = sqlx::query(
            r#"
            UPDATE plan_prices SET active = FALSE
            WHERE plan_id = $1 AND billing_cycle = $2 AND currency = $3 AND active
            "#,
        )
        .bind(plan_id)
        .bind(cycle.as_str())
        .bind(currency)
        .execute(&mut **tx)
        .await?
        .rows_affected();
        report.prices_deactivated += deactivated as usize;

        sqlx::query(
            r#"
            INSERT INTO plan_prices (id, plan_id, billing_cycle, currency, unit_amount, stripe_price_id, active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(plan_id)
        .bind(cycle.as_str())
        .bind(currency)
        .bind(amount)
        .bind(&stripe_price_id)
        .execute(&mut **tx)
        .await?;

        report.prices_created += 1;
        report.actions.push(format!(
            "plan '{}' {}: new {} price at {} minor units",
            spec.key, cycle, currency, amount
        ));
        Ok(())
    }

    async fn create_stripe_price(
        &self,
        product_id: &str,
        cycle: BillingCycle,
        amount: i64,
    ) -> BillingResult<Price> {
        let (interval_count, unit) = cycle.recurrence();
        let interval = match unit {
            RecurrenceUnit::Month => CreatePriceRecurringInterval::Month,
            RecurrenceUnit::Year => CreatePriceRecurringInterval::Year,
        };

        let mut params = CreatePrice::new(self.stripe.config().currency);
        params.product = Some(IdOrCreate::Id(product_id));
        params.unit_amount = Some(amount);
        params.nickname = Some(cycle.as_str());
        params.recurring = Some(CreatePriceRecurring {
            interval,
            interval_count: Some(interval_count),
            ..Default::default()
        });

        Ok(Price::create(self.stripe.inner(), params).await?)
    }
}

/// Reconciliation verdict for one (plan, cycle, currency) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriceAction {
    /// Active row already carries the catalog amount.
    Keep,
    /// No active row yet.
    Create,
    /// Amount changed: retire the active row, create a replacement.
    Replace,
}

fn price_action(active_amount: Option<i64>, catalog_amount: i64) -> PriceAction {
    match active_amount {
        Some(existing) if existing == catalog_amount => PriceAction::Keep,
        Some(_) => PriceAction::Replace,
        None => PriceAction::Create,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_covers_all_cycles() {
        for spec in default_catalog() {
            let cycles: Vec<_> = spec.prices.iter().map(|(c, _)| *c).collect();
            for cycle in BillingCycle::ALL {
                assert!(
                    cycles.contains(&cycle),
                    "plan '{}' missing {}",
                    spec.key,
                    cycle
                );
            }
        }
    }

    #[test]
    fn default_catalog_amounts_are_positive() {
        for spec in default_catalog() {
            for (cycle, amount) in &spec.prices {
                assert!(*amount > 0, "{} {}", spec.key, cycle);
            }
        }
    }

    #[test]
    fn longer_cycles_cost_more_in_total() {
        for spec in default_catalog() {
            let amount_for = |cycle: BillingCycle| {
                spec.prices
                    .iter()
                    .find(|(c, _)| *c == cycle)
                    .map(|(_, a)| *a)
                    .unwrap()
            };
            assert!(amount_for(BillingCycle::Quarterly) > amount_for(BillingCycle::Monthly));
            assert!(amount_for(BillingCycle::Annual) > amount_for(BillingCycle::SemiAnnual));
        }
    }

    #[test]
    fn unchanged_amount_is_a_noop() {
        assert_eq!(price_action(Some(19900), 19900), PriceAction::Keep);
        // Re-running the same catalog keeps keeping.
        assert_eq!(price_action(Some(19900), 19900), PriceAction::Keep);
    }

    #[test]
    fn changed_amount_retires_and_replaces() {
        assert_eq!(price_action(Some(19900), 24900), PriceAction::Replace);
        // Once replaced, the new amount is a no-op on the next sync.
        assert_eq!(price_action(Some(24900), 24900), PriceAction::Keep);
    }

    #[test]
    fn missing_price_is_created() {
        assert_eq!(price_action(None, 1099), PriceAction::Create);
    }

    #[test]
    fn empty_report_is_in_sync() {
        let report = SyncReport::default();
        assert!(report.in_sync());
        let drifted = SyncReport {
            prices_created: 1,
            ..SyncReport::default()
        };
        assert!(!drifted.in_sync());
    }
}
