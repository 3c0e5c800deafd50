//! Billing error types.

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors raised by the billing crate.
///
/// Configuration errors indicate a deploy-time mismatch and are never
/// silently defaulted; external-service errors are recoverable and
/// surfaced up the call stack; idempotency conflicts are not errors at
/// all and never reach this type.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid billing cycle: {0}")]
    InvalidBillingCycle(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No active price for a published plan. A catalog/sync bug, not a
    /// user error.
    #[error("plan '{plan}' has no active {cycle} price - catalog out of sync")]
    PlanNotPurchasable { plan: String, cycle: String },

    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("webhook event not supported: {0}")]
    WebhookEventNotSupported(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("stripe API error: {0}")]
    StripeApi(#[from] stripe::StripeError),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}
