//! Stripe client wrapper and configuration.

use std::sync::Arc;

use stripe::Currency;

use crate::error::{BillingError, BillingResult};

/// Stripe configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Currency all catalog prices are created in.
    pub currency: Currency,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = require_env("STRIPE_SECRET_KEY")?;
        let webhook_secret = require_env("STRIPE_WEBHOOK_SECRET")?;
        let currency_str =
            std::env::var("BILLING_CURRENCY").unwrap_or_else(|_| "eur".to_string());
        let currency = parse_currency(&currency_str)?;
        let checkout_success_url = std::env::var("CHECKOUT_SUCCESS_URL")
            .unwrap_or_else(|_| "https://pixelhost.gg/checkout/success".to_string());
        let checkout_cancel_url = std::env::var("CHECKOUT_CANCEL_URL")
            .unwrap_or_else(|_| "https://pixelhost.gg/checkout/cancel".to_string());

        Ok(Self {
            secret_key,
            webhook_secret,
            currency,
            checkout_success_url,
            checkout_cancel_url,
        })
    }
}

fn require_env(key: &str) -> BillingResult<String> {
    std::env::var(key).map_err(|_| BillingError::Config(format!("{} not set", key)))
}

/// Parse a lowercase ISO currency code into the Stripe enum. Unknown
/// codes fail fast; a wrong currency must never be defaulted.
pub fn parse_currency(code: &str) -> BillingResult<Currency> {
    serde_json::from_value(serde_json::Value::String(code.to_lowercase()))
        .map_err(|_| BillingError::Config(format!("unsupported currency '{}'", code)))
}

/// Shared Stripe client handle.
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = stripe::Client::new(config.secret_key.clone());
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_currencies() {
        assert_eq!(parse_currency("eur").unwrap(), Currency::EUR);
        assert_eq!(parse_currency("USD").unwrap(), Currency::USD);
    }

    #[test]
    fn unknown_currency_is_config_error() {
        assert!(matches!(
            parse_currency("doubloons"),
            Err(BillingError::Config(_))
        ));
    }
}
