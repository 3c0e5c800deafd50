//! Stripe webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /stripe/webhook`.
///
/// Raw body plus the `Stripe-Signature` header; an invalid signature
/// is a 400 with no database mutation. Duplicates are acknowledged
/// with 200 so Stripe stops retrying them.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Stripe-Signature header".to_string()))?;

    let payload = std::str::from_utf8(&body)
        .map_err(|_| ApiError::BadRequest("webhook body is not valid UTF-8".to_string()))?;

    let event = state.billing.webhooks.verify_event(payload, signature)?;
    state.billing.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}
