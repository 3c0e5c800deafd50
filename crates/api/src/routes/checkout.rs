//! Checkout endpoints.
//!
//! `POST /checkout` creates the hosted session; the success and
//! cancel return paths only inform the user. Provisioning is driven
//! by the webhook stream, never by the redirect.

use axum::extract::{Extension, State};
use axum::Json;
use serde_json::json;

use pixelhost_billing::{CheckoutRequest, CheckoutResponse};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let response = state
        .billing
        .checkout
        .create_session(user.user_id, &req)
        .await?;
    Ok(Json(response))
}

/// Landing page data for a completed checkout. Payment confirmation
/// and server creation arrive via webhook; this endpoint promises
/// nothing about either.
pub async fn checkout_success() -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "message": "Payment received. Your server is being set up and will appear in your dashboard shortly."
    }))
}

pub async fn checkout_cancel() -> Json<serde_json::Value> {
    Json(json!({
        "status": "canceled",
        "message": "Checkout canceled. You have not been charged."
    }))
}
