//! API error type and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use pixelhost_billing::BillingError;
use pixelhost_panel::PanelError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal detail stays in the logs, not the response body.
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal API error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::InvalidBillingCycle(cycle) => {
                Self::BadRequest(format!("invalid billing cycle '{}'", cycle))
            }
            BillingError::InvalidInput(msg) => Self::BadRequest(msg),
            BillingError::WebhookSignatureInvalid => {
                Self::BadRequest("invalid webhook signature".to_string())
            }
            BillingError::NotFound(_) => Self::NotFound,
            // A published plan without a purchasable price is a
            // catalog defect, not a user mistake.
            BillingError::PlanNotPurchasable { plan, cycle } => {
                Self::Internal(format!("plan '{}' has no active {} price", plan, cycle))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PanelError> for ApiError {
    fn from(e: PanelError) -> Self {
        match e {
            PanelError::Validation(msg) => Self::BadRequest(msg),
            PanelError::NotFound(_) => Self::NotFound,
            PanelError::Timeout | PanelError::Transport(_) => {
                Self::Unavailable("control panel unreachable, try again shortly".to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(format!("database error: {}", e))
    }
}
