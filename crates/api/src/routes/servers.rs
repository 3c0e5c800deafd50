//! Server management endpoints.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use pixelhost_billing::jobs;
use pixelhost_panel::PanelError;
use pixelhost_shared::JobKind;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /servers/{id}/cancel`.
///
/// Stops renewals at the period end and queues suspension. The server
/// itself survives until deleted explicitly.
pub async fn cancel_server(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(server_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .billing
        .lifecycle
        .cancel_server(user.user_id, server_id)
        .await?;
    Ok(Json(json!({
        "status": "canceled",
        "message": "Subscription will not renew. The server will be suspended and can be deleted at any time."
    })))
}

#[derive(Debug, serde::Deserialize)]
pub struct DeleteServerQuery {
    /// Must equal the server's name exactly.
    pub confirm: Option<String>,
}

/// `DELETE /servers/{id}?confirm=<name>`.
///
/// Irreversible. The panel force-delete runs first; the local row is
/// marked deleted only after the remote side confirmed, so a panel
/// failure leaves both sides consistent and the request retryable.
pub async fn delete_server(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(server_id): Path<Uuid>,
    Query(query): Query<DeleteServerQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let server = state
        .billing
        .lifecycle
        .owned_server(user.user_id, server_id)
        .await?;

    match query.confirm.as_deref() {
        Some(confirm) if confirm == server.name => {}
        _ => {
            return Err(ApiError::BadRequest(format!(
                "deletion requires confirm=<server name>; pass confirm={}",
                server.name
            )))
        }
    }

    // Stop renewals before destroying the server it pays for.
    if server.stripe_subscription_id.is_some() && server.status != "canceled" {
        state
            .billing
            .lifecycle
            .cancel_server(user.user_id, server_id)
            .await?;
    }

    if let Some(raw_id) = server.panel_server_id {
        let panel_server_id = u32::try_from(raw_id)
            .map_err(|_| ApiError::Internal(format!("stored panel id {} out of range", raw_id)))?;
        match state.panel.force_delete_server(panel_server_id).await {
            Ok(()) => {}
            // An unreachable panel hands the deletion to the worker;
            // the row stays undeleted until the remote side confirms.
            Err(e) if panel_retryable(&e) => {
                jobs::enqueue(&state.pool, server_id, JobKind::Delete)
                    .await
                    .map_err(ApiError::from)?;
                tracing::warn!(
                    server_id = %server_id,
                    error = %e,
                    "Panel unreachable, deletion queued"
                );
                return Ok(Json(json!({
                    "status": "deletion_scheduled",
                    "message": "The panel is temporarily unreachable. Deletion will complete shortly and cannot be undone."
                })));
            }
            Err(e) => return Err(e.into()),
        }
    }

    state.billing.lifecycle.record_deletion(server_id).await?;

    tracing::info!(server_id = %server_id, user_id = %user.user_id, "Server deleted");
    Ok(Json(json!({
        "status": "deleted",
        "message": "Server deleted. This cannot be undone."
    })))
}

/// Failures worth retrying in the background rather than surfacing.
fn panel_retryable(error: &PanelError) -> bool {
    matches!(
        error,
        PanelError::Timeout | PanelError::Transport(_) | PanelError::Api { status: 500..=599, .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outages_queue_deletion_rejections_do_not() {
        assert!(panel_retryable(&PanelError::Timeout));
        assert!(panel_retryable(&PanelError::Api {
            status: 503,
            message: "maintenance".to_string()
        }));
        assert!(!panel_retryable(&PanelError::Validation(
            "bad request".to_string()
        )));
        assert!(!panel_retryable(&PanelError::Auth));
    }
}
