//! Registration and login.

use axum::extract::State;
use axum::Json;
use rand::Rng;
use uuid::Uuid;

use pixelhost_panel::CreateUserParams;

use crate::auth::{hash_password, validate_password_strength, verify_password};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, serde::Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: Uuid,
}

/// Create a local account and its control-panel counterpart.
///
/// The local row and the panel account succeed or fail together: the
/// insert happens inside a transaction that only commits after the
/// panel call, so a panel outage leaves no half-registered user.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    // All input validation precedes any side effect.
    if req.password != req.password_confirm {
        return Err(ApiError::BadRequest("passwords do not match".to_string()));
    }
    validate_password_strength(&req.password)?;
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(ApiError::BadRequest("invalid email address".to_string()));
    }
    let name = req.name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(ApiError::BadRequest(
            "name must be 1-64 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (id, email, display_name, password_hash)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(name)
    .bind(&password_hash)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Err(ApiError::Conflict(
            "an account with this email already exists".to_string(),
        ));
    }

    // The panel account gets its own random credential; users reset it
    // through the panel if they ever need direct access.
    let panel_password = random_password();
    let panel_user = state
        .panel
        .create_user(&CreateUserParams {
            email: email.clone(),
            name: name.to_string(),
            password: panel_password,
        })
        .await
        .map_err(|e| {
            tracing::error!(email = %email, error = %e, "Panel user creation failed during registration");
            // Transaction drops here, rolling the local insert back.
            ApiError::Unavailable("registration is temporarily unavailable, try again".to_string())
        })?;

    sqlx::query(
        "UPDATE users SET panel_user_id = $1, panel_username = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(i64::from(panel_user.id))
    .bind(&panel_user.username)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let token = state.jwt_manager.issue(user_id)?;
    tracing::info!(user_id = %user_id, panel_user_id = panel_user.id, "User registered");

    Ok(Json(AuthResponse { token, user_id }))
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();

    let row: Option<(Uuid, String)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;

    // Same response for unknown email and wrong password.
    let Some((user_id, password_hash)) = row else {
        return Err(ApiError::Unauthorized);
    };
    if !verify_password(&req.password, &password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let token = state.jwt_manager.issue(user_id)?;
    Ok(Json(AuthResponse { token, user_id }))
}

fn random_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();
    (0..24)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_passwords_are_long_and_distinct() {
        let a = random_password();
        let b = random_password();
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
    }
}
