//! Authentication: session JWTs and password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Session token lifetime.
const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Issues and validates session JWTs.
#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, ApiError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            jti: Uuid::new_v4(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized)
    }
}

/// Authenticated user, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Middleware enforcing a valid bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.jwt_manager.validate(token)?;
    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
    });
    Ok(next.run(request).await)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Minimum bar for new passwords. Length only; composition rules push
/// users toward predictable patterns.
pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 10 {
        return Err(ApiError::BadRequest(
            "password must be at least 10 characters".to_string(),
        ));
    }
    if password.len() > 128 {
        return Err(ApiError::BadRequest(
            "password must be at most 128 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn issued_token_validates_and_carries_user() {
        let manager = JwtManager::new("a-test-secret-of-sufficient-length");
        let user_id = Uuid::new_v4();
        let token = manager.issue(user_id).unwrap();
        let claims = manager.validate(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let issuer = JwtManager::new("secret-one-secret-one-secret-one");
        let verifier = JwtManager::new("secret-two-secret-two-secret-two");
        let token = issuer.issue(Uuid::new_v4()).unwrap();
        assert!(verifier.validate(&token).is_err());
    }

    #[test]
    fn password_strength_bounds() {
        assert!(validate_password_strength("short").is_err());
        assert!(validate_password_strength("long enough password").is_ok());
        assert!(validate_password_strength(&"x".repeat(129)).is_err());
    }
}
