//! Request/response types for the panel application API.
//!
//! The panel wraps every object in `{"object": "...", "attributes":
//! {...}}` and lists in `{"object": "list", "data": [...]}`; the
//! wrappers stay private to this crate and only the attribute structs
//! escape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic `{"attributes": ...}` wrapper.
#[derive(Debug, Deserialize)]
pub(crate) struct Wrapped<T> {
    pub attributes: T,
}

/// Generic list wrapper.
#[derive(Debug, Deserialize)]
pub(crate) struct PageOf<T> {
    pub data: Vec<Wrapped<T>>,
}

/// A panel user, as returned by `/api/application/users`.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelUser {
    pub id: u32,
    pub username: String,
    pub email: String,
}

/// A panel server, as returned by `/api/application/servers`.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelServer {
    pub id: u32,
    pub uuid: Uuid,
    /// Short identifier the panel UI uses (first uuid segment).
    pub identifier: String,
    pub external_id: Option<String>,
    #[serde(default)]
    pub suspended: bool,
}

/// Remote identifiers for a freshly created (or idempotently
/// re-fetched) server. This is what gets persisted onto the local
/// `servers` row after remote success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedServer {
    pub id: u32,
    pub uuid: Uuid,
    pub identifier: String,
}

impl From<PanelServer> for CreatedServer {
    fn from(s: PanelServer) -> Self {
        CreatedServer {
            id: s.id,
            uuid: s.uuid,
            identifier: s.identifier,
        }
    }
}

/// Inputs for creating a panel user.
#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    /// Display name the username is derived from.
    pub name: String,
    pub password: String,
}

/// Inputs for creating a panel server. Resource limits and launch
/// config come from the static tables, not from here.
#[derive(Debug, Clone)]
pub struct CreateServerParams {
    pub name: String,
    pub panel_user_id: u32,
    /// Our idempotency key, stored as the panel's `external_id`.
    pub external_id: String,
    pub plan_key: String,
    pub game: String,
    pub variant: String,
    pub region: String,
}

/// Body of a `POST /api/application/users` request.
#[derive(Debug, Serialize)]
pub(crate) struct CreateUserBody<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ServerLimits {
    pub memory: u32,
    pub swap: u32,
    pub disk: u32,
    pub io: u32,
    pub cpu: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ServerFeatureLimits {
    pub databases: u32,
    pub backups: u32,
    pub allocations: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ServerDeploy {
    pub locations: Vec<u32>,
    pub dedicated_ip: bool,
    pub port_range: Vec<String>,
}

/// Body of a `POST /api/application/servers` request.
#[derive(Debug, Serialize)]
pub(crate) struct CreateServerBody {
    pub name: String,
    pub user: u32,
    pub external_id: String,
    pub egg: u32,
    pub docker_image: String,
    pub startup: String,
    pub environment: serde_json::Map<String, serde_json::Value>,
    pub limits: ServerLimits,
    pub feature_limits: ServerFeatureLimits,
    pub deploy: ServerDeploy,
    pub start_on_completion: bool,
}

/// Error body the panel returns on 4xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct PanelErrorBody {
    #[serde(default)]
    pub errors: Vec<PanelErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PanelErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub detail: String,
}
