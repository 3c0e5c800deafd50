//! Pterodactyl application-API client.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use pixelhost_shared::{game_variant, plan_resources};

use crate::error::{PanelError, PanelResult};
use crate::types::{
    CreateServerBody, CreateServerParams, CreateUserBody, CreateUserParams, CreatedServer,
    PageOf, PanelErrorBody, PanelServer, PanelUser, ServerDeploy, ServerFeatureLimits,
    ServerLimits, Wrapped,
};
use crate::username;

/// Bounded timeout for panel calls. Exceeding it is a failure, not a
/// hang; provisioning must never block a caller indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Region slug to panel location id. Static, like the plan and game
/// tables; an unknown region is a configuration error.
const REGIONS: &[(&str, u32)] = &[
    ("eu-central", 1),
    ("us-east", 2),
    ("us-west", 3),
    ("ap-southeast", 4),
];

fn location_for_region(region: &str) -> Option<u32> {
    REGIONS
        .iter()
        .find(|(slug, _)| *slug == region)
        .map(|(_, id)| *id)
}

/// Panel connection configuration.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Base URL of the panel, e.g. `https://panel.pixelhost.gg`.
    pub base_url: String,
    /// Application API key (bearer token).
    pub api_key: String,
}

impl PanelConfig {
    pub fn from_env() -> PanelResult<Self> {
        let base_url = std::env::var("PANEL_BASE_URL")
            .map_err(|_| PanelError::Config("PANEL_BASE_URL not set".to_string()))?;
        let api_key = std::env::var("PANEL_API_KEY")
            .map_err(|_| PanelError::Config("PANEL_API_KEY not set".to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

/// Typed client for the panel control plane.
#[derive(Clone)]
pub struct PanelClient {
    http: reqwest::Client,
    config: PanelConfig,
}

impl PanelClient {
    pub fn new(config: PanelConfig) -> PanelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PanelError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> PanelResult<Self> {
        Self::new(PanelConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/application{}", self.config.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.config.api_key)
            .header("Accept", "application/json")
    }

    /// Map a non-2xx response to a typed error, pulling the panel's
    /// error detail out of the body when present.
    async fn error_for(&self, resp: Response) -> PanelError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<PanelErrorBody>(&body)
            .ok()
            .and_then(|b| {
                b.errors
                    .first()
                    .map(|e| format!("{}: {}", e.code, e.detail))
            })
            .unwrap_or_else(|| body.chars().take(200).collect());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PanelError::Auth,
            StatusCode::NOT_FOUND => PanelError::NotFound(detail),
            StatusCode::UNPROCESSABLE_ENTITY => PanelError::Validation(detail),
            _ => PanelError::Api {
                status: status.as_u16(),
                message: detail,
            },
        }
    }

    async fn parse<T: DeserializeOwned>(&self, resp: Response) -> PanelResult<T> {
        let body = resp.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| PanelError::MalformedResponse(format!("{} (body: {:.120})", e, body)))
    }

    /// Look up a user by exact username.
    pub async fn find_user_by_username(&self, name: &str) -> PanelResult<Option<PanelUser>> {
        let resp = self
            .request(reqwest::Method::GET, "/users")
            .query(&[("filter[username]", name)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(self.error_for(resp).await);
        }

        let page: PageOf<PanelUser> = self.parse(resp).await?;
        // The filter is a substring match on some panel versions;
        // require an exact hit.
        Ok(page
            .data
            .into_iter()
            .map(|w| w.attributes)
            .find(|u| u.username == name))
    }

    /// Create a panel user with a collision-free username derived from
    /// the display name. Suffix attempts are bounded; remote
    /// validation rejections surface as [`PanelError::Validation`].
    pub async fn create_user(&self, params: &CreateUserParams) -> PanelResult<PanelUser> {
        let base = username::normalize_username(&params.name);

        // One extra slot past the numeric range for the random fallback.
        let mut chosen = None;
        for attempt in 0..=(username::MAX_NUMERIC_SUFFIXES + 1) {
            let cand = username::candidate(&base, attempt);
            if self.find_user_by_username(&cand).await?.is_none() {
                chosen = Some(cand);
                break;
            }
            tracing::debug!(candidate = %cand, attempt, "Panel username taken, trying next");
        }
        let username = chosen.ok_or_else(|| PanelError::UsernameExhausted(base.clone()))?;

        let (first_name, last_name) = match params.name.split_once(' ') {
            Some((first, rest)) => (first, rest),
            None => (params.name.as_str(), "Pixelhost"),
        };

        let body = CreateUserBody {
            email: &params.email,
            username: &username,
            first_name,
            last_name,
            password: &params.password,
        };

        let resp = self
            .request(reqwest::Method::POST, "/users")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(self.error_for(resp).await);
        }

        let user: Wrapped<PanelUser> = self.parse(resp).await?;
        tracing::info!(
            panel_user_id = user.attributes.id,
            username = %user.attributes.username,
            "Panel user created"
        );
        Ok(user.attributes)
    }

    /// Look up a server by our external id (the idempotency key).
    pub async fn find_server_by_external_id(
        &self,
        external_id: &str,
    ) -> PanelResult<Option<PanelServer>> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/servers/external/{}", external_id),
            )
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(self.error_for(resp).await);
        }

        let server: Wrapped<PanelServer> = self.parse(resp).await?;
        Ok(Some(server.attributes))
    }

    /// Create a game server. Idempotent: if a server with the given
    /// external id already exists, its identifiers are returned and no
    /// second server is created.
    pub async fn create_server(&self, params: &CreateServerParams) -> PanelResult<CreatedServer> {
        if let Some(existing) = self.find_server_by_external_id(&params.external_id).await? {
            tracing::info!(
                external_id = %params.external_id,
                panel_server_id = existing.id,
                "Panel server already exists for external id, reusing"
            );
            return Ok(existing.into());
        }

        let resources = plan_resources(&params.plan_key).ok_or_else(|| {
            PanelError::Config(format!("no resource table entry for plan '{}'", params.plan_key))
        })?;
        let launch = game_variant(&params.game, &params.variant).ok_or_else(|| {
            PanelError::Config(format!(
                "no game config for '{}/{}'",
                params.game, params.variant
            ))
        })?;
        let location = location_for_region(&params.region).ok_or_else(|| {
            PanelError::Config(format!("unknown region '{}'", params.region))
        })?;

        let mut environment = serde_json::Map::new();
        for (key, value) in launch.env {
            environment.insert((*key).to_string(), serde_json::Value::from(*value));
        }

        let body = CreateServerBody {
            name: params.name.clone(),
            user: params.panel_user_id,
            external_id: params.external_id.clone(),
            egg: launch.egg_id,
            docker_image: launch.docker_image.to_string(),
            startup: launch.startup.to_string(),
            environment,
            limits: ServerLimits {
                memory: resources.memory_mb,
                swap: resources.swap_mb,
                disk: resources.disk_mb,
                io: resources.io_weight,
                cpu: resources.cpu_percent,
            },
            feature_limits: ServerFeatureLimits {
                databases: resources.databases,
                backups: resources.backups,
                allocations: resources.allocations,
            },
            deploy: ServerDeploy {
                locations: vec![location],
                dedicated_ip: false,
                port_range: vec![],
            },
            start_on_completion: true,
        };

        let resp = self
            .request(reqwest::Method::POST, "/servers")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(self.error_for(resp).await);
        }

        let server: Wrapped<PanelServer> = self.parse(resp).await?;
        tracing::info!(
            panel_server_id = server.attributes.id,
            identifier = %server.attributes.identifier,
            external_id = %params.external_id,
            "Panel server created"
        );
        Ok(server.attributes.into())
    }

    /// Suspend a server. Suspending an already-suspended server is a
    /// no-op success.
    pub async fn suspend_server(&self, panel_server_id: u32) -> PanelResult<()> {
        self.power_action(panel_server_id, "suspend").await
    }

    /// Unsuspend a server. Same no-op semantics as suspend.
    pub async fn unsuspend_server(&self, panel_server_id: u32) -> PanelResult<()> {
        self.power_action(panel_server_id, "unsuspend").await
    }

    async fn power_action(&self, panel_server_id: u32, action: &str) -> PanelResult<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/servers/{}/{}", panel_server_id, action),
            )
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            // Already in the desired state, or already gone.
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(self.error_for(resp).await),
        }
    }

    /// Irreversibly delete a server from the panel. A 404 means it is
    /// already gone and counts as success; any other failure must NOT
    /// be treated as deleted locally.
    pub async fn force_delete_server(&self, panel_server_id: u32) -> PanelResult<()> {
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/servers/{}/force", panel_server_id),
            )
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(self.error_for(resp).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreateUserParams;

    fn client_for(server: &mockito::ServerGuard) -> PanelClient {
        PanelClient::new(PanelConfig {
            base_url: server.url(),
            api_key: "ptla_test".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn suspend_conflict_is_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/application/servers/7/suspend")
            .with_status(409)
            .create_async()
            .await;

        let client = client_for(&server);
        client.suspend_server(7).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn force_delete_missing_server_is_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/application/servers/7/force")
            .with_status(404)
            .with_body(r#"{"errors":[{"code":"NotFoundHttpException","detail":"gone"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        client.force_delete_server(7).await.unwrap();
    }

    #[tokio::test]
    async fn force_delete_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/application/servers/7/force")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.force_delete_server(7).await.unwrap_err();
        assert!(matches!(err, PanelError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn create_server_reuses_existing_external_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/application/servers/external/srv-abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"object":"server","attributes":{"id":42,"uuid":"0f4d9a74-7c3e-4e7a-9a53-1df2fc7a2a10","identifier":"0f4d9a74","external_id":"srv-abc","suspended":false}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let created = client
            .create_server(&CreateServerParams {
                name: "my smp".to_string(),
                panel_user_id: 3,
                external_id: "srv-abc".to_string(),
                plan_key: "core".to_string(),
                game: "minecraft".to_string(),
                variant: "paper".to_string(),
                region: "eu-central".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(created.id, 42);
        assert_eq!(created.identifier, "0f4d9a74");
    }

    #[tokio::test]
    async fn create_server_unknown_plan_is_config_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/application/servers/external/srv-x")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .create_server(&CreateServerParams {
                name: "x".to_string(),
                panel_user_id: 1,
                external_id: "srv-x".to_string(),
                plan_key: "mega".to_string(),
                game: "minecraft".to_string(),
                variant: "paper".to_string(),
                region: "eu-central".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::Config(_)));
    }

    #[tokio::test]
    async fn create_user_validation_rejection_is_typed() {
        let mut server = mockito::Server::new_async().await;
        // No collision on the first candidate.
        server
            .mock("GET", "/api/application/users")
            .match_query(mockito::Matcher::UrlEncoded(
                "filter[username]".to_string(),
                "jane_doe".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"object":"list","data":[]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/application/users")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"errors":[{"code":"ValidationException","detail":"The email field must be a valid email address."}]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .create_user(&CreateUserParams {
                email: "not-an-email".to_string(),
                name: "Jane Doe".to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::Validation(_)));
    }

    #[tokio::test]
    async fn malformed_body_is_typed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/application/servers/external/srv-abc")
            .with_status(200)
            .with_body(r#"{"object":"server"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .find_server_by_external_id("srv-abc")
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::MalformedResponse(_)));
    }

    #[test]
    fn known_regions_resolve() {
        assert_eq!(location_for_region("eu-central"), Some(1));
        assert_eq!(location_for_region("mars-1"), None);
    }
}
