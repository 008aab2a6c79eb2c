use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// IdentityProvider
///
/// The external auth service owning passwords. This service never sees a password
/// hash; it only forwards credentials and mirrors the returned user id.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account and returns the provider's user id.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError>;

    /// Exchanges credentials for an access token.
    async fn sign_in(&self, email: &str, password: &str) -> Result<TokenResponse, IdentityError>;
}

/// IdentityError
///
/// `Rejected` is the provider refusing the request (taken email, bad credentials);
/// `Unavailable` is everything else (network, unexpected payload, 5xx).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("rejected by identity provider: {0}")]
    Rejected(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

fn unavailable(err: impl std::fmt::Display) -> IdentityError {
    IdentityError::Unavailable(err.to_string())
}

/// Client errors are the caller's fault; anything else means the provider is down.
fn check_status(response: &reqwest::Response) -> Result<(), IdentityError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(IdentityError::Rejected(format!("status {}", status)))
    } else {
        Err(IdentityError::Unavailable(format!("status {}", status)))
    }
}

pub type IdentityState = Arc<dyn IdentityProvider>;

/// TokenResponse
///
/// The subset of the provider's token payload returned to the client by `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// GoTrueClient
///
/// Talks to a GoTrue-compatible auth server (`/auth/v1/signup`, `/auth/v1/token`).
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SignUpResponse {
    id: Uuid,
}

impl GoTrueClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(&response)?;

        let user = response.json::<SignUpResponse>().await.map_err(unavailable)?;
        Ok(user.id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<TokenResponse, IdentityError> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(&response)?;

        response.json::<TokenResponse>().await.map_err(unavailable)
    }
}

/// MockIdentityProvider
///
/// In-memory stand-in for tests: remembers sign-ups and issues a fixed token for any
/// known email/password pair.
#[derive(Default)]
pub struct MockIdentityProvider {
    accounts: Mutex<Vec<(String, String, Uuid)>>,
    pub should_fail: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        if self.should_fail {
            return Err(unavailable("Mock Identity Error: Simulation requested"));
        }
        let mut accounts = self.accounts.lock().map_err(unavailable)?;
        if accounts.iter().any(|(e, _, _)| e.eq_ignore_ascii_case(email)) {
            return Err(IdentityError::Rejected("email already registered".to_string()));
        }
        let id = Uuid::new_v4();
        accounts.push((email.to_string(), password.to_string(), id));
        Ok(id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<TokenResponse, IdentityError> {
        if self.should_fail {
            return Err(unavailable("Mock Identity Error: Simulation requested"));
        }
        let accounts = self.accounts.lock().map_err(unavailable)?;
        let (_, _, id) = accounts
            .iter()
            .find(|(e, p, _)| e.eq_ignore_ascii_case(email) && p == password)
            .ok_or_else(|| IdentityError::Rejected("invalid credentials".to_string()))?;
        Ok(TokenResponse {
            access_token: format!("mock-token-{}", id),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            refresh_token: None,
        })
    }
}
