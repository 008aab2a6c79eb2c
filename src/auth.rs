use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    access::Actor,
    config::{AppConfig, Env},
    models::User,
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the access token issued by the auth provider. Signed with the shared
/// secret and checked on every authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the provider's user id, which is also `users.id`.
    pub sub: Uuid,
    /// Expiration Time (exp). Always validated.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request: the login and the `Actor` the
/// access policy evaluates (person party plus every role it holds).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub actor: Actor,
}

impl AuthUser {
    pub fn party_id(&self) -> Uuid {
        self.actor.party_id
    }

    pub fn is_superuser(&self) -> bool {
        self.actor.is_superuser
    }
}

/// Loads the user's roles and wraps both into an `AuthUser`.
async fn resolve(repo: &RepositoryState, user: User) -> Result<AuthUser, StatusCode> {
    let roles = repo.roles_for_party(user.party_id).await.map_err(|e| {
        tracing::error!("failed to load roles for {}: {:?}", user.id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(AuthUser {
        id: user.id,
        email: user.email,
        actor: Actor::new(user.party_id, user.is_superuser, roles),
    })
}

async fn lookup_user(repo: &RepositoryState, id: Uuid) -> Result<Option<User>, StatusCode> {
    repo.get_user(id).await.map_err(|e| {
        tracing::error!("failed to load user {}: {:?}", id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming a known user is enough.
/// 2. Bearer token extraction and HS256 decoding against the provider's secret. Expiry is
///    always checked; `aud` only when an audience is configured.
/// 3. User lookup, so deleted users lose access even with a live token.
///
/// Rejection: 401 on any authentication failure, 500 if the store is unreachable.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());
            if let Some(user_id) = bypass {
                if let Some(user) = lookup_user(&repo, user_id).await? {
                    return resolve(&repo, user).await;
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        match &config.jwt_audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!("rejected token: {:?}", other),
            }
            StatusCode::UNAUTHORIZED
        })?;

        let user = lookup_user(&repo, token_data.claims.sub)
            .await?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        resolve(&repo, user).await
    }
}
