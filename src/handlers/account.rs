use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{
    authorize, identity_error, load_organization, party_locations, require_text, today,
};
use crate::{
    AppState,
    access::{Permission, Subject},
    auth::AuthUser,
    error::{AppError, AppResult},
    identity::TokenResponse,
    models::{
        Caf, CafFilter, CreatePersonRequest, CreateUserRequest, LoginRequest, NewOrganization,
        RegisterRequest, User, UserProfile,
    },
    repository::{NewCarrier, RegisteredCarrier},
};

/// register
///
/// [Public Route] Self-service carrier sign-up. Creates the auth-provider account, then
/// the organization, its first administrator and the administrator's login mirror.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Carrier registered", body = UserProfile),
        (status = 400, description = "Invalid input or email rejected"),
        (status = 502, description = "Identity provider unavailable")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    require_text("organization_name", &payload.organization_name)?;
    require_text("first_name", &payload.first_name)?;
    require_text("last_name", &payload.last_name)?;
    require_text("email", &payload.email)?;
    if payload.password.len() < 8 {
        return Err(AppError::BadRequest("password must be at least 8 characters".into()));
    }

    let user_id = state
        .identity
        .sign_up(&payload.email, &payload.password)
        .await
        .map_err(|e| identity_error(e, AppError::BadRequest))?;

    let RegisteredCarrier {
        organization: org,
        person,
        role,
        user,
    } = state
        .repo
        .register_carrier(NewCarrier {
            user_id,
            email: payload.email.clone(),
            organization: NewOrganization {
                name: payload.organization_name,
                dot_number: payload.dot_number,
                is_master: false,
                master_id: None,
            },
            admin: CreatePersonRequest {
                first_name: payload.first_name,
                last_name: payload.last_name,
                email: Some(payload.email),
                ..Default::default()
            },
            start_date: today(),
        })
        .await?;

    tracing::info!(user = %user.id, organization = %org.id, "carrier registered");

    Ok((
        StatusCode::CREATED,
        Json(UserProfile {
            id: user.id,
            email: user.email,
            is_superuser: false,
            person: Some(person),
            roles: vec![role],
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges credentials for an access token at the auth provider.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = state
        .identity
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(|e| identity_error(e, |_| AppError::Unauthorized))?;
    Ok(Json(token))
}

/// get_me
///
/// [Authenticated Route] The caller's login, person record and roles.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current user", body = UserProfile))
)]
pub async fn get_me(auth: AuthUser, State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    let person = state.repo.get_person(auth.party_id()).await?;
    Ok(Json(UserProfile {
        id: auth.id,
        email: auth.email,
        is_superuser: auth.actor.is_superuser,
        person,
        roles: auth.actor.roles,
    }))
}

/// get_my_cafs
///
/// [Authenticated Route] Corrective action forms assigned to the caller, in every
/// organization.
#[utoipa::path(
    get,
    path = "/me/cafs",
    responses((status = 200, description = "Assigned forms", body = [Caf]))
)]
pub async fn get_my_cafs(auth: AuthUser, State(state): State<AppState>) -> AppResult<Json<Vec<Caf>>> {
    let filter = CafFilter {
        assigned_to: Some(auth.party_id()),
        ..Default::default()
    };
    Ok(Json(state.repo.list_cafs(&filter).await?))
}

/// create_user
///
/// [Authenticated Route] Gives an existing person of the organization a login. The
/// password goes to the auth provider; only the returned id is stored.
#[utoipa::path(
    post,
    path = "/organizations/{id}/users",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Login created", body = User),
        (status = 400, description = "Person not in organization or email rejected"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let org = load_organization(&state, organization_id).await?;
    require_text("email", &payload.email)?;

    let is_member = state
        .repo
        .roles_for_party(payload.party_id)
        .await?
        .iter()
        .any(|r| r.organization_id == org.id);
    if !is_member || state.repo.get_person(payload.party_id).await?.is_none() {
        return Err(AppError::BadRequest(
            "party is not a person of this organization".into(),
        ));
    }

    let locations = party_locations(&state, org.id, payload.party_id).await?;
    authorize(&auth, &Subject::within(&org, locations), Permission::Manage)?;

    let user_id = state
        .identity
        .sign_up(&payload.email, &payload.password)
        .await
        .map_err(|e| identity_error(e, AppError::BadRequest))?;

    let user = state
        .repo
        .create_user(User {
            id: user_id,
            email: payload.email,
            party_id: payload.party_id,
            is_superuser: false,
        })
        .await?;

    tracing::info!(user = %user.id, party = %user.party_id, "login created");
    Ok((StatusCode::CREATED, Json(user)))
}
