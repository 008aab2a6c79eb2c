use axum::{Json, extract::State, http::StatusCode};

use super::{require_superuser, require_text};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{CreateOrganizationRequest, NewOrganization, Organization, PlatformStats},
};

/// get_admin_stats
///
/// [Admin Route] Platform-wide counters. Superusers only.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Platform statistics", body = PlatformStats),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn get_admin_stats(auth: AuthUser, State(state): State<AppState>) -> AppResult<Json<PlatformStats>> {
    require_superuser(&auth)?;
    Ok(Json(state.repo.get_stats().await?))
}

#[utoipa::path(
    get,
    path = "/admin/organizations",
    responses(
        (status = 200, description = "Every organization", body = [Organization]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_all_organizations(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Organization>>> {
    require_superuser(&auth)?;
    Ok(Json(state.repo.list_organizations().await?))
}

/// create_master_organization
///
/// [Admin Route] Creates a master (consulting) organization. `master_id` must be empty;
/// masters do not nest.
#[utoipa::path(
    post,
    path = "/admin/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Master organization created", body = Organization),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_master_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    require_superuser(&auth)?;
    require_text("name", &payload.name)?;
    if payload.master_id.is_some() {
        return Err(AppError::BadRequest("master organizations cannot have a master".into()));
    }

    let org = state
        .repo
        .create_organization(NewOrganization {
            name: payload.name,
            dot_number: payload.dot_number,
            is_master: true,
            master_id: None,
        })
        .await?;
    tracing::info!(organization = %org.id, "master organization created");
    Ok((StatusCode::CREATED, Json(org)))
}
