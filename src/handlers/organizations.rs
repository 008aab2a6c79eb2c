use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    authorize, load_organization, location_index, manager_scope_in, require_text, scope_in, today,
};
use crate::{
    AppState,
    access::{Permission, Subject},
    auth::AuthUser,
    compliance::credential_counts,
    error::{AppError, AppResult},
    maintenance::{DueStatus, maintenance_status},
    models::{
        CafFilter, CafStatus, CreateLocationRequest, CreateOrganizationRequest, IssueFilter,
        IssueRecord, IssueType, IssueTypeCount, Location, NewOrganization, Organization,
        OrganizationDashboard, RoleType, UpdateOrganizationRequest,
    },
};

/// list_organizations
///
/// [Authenticated Route] Organizations the caller holds a role in, plus the
/// sub-organizations of any master organization they sit in. Superusers see all.
#[utoipa::path(
    get,
    path = "/organizations",
    responses((status = 200, description = "Visible organizations", body = [Organization]))
)]
pub async fn list_organizations(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Organization>>> {
    let all = state.repo.list_organizations().await?;
    let visible = auth
        .actor
        .visible_organizations(&all, today())
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(visible))
}

/// create_organization
///
/// [Authenticated Route] Creates a sub-organization under a master organization. Requires
/// a master seat in `master_id` (or superuser).
#[utoipa::path(
    post,
    path = "/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = Organization),
        (status = 400, description = "Missing or invalid master organization"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    require_text("name", &payload.name)?;
    let Some(master_id) = payload.master_id else {
        return Err(AppError::BadRequest(
            "master_id is required; master organizations are created by platform admins".into(),
        ));
    };

    match state.repo.get_organization(master_id).await? {
        Some(master) if master.is_master => {}
        _ => return Err(AppError::BadRequest("master_id is not a master organization".into())),
    }

    if !auth.is_superuser() && !auth.actor.is_master_of(master_id, today()) {
        tracing::warn!(user = %auth.id, master = %master_id, "sub-organization denied");
        return Err(AppError::Forbidden);
    }

    let org = state
        .repo
        .create_organization(NewOrganization {
            name: payload.name,
            dot_number: payload.dot_number,
            is_master: false,
            master_id: Some(master_id),
        })
        .await?;

    tracing::info!(organization = %org.id, master = %master_id, "sub-organization created");
    Ok((StatusCode::CREATED, Json(org)))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Found", body = Organization),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Organization>> {
    let org = load_organization(&state, id).await?;
    scope_in(&auth, &org)?;
    Ok(Json(org))
}

/// update_organization
///
/// [Authenticated Route] Renames the organization or changes its DOT number. Needs an
/// organization-wide manager role.
#[utoipa::path(
    put,
    path = "/organizations/{id}",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = UpdateOrganizationRequest,
    responses(
        (status = 200, description = "Updated", body = Organization),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrganizationRequest>,
) -> AppResult<Json<Organization>> {
    let org = load_organization(&state, id).await?;
    authorize(&auth, &Subject::organization(&org), Permission::Manage)?;
    if let Some(name) = &payload.name {
        require_text("name", name)?;
    }
    let updated = state
        .repo
        .update_organization(id, payload)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/locations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses((status = 200, description = "Locations", body = [Location]))
)]
pub async fn list_locations(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Location>>> {
    let org = load_organization(&state, id).await?;
    scope_in(&auth, &org)?;
    Ok(Json(state.repo.list_locations(org.id).await?))
}

#[utoipa::path(
    post,
    path = "/organizations/{id}/locations",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateLocationRequest,
    responses(
        (status = 201, description = "Location created", body = Location),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_location(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateLocationRequest>,
) -> AppResult<(StatusCode, Json<Location>)> {
    let org = load_organization(&state, id).await?;
    authorize(&auth, &Subject::organization(&org), Permission::Manage)?;
    require_text("name", &payload.name)?;
    let location = state.repo.create_location(org.id, payload).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

/// get_dashboard
///
/// [Authenticated Route] Headline compliance numbers for an organization, computed over
/// the part of it the caller manages (the whole organization or their locations).
#[utoipa::path(
    get,
    path = "/organizations/{id}/dashboard",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Dashboard", body = OrganizationDashboard),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn get_dashboard(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrganizationDashboard>> {
    let org = load_organization(&state, id).await?;
    let scope = manager_scope_in(&auth, &org)?;
    let viewer = auth.party_id();
    let today = today();
    let index = location_index(&state, org.id).await?;
    let locations_of = |party: Uuid| index.get(&party).map(Vec::as_slice).unwrap_or(&[]);

    let all_roles = [RoleType::Master, RoleType::Admin, RoleType::Staff, RoleType::Driver];
    let members: Vec<_> = state
        .repo
        .list_members(org.id, &all_roles)
        .await?
        .into_iter()
        .filter(|m| {
            m.is_active_on(today) && scope.admits(viewer, Some(m.person.id), locations_of(m.person.id))
        })
        .collect();
    let mut drivers: Vec<Uuid> = members
        .iter()
        .filter(|m| m.role_type == RoleType::Driver)
        .map(|m| m.person.id)
        .collect();
    drivers.sort();
    drivers.dedup();
    let mut staff: Vec<Uuid> = members
        .iter()
        .filter(|m| m.role_type.is_manager())
        .map(|m| m.person.id)
        .collect();
    staff.sort();
    staff.dedup();

    let units: Vec<_> = state
        .repo
        .list_equipment(org.id)
        .await?
        .into_iter()
        .filter(|e| e.is_active && scope.admits(viewer, None, locations_of(e.id)))
        .collect();

    let mut maintenance_overdue = 0;
    let mut maintenance_due_soon = 0;
    for unit in &units {
        let history = state.repo.list_maintenance(unit.id).await?;
        let worst = maintenance_status(unit, &history, today)
            .into_iter()
            .map(|s| s.status)
            .max();
        match worst {
            Some(DueStatus::Overdue | DueStatus::NeverServiced) => maintenance_overdue += 1,
            Some(DueStatus::DueSoon) => maintenance_due_soon += 1,
            _ => {}
        }
    }

    let issue_filter = IssueFilter {
        organization_id: Some(org.id),
        ..Default::default()
    };
    let issues: Vec<IssueRecord> = state
        .repo
        .list_issues(&issue_filter)
        .await?
        .into_iter()
        .filter(|r| scope.admits(viewer, Some(r.issue.party_id), locations_of(r.issue.party_id)))
        .collect();

    let mut by_type: BTreeMap<IssueType, i64> = BTreeMap::new();
    for record in issues.iter().filter(|r| !r.issue.status.is_terminal()) {
        *by_type.entry(record.issue.issue_type).or_default() += 1;
    }
    let open_issues: i64 = by_type.values().sum();

    // Expiration badges only make sense for people still driving.
    let credentials: Vec<IssueRecord> = issues
        .iter()
        .filter(|r| drivers.binary_search(&r.issue.party_id).is_ok())
        .cloned()
        .collect();
    let (expired_credentials, expiring_credentials) =
        credential_counts(&credentials, today, state.config.expiring_window_days);

    let caf_filter = CafFilter {
        organization_id: Some(org.id),
        ..Default::default()
    };
    let visible_issues: Vec<Uuid> = issues.iter().map(|r| r.issue.id).collect();
    let cafs: Vec<_> = state
        .repo
        .list_cafs(&caf_filter)
        .await?
        .into_iter()
        .filter(|c| visible_issues.contains(&c.issue_id))
        .collect();

    Ok(Json(OrganizationDashboard {
        organization_id: org.id,
        active_drivers: drivers.len() as i64,
        active_staff: staff.len() as i64,
        active_equipment: units.len() as i64,
        open_issues,
        open_issues_by_type: by_type
            .into_iter()
            .map(|(issue_type, count)| IssueTypeCount { issue_type, count })
            .collect(),
        expired_credentials,
        expiring_credentials,
        cafs_awaiting_signature: cafs.iter().filter(|c| c.status == CafStatus::Assigned).count() as i64,
        cafs_awaiting_approval: cafs.iter().filter(|c| c.status == CafStatus::Signed).count() as i64,
        maintenance_overdue,
        maintenance_due_soon,
    }))
}
