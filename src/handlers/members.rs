use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    authorize, check_location, load_organization, manager_scope_in, party_locations,
    require_text, scope_in, today,
};
use crate::{
    AppState,
    access::{Permission, Subject},
    auth::AuthUser,
    compliance::{DriverCompliance, driver_compliance},
    error::{AppError, AppResult},
    models::{
        AssignRoleRequest, CreatePersonRequest, DriverProfile, IssueFilter, Member, NewRole,
        Organization, Person, Role, RoleType, UpdatePersonRequest,
    },
};

const STAFF_ROLES: [RoleType; 3] = [RoleType::Master, RoleType::Admin, RoleType::Staff];

/// Subject for a driver of `org`. 404 when the party holds no driver role there.
async fn driver_subject(state: &AppState, org: &Organization, party_id: Uuid) -> AppResult<Subject> {
    let roles = state.repo.roles_for_party(party_id).await?;
    let is_driver = roles
        .iter()
        .any(|r| r.organization_id == org.id && r.role_type == RoleType::Driver);
    if !is_driver {
        return Err(AppError::NotFound);
    }
    let locations = party_locations(state, org.id, party_id).await?;
    Ok(Subject::within(org, locations).owned_by(party_id))
}

/// Creates the person and its role in one go, after the caller is cleared for the
/// target location.
async fn enroll(
    state: &AppState,
    auth: &AuthUser,
    org: &Organization,
    payload: CreatePersonRequest,
    role_type: RoleType,
) -> AppResult<Member> {
    require_text("first_name", &payload.first_name)?;
    require_text("last_name", &payload.last_name)?;
    check_location(state, org.id, payload.location_id).await?;

    let subject = match (role_type, payload.location_id) {
        (RoleType::Driver | RoleType::Staff, Some(location)) => Subject::within(org, vec![location]),
        _ => Subject::organization(org),
    };
    authorize(auth, &subject, Permission::Manage)?;

    let person = state.repo.create_person(&payload).await?;
    let role = state
        .repo
        .create_role(NewRole {
            party_id: person.id,
            organization_id: org.id,
            location_id: payload.location_id,
            role_type,
            start_date: payload.hire_date.unwrap_or_else(today),
            end_date: None,
        })
        .await?;

    tracing::info!(person = %person.id, organization = %org.id, ?role_type, "member enrolled");
    Ok(Member {
        person,
        role_id: role.id,
        role_type: role.role_type,
        location_id: role.location_id,
        is_active: role.is_active,
        start_date: role.start_date,
        end_date: role.end_date,
    })
}

/// Members of the given role types the caller may see, one row per person. A person
/// holding several matching roles is listed under a currently active one when they
/// have it.
async fn visible_members(
    state: &AppState,
    auth: &AuthUser,
    org: &Organization,
    role_types: &[RoleType],
) -> AppResult<Vec<Member>> {
    let scope = scope_in(auth, org)?;
    let viewer = auth.party_id();
    let today = today();
    let members = state.repo.list_members(org.id, role_types).await?;

    let mut listed: Vec<Member> = Vec::with_capacity(members.len());
    let mut position: HashMap<Uuid, usize> = HashMap::new();
    for member in members {
        let locations: Vec<Uuid> = member.location_id.into_iter().collect();
        if !scope.admits(viewer, Some(member.person.id), &locations) {
            continue;
        }
        match position.get(&member.person.id) {
            Some(&i) => {
                if !listed[i].is_active_on(today) && member.is_active_on(today) {
                    listed[i] = member;
                }
            }
            None => {
                position.insert(member.person.id, listed.len());
                listed.push(member);
            }
        }
    }
    Ok(listed)
}

/// list_drivers
///
/// [Authenticated Route] Drivers of the organization. Location-bound staff see the
/// drivers of their locations; a driver sees only themself.
#[utoipa::path(
    get,
    path = "/organizations/{id}/drivers",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Drivers", body = [Member]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_drivers(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Member>>> {
    let org = load_organization(&state, id).await?;
    let drivers = visible_members(&state, &auth, &org, &[RoleType::Driver]).await?;
    Ok(Json(drivers))
}

/// create_driver
///
/// [Authenticated Route] Creates a person and binds them to the organization (and
/// optionally one of its locations) with a driver role starting on the hire date.
#[utoipa::path(
    post,
    path = "/organizations/{id}/drivers",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CreatePersonRequest,
    responses(
        (status = 201, description = "Driver created", body = Member),
        (status = 400, description = "Invalid input or foreign location"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_driver(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreatePersonRequest>,
) -> AppResult<(StatusCode, Json<Member>)> {
    let org = load_organization(&state, id).await?;
    let member = enroll(&state, &auth, &org, payload, RoleType::Driver).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/drivers/{party_id}",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("party_id" = Uuid, Path, description = "Driver party ID")
    ),
    responses(
        (status = 200, description = "Driver", body = DriverProfile),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_driver(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, party_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<DriverProfile>> {
    let org = load_organization(&state, id).await?;
    let subject = driver_subject(&state, &org, party_id).await?;
    authorize(&auth, &subject, Permission::View)?;

    let person = state.repo.get_person(party_id).await?.ok_or(AppError::NotFound)?;
    let roles = state
        .repo
        .roles_for_party(party_id)
        .await?
        .into_iter()
        .filter(|r| r.organization_id == org.id)
        .collect();
    Ok(Json(DriverProfile { person, roles }))
}

#[utoipa::path(
    put,
    path = "/organizations/{id}/drivers/{party_id}",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("party_id" = Uuid, Path, description = "Driver party ID")
    ),
    request_body = UpdatePersonRequest,
    responses(
        (status = 200, description = "Updated", body = Person),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_driver(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, party_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePersonRequest>,
) -> AppResult<Json<Person>> {
    let org = load_organization(&state, id).await?;
    let subject = driver_subject(&state, &org, party_id).await?;
    authorize(&auth, &subject, Permission::Manage)?;

    for (field, value) in [("first_name", &payload.first_name), ("last_name", &payload.last_name)] {
        if let Some(value) = value {
            require_text(field, value)?;
        }
    }

    let person = state
        .repo
        .update_person(party_id, payload)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(person))
}

/// get_driver_compliance
///
/// [Authenticated Route] License, MVR and training badges for one driver, plus the
/// worst of them.
#[utoipa::path(
    get,
    path = "/organizations/{id}/drivers/{party_id}/compliance",
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("party_id" = Uuid, Path, description = "Driver party ID")
    ),
    responses(
        (status = 200, description = "Compliance summary", body = DriverCompliance),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_driver_compliance(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, party_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<DriverCompliance>> {
    let org = load_organization(&state, id).await?;
    let subject = driver_subject(&state, &org, party_id).await?;
    authorize(&auth, &subject, Permission::View)?;

    let filter = IssueFilter {
        organization_id: Some(org.id),
        party_id: Some(party_id),
        ..Default::default()
    };
    let records = state.repo.list_issues(&filter).await?;
    Ok(Json(driver_compliance(
        party_id,
        &records,
        today(),
        state.config.expiring_window_days,
    )))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/staff",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Staff", body = [Member]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_staff(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Member>>> {
    let org = load_organization(&state, id).await?;
    manager_scope_in(&auth, &org)?;
    let staff = visible_members(&state, &auth, &org, &STAFF_ROLES).await?;
    Ok(Json(staff))
}

/// create_staff
///
/// [Authenticated Route] Adds office staff. `role_type` may be `staff` (default) or
/// `admin`; admins always need an organization-wide grant.
#[utoipa::path(
    post,
    path = "/organizations/{id}/staff",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CreatePersonRequest,
    responses(
        (status = 201, description = "Staff member created", body = Member),
        (status = 400, description = "Invalid role type"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_staff(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreatePersonRequest>,
) -> AppResult<(StatusCode, Json<Member>)> {
    let org = load_organization(&state, id).await?;
    let role_type = payload.role_type.unwrap_or(RoleType::Staff);
    check_role_type(&org, role_type, payload.location_id)?;
    if role_type == RoleType::Driver {
        return Err(AppError::BadRequest("use the drivers endpoint for drivers".into()));
    }
    let member = enroll(&state, &auth, &org, payload, role_type).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// Master seats only exist in master organizations, and neither master nor admin
/// roles may be narrowed to a location.
fn check_role_type(org: &Organization, role_type: RoleType, location_id: Option<Uuid>) -> AppResult<()> {
    if role_type == RoleType::Master && !org.is_master {
        return Err(AppError::BadRequest(
            "master roles can only be held in a master organization".into(),
        ));
    }
    if matches!(role_type, RoleType::Master | RoleType::Admin) && location_id.is_some() {
        return Err(AppError::BadRequest(format!(
            "{} roles cover the whole organization and take no location",
            role_type.as_str()
        )));
    }
    Ok(())
}

/// assign_role
///
/// [Authenticated Route] Gives an existing person a new role in the organization.
/// Location-bound managers may hand out driver and staff roles for their locations;
/// admin and master roles need an organization-wide grant.
#[utoipa::path(
    post,
    path = "/organizations/{id}/roles",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned", body = Role),
        (status = 400, description = "Invalid role"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn assign_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let org = load_organization(&state, id).await?;
    check_role_type(&org, payload.role_type, payload.location_id)?;
    check_location(&state, org.id, payload.location_id).await?;

    let subject = match (payload.role_type, payload.location_id) {
        (RoleType::Driver | RoleType::Staff, Some(location)) => Subject::within(&org, vec![location]),
        _ => Subject::organization(&org),
    };
    authorize(&auth, &subject, Permission::Manage)?;

    if state.repo.get_person(payload.party_id).await?.is_none() {
        return Err(AppError::BadRequest("party is not a known person".into()));
    }

    let start_date = payload.start_date.unwrap_or_else(today);
    if payload.end_date.is_some_and(|end| end < start_date) {
        return Err(AppError::BadRequest("end_date must not be before start_date".into()));
    }

    let role = state
        .repo
        .create_role(NewRole {
            party_id: payload.party_id,
            organization_id: org.id,
            location_id: payload.location_id,
            role_type: payload.role_type,
            start_date,
            end_date: payload.end_date,
        })
        .await?;

    tracing::info!(role = %role.id, party = %role.party_id, role_type = ?role.role_type, "role assigned");
    Ok((StatusCode::CREATED, Json(role)))
}

/// end_role
///
/// [Authenticated Route] Deactivates a role as of today. The row is kept for history.
#[utoipa::path(
    delete,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role ended", body = Role),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn end_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let role = state.repo.get_role(id).await?.ok_or(AppError::NotFound)?;
    let org = load_organization(&state, role.organization_id).await?;

    let subject = match (role.role_type, role.location_id) {
        (RoleType::Driver | RoleType::Staff, Some(location)) => Subject::within(&org, vec![location]),
        _ => Subject::organization(&org),
    };
    authorize(&auth, &subject, Permission::Manage)?;

    let ended = state
        .repo
        .end_role(id, today())
        .await?
        .ok_or(AppError::NotFound)?;
    tracing::info!(role = %ended.id, "role ended");
    Ok(Json(ended))
}
