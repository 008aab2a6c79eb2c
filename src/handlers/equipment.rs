use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{authorize, check_location, load_organization, require_text, scope_in, today};
use crate::{
    AppState,
    access::{Permission, Subject},
    auth::AuthUser,
    error::{AppError, AppResult},
    maintenance::{AB_SCHEDULE, MaintenanceOverview, ScheduleInterval, maintenance_status},
    models::{
        CreateEquipmentRequest, Equipment, MaintenanceRecord, Organization,
        RecordMaintenanceRequest, UpdateEquipmentRequest,
    },
};

fn equipment_subject(org: &Organization, unit: &Equipment) -> Subject {
    Subject::within(org, unit.location_id.into_iter().collect())
}

async fn load_equipment(state: &AppState, id: Uuid) -> AppResult<(Organization, Equipment)> {
    let unit = state.repo.get_equipment(id).await?.ok_or(AppError::NotFound)?;
    let org = load_organization(state, unit.organization_id).await?;
    Ok((org, unit))
}

/// Highest reading accepted from clients. No road vehicle gets near it.
const MAX_ODOMETER: i64 = 10_000_000;

fn check_odometer(odometer: i64) -> AppResult<()> {
    if !(0..=MAX_ODOMETER).contains(&odometer) {
        return Err(AppError::BadRequest(format!(
            "odometer must be between 0 and {}",
            MAX_ODOMETER
        )));
    }
    Ok(())
}

/// list_equipment
///
/// [Authenticated Route] Units of the organization visible to the caller. Drivers have
/// no equipment scope and get an empty list.
#[utoipa::path(
    get,
    path = "/organizations/{id}/equipment",
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Equipment", body = [Equipment]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_equipment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Equipment>>> {
    let org = load_organization(&state, id).await?;
    let scope = scope_in(&auth, &org)?;
    let viewer = auth.party_id();
    let units = state
        .repo
        .list_equipment(org.id)
        .await?
        .into_iter()
        .filter(|e| {
            let locations: Vec<Uuid> = e.location_id.into_iter().collect();
            scope.admits(viewer, None, &locations)
        })
        .collect();
    Ok(Json(units))
}

#[utoipa::path(
    post,
    path = "/organizations/{id}/equipment",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateEquipmentRequest,
    responses(
        (status = 201, description = "Equipment created", body = Equipment),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Unit number already used")
    )
)]
pub async fn create_equipment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateEquipmentRequest>,
) -> AppResult<(StatusCode, Json<Equipment>)> {
    let org = load_organization(&state, id).await?;
    require_text("unit_number", &payload.unit_number)?;
    check_odometer(payload.odometer)?;
    check_location(&state, org.id, payload.location_id).await?;
    authorize(
        &auth,
        &Subject::within(&org, payload.location_id.into_iter().collect()),
        Permission::Manage,
    )?;

    let exists = state
        .repo
        .list_equipment(org.id)
        .await?
        .iter()
        .any(|e| e.unit_number == payload.unit_number);
    if exists {
        return Err(AppError::Conflict("unit number already used in this organization".into()));
    }

    let unit = state.repo.create_equipment(org.id, payload).await?;
    tracing::info!(equipment = %unit.id, organization = %org.id, "equipment created");
    Ok((StatusCode::CREATED, Json(unit)))
}

#[utoipa::path(
    get,
    path = "/equipment/{id}",
    params(("id" = Uuid, Path, description = "Equipment party ID")),
    responses(
        (status = 200, description = "Found", body = Equipment),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_equipment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Equipment>> {
    let (org, unit) = load_equipment(&state, id).await?;
    authorize(&auth, &equipment_subject(&org, &unit), Permission::View)?;
    Ok(Json(unit))
}

/// update_equipment
///
/// [Authenticated Route] Moving a unit to another location needs a grant on both the
/// old and the new location.
#[utoipa::path(
    put,
    path = "/equipment/{id}",
    params(("id" = Uuid, Path, description = "Equipment party ID")),
    request_body = UpdateEquipmentRequest,
    responses(
        (status = 200, description = "Updated", body = Equipment),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_equipment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEquipmentRequest>,
) -> AppResult<Json<Equipment>> {
    let (org, unit) = load_equipment(&state, id).await?;
    authorize(&auth, &equipment_subject(&org, &unit), Permission::Manage)?;

    if let Some(unit_number) = &payload.unit_number {
        require_text("unit_number", unit_number)?;
    }
    if let Some(odometer) = payload.odometer {
        check_odometer(odometer)?;
        if odometer < unit.odometer {
            return Err(AppError::BadRequest(format!(
                "odometer cannot go back from {} to {}",
                unit.odometer, odometer
            )));
        }
    }
    if let Some(location) = payload.location_id {
        check_location(&state, org.id, Some(location)).await?;
        authorize(&auth, &Subject::within(&org, vec![location]), Permission::Manage)?;
    }

    let updated = state
        .repo
        .update_equipment(id, payload)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

/// get_maintenance
///
/// [Authenticated Route] Service history and A/B schedule status of a unit.
#[utoipa::path(
    get,
    path = "/equipment/{id}/maintenance",
    params(("id" = Uuid, Path, description = "Equipment party ID")),
    responses(
        (status = 200, description = "Maintenance overview", body = MaintenanceOverview),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_maintenance(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MaintenanceOverview>> {
    let (org, unit) = load_equipment(&state, id).await?;
    authorize(&auth, &equipment_subject(&org, &unit), Permission::View)?;

    let history = state.repo.list_maintenance(unit.id).await?;
    let schedule = maintenance_status(&unit, &history, today());
    Ok(Json(MaintenanceOverview {
        equipment_id: unit.id,
        odometer: unit.odometer,
        history,
        schedule,
    }))
}

/// record_maintenance
///
/// [Authenticated Route] Logs a completed A or B service. A reading above the unit's
/// odometer advances it.
#[utoipa::path(
    post,
    path = "/equipment/{id}/maintenance",
    params(("id" = Uuid, Path, description = "Equipment party ID")),
    request_body = RecordMaintenanceRequest,
    responses(
        (status = 201, description = "Service recorded", body = MaintenanceRecord),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn record_maintenance(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordMaintenanceRequest>,
) -> AppResult<(StatusCode, Json<MaintenanceRecord>)> {
    let (org, unit) = load_equipment(&state, id).await?;
    authorize(&auth, &equipment_subject(&org, &unit), Permission::Manage)?;
    check_odometer(payload.odometer)?;
    if payload.performed_on > today() {
        return Err(AppError::BadRequest("performed_on must not be in the future".into()));
    }

    let record = state.repo.record_maintenance(unit.id, payload).await?;
    tracing::info!(equipment = %unit.id, level = ?record.service_level, "maintenance recorded");
    Ok((StatusCode::CREATED, Json(record)))
}

/// get_schedules
///
/// [Authenticated Route] The A/B preventive-maintenance intervals per category.
#[utoipa::path(
    get,
    path = "/maintenance/schedules",
    responses((status = 200, description = "Schedule", body = [ScheduleInterval]))
)]
pub async fn get_schedules() -> Json<Vec<ScheduleInterval>> {
    Json(AB_SCHEDULE.iter().map(ScheduleInterval::from).collect())
}
