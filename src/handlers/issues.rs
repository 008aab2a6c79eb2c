use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{
    authorize, issue_subject, load_issue, load_organization, location_index, party_belongs_to,
    party_locations, require_text, scope_in,
};
use crate::{
    AppState,
    access::{Permission, Subject},
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        CafFilter, CreateIssueRequest, CreateViolationRequest, Document, DownloadUrlResponse,
        IssueDetail, IssueFilter, IssueRecord, IssueType, UpdateIssueRequest,
        UploadDocumentRequest, UploadDocumentResponse, Violation,
    },
    repository::NewDocument,
    storage::{document_key, extension_for},
};

/// Issues of an organization matching `filter`, narrowed to the caller's scope.
async fn visible_issues(
    state: &AppState,
    auth: &AuthUser,
    organization_id: Uuid,
    mut filter: IssueFilter,
) -> AppResult<Vec<IssueRecord>> {
    let org = load_organization(state, organization_id).await?;
    let scope = scope_in(auth, &org)?;
    let viewer = auth.party_id();
    let index = location_index(state, org.id).await?;

    filter.organization_id = Some(org.id);
    let records = state.repo.list_issues(&filter).await?;
    Ok(records
        .into_iter()
        .filter(|r| {
            let locations = index.get(&r.issue.party_id).map(Vec::as_slice).unwrap_or(&[]);
            scope.admits(viewer, Some(r.issue.party_id), locations)
        })
        .collect())
}

/// Equipment named inside an inspection or accident must belong to the organization.
async fn check_detail_equipment(state: &AppState, organization_id: Uuid, detail: &IssueDetail) -> AppResult<()> {
    let equipment_id = match detail {
        IssueDetail::RoadsideInspection(d) => d.equipment_id,
        IssueDetail::Accident(d) => d.equipment_id,
        _ => None,
    };
    let Some(equipment_id) = equipment_id else {
        return Ok(());
    };
    match state.repo.get_equipment(equipment_id).await? {
        Some(unit) if unit.organization_id == organization_id => Ok(()),
        _ => Err(AppError::BadRequest(
            "equipment does not belong to this organization".into(),
        )),
    }
}

/// list_issues
///
/// [Authenticated Route] Compliance records of an organization, newest first.
/// Filterable by type, status and party.
#[utoipa::path(
    get,
    path = "/organizations/{id}/issues",
    params(("id" = Uuid, Path, description = "Organization ID"), IssueFilter),
    responses(
        (status = 200, description = "Issues", body = [IssueRecord]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_issues(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(filter): Query<IssueFilter>,
) -> AppResult<Json<Vec<IssueRecord>>> {
    Ok(Json(visible_issues(&state, &auth, id, filter).await?))
}

/// list_issues_of_type
///
/// Backs the per-type listings (`/organizations/{id}/licenses`, `/mvrs`, ...). The
/// route fixes the type; the other filters still apply.
pub async fn list_issues_of_type(
    issue_type: IssueType,
    auth: AuthUser,
    state: AppState,
    id: Uuid,
    mut filter: IssueFilter,
) -> AppResult<Json<Vec<IssueRecord>>> {
    filter.issue_type = Some(issue_type);
    Ok(Json(visible_issues(&state, &auth, id, filter).await?))
}

/// create_issue
///
/// [Authenticated Route] Files a compliance record. The detail variant decides the
/// issue type; the subject party must be a member or unit of the organization.
#[utoipa::path(
    post,
    path = "/organizations/{id}/issues",
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateIssueRequest,
    responses(
        (status = 201, description = "Issue created", body = IssueRecord),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn create_issue(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateIssueRequest>,
) -> AppResult<(StatusCode, Json<IssueRecord>)> {
    let org = load_organization(&state, id).await?;
    require_text("title", &payload.title)?;
    payload.detail.validate().map_err(AppError::BadRequest)?;

    if !party_belongs_to(&state, org.id, payload.party_id).await? {
        return Err(AppError::BadRequest(
            "party is not a member or unit of this organization".into(),
        ));
    }
    check_detail_equipment(&state, org.id, &payload.detail).await?;

    let locations = party_locations(&state, org.id, payload.party_id).await?;
    authorize(&auth, &Subject::within(&org, locations), Permission::Manage)?;

    let record = state
        .repo
        .create_issue(org.id, Some(auth.party_id()), payload)
        .await?;
    tracing::info!(
        issue = %record.issue.id,
        issue_type = ?record.issue.issue_type,
        organization = %org.id,
        "issue created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/issues/{id}",
    params(("id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Found", body = IssueRecord),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_issue(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<IssueRecord>> {
    let record = load_issue(&state, id).await?;
    let (_, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::View)?;
    Ok(Json(record))
}

/// update_issue
///
/// [Authenticated Route] Partial update. Moving into `resolved`/`closed` stamps
/// `resolved_at`, reopening clears it. The issue type is fixed at creation.
#[utoipa::path(
    put,
    path = "/issues/{id}",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = UpdateIssueRequest,
    responses(
        (status = 200, description = "Updated", body = IssueRecord),
        (status = 400, description = "Detail of another type"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_issue(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateIssueRequest>,
) -> AppResult<Json<IssueRecord>> {
    let record = load_issue(&state, id).await?;
    let (org, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::Manage)?;

    if let Some(title) = &payload.title {
        require_text("title", title)?;
    }
    if let Some(detail) = &payload.detail {
        if detail.issue_type() != record.issue.issue_type {
            return Err(AppError::BadRequest("the issue type cannot be changed".into()));
        }
        detail.validate().map_err(AppError::BadRequest)?;
        check_detail_equipment(&state, org.id, detail).await?;
    }

    let updated = state
        .repo
        .update_issue(id, payload)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

/// delete_issue
///
/// [Authenticated Route] Removes an issue with its violations and documents. Issues
/// that already have corrective action forms are kept (409).
#[utoipa::path(
    delete,
    path = "/issues/{id}",
    params(("id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Issue has corrective action forms")
    )
)]
pub async fn delete_issue(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let record = load_issue(&state, id).await?;
    let (_, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::Manage)?;

    let filter = CafFilter {
        issue_id: Some(id),
        ..Default::default()
    };
    if !state.repo.list_cafs(&filter).await?.is_empty() {
        return Err(AppError::Conflict(
            "issue has corrective action forms and cannot be deleted".into(),
        ));
    }

    if state.repo.delete_issue(id).await? {
        tracing::info!(issue = %id, "issue deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

#[utoipa::path(
    get,
    path = "/issues/{id}/violations",
    params(("id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Violations", body = [Violation]),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn list_violations(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Violation>>> {
    let record = load_issue(&state, id).await?;
    let (_, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::View)?;
    Ok(Json(state.repo.list_violations(id).await?))
}

/// add_violation
///
/// [Authenticated Route] Cites a regulation on a roadside inspection or accident.
#[utoipa::path(
    post,
    path = "/issues/{id}/violations",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = CreateViolationRequest,
    responses(
        (status = 201, description = "Violation added", body = Violation),
        (status = 400, description = "Issue type has no violations"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn add_violation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateViolationRequest>,
) -> AppResult<(StatusCode, Json<Violation>)> {
    let record = load_issue(&state, id).await?;
    let (_, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::Manage)?;

    if !record.issue.issue_type.carries_violations() {
        return Err(AppError::BadRequest(
            "violations only apply to roadside inspections and accidents".into(),
        ));
    }
    require_text("code", &payload.code)?;
    require_text("description", &payload.description)?;
    if payload.severity < 1 {
        return Err(AppError::BadRequest("severity must be at least 1".into()));
    }

    let violation = state.repo.add_violation(id, payload).await?;
    Ok((StatusCode::CREATED, Json(violation)))
}

#[utoipa::path(
    get,
    path = "/issues/{id}/documents",
    params(("id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Documents", body = [Document]),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn list_documents(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Document>>> {
    let record = load_issue(&state, id).await?;
    let (_, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::View)?;
    Ok(Json(state.repo.list_documents(id).await?))
}

/// upload_document
///
/// [Authenticated Route] Registers a document on an issue and returns a short-lived
/// (10-minute) presigned URL the client PUTs the file to. The client filename is kept
/// for display only; the object key is generated.
#[utoipa::path(
    post,
    path = "/issues/{id}/documents",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = UploadDocumentRequest,
    responses(
        (status = 201, description = "Upload URL issued", body = UploadDocumentResponse),
        (status = 400, description = "Unsupported content type"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn upload_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UploadDocumentRequest>,
) -> AppResult<(StatusCode, Json<UploadDocumentResponse>)> {
    let record = load_issue(&state, id).await?;
    let (org, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::Manage)?;

    require_text("filename", &payload.filename)?;
    let extension = extension_for(&payload.content_type).ok_or_else(|| {
        AppError::BadRequest(format!("unsupported content type {}", payload.content_type))
    })?;

    let key = document_key(org.id, id, extension);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, &payload.content_type)
        .await
        .map_err(AppError::Storage)?;

    let document = state
        .repo
        .add_document(NewDocument {
            issue_id: id,
            object_key: key,
            filename: payload.filename,
            content_type: payload.content_type,
            uploaded_by: Some(auth.party_id()),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadDocumentResponse { document, upload_url }),
    ))
}

/// download_document
///
/// [Authenticated Route] A five-minute presigned GET URL for a stored document.
#[utoipa::path(
    get,
    path = "/documents/{id}/download",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Download URL", body = DownloadUrlResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn download_document(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DownloadUrlResponse>> {
    let document = state.repo.get_document(id).await?.ok_or(AppError::NotFound)?;
    let record = load_issue(&state, document.issue_id).await?;
    let (_, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::View)?;

    let download_url = state
        .storage
        .get_presigned_download_url(&document.object_key)
        .await
        .map_err(AppError::Storage)?;
    Ok(Json(DownloadUrlResponse { download_url }))
}
