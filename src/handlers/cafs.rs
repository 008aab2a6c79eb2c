use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    authorize, caf_subject, issue_subject, load_issue, load_organization, location_index,
    require_text, scope_in, today,
};
use crate::{
    AppState,
    access::Permission,
    auth::AuthUser,
    caf::{CafAction, apply},
    error::{AppError, AppResult},
    models::{
        AssignCafRequest, Caf, CafFilter, CreateCafRequest, IssueFilter, IssueRecord, NewCaf,
        ReviewCafRequest, SignCafRequest,
    },
};

async fn load_caf(state: &AppState, id: Uuid) -> AppResult<Caf> {
    state.repo.get_caf(id).await?.ok_or(AppError::NotFound)
}

fn require_violations(record: &IssueRecord) -> AppResult<()> {
    if record.issue.issue_type.carries_violations() {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "corrective action forms only apply to roadside inspections and accidents".into(),
        ))
    }
}

/// The assignee must hold an active role in the form's organization.
async fn check_assignee(state: &AppState, organization_id: Uuid, assignee: Uuid) -> AppResult<()> {
    let today = today();
    let eligible = state
        .repo
        .roles_for_party(assignee)
        .await?
        .iter()
        .any(|r| r.organization_id == organization_id && r.is_active_on(today));
    if eligible {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "assignee holds no active role in this organization".into(),
        ))
    }
}

/// Runs one workflow step: authorize, apply, persist.
async fn transition(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
    permission: Permission,
    action: CafAction,
) -> AppResult<Caf> {
    let mut caf = load_caf(state, id).await?;
    let subject = caf_subject(state, &caf).await?;
    authorize(auth, &subject, permission)?;

    let name = action.name();
    apply(&mut caf, action, auth.party_id(), Utc::now())?;
    let saved = state.repo.save_caf(&caf).await?;
    tracing::info!(caf = %saved.id, action = name, status = ?saved.status, "caf transition");
    Ok(saved)
}

/// list_cafs
///
/// [Authenticated Route] Corrective action forms of an organization. Filterable by
/// status and assignee; assignees always see their own forms.
#[utoipa::path(
    get,
    path = "/organizations/{id}/cafs",
    params(("id" = Uuid, Path, description = "Organization ID"), CafFilter),
    responses(
        (status = 200, description = "Forms", body = [Caf]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_cafs(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(mut filter): Query<CafFilter>,
) -> AppResult<Json<Vec<Caf>>> {
    let org = load_organization(&state, id).await?;
    let scope = scope_in(&auth, &org)?;
    let viewer = auth.party_id();
    let index = location_index(&state, org.id).await?;

    let issue_filter = IssueFilter {
        organization_id: Some(org.id),
        ..Default::default()
    };
    let issue_party: HashMap<Uuid, Uuid> = state
        .repo
        .list_issues(&issue_filter)
        .await?
        .into_iter()
        .map(|r| (r.issue.id, r.issue.party_id))
        .collect();

    filter.organization_id = Some(org.id);
    let cafs = state
        .repo
        .list_cafs(&filter)
        .await?
        .into_iter()
        .filter(|c| {
            let locations = issue_party
                .get(&c.issue_id)
                .and_then(|party| index.get(party))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            scope.admits(viewer, c.assigned_to, locations)
        })
        .collect();
    Ok(Json(cafs))
}

/// create_caf
///
/// [Authenticated Route] Opens a corrective action form on an inspection or accident,
/// optionally tied to one of its violations and assigned right away.
#[utoipa::path(
    post,
    path = "/issues/{id}/cafs",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = CreateCafRequest,
    responses(
        (status = 201, description = "Form created", body = Caf),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn create_caf(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateCafRequest>,
) -> AppResult<(StatusCode, Json<Caf>)> {
    let record = load_issue(&state, id).await?;
    let (org, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::Manage)?;
    require_violations(&record)?;
    require_text("title", &payload.title)?;
    require_text("corrective_action", &payload.corrective_action)?;

    if let Some(violation_id) = payload.violation_id {
        let belongs = state
            .repo
            .list_violations(id)
            .await?
            .iter()
            .any(|v| v.id == violation_id);
        if !belongs {
            return Err(AppError::BadRequest("violation does not belong to this issue".into()));
        }
    }
    if let Some(assignee) = payload.assigned_to {
        check_assignee(&state, org.id, assignee).await?;
    }

    let mut caf = state
        .repo
        .create_caf(NewCaf {
            organization_id: org.id,
            issue_id: id,
            violation_id: payload.violation_id,
            title: payload.title,
            corrective_action: payload.corrective_action,
            created_by: Some(auth.party_id()),
        })
        .await?;

    if let Some(assignee) = payload.assigned_to {
        apply(&mut caf, CafAction::Assign { assignee }, auth.party_id(), Utc::now())?;
        caf = state.repo.save_caf(&caf).await?;
    }

    tracing::info!(caf = %caf.id, issue = %id, "caf created");
    Ok((StatusCode::CREATED, Json(caf)))
}

/// generate_cafs
///
/// [Authenticated Route] Creates one draft form for every violation of the issue that
/// has none yet. Returns only the new forms; calling it twice is harmless.
#[utoipa::path(
    post,
    path = "/issues/{id}/cafs/generate",
    params(("id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 201, description = "Forms generated", body = [Caf]),
        (status = 400, description = "Issue type has no violations"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn generate_cafs(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Vec<Caf>>)> {
    let record = load_issue(&state, id).await?;
    let (org, subject) = issue_subject(&state, &record).await?;
    authorize(&auth, &subject, Permission::Manage)?;
    require_violations(&record)?;

    let existing = state
        .repo
        .list_cafs(&CafFilter {
            issue_id: Some(id),
            ..Default::default()
        })
        .await?;
    let covered: Vec<Uuid> = existing.iter().filter_map(|c| c.violation_id).collect();

    let mut created = Vec::new();
    for violation in state.repo.list_violations(id).await? {
        if covered.contains(&violation.id) {
            continue;
        }
        let caf = state
            .repo
            .create_caf(NewCaf {
                organization_id: org.id,
                issue_id: id,
                violation_id: Some(violation.id),
                title: format!("{} {}", violation.code, record.issue.title),
                corrective_action: format!("Correct and document: {}", violation.description),
                created_by: Some(auth.party_id()),
            })
            .await?;
        created.push(caf);
    }

    tracing::info!(issue = %id, count = created.len(), "cafs generated");
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/cafs/{id}",
    params(("id" = Uuid, Path, description = "CAF ID")),
    responses(
        (status = 200, description = "Found", body = Caf),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_caf(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Caf>> {
    let caf = load_caf(&state, id).await?;
    let subject = caf_subject(&state, &caf).await?;
    authorize(&auth, &subject, Permission::View)?;
    Ok(Json(caf))
}

/// assign_caf
///
/// [Authenticated Route] Routes the form to a person for signature. Reassigning a
/// rejected form sends it back through signing.
#[utoipa::path(
    post,
    path = "/cafs/{id}/assign",
    params(("id" = Uuid, Path, description = "CAF ID")),
    request_body = AssignCafRequest,
    responses(
        (status = 200, description = "Assigned", body = Caf),
        (status = 400, description = "Assignee not in organization"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn assign_caf(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignCafRequest>,
) -> AppResult<Json<Caf>> {
    let caf = load_caf(&state, id).await?;
    check_assignee(&state, caf.organization_id, payload.assignee).await?;
    let caf = transition(
        &state,
        &auth,
        id,
        Permission::Manage,
        CafAction::Assign {
            assignee: payload.assignee,
        },
    )
    .await?;
    Ok(Json(caf))
}

/// sign_caf
///
/// [Authenticated Route] The assignee signs the form. Anyone else gets 403.
#[utoipa::path(
    post,
    path = "/cafs/{id}/sign",
    params(("id" = Uuid, Path, description = "CAF ID")),
    request_body = SignCafRequest,
    responses(
        (status = 200, description = "Signed", body = Caf),
        (status = 403, description = "Not the assignee"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn sign_caf(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignCafRequest>,
) -> AppResult<Json<Caf>> {
    let action = CafAction::Sign {
        signature: payload.signature,
    };
    Ok(Json(transition(&state, &auth, id, Permission::View, action).await?))
}

#[utoipa::path(
    post,
    path = "/cafs/{id}/approve",
    params(("id" = Uuid, Path, description = "CAF ID")),
    request_body = ReviewCafRequest,
    responses(
        (status = 200, description = "Approved", body = Caf),
        (status = 403, description = "Forbidden or own signature"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn approve_caf(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewCafRequest>,
) -> AppResult<Json<Caf>> {
    let action = CafAction::Approve { note: payload.note };
    Ok(Json(transition(&state, &auth, id, Permission::Manage, action).await?))
}

#[utoipa::path(
    post,
    path = "/cafs/{id}/reject",
    params(("id" = Uuid, Path, description = "CAF ID")),
    request_body = ReviewCafRequest,
    responses(
        (status = 200, description = "Rejected", body = Caf),
        (status = 403, description = "Forbidden or own signature"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn reject_caf(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewCafRequest>,
) -> AppResult<Json<Caf>> {
    let action = CafAction::Reject { note: payload.note };
    Ok(Json(transition(&state, &auth, id, Permission::Manage, action).await?))
}
