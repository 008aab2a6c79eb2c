//! Route handlers, one module per resource.
//!
//! Every organization-scoped handler follows the same order: load the record (404),
//! describe it as a [`Subject`], ask the caller's [`Actor`](crate::access::Actor) for
//! a grant (403), then touch the repository.

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    AppState,
    access::{Grant, Permission, Scope, Subject},
    auth::AuthUser,
    error::{AppError, AppResult},
    identity::IdentityError,
    models::{Caf, IssueRecord, Organization, RoleType},
};

pub mod account;
pub mod admin;
pub mod cafs;
pub mod equipment;
pub mod issues;
pub mod members;
pub mod organizations;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) async fn load_organization(state: &AppState, id: Uuid) -> AppResult<Organization> {
    state.repo.get_organization(id).await?.ok_or(AppError::NotFound)
}

/// Resolves a grant and logs it.
pub(crate) fn authorize(auth: &AuthUser, subject: &Subject, permission: Permission) -> AppResult<Grant> {
    let grant = auth.actor.authorize(subject, permission, today())?;
    tracing::debug!(
        user = %auth.id,
        organization = %subject.organization_id,
        ?permission,
        ?grant,
        "access granted"
    );
    Ok(grant)
}

/// Listing scope of the caller inside `org`. No standing at all is a 403.
pub(crate) fn scope_in(auth: &AuthUser, org: &Organization) -> AppResult<Scope> {
    auth.actor.scope(org, today()).ok_or(AppError::Forbidden)
}

/// Like [`scope_in`] but rejects callers who can only see their own records.
pub(crate) fn manager_scope_in(auth: &AuthUser, org: &Organization) -> AppResult<Scope> {
    match scope_in(auth, org)? {
        Scope::Own => Err(AppError::Forbidden),
        scope => Ok(scope),
    }
}

/// Locations a party is attached to inside an organization: the locations of its roles
/// there for a person, the unit's location for equipment.
pub(crate) async fn party_locations(state: &AppState, organization_id: Uuid, party_id: Uuid) -> AppResult<Vec<Uuid>> {
    let mut locations: Vec<Uuid> = state
        .repo
        .roles_for_party(party_id)
        .await?
        .into_iter()
        .filter(|r| r.organization_id == organization_id)
        .filter_map(|r| r.location_id)
        .collect();
    if locations.is_empty() {
        if let Some(unit) = state.repo.get_equipment(party_id).await? {
            if unit.organization_id == organization_id {
                locations.extend(unit.location_id);
            }
        }
    }
    locations.sort();
    locations.dedup();
    Ok(locations)
}

/// Whether `party_id` is a person with a role in the organization or a unit owned by it.
pub(crate) async fn party_belongs_to(state: &AppState, organization_id: Uuid, party_id: Uuid) -> AppResult<bool> {
    let has_role = state
        .repo
        .roles_for_party(party_id)
        .await?
        .iter()
        .any(|r| r.organization_id == organization_id);
    if has_role {
        return Ok(true);
    }
    Ok(state
        .repo
        .get_equipment(party_id)
        .await?
        .is_some_and(|e| e.organization_id == organization_id))
}

/// Party id → locations for every member and unit of an organization. Used to filter
/// listings by scope without a lookup per row.
pub(crate) async fn location_index(state: &AppState, organization_id: Uuid) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
    let mut index: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let all_roles = [RoleType::Master, RoleType::Admin, RoleType::Staff, RoleType::Driver];
    for member in state.repo.list_members(organization_id, &all_roles).await? {
        let entry = index.entry(member.person.id).or_default();
        entry.extend(member.location_id);
    }
    for unit in state.repo.list_equipment(organization_id).await? {
        index.entry(unit.id).or_default().extend(unit.location_id);
    }
    Ok(index)
}

/// Rejects blank required strings.
pub(crate) fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// A location referenced in a payload must exist and belong to the organization.
pub(crate) async fn check_location(state: &AppState, organization_id: Uuid, location_id: Option<Uuid>) -> AppResult<()> {
    let Some(location_id) = location_id else {
        return Ok(());
    };
    match state.repo.get_location(location_id).await? {
        Some(location) if location.organization_id == organization_id => Ok(()),
        _ => Err(AppError::BadRequest(
            "location does not belong to this organization".into(),
        )),
    }
}

/// Subject of an issue: its organization, its party as owner and that party's locations.
pub(crate) async fn issue_subject(state: &AppState, record: &IssueRecord) -> AppResult<(Organization, Subject)> {
    let org = load_organization(state, record.issue.organization_id).await?;
    let locations = party_locations(state, org.id, record.issue.party_id).await?;
    let subject = Subject::within(&org, locations).owned_by(record.issue.party_id);
    Ok((org, subject))
}

pub(crate) async fn load_issue(state: &AppState, id: Uuid) -> AppResult<IssueRecord> {
    state.repo.get_issue(id).await?.ok_or(AppError::NotFound)
}

/// Subject of a CAF: the issue's locations, owned by the assignee so they can read and
/// sign it.
pub(crate) async fn caf_subject(state: &AppState, caf: &Caf) -> AppResult<Subject> {
    let org = load_organization(state, caf.organization_id).await?;
    let party = state.repo.get_issue(caf.issue_id).await?.map(|r| r.issue.party_id);
    let locations = match party {
        Some(party) => party_locations(state, org.id, party).await?,
        None => Vec::new(),
    };
    let mut subject = Subject::within(&org, locations);
    subject.owner = caf.assigned_to;
    Ok(subject)
}

pub(crate) fn require_superuser(auth: &AuthUser) -> AppResult<()> {
    if auth.is_superuser() {
        Ok(())
    } else {
        tracing::warn!(user = %auth.id, "non-superuser on admin route");
        Err(AppError::Forbidden)
    }
}

/// Provider outages are a 502; `rejected` decides what a refusal means for the caller.
pub(crate) fn identity_error(err: IdentityError, rejected: impl FnOnce(String) -> AppError) -> AppError {
    match err {
        IdentityError::Rejected(reason) => rejected(reason),
        IdentityError::Unavailable(reason) => AppError::Identity(reason),
    }
}
