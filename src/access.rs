//! Authorization policy shared by every resource.
//!
//! Access to a record is resolved against the party-organization-role graph in a fixed
//! order of tiers:
//!
//! 1. **Superuser**: platform operators see and manage everything.
//! 2. **Owner**: a person may *view* records filed against their own party.
//! 3. **Master**: an active `master` role in the organization that manages the record's
//!    organization grants full access to every sub-organization.
//! 4. **Organization**: an active manager role (`master`, `admin`, `staff`) in the
//!    record's organization with no location restriction.
//! 5. **Location**: an active `admin`/`staff` role restricted to one of the record's
//!    locations.
//!
//! Handlers describe the record as a [`Subject`] and ask the [`Actor`] resolved by the
//! auth extractor; nothing else in the crate inspects roles directly.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Organization, Role, RoleType};

/// Permission
///
/// What the caller wants to do with a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    View,
    Manage,
}

/// Grant
///
/// The tier that allowed the request. Handlers log it; nothing branches on it except
/// tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    Superuser,
    Owner,
    Master,
    Organization,
    Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("party {party_id} may not {permission:?} records of organization {organization_id}")]
pub struct AccessDenied {
    pub party_id: Uuid,
    pub organization_id: Uuid,
    pub permission: Permission,
}

/// Subject
///
/// What an access decision is made about: the owning party (if the record belongs to a
/// person), the organization, that organization's master, and the locations the record
/// is attached to.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    pub owner: Option<Uuid>,
    pub organization_id: Uuid,
    pub master_id: Option<Uuid>,
    pub location_ids: Vec<Uuid>,
}

impl Subject {
    /// The organization itself, as a whole.
    pub fn organization(org: &Organization) -> Self {
        Self {
            owner: None,
            organization_id: org.id,
            master_id: org.master_id,
            location_ids: Vec::new(),
        }
    }

    /// A record inside `org` attached to the given locations.
    pub fn within(org: &Organization, location_ids: Vec<Uuid>) -> Self {
        Self {
            location_ids,
            ..Self::organization(org)
        }
    }

    pub fn owned_by(mut self, owner: Uuid) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Scope
///
/// How much of an organization a caller may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every record in the organization.
    Organization,
    /// Records attached to one of these locations (plus the caller's own).
    Locations(Vec<Uuid>),
    /// Only records the caller owns.
    Own,
}

impl Scope {
    /// Whether a record owned by `owner` and attached to `location_ids` is visible to
    /// `viewer` under this scope.
    pub fn admits(&self, viewer: Uuid, owner: Option<Uuid>, location_ids: &[Uuid]) -> bool {
        if owner == Some(viewer) {
            return true;
        }
        match self {
            Scope::Organization => true,
            Scope::Locations(allowed) => location_ids.iter().any(|l| allowed.contains(l)),
            Scope::Own => false,
        }
    }
}

/// Actor
///
/// The authenticated caller as seen by the policy: their person party and every role
/// they hold, active or not.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub party_id: Uuid,
    pub is_superuser: bool,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(party_id: Uuid, is_superuser: bool, roles: Vec<Role>) -> Self {
        Self {
            party_id,
            is_superuser,
            roles,
        }
    }

    pub fn active_roles(&self, today: NaiveDate) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(move |r| r.is_active_on(today))
    }

    fn manager_roles_in(&self, organization_id: Uuid, today: NaiveDate) -> impl Iterator<Item = &Role> {
        self.active_roles(today)
            .filter(move |r| r.organization_id == organization_id && r.role_type.is_manager())
    }

    /// Whether the actor holds an active, organization-wide master seat in `master_org`.
    pub fn is_master_of(&self, master_org: Uuid, today: NaiveDate) -> bool {
        self.active_roles(today).any(|r| {
            r.role_type == RoleType::Master && r.organization_id == master_org && r.location_id.is_none()
        })
    }

    /// Resolves a single access decision. See the module docs for the tier order.
    pub fn authorize(
        &self,
        subject: &Subject,
        permission: Permission,
        today: NaiveDate,
    ) -> Result<Grant, AccessDenied> {
        if self.is_superuser {
            return Ok(Grant::Superuser);
        }

        if permission == Permission::View && subject.owner == Some(self.party_id) {
            return Ok(Grant::Owner);
        }

        if let Some(master_id) = subject.master_id {
            if self.is_master_of(master_id, today) {
                return Ok(Grant::Master);
            }
        }

        if self
            .manager_roles_in(subject.organization_id, today)
            .any(|r| r.location_id.is_none())
        {
            return Ok(Grant::Organization);
        }

        if self.manager_roles_in(subject.organization_id, today).any(|r| {
            r.role_type != RoleType::Master
                && r.location_id.is_some_and(|l| subject.location_ids.contains(&l))
        }) {
            return Ok(Grant::Location);
        }

        Err(AccessDenied {
            party_id: self.party_id,
            organization_id: subject.organization_id,
            permission,
        })
    }

    /// How much of `org` the actor may list. `None` when the actor has no standing there.
    pub fn scope(&self, org: &Organization, today: NaiveDate) -> Option<Scope> {
        if self.is_superuser {
            return Some(Scope::Organization);
        }
        if org.master_id.is_some_and(|m| self.is_master_of(m, today)) {
            return Some(Scope::Organization);
        }

        let roles: Vec<&Role> = self
            .active_roles(today)
            .filter(|r| r.organization_id == org.id)
            .collect();
        if roles.is_empty() {
            return None;
        }

        let mut locations = Vec::new();
        for role in roles.iter().filter(|r| r.role_type.is_manager()) {
            match role.location_id {
                None => return Some(Scope::Organization),
                Some(l) => locations.push(l),
            }
        }

        if locations.is_empty() {
            Some(Scope::Own)
        } else {
            Some(Scope::Locations(locations))
        }
    }

    /// Organizations the actor holds any active role in, plus those managed through a
    /// master seat.
    pub fn visible_organizations<'a>(
        &self,
        all: &'a [Organization],
        today: NaiveDate,
    ) -> Vec<&'a Organization> {
        all.iter()
            .filter(|org| self.scope(org, today).is_some())
            .collect()
    }
}
