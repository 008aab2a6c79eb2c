use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Caf, CafFilter, CreateEquipmentRequest, CreateIssueRequest, CreateLocationRequest,
    CreatePersonRequest, CreateViolationRequest, Document, Equipment, IssueFilter, IssueRecord,
    Location, MaintenanceRecord, Member, NewCaf, NewOrganization, NewRole, Organization, Person,
    PlatformStats, RecordMaintenanceRequest, Role, RoleType, UpdateEquipmentRequest,
    UpdateIssueRequest, UpdateOrganizationRequest, UpdatePersonRequest, User, Violation,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// NewDocument
///
/// Internal insert shape for `documents`.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub issue_id: Uuid,
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub uploaded_by: Option<Uuid>,
}

/// NewCarrier
///
/// Everything a self-service sign-up writes: the organization, its first administrator
/// (an organization-wide `admin` role from `start_date`) and the login mirror for
/// `user_id`.
#[derive(Debug, Clone)]
pub struct NewCarrier {
    pub user_id: Uuid,
    pub email: String,
    pub organization: NewOrganization,
    pub admin: CreatePersonRequest,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct RegisteredCarrier {
    pub organization: Organization,
    pub person: Person,
    pub role: Role,
    pub user: User,
}

/// Repository Trait
///
/// Abstract contract for every persistence operation. Handlers only ever see
/// `Arc<dyn Repository>`, so Postgres and the in-memory store are interchangeable.
///
/// Lookups return `Ok(None)` for unknown ids; mutations on unknown ids return
/// `Ok(None)` / `Ok(false)`. `Err` is reserved for storage failures and constraint
/// violations.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn create_user(&self, user: User) -> RepoResult<User>;
    /// Writes a new carrier in one unit: on any failure nothing is kept.
    async fn register_carrier(&self, carrier: NewCarrier) -> RepoResult<RegisteredCarrier>;

    // --- Organizations & Locations ---
    async fn create_organization(&self, org: NewOrganization) -> RepoResult<Organization>;
    async fn get_organization(&self, id: Uuid) -> RepoResult<Option<Organization>>;
    async fn list_organizations(&self) -> RepoResult<Vec<Organization>>;
    async fn update_organization(
        &self,
        id: Uuid,
        req: UpdateOrganizationRequest,
    ) -> RepoResult<Option<Organization>>;
    async fn create_location(&self, organization_id: Uuid, req: CreateLocationRequest) -> RepoResult<Location>;
    async fn get_location(&self, id: Uuid) -> RepoResult<Option<Location>>;
    async fn list_locations(&self, organization_id: Uuid) -> RepoResult<Vec<Location>>;

    // --- Persons & Roles ---
    async fn create_person(&self, req: &CreatePersonRequest) -> RepoResult<Person>;
    async fn get_person(&self, id: Uuid) -> RepoResult<Option<Person>>;
    async fn update_person(&self, id: Uuid, req: UpdatePersonRequest) -> RepoResult<Option<Person>>;
    async fn create_role(&self, role: NewRole) -> RepoResult<Role>;
    async fn get_role(&self, id: Uuid) -> RepoResult<Option<Role>>;
    async fn roles_for_party(&self, party_id: Uuid) -> RepoResult<Vec<Role>>;
    /// Deactivates a role and stamps its end date.
    async fn end_role(&self, id: Uuid, on: NaiveDate) -> RepoResult<Option<Role>>;
    /// Persons holding one of `role_types` in the organization, one row per role.
    async fn list_members(&self, organization_id: Uuid, role_types: &[RoleType]) -> RepoResult<Vec<Member>>;

    // --- Equipment & Maintenance ---
    async fn create_equipment(&self, organization_id: Uuid, req: CreateEquipmentRequest) -> RepoResult<Equipment>;
    async fn get_equipment(&self, id: Uuid) -> RepoResult<Option<Equipment>>;
    async fn list_equipment(&self, organization_id: Uuid) -> RepoResult<Vec<Equipment>>;
    async fn update_equipment(&self, id: Uuid, req: UpdateEquipmentRequest) -> RepoResult<Option<Equipment>>;
    /// Records a service and advances the unit's odometer when the reading is higher.
    async fn record_maintenance(
        &self,
        equipment_id: Uuid,
        req: RecordMaintenanceRequest,
    ) -> RepoResult<MaintenanceRecord>;
    async fn list_maintenance(&self, equipment_id: Uuid) -> RepoResult<Vec<MaintenanceRecord>>;

    // --- Issues ---
    async fn create_issue(
        &self,
        organization_id: Uuid,
        created_by: Option<Uuid>,
        req: CreateIssueRequest,
    ) -> RepoResult<IssueRecord>;
    async fn get_issue(&self, id: Uuid) -> RepoResult<Option<IssueRecord>>;
    async fn list_issues(&self, filter: &IssueFilter) -> RepoResult<Vec<IssueRecord>>;
    /// Applies a partial update. Status changes into resolved/closed stamp
    /// `resolved_at`; changes out of them clear it.
    async fn update_issue(&self, id: Uuid, req: UpdateIssueRequest) -> RepoResult<Option<IssueRecord>>;
    async fn delete_issue(&self, id: Uuid) -> RepoResult<bool>;
    async fn add_violation(&self, issue_id: Uuid, req: CreateViolationRequest) -> RepoResult<Violation>;
    async fn list_violations(&self, issue_id: Uuid) -> RepoResult<Vec<Violation>>;

    // --- Corrective Action Forms ---
    async fn create_caf(&self, caf: NewCaf) -> RepoResult<Caf>;
    async fn get_caf(&self, id: Uuid) -> RepoResult<Option<Caf>>;
    async fn list_cafs(&self, filter: &CafFilter) -> RepoResult<Vec<Caf>>;
    /// Persists the workflow fields of a CAF after a transition.
    async fn save_caf(&self, caf: &Caf) -> RepoResult<Caf>;

    // --- Documents ---
    async fn add_document(&self, doc: NewDocument) -> RepoResult<Document>;
    async fn get_document(&self, id: Uuid) -> RepoResult<Option<Document>>;
    async fn list_documents(&self, issue_id: Uuid) -> RepoResult<Vec<Document>>;

    // --- Platform ---
    async fn get_stats(&self) -> RepoResult<PlatformStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
