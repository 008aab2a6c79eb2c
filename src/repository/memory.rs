use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::error::{DatabaseError, ErrorKind};
use std::{borrow::Cow, collections::HashMap, error::Error as StdError, fmt};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewCarrier, NewDocument, RegisteredCarrier, RepoResult, Repository};
use crate::models::{
    Caf, CafFilter, CafStatus, CreateEquipmentRequest, CreateIssueRequest, CreateLocationRequest,
    CreatePersonRequest, CreateViolationRequest, Document, Equipment, Issue, IssueFilter,
    IssueRecord, IssueStatus, Location, MaintenanceRecord, Member, NewCaf, NewOrganization,
    NewRole, Organization, Person, PlatformStats, RecordMaintenanceRequest, Role, RoleType,
    UpdateEquipmentRequest, UpdateIssueRequest, UpdateOrganizationRequest, UpdatePersonRequest,
    User, Violation,
};

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    locations: HashMap<Uuid, Location>,
    persons: HashMap<Uuid, Person>,
    roles: HashMap<Uuid, Role>,
    equipment: HashMap<Uuid, Equipment>,
    maintenance: Vec<MaintenanceRecord>,
    issues: HashMap<Uuid, IssueRecord>,
    violations: Vec<Violation>,
    cafs: HashMap<Uuid, Caf>,
    documents: HashMap<Uuid, Document>,
}

impl Store {
    fn user_taken(&self, user: &User) -> bool {
        self.users.contains_key(&user.id)
            || self
                .users
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(&user.email) || u.party_id == user.party_id)
    }
}

fn organization_row(org: NewOrganization) -> Organization {
    let now = Utc::now();
    Organization {
        id: Uuid::new_v4(),
        name: org.name,
        dot_number: org.dot_number,
        is_master: org.is_master,
        master_id: org.master_id,
        created_at: now,
        updated_at: now,
    }
}

fn person_row(req: &CreatePersonRequest) -> Person {
    let now = Utc::now();
    Person {
        id: Uuid::new_v4(),
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
        email: req.email.clone(),
        phone: req.phone.clone(),
        date_of_birth: req.date_of_birth,
        hire_date: req.hire_date,
        created_at: now,
        updated_at: now,
    }
}

fn role_row(role: NewRole) -> Role {
    Role {
        id: Uuid::new_v4(),
        party_id: role.party_id,
        organization_id: role.organization_id,
        location_id: role.location_id,
        role_type: role.role_type,
        is_active: true,
        start_date: role.start_date,
        end_date: role.end_date,
        created_at: Utc::now(),
    }
}

/// ConstraintViolation
///
/// The in-memory stand-in for a Postgres constraint error. Carries the same SQLSTATE
/// code so `AppError`'s mapping treats both backends alike.
#[derive(Debug)]
struct ConstraintViolation {
    code: &'static str,
    message: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ConstraintViolation {}

impl DatabaseError for ConstraintViolation {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.code))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self.code {
            "23505" => ErrorKind::UniqueViolation,
            _ => ErrorKind::ForeignKeyViolation,
        }
    }
}

/// 23505, as Postgres raises for a duplicate key.
fn unique_violation(message: &str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(ConstraintViolation {
        code: "23505",
        message: message.to_string(),
    }))
}

/// 23503, as Postgres raises for a missing or still-referenced row.
fn foreign_key_violation(message: &str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(ConstraintViolation {
        code: "23503",
        message: message.to_string(),
    }))
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. Used by the handler and API tests
/// so they run without a database; behaves like the Postgres implementation for every
/// documented case (filters, odometer advance, `resolved_at` stamping, uniqueness).
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> RepoResult<User> {
        let mut store = self.store.write().await;
        if store.user_taken(&user) {
            return Err(unique_violation("user already exists"));
        }
        store.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Checks every constraint before the first insert, under one write lock.
    async fn register_carrier(&self, carrier: NewCarrier) -> RepoResult<RegisteredCarrier> {
        let mut store = self.store.write().await;
        let person = person_row(&carrier.admin);
        let user = User {
            id: carrier.user_id,
            email: carrier.email,
            party_id: person.id,
            is_superuser: false,
        };
        if store.user_taken(&user) {
            return Err(unique_violation("user already exists"));
        }

        let organization = organization_row(carrier.organization);
        let role = role_row(NewRole {
            party_id: person.id,
            organization_id: organization.id,
            location_id: None,
            role_type: RoleType::Admin,
            start_date: carrier.start_date,
            end_date: None,
        });
        store.organizations.insert(organization.id, organization.clone());
        store.persons.insert(person.id, person.clone());
        store.roles.insert(role.id, role.clone());
        store.users.insert(user.id, user.clone());
        Ok(RegisteredCarrier {
            organization,
            person,
            role,
            user,
        })
    }

    // --- ORGANIZATIONS & LOCATIONS ---

    async fn create_organization(&self, org: NewOrganization) -> RepoResult<Organization> {
        let mut store = self.store.write().await;
        if let Some(master) = org.master_id {
            if !store.organizations.contains_key(&master) {
                return Err(foreign_key_violation("master organization does not exist"));
            }
        }
        let created = organization_row(org);
        store.organizations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_organization(&self, id: Uuid) -> RepoResult<Option<Organization>> {
        Ok(self.store.read().await.organizations.get(&id).cloned())
    }

    async fn list_organizations(&self) -> RepoResult<Vec<Organization>> {
        let mut orgs: Vec<Organization> = self.store.read().await.organizations.values().cloned().collect();
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs)
    }

    async fn update_organization(
        &self,
        id: Uuid,
        req: UpdateOrganizationRequest,
    ) -> RepoResult<Option<Organization>> {
        let mut store = self.store.write().await;
        let Some(org) = store.organizations.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            org.name = name;
        }
        if let Some(dot) = req.dot_number {
            org.dot_number = Some(dot);
        }
        org.updated_at = Utc::now();
        Ok(Some(org.clone()))
    }

    async fn create_location(&self, organization_id: Uuid, req: CreateLocationRequest) -> RepoResult<Location> {
        let mut store = self.store.write().await;
        if !store.organizations.contains_key(&organization_id) {
            return Err(foreign_key_violation("organization does not exist"));
        }
        let location = Location {
            id: Uuid::new_v4(),
            organization_id,
            name: req.name,
            address: req.address,
            created_at: Utc::now(),
        };
        store.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn get_location(&self, id: Uuid) -> RepoResult<Option<Location>> {
        Ok(self.store.read().await.locations.get(&id).cloned())
    }

    async fn list_locations(&self, organization_id: Uuid) -> RepoResult<Vec<Location>> {
        let store = self.store.read().await;
        let mut locations: Vec<Location> = store
            .locations
            .values()
            .filter(|l| l.organization_id == organization_id)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    // --- PERSONS & ROLES ---

    async fn create_person(&self, req: &CreatePersonRequest) -> RepoResult<Person> {
        let person = person_row(req);
        self.store.write().await.persons.insert(person.id, person.clone());
        Ok(person)
    }

    async fn get_person(&self, id: Uuid) -> RepoResult<Option<Person>> {
        Ok(self.store.read().await.persons.get(&id).cloned())
    }

    async fn update_person(&self, id: Uuid, req: UpdatePersonRequest) -> RepoResult<Option<Person>> {
        let mut store = self.store.write().await;
        let Some(person) = store.persons.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = req.first_name {
            person.first_name = v;
        }
        if let Some(v) = req.last_name {
            person.last_name = v;
        }
        if req.email.is_some() {
            person.email = req.email;
        }
        if req.phone.is_some() {
            person.phone = req.phone;
        }
        if req.date_of_birth.is_some() {
            person.date_of_birth = req.date_of_birth;
        }
        if req.hire_date.is_some() {
            person.hire_date = req.hire_date;
        }
        person.updated_at = Utc::now();
        Ok(Some(person.clone()))
    }

    async fn create_role(&self, role: NewRole) -> RepoResult<Role> {
        let mut store = self.store.write().await;
        if !store.organizations.contains_key(&role.organization_id) {
            return Err(foreign_key_violation("organization does not exist"));
        }
        let created = role_row(role);
        store.roles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_role(&self, id: Uuid) -> RepoResult<Option<Role>> {
        Ok(self.store.read().await.roles.get(&id).cloned())
    }

    async fn roles_for_party(&self, party_id: Uuid) -> RepoResult<Vec<Role>> {
        let store = self.store.read().await;
        let mut roles: Vec<Role> = store.roles.values().filter(|r| r.party_id == party_id).cloned().collect();
        roles.sort_by_key(|r| r.start_date);
        Ok(roles)
    }

    async fn end_role(&self, id: Uuid, on: NaiveDate) -> RepoResult<Option<Role>> {
        let mut store = self.store.write().await;
        let Some(role) = store.roles.get_mut(&id) else {
            return Ok(None);
        };
        role.is_active = false;
        role.end_date = Some(role.end_date.map_or(on, |end| end.min(on)));
        Ok(Some(role.clone()))
    }

    async fn list_members(&self, organization_id: Uuid, role_types: &[RoleType]) -> RepoResult<Vec<Member>> {
        let store = self.store.read().await;
        let mut members: Vec<Member> = store
            .roles
            .values()
            .filter(|r| r.organization_id == organization_id && role_types.contains(&r.role_type))
            .filter_map(|r| {
                store.persons.get(&r.party_id).map(|p| Member {
                    person: p.clone(),
                    role_id: r.id,
                    role_type: r.role_type,
                    location_id: r.location_id,
                    is_active: r.is_active,
                    start_date: r.start_date,
                    end_date: r.end_date,
                })
            })
            .collect();
        members.sort_by(|a, b| {
            (&a.person.last_name, &a.person.first_name).cmp(&(&b.person.last_name, &b.person.first_name))
        });
        Ok(members)
    }

    // --- EQUIPMENT & MAINTENANCE ---

    async fn create_equipment(&self, organization_id: Uuid, req: CreateEquipmentRequest) -> RepoResult<Equipment> {
        let mut store = self.store.write().await;
        if store
            .equipment
            .values()
            .any(|e| e.organization_id == organization_id && e.unit_number == req.unit_number)
        {
            return Err(unique_violation("unit number already used in this organization"));
        }
        let now = Utc::now();
        let equipment = Equipment {
            id: Uuid::new_v4(),
            organization_id,
            location_id: req.location_id,
            unit_number: req.unit_number,
            vin: req.vin,
            make: req.make,
            model: req.model,
            year: req.year,
            category: req.category,
            odometer: req.odometer,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        store.equipment.insert(equipment.id, equipment.clone());
        Ok(equipment)
    }

    async fn get_equipment(&self, id: Uuid) -> RepoResult<Option<Equipment>> {
        Ok(self.store.read().await.equipment.get(&id).cloned())
    }

    async fn list_equipment(&self, organization_id: Uuid) -> RepoResult<Vec<Equipment>> {
        let store = self.store.read().await;
        let mut units: Vec<Equipment> = store
            .equipment
            .values()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.unit_number.cmp(&b.unit_number));
        Ok(units)
    }

    async fn update_equipment(&self, id: Uuid, req: UpdateEquipmentRequest) -> RepoResult<Option<Equipment>> {
        let mut store = self.store.write().await;
        let Some(current) = store.equipment.get(&id) else {
            return Ok(None);
        };
        if let Some(unit) = &req.unit_number {
            let org = current.organization_id;
            if store
                .equipment
                .values()
                .any(|e| e.id != id && e.organization_id == org && &e.unit_number == unit)
            {
                return Err(unique_violation("unit number already used in this organization"));
            }
        }
        let Some(equipment) = store.equipment.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = req.unit_number {
            equipment.unit_number = v;
        }
        if req.vin.is_some() {
            equipment.vin = req.vin;
        }
        if req.location_id.is_some() {
            equipment.location_id = req.location_id;
        }
        if let Some(v) = req.odometer {
            equipment.odometer = v;
        }
        if let Some(v) = req.is_active {
            equipment.is_active = v;
        }
        equipment.updated_at = Utc::now();
        Ok(Some(equipment.clone()))
    }

    async fn record_maintenance(
        &self,
        equipment_id: Uuid,
        req: RecordMaintenanceRequest,
    ) -> RepoResult<MaintenanceRecord> {
        let mut store = self.store.write().await;
        let Some(equipment) = store.equipment.get_mut(&equipment_id) else {
            return Err(foreign_key_violation("equipment does not exist"));
        };
        equipment.odometer = equipment.odometer.max(req.odometer);
        equipment.updated_at = Utc::now();

        let record = MaintenanceRecord {
            id: Uuid::new_v4(),
            equipment_id,
            service_level: req.service_level,
            performed_on: req.performed_on,
            odometer: req.odometer,
            notes: req.notes,
            created_at: Utc::now(),
        };
        store.maintenance.push(record.clone());
        Ok(record)
    }

    async fn list_maintenance(&self, equipment_id: Uuid) -> RepoResult<Vec<MaintenanceRecord>> {
        let store = self.store.read().await;
        let mut history: Vec<MaintenanceRecord> = store
            .maintenance
            .iter()
            .filter(|m| m.equipment_id == equipment_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.performed_on.cmp(&a.performed_on));
        Ok(history)
    }

    // --- ISSUES ---

    async fn create_issue(
        &self,
        organization_id: Uuid,
        created_by: Option<Uuid>,
        req: CreateIssueRequest,
    ) -> RepoResult<IssueRecord> {
        let mut store = self.store.write().await;
        if !store.organizations.contains_key(&organization_id) {
            return Err(foreign_key_violation("organization does not exist"));
        }
        let now = Utc::now();
        let record = IssueRecord {
            issue: Issue {
                id: Uuid::new_v4(),
                issue_type: req.detail.issue_type(),
                party_id: req.party_id,
                organization_id,
                title: req.title,
                description: req.description,
                status: IssueStatus::Open,
                priority: req.priority,
                due_date: req.due_date,
                created_by,
                created_at: now,
                updated_at: now,
                resolved_at: None,
            },
            detail: req.detail,
        };
        store.issues.insert(record.issue.id, record.clone());
        Ok(record)
    }

    async fn get_issue(&self, id: Uuid) -> RepoResult<Option<IssueRecord>> {
        Ok(self.store.read().await.issues.get(&id).cloned())
    }

    async fn list_issues(&self, filter: &IssueFilter) -> RepoResult<Vec<IssueRecord>> {
        let store = self.store.read().await;
        let mut records: Vec<IssueRecord> = store
            .issues
            .values()
            .filter(|r| filter.matches(&r.issue))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.issue.created_at.cmp(&a.issue.created_at));
        Ok(records)
    }

    async fn update_issue(&self, id: Uuid, req: UpdateIssueRequest) -> RepoResult<Option<IssueRecord>> {
        let mut store = self.store.write().await;
        let Some(record) = store.issues.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        let issue = &mut record.issue;
        if let Some(v) = req.title {
            issue.title = v;
        }
        if req.description.is_some() {
            issue.description = req.description;
        }
        if let Some(status) = req.status {
            issue.status = status;
            issue.resolved_at = if status.is_terminal() {
                issue.resolved_at.or(Some(now))
            } else {
                None
            };
        }
        if let Some(v) = req.priority {
            issue.priority = v;
        }
        if req.due_date.is_some() {
            issue.due_date = req.due_date;
        }
        issue.updated_at = now;
        if let Some(detail) = req.detail {
            record.detail = detail;
        }
        Ok(Some(record.clone()))
    }

    async fn delete_issue(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.cafs.values().any(|c| c.issue_id == id) {
            return Err(foreign_key_violation("issue is referenced by corrective action forms"));
        }
        if store.issues.remove(&id).is_none() {
            return Ok(false);
        }
        store.violations.retain(|v| v.issue_id != id);
        store.documents.retain(|_, d| d.issue_id != id);
        Ok(true)
    }

    async fn add_violation(&self, issue_id: Uuid, req: CreateViolationRequest) -> RepoResult<Violation> {
        let mut store = self.store.write().await;
        if !store.issues.contains_key(&issue_id) {
            return Err(foreign_key_violation("issue does not exist"));
        }
        let violation = Violation {
            id: Uuid::new_v4(),
            issue_id,
            code: req.code,
            description: req.description,
            out_of_service: req.out_of_service,
            severity: req.severity,
            created_at: Utc::now(),
        };
        store.violations.push(violation.clone());
        Ok(violation)
    }

    async fn list_violations(&self, issue_id: Uuid) -> RepoResult<Vec<Violation>> {
        let store = self.store.read().await;
        Ok(store.violations.iter().filter(|v| v.issue_id == issue_id).cloned().collect())
    }

    // --- CORRECTIVE ACTION FORMS ---

    async fn create_caf(&self, caf: NewCaf) -> RepoResult<Caf> {
        let mut store = self.store.write().await;
        if !store.issues.contains_key(&caf.issue_id) {
            return Err(foreign_key_violation("issue does not exist"));
        }
        let now = Utc::now();
        let created = Caf {
            id: Uuid::new_v4(),
            organization_id: caf.organization_id,
            issue_id: caf.issue_id,
            violation_id: caf.violation_id,
            title: caf.title,
            corrective_action: caf.corrective_action,
            status: CafStatus::Draft,
            assigned_to: None,
            created_by: caf.created_by,
            signature: None,
            signed_by: None,
            signed_at: None,
            reviewed_by: None,
            reviewed_at: None,
            review_note: None,
            created_at: now,
            updated_at: now,
        };
        store.cafs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_caf(&self, id: Uuid) -> RepoResult<Option<Caf>> {
        Ok(self.store.read().await.cafs.get(&id).cloned())
    }

    async fn list_cafs(&self, filter: &CafFilter) -> RepoResult<Vec<Caf>> {
        let store = self.store.read().await;
        let mut cafs: Vec<Caf> = store.cafs.values().filter(|c| filter.matches(c)).cloned().collect();
        cafs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cafs)
    }

    async fn save_caf(&self, caf: &Caf) -> RepoResult<Caf> {
        let mut store = self.store.write().await;
        let Some(stored) = store.cafs.get_mut(&caf.id) else {
            return Err(sqlx::Error::RowNotFound);
        };
        stored.status = caf.status;
        stored.assigned_to = caf.assigned_to;
        stored.signature = caf.signature.clone();
        stored.signed_by = caf.signed_by;
        stored.signed_at = caf.signed_at;
        stored.reviewed_by = caf.reviewed_by;
        stored.reviewed_at = caf.reviewed_at;
        stored.review_note = caf.review_note.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    // --- DOCUMENTS ---

    async fn add_document(&self, doc: NewDocument) -> RepoResult<Document> {
        let mut store = self.store.write().await;
        if !store.issues.contains_key(&doc.issue_id) {
            return Err(foreign_key_violation("issue does not exist"));
        }
        let document = Document {
            id: Uuid::new_v4(),
            issue_id: doc.issue_id,
            object_key: doc.object_key,
            filename: doc.filename,
            content_type: doc.content_type,
            uploaded_by: doc.uploaded_by,
            created_at: Utc::now(),
        };
        store.documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> RepoResult<Option<Document>> {
        Ok(self.store.read().await.documents.get(&id).cloned())
    }

    async fn list_documents(&self, issue_id: Uuid) -> RepoResult<Vec<Document>> {
        let store = self.store.read().await;
        let mut docs: Vec<Document> = store.documents.values().filter(|d| d.issue_id == issue_id).cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    // --- PLATFORM ---

    async fn get_stats(&self) -> RepoResult<PlatformStats> {
        let store = self.store.read().await;
        let mut drivers: Vec<Uuid> = store
            .roles
            .values()
            .filter(|r| r.role_type == RoleType::Driver && r.is_active)
            .map(|r| r.party_id)
            .collect();
        drivers.sort();
        drivers.dedup();

        Ok(PlatformStats {
            total_organizations: store.organizations.len() as i64,
            master_organizations: store.organizations.values().filter(|o| o.is_master).count() as i64,
            total_users: store.users.len() as i64,
            total_drivers: drivers.len() as i64,
            total_equipment: store.equipment.values().filter(|e| e.is_active).count() as i64,
            open_issues: store
                .issues
                .values()
                .filter(|r| !r.issue.status.is_terminal())
                .count() as i64,
            pending_cafs: store.cafs.values().filter(|c| c.status != CafStatus::Approved).count() as i64,
        })
    }
}
