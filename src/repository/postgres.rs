use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{NewCarrier, NewDocument, RegisteredCarrier, RepoResult, Repository};
use crate::models::{
    AccidentDetail, Caf, CafFilter, CafStatus, CreateEquipmentRequest, CreateIssueRequest,
    CreateLocationRequest, CreatePersonRequest, CreateViolationRequest, Document,
    DrugAlcoholDetail, Equipment, Issue, IssueDetail, IssueFilter, IssueRecord, IssueStatus,
    IssueType, LicenseDetail, Location, MaintenanceRecord, Member, MvrDetail, NewCaf,
    NewOrganization, NewRole, Organization, PartyType, Person, PlatformStats,
    RecordMaintenanceRequest, RoadsideInspectionDetail, Role, RoleType, TrainingDetail,
    UpdateEquipmentRequest, UpdateIssueRequest, UpdateOrganizationRequest, UpdatePersonRequest,
    User, Violation,
};

const ORG_COLUMNS: &str = "party_id, name, dot_number, is_master, master_id, created_at, updated_at";
const LOCATION_COLUMNS: &str = "id, organization_id, name, address, created_at";
const PERSON_COLUMNS: &str =
    "party_id, first_name, last_name, email, phone, date_of_birth, hire_date, created_at, updated_at";
const ROLE_COLUMNS: &str =
    "id, party_id, organization_id, location_id, role_type, is_active, start_date, end_date, created_at";
const EQUIPMENT_COLUMNS: &str = "party_id, organization_id, location_id, unit_number, vin, make, model, \
     year, category, odometer, is_active, created_at, updated_at";
const MAINTENANCE_COLUMNS: &str = "id, equipment_id, service_level, performed_on, odometer, notes, created_at";
const ISSUE_COLUMNS: &str = "id, issue_type, party_id, organization_id, title, description, status, \
     priority, due_date, created_by, created_at, updated_at, resolved_at";
const VIOLATION_COLUMNS: &str = "id, issue_id, code, description, out_of_service, severity, created_at";
const CAF_COLUMNS: &str = "id, organization_id, issue_id, violation_id, title, corrective_action, status, \
     assigned_to, created_by, signature, signed_by, signed_at, reviewed_by, reviewed_at, review_note, \
     created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "id, issue_id, object_key, filename, content_type, uploaded_by, created_at";

/// PostgresRepository
///
/// The production `Repository`, backed by a `PgPool`. All queries are parameterized;
/// dynamic filters go through `QueryBuilder::push_bind`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_party(conn: &mut PgConnection, party_type: PartyType) -> RepoResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO parties (id, party_type) VALUES ($1, $2)")
            .bind(id)
            .bind(party_type)
            .execute(&mut *conn)
            .await?;
        Ok(id)
    }

    async fn insert_user(conn: &mut PgConnection, user: &User) -> RepoResult<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, party_id, is_superuser) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, party_id, is_superuser",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.party_id)
        .bind(user.is_superuser)
        .fetch_one(&mut *conn)
        .await
    }

    async fn insert_organization(conn: &mut PgConnection, org: &NewOrganization) -> RepoResult<Organization> {
        let id = Self::insert_party(conn, PartyType::Organization).await?;
        sqlx::query_as::<_, Organization>(&format!(
            "INSERT INTO organizations (party_id, name, dot_number, is_master, master_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ORG_COLUMNS}"
        ))
        .bind(id)
        .bind(&org.name)
        .bind(&org.dot_number)
        .bind(org.is_master)
        .bind(org.master_id)
        .fetch_one(&mut *conn)
        .await
    }

    async fn insert_person(conn: &mut PgConnection, req: &CreatePersonRequest) -> RepoResult<Person> {
        let id = Self::insert_party(conn, PartyType::Person).await?;
        sqlx::query_as::<_, Person>(&format!(
            "INSERT INTO persons (party_id, first_name, last_name, email, phone, date_of_birth, hire_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PERSON_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(req.date_of_birth)
        .bind(req.hire_date)
        .fetch_one(&mut *conn)
        .await
    }

    async fn insert_role(conn: &mut PgConnection, role: &NewRole) -> RepoResult<Role> {
        sqlx::query_as::<_, Role>(&format!(
            "INSERT INTO roles (id, party_id, organization_id, location_id, role_type, is_active, start_date, end_date) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(role.party_id)
        .bind(role.organization_id)
        .bind(role.location_id)
        .bind(role.role_type)
        .bind(role.start_date)
        .bind(role.end_date)
        .fetch_one(&mut *conn)
        .await
    }

    /// Loads the envelope's detail row from the table matching its type.
    async fn fetch_detail(&self, issue: &Issue) -> RepoResult<IssueDetail> {
        let detail = match issue.issue_type {
            IssueType::License => IssueDetail::License(
                sqlx::query_as::<_, LicenseDetail>(
                    "SELECT license_number, state, class, endorsements, restrictions, issue_date, \
                     expiration_date FROM license_issues WHERE issue_id = $1",
                )
                .bind(issue.id)
                .fetch_one(&self.pool)
                .await?,
            ),
            IssueType::Mvr => IssueDetail::Mvr(
                sqlx::query_as::<_, MvrDetail>(
                    "SELECT state, mvr_date, points, violations, expiration_date \
                     FROM mvr_issues WHERE issue_id = $1",
                )
                .bind(issue.id)
                .fetch_one(&self.pool)
                .await?,
            ),
            IssueType::Training => IssueDetail::Training(
                sqlx::query_as::<_, TrainingDetail>(
                    "SELECT training_type, provider, completed_on, expiration_date \
                     FROM training_issues WHERE issue_id = $1",
                )
                .bind(issue.id)
                .fetch_one(&self.pool)
                .await?,
            ),
            IssueType::DrugAlcohol => IssueDetail::DrugAlcohol(
                sqlx::query_as::<_, DrugAlcoholDetail>(
                    "SELECT test_type, collected_on, result, is_alcohol \
                     FROM drug_alcohol_issues WHERE issue_id = $1",
                )
                .bind(issue.id)
                .fetch_one(&self.pool)
                .await?,
            ),
            IssueType::RoadsideInspection => IssueDetail::RoadsideInspection(
                sqlx::query_as::<_, RoadsideInspectionDetail>(
                    "SELECT report_number, inspection_date, level, state, location, equipment_id, \
                     out_of_service FROM roadside_inspection_issues WHERE issue_id = $1",
                )
                .bind(issue.id)
                .fetch_one(&self.pool)
                .await?,
            ),
            IssueType::Accident => IssueDetail::Accident(
                sqlx::query_as::<_, AccidentDetail>(
                    "SELECT accident_date, location, fatalities, injuries, hazmat_released, tow_away, \
                     preventable, equipment_id FROM accident_issues WHERE issue_id = $1",
                )
                .bind(issue.id)
                .fetch_one(&self.pool)
                .await?,
            ),
        };
        Ok(detail)
    }

    async fn with_detail(&self, issue: Issue) -> RepoResult<IssueRecord> {
        let detail = self.fetch_detail(&issue).await?;
        Ok(IssueRecord { issue, detail })
    }
}

fn detail_table(issue_type: IssueType) -> &'static str {
    match issue_type {
        IssueType::License => "license_issues",
        IssueType::Mvr => "mvr_issues",
        IssueType::Training => "training_issues",
        IssueType::DrugAlcohol => "drug_alcohol_issues",
        IssueType::RoadsideInspection => "roadside_inspection_issues",
        IssueType::Accident => "accident_issues",
    }
}

async fn insert_detail(conn: &mut PgConnection, issue_id: Uuid, detail: &IssueDetail) -> RepoResult<()> {
    let query = match detail {
        IssueDetail::License(d) => sqlx::query(
            "INSERT INTO license_issues (issue_id, license_number, state, class, endorsements, \
             restrictions, issue_date, expiration_date) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(issue_id)
        .bind(&d.license_number)
        .bind(&d.state)
        .bind(&d.class)
        .bind(&d.endorsements)
        .bind(&d.restrictions)
        .bind(d.issue_date)
        .bind(d.expiration_date),
        IssueDetail::Mvr(d) => sqlx::query(
            "INSERT INTO mvr_issues (issue_id, state, mvr_date, points, violations, expiration_date) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(issue_id)
        .bind(&d.state)
        .bind(d.mvr_date)
        .bind(d.points)
        .bind(d.violations)
        .bind(d.expiration_date),
        IssueDetail::Training(d) => sqlx::query(
            "INSERT INTO training_issues (issue_id, training_type, provider, completed_on, expiration_date) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(issue_id)
        .bind(&d.training_type)
        .bind(&d.provider)
        .bind(d.completed_on)
        .bind(d.expiration_date),
        IssueDetail::DrugAlcohol(d) => sqlx::query(
            "INSERT INTO drug_alcohol_issues (issue_id, test_type, collected_on, result, is_alcohol) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(issue_id)
        .bind(d.test_type)
        .bind(d.collected_on)
        .bind(d.result)
        .bind(d.is_alcohol),
        IssueDetail::RoadsideInspection(d) => sqlx::query(
            "INSERT INTO roadside_inspection_issues (issue_id, report_number, inspection_date, level, \
             state, location, equipment_id, out_of_service) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(issue_id)
        .bind(&d.report_number)
        .bind(d.inspection_date)
        .bind(d.level)
        .bind(&d.state)
        .bind(&d.location)
        .bind(d.equipment_id)
        .bind(d.out_of_service),
        IssueDetail::Accident(d) => sqlx::query(
            "INSERT INTO accident_issues (issue_id, accident_date, location, fatalities, injuries, \
             hazmat_released, tow_away, preventable, equipment_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(issue_id)
        .bind(d.accident_date)
        .bind(&d.location)
        .bind(d.fatalities)
        .bind(d.injuries)
        .bind(d.hazmat_released)
        .bind(d.tow_away)
        .bind(d.preventable)
        .bind(d.equipment_id),
    };
    query.execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT id, email, party_id, is_superuser FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_user(&self, user: User) -> RepoResult<User> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_user(&mut conn, &user).await
    }

    /// Organization, administrator, role and login in one transaction.
    async fn register_carrier(&self, carrier: NewCarrier) -> RepoResult<RegisteredCarrier> {
        let mut tx = self.pool.begin().await?;
        let organization = Self::insert_organization(&mut tx, &carrier.organization).await?;
        let person = Self::insert_person(&mut tx, &carrier.admin).await?;
        let role = Self::insert_role(
            &mut tx,
            &NewRole {
                party_id: person.id,
                organization_id: organization.id,
                location_id: None,
                role_type: RoleType::Admin,
                start_date: carrier.start_date,
                end_date: None,
            },
        )
        .await?;
        let user = Self::insert_user(
            &mut tx,
            &User {
                id: carrier.user_id,
                email: carrier.email,
                party_id: person.id,
                is_superuser: false,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(RegisteredCarrier {
            organization,
            person,
            role,
            user,
        })
    }

    // --- ORGANIZATIONS & LOCATIONS ---

    /// Inserts the party row and the organization row in one transaction.
    async fn create_organization(&self, org: NewOrganization) -> RepoResult<Organization> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_organization(&mut tx, &org).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_organization(&self, id: Uuid) -> RepoResult<Option<Organization>> {
        sqlx::query_as::<_, Organization>(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE party_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_organizations(&self) -> RepoResult<Vec<Organization>> {
        sqlx::query_as::<_, Organization>(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn update_organization(
        &self,
        id: Uuid,
        req: UpdateOrganizationRequest,
    ) -> RepoResult<Option<Organization>> {
        sqlx::query_as::<_, Organization>(&format!(
            "UPDATE organizations SET name = COALESCE($2, name), dot_number = COALESCE($3, dot_number), \
             updated_at = NOW() WHERE party_id = $1 RETURNING {ORG_COLUMNS}"
        ))
        .bind(id)
        .bind(req.name)
        .bind(req.dot_number)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_location(&self, organization_id: Uuid, req: CreateLocationRequest) -> RepoResult<Location> {
        sqlx::query_as::<_, Location>(&format!(
            "INSERT INTO locations (id, organization_id, name, address) VALUES ($1, $2, $3, $4) \
             RETURNING {LOCATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(req.name)
        .bind(req.address)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_location(&self, id: Uuid) -> RepoResult<Option<Location>> {
        sqlx::query_as::<_, Location>(&format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_locations(&self, organization_id: Uuid) -> RepoResult<Vec<Location>> {
        sqlx::query_as::<_, Location>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE organization_id = $1 ORDER BY name"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
    }

    // --- PERSONS & ROLES ---

    async fn create_person(&self, req: &CreatePersonRequest) -> RepoResult<Person> {
        let mut tx = self.pool.begin().await?;
        let person = Self::insert_person(&mut tx, req).await?;
        tx.commit().await?;
        Ok(person)
    }

    async fn get_person(&self, id: Uuid) -> RepoResult<Option<Person>> {
        sqlx::query_as::<_, Person>(&format!("SELECT {PERSON_COLUMNS} FROM persons WHERE party_id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_person(&self, id: Uuid, req: UpdatePersonRequest) -> RepoResult<Option<Person>> {
        sqlx::query_as::<_, Person>(&format!(
            "UPDATE persons SET first_name = COALESCE($2, first_name), last_name = COALESCE($3, last_name), \
             email = COALESCE($4, email), phone = COALESCE($5, phone), \
             date_of_birth = COALESCE($6, date_of_birth), hire_date = COALESCE($7, hire_date), \
             updated_at = NOW() WHERE party_id = $1 RETURNING {PERSON_COLUMNS}"
        ))
        .bind(id)
        .bind(req.first_name)
        .bind(req.last_name)
        .bind(req.email)
        .bind(req.phone)
        .bind(req.date_of_birth)
        .bind(req.hire_date)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_role(&self, role: NewRole) -> RepoResult<Role> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_role(&mut conn, &role).await
    }

    async fn get_role(&self, id: Uuid) -> RepoResult<Option<Role>> {
        sqlx::query_as::<_, Role>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn roles_for_party(&self, party_id: Uuid) -> RepoResult<Vec<Role>> {
        sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE party_id = $1 ORDER BY start_date"
        ))
        .bind(party_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn end_role(&self, id: Uuid, on: NaiveDate) -> RepoResult<Option<Role>> {
        sqlx::query_as::<_, Role>(&format!(
            "UPDATE roles SET is_active = FALSE, end_date = LEAST(COALESCE(end_date, $2), $2) \
             WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id)
        .bind(on)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_members(&self, organization_id: Uuid, role_types: &[RoleType]) -> RepoResult<Vec<Member>> {
        let labels: Vec<String> = role_types.iter().map(|r| r.as_str().to_string()).collect();
        sqlx::query_as::<_, Member>(
            "SELECT p.party_id, p.first_name, p.last_name, p.email, p.phone, p.date_of_birth, p.hire_date, \
                    p.created_at, p.updated_at, \
                    r.id AS role_id, r.role_type, r.location_id, r.is_active, r.start_date, r.end_date \
             FROM roles r JOIN persons p ON p.party_id = r.party_id \
             WHERE r.organization_id = $1 AND r.role_type::text = ANY($2) \
             ORDER BY p.last_name, p.first_name",
        )
        .bind(organization_id)
        .bind(labels)
        .fetch_all(&self.pool)
        .await
    }

    // --- EQUIPMENT & MAINTENANCE ---

    async fn create_equipment(&self, organization_id: Uuid, req: CreateEquipmentRequest) -> RepoResult<Equipment> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_party(&mut tx, PartyType::Equipment).await?;
        let equipment = sqlx::query_as::<_, Equipment>(&format!(
            "INSERT INTO equipment (party_id, organization_id, location_id, unit_number, vin, make, model, \
             year, category, odometer) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {EQUIPMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .bind(req.location_id)
        .bind(req.unit_number)
        .bind(req.vin)
        .bind(req.make)
        .bind(req.model)
        .bind(req.year)
        .bind(req.category)
        .bind(req.odometer)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(equipment)
    }

    async fn get_equipment(&self, id: Uuid) -> RepoResult<Option<Equipment>> {
        sqlx::query_as::<_, Equipment>(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE party_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_equipment(&self, organization_id: Uuid) -> RepoResult<Vec<Equipment>> {
        sqlx::query_as::<_, Equipment>(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE organization_id = $1 ORDER BY unit_number"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_equipment(&self, id: Uuid, req: UpdateEquipmentRequest) -> RepoResult<Option<Equipment>> {
        sqlx::query_as::<_, Equipment>(&format!(
            "UPDATE equipment SET unit_number = COALESCE($2, unit_number), vin = COALESCE($3, vin), \
             location_id = COALESCE($4, location_id), odometer = COALESCE($5, odometer), \
             is_active = COALESCE($6, is_active), updated_at = NOW() \
             WHERE party_id = $1 RETURNING {EQUIPMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(req.unit_number)
        .bind(req.vin)
        .bind(req.location_id)
        .bind(req.odometer)
        .bind(req.is_active)
        .fetch_optional(&self.pool)
        .await
    }

    async fn record_maintenance(
        &self,
        equipment_id: Uuid,
        req: RecordMaintenanceRequest,
    ) -> RepoResult<MaintenanceRecord> {
        let mut tx = self.pool.begin().await?;
        let record = sqlx::query_as::<_, MaintenanceRecord>(&format!(
            "INSERT INTO maintenance_records (id, equipment_id, service_level, performed_on, odometer, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MAINTENANCE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(equipment_id)
        .bind(req.service_level)
        .bind(req.performed_on)
        .bind(req.odometer)
        .bind(req.notes)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE equipment SET odometer = GREATEST(odometer, $2), updated_at = NOW() WHERE party_id = $1",
        )
        .bind(equipment_id)
        .bind(record.odometer)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn list_maintenance(&self, equipment_id: Uuid) -> RepoResult<Vec<MaintenanceRecord>> {
        sqlx::query_as::<_, MaintenanceRecord>(&format!(
            "SELECT {MAINTENANCE_COLUMNS} FROM maintenance_records WHERE equipment_id = $1 \
             ORDER BY performed_on DESC"
        ))
        .bind(equipment_id)
        .fetch_all(&self.pool)
        .await
    }

    // --- ISSUES ---

    /// Inserts the envelope and its detail row atomically.
    async fn create_issue(
        &self,
        organization_id: Uuid,
        created_by: Option<Uuid>,
        req: CreateIssueRequest,
    ) -> RepoResult<IssueRecord> {
        let mut tx = self.pool.begin().await?;
        let issue = sqlx::query_as::<_, Issue>(&format!(
            "INSERT INTO issues (id, issue_type, party_id, organization_id, title, description, priority, \
             due_date, created_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {ISSUE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.detail.issue_type())
        .bind(req.party_id)
        .bind(organization_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(req.priority)
        .bind(req.due_date)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;
        insert_detail(&mut tx, issue.id, &req.detail).await?;
        tx.commit().await?;
        Ok(IssueRecord {
            issue,
            detail: req.detail,
        })
    }

    async fn get_issue(&self, id: Uuid) -> RepoResult<Option<IssueRecord>> {
        let issue = sqlx::query_as::<_, Issue>(&format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match issue {
            Some(issue) => Ok(Some(self.with_detail(issue).await?)),
            None => Ok(None),
        }
    }

    async fn list_issues(&self, filter: &IssueFilter) -> RepoResult<Vec<IssueRecord>> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE TRUE"));
        if let Some(org) = filter.organization_id {
            builder.push(" AND organization_id = ").push_bind(org);
        }
        if let Some(party) = filter.party_id {
            builder.push(" AND party_id = ").push_bind(party);
        }
        if let Some(issue_type) = filter.issue_type {
            builder.push(" AND issue_type = ").push_bind(issue_type);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        builder.push(" ORDER BY created_at DESC");

        let issues = builder.build_query_as::<Issue>().fetch_all(&self.pool).await?;

        // TODO: batch detail loading per issue type with `issue_id = ANY($1)` instead of one query per row.
        let mut records = Vec::with_capacity(issues.len());
        for issue in issues {
            records.push(self.with_detail(issue).await?);
        }
        Ok(records)
    }

    async fn update_issue(&self, id: Uuid, req: UpdateIssueRequest) -> RepoResult<Option<IssueRecord>> {
        let mut tx = self.pool.begin().await?;
        let resolved = req.status.map(IssueStatus::is_terminal);
        let issue = sqlx::query_as::<_, Issue>(&format!(
            "UPDATE issues SET title = COALESCE($2, title), description = COALESCE($3, description), \
             status = COALESCE($4, status), priority = COALESCE($5, priority), \
             due_date = COALESCE($6, due_date), \
             resolved_at = CASE WHEN $7::boolean IS NULL THEN resolved_at \
                                WHEN $7::boolean THEN COALESCE(resolved_at, NOW()) \
                                ELSE NULL END, \
             updated_at = NOW() WHERE id = $1 RETURNING {ISSUE_COLUMNS}"
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.status)
        .bind(req.priority)
        .bind(req.due_date)
        .bind(resolved)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(issue) = issue else {
            return Ok(None);
        };

        if let Some(detail) = &req.detail {
            sqlx::query(&format!("DELETE FROM {} WHERE issue_id = $1", detail_table(issue.issue_type)))
                .bind(issue.id)
                .execute(&mut *tx)
                .await?;
            insert_detail(&mut tx, issue.id, detail).await?;
        }
        tx.commit().await?;

        match req.detail {
            Some(detail) => Ok(Some(IssueRecord { issue, detail })),
            None => Ok(Some(self.with_detail(issue).await?)),
        }
    }

    async fn delete_issue(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM issues WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_violation(&self, issue_id: Uuid, req: CreateViolationRequest) -> RepoResult<Violation> {
        sqlx::query_as::<_, Violation>(&format!(
            "INSERT INTO violations (id, issue_id, code, description, out_of_service, severity) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {VIOLATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(issue_id)
        .bind(req.code)
        .bind(req.description)
        .bind(req.out_of_service)
        .bind(req.severity)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_violations(&self, issue_id: Uuid) -> RepoResult<Vec<Violation>> {
        sqlx::query_as::<_, Violation>(&format!(
            "SELECT {VIOLATION_COLUMNS} FROM violations WHERE issue_id = $1 ORDER BY created_at"
        ))
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await
    }

    // --- CORRECTIVE ACTION FORMS ---

    async fn create_caf(&self, caf: NewCaf) -> RepoResult<Caf> {
        sqlx::query_as::<_, Caf>(&format!(
            "INSERT INTO cafs (id, organization_id, issue_id, violation_id, title, corrective_action, status, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {CAF_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(caf.organization_id)
        .bind(caf.issue_id)
        .bind(caf.violation_id)
        .bind(caf.title)
        .bind(caf.corrective_action)
        .bind(CafStatus::Draft)
        .bind(caf.created_by)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_caf(&self, id: Uuid) -> RepoResult<Option<Caf>> {
        sqlx::query_as::<_, Caf>(&format!("SELECT {CAF_COLUMNS} FROM cafs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_cafs(&self, filter: &CafFilter) -> RepoResult<Vec<Caf>> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {CAF_COLUMNS} FROM cafs WHERE TRUE"));
        if let Some(org) = filter.organization_id {
            builder.push(" AND organization_id = ").push_bind(org);
        }
        if let Some(issue) = filter.issue_id {
            builder.push(" AND issue_id = ").push_bind(issue);
        }
        if let Some(assignee) = filter.assigned_to {
            builder.push(" AND assigned_to = ").push_bind(assignee);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        builder.push(" ORDER BY created_at DESC");
        builder.build_query_as::<Caf>().fetch_all(&self.pool).await
    }

    async fn save_caf(&self, caf: &Caf) -> RepoResult<Caf> {
        sqlx::query_as::<_, Caf>(&format!(
            "UPDATE cafs SET status = $2, assigned_to = $3, signature = $4, signed_by = $5, signed_at = $6, \
             reviewed_by = $7, reviewed_at = $8, review_note = $9, updated_at = NOW() \
             WHERE id = $1 RETURNING {CAF_COLUMNS}"
        ))
        .bind(caf.id)
        .bind(caf.status)
        .bind(caf.assigned_to)
        .bind(&caf.signature)
        .bind(caf.signed_by)
        .bind(caf.signed_at)
        .bind(caf.reviewed_by)
        .bind(caf.reviewed_at)
        .bind(&caf.review_note)
        .fetch_one(&self.pool)
        .await
    }

    // --- DOCUMENTS ---

    async fn add_document(&self, doc: NewDocument) -> RepoResult<Document> {
        sqlx::query_as::<_, Document>(&format!(
            "INSERT INTO documents (id, issue_id, object_key, filename, content_type, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(doc.issue_id)
        .bind(doc.object_key)
        .bind(doc.filename)
        .bind(doc.content_type)
        .bind(doc.uploaded_by)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_document(&self, id: Uuid) -> RepoResult<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_documents(&self, issue_id: Uuid) -> RepoResult<Vec<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE issue_id = $1 ORDER BY created_at DESC"
        ))
        .bind(issue_id)
        .fetch_all(&self.pool)
        .await
    }

    // --- PLATFORM ---

    async fn get_stats(&self) -> RepoResult<PlatformStats> {
        let count = |sql: &'static str| sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool);
        Ok(PlatformStats {
            total_organizations: count("SELECT COUNT(*) FROM organizations").await?,
            master_organizations: count("SELECT COUNT(*) FROM organizations WHERE is_master").await?,
            total_users: count("SELECT COUNT(*) FROM users").await?,
            total_drivers: count(
                "SELECT COUNT(DISTINCT party_id) FROM roles WHERE role_type = 'driver' AND is_active",
            )
            .await?,
            total_equipment: count("SELECT COUNT(*) FROM equipment WHERE is_active").await?,
            open_issues: count("SELECT COUNT(*) FROM issues WHERE status IN ('open', 'in_progress')").await?,
            pending_cafs: count("SELECT COUNT(*) FROM cafs WHERE status <> 'approved'").await?,
        })
    }
}
