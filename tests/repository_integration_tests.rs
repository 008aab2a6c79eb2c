use chrono::{Days, NaiveDate, Utc};
use fleet_compliance::{
    error::AppError,
    models::{
        CafFilter, CafStatus, CreateEquipmentRequest, CreateIssueRequest, CreateLocationRequest,
        CreatePersonRequest, CreateViolationRequest, EquipmentCategory, IssueDetail, IssueFilter,
        IssueStatus, IssueType, LicenseDetail, NewCaf, NewOrganization, NewRole, Priority,
        RecordMaintenanceRequest, RoadsideInspectionDetail, RoleType, ServiceLevel,
        UpdateEquipmentRequest, UpdateIssueRequest, UpdateOrganizationRequest, User,
    },
    repository::{InMemoryRepository, NewCarrier, NewDocument, PostgresRepository, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

/// Holds the database pool for the Postgres-backed runs.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn license_request(party_id: Uuid, expires_in_days: u64) -> CreateIssueRequest {
    CreateIssueRequest {
        party_id,
        title: "CDL on file".to_string(),
        description: None,
        priority: Priority::Medium,
        due_date: None,
        detail: IssueDetail::License(LicenseDetail {
            license_number: format!("CDL-{}", Uuid::new_v4().simple()),
            state: "OH".to_string(),
            class: "A".to_string(),
            expiration_date: today() + Days::new(expires_in_days),
            ..Default::default()
        }),
    }
}

// --- Contracts ---
//
// Each contract runs against the in-memory store on every test run and against
// Postgres when DATABASE_URL points at a disposable database.

async fn organization_and_roles_contract(repo: &dyn Repository) {
    let master = repo
        .create_organization(NewOrganization {
            name: "Safety Partners".to_string(),
            is_master: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let carrier = repo
        .create_organization(NewOrganization {
            name: "Blue Line Freight".to_string(),
            dot_number: Some("1234567".to_string()),
            master_id: Some(master.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(carrier.master_id, Some(master.id));
    assert!(!carrier.is_master);

    let renamed = repo
        .update_organization(
            carrier.id,
            UpdateOrganizationRequest {
                name: Some("Blue Line Freight LLC".to_string()),
                dot_number: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.name, "Blue Line Freight LLC");
    assert_eq!(renamed.dot_number.as_deref(), Some("1234567"));
    assert!(
        repo.update_organization(Uuid::new_v4(), UpdateOrganizationRequest::default())
            .await
            .unwrap()
            .is_none()
    );

    let yard = repo
        .create_location(
            carrier.id,
            CreateLocationRequest {
                name: "Columbus yard".to_string(),
                address: None,
            },
        )
        .await
        .unwrap();
    let locations = repo.list_locations(carrier.id).await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].id, yard.id);

    let driver = repo
        .create_person(&CreatePersonRequest {
            first_name: "Ana".to_string(),
            last_name: "Zapata".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let dispatcher = repo
        .create_person(&CreatePersonRequest {
            first_name: "Ben".to_string(),
            last_name: "Abbott".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let driver_role = repo
        .create_role(NewRole {
            party_id: driver.id,
            organization_id: carrier.id,
            location_id: Some(yard.id),
            role_type: RoleType::Driver,
            start_date: today(),
            end_date: None,
        })
        .await
        .unwrap();
    repo.create_role(NewRole {
        party_id: dispatcher.id,
        organization_id: carrier.id,
        location_id: None,
        role_type: RoleType::Staff,
        start_date: today(),
        end_date: None,
    })
    .await
    .unwrap();
    assert!(driver_role.is_active);

    let drivers = repo.list_members(carrier.id, &[RoleType::Driver]).await.unwrap();
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].person.id, driver.id);
    assert_eq!(drivers[0].location_id, Some(yard.id));

    let everyone = repo
        .list_members(carrier.id, &[RoleType::Driver, RoleType::Staff])
        .await
        .unwrap();
    // Ordered by last name.
    assert_eq!(everyone[0].person.last_name, "Abbott");
    assert_eq!(everyone[1].person.last_name, "Zapata");

    let ended = repo.end_role(driver_role.id, today()).await.unwrap().unwrap();
    assert!(!ended.is_active);
    assert_eq!(ended.end_date, Some(today()));
    assert!(!ended.is_active_on(today()));
    assert_eq!(repo.roles_for_party(driver.id).await.unwrap().len(), 1);

    let user = repo
        .create_user(User {
            id: Uuid::new_v4(),
            email: format!("{}@bluelines.test", Uuid::new_v4().simple()),
            party_id: dispatcher.id,
            is_superuser: false,
        })
        .await
        .unwrap();
    let fetched = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.party_id, dispatcher.id);
    assert!(repo.get_user(Uuid::new_v4()).await.unwrap().is_none());
}

async fn equipment_contract(repo: &dyn Repository) {
    let carrier = repo
        .create_organization(NewOrganization {
            name: "Rolling Stock Inc".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let tractor = repo
        .create_equipment(
            carrier.id,
            CreateEquipmentRequest {
                unit_number: "101".to_string(),
                category: EquipmentCategory::Tractor,
                odometer: 200_000,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(tractor.is_active);

    let duplicate = repo
        .create_equipment(
            carrier.id,
            CreateEquipmentRequest {
                unit_number: "101".to_string(),
                category: EquipmentCategory::Trailer,
                ..Default::default()
            },
        )
        .await;
    assert!(duplicate.is_err(), "unit numbers are unique per organization");

    repo.record_maintenance(
        tractor.id,
        RecordMaintenanceRequest {
            service_level: ServiceLevel::A,
            performed_on: today(),
            odometer: 205_000,
            notes: Some("Brakes adjusted".to_string()),
        },
    )
    .await
    .unwrap();
    // An older reading never winds the odometer back.
    repo.record_maintenance(
        tractor.id,
        RecordMaintenanceRequest {
            service_level: ServiceLevel::B,
            performed_on: today() - Days::new(30),
            odometer: 190_000,
            notes: None,
        },
    )
    .await
    .unwrap();

    let unit = repo.get_equipment(tractor.id).await.unwrap().unwrap();
    assert_eq!(unit.odometer, 205_000);
    assert_eq!(repo.list_maintenance(tractor.id).await.unwrap().len(), 2);

    let retired = repo
        .update_equipment(
            tractor.id,
            UpdateEquipmentRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!retired.is_active);
    assert_eq!(retired.unit_number, "101");
    assert_eq!(repo.list_equipment(carrier.id).await.unwrap().len(), 1);
}

async fn issue_contract(repo: &dyn Repository) {
    let carrier = repo
        .create_organization(NewOrganization {
            name: "Issue Haulers".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let driver = repo
        .create_person(&CreatePersonRequest {
            first_name: "Cy".to_string(),
            last_name: "Driver".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let license = repo
        .create_issue(carrier.id, None, license_request(driver.id, 400))
        .await
        .unwrap();
    assert_eq!(license.issue.issue_type, IssueType::License);
    assert_eq!(license.issue.status, IssueStatus::Open);

    let inspection = repo
        .create_issue(
            carrier.id,
            Some(driver.id),
            CreateIssueRequest {
                party_id: driver.id,
                title: "Level 2 inspection".to_string(),
                description: Some("Lamp out".to_string()),
                priority: Priority::High,
                due_date: Some(today() + Days::new(7)),
                detail: IssueDetail::RoadsideInspection(RoadsideInspectionDetail {
                    report_number: "OH-778".to_string(),
                    inspection_date: today(),
                    level: 2,
                    state: "OH".to_string(),
                    ..Default::default()
                }),
            },
        )
        .await
        .unwrap();

    let fetched = repo.get_issue(inspection.issue.id).await.unwrap().unwrap();
    assert_eq!(fetched.detail, inspection.detail);
    assert_eq!(fetched.issue.created_by, Some(driver.id));

    let only_licenses = repo
        .list_issues(&IssueFilter {
            organization_id: Some(carrier.id),
            issue_type: Some(IssueType::License),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(only_licenses.len(), 1);
    assert_eq!(only_licenses[0].issue.id, license.issue.id);

    let resolved = repo
        .update_issue(
            inspection.issue.id,
            UpdateIssueRequest {
                status: Some(IssueStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(resolved.issue.resolved_at.is_some());
    assert_eq!(resolved.issue.title, "Level 2 inspection");

    let reopened = repo
        .update_issue(
            inspection.issue.id,
            UpdateIssueRequest {
                status: Some(IssueStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(reopened.issue.resolved_at.is_none());

    let violation = repo
        .add_violation(
            inspection.issue.id,
            CreateViolationRequest {
                code: "393.9(a)".to_string(),
                description: "Inoperable lamp".to_string(),
                out_of_service: false,
                severity: 6,
            },
        )
        .await
        .unwrap();
    assert_eq!(repo.list_violations(inspection.issue.id).await.unwrap().len(), 1);

    let document = repo
        .add_document(NewDocument {
            issue_id: inspection.issue.id,
            object_key: format!("organizations/{}/issues/{}/a.pdf", carrier.id, inspection.issue.id),
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            uploaded_by: Some(driver.id),
        })
        .await
        .unwrap();
    assert_eq!(
        repo.get_document(document.id).await.unwrap().unwrap().filename,
        "report.pdf"
    );
    assert_eq!(repo.list_documents(inspection.issue.id).await.unwrap().len(), 1);

    let caf = repo
        .create_caf(NewCaf {
            organization_id: carrier.id,
            issue_id: inspection.issue.id,
            violation_id: Some(violation.id),
            title: "Replace lamp".to_string(),
            corrective_action: "Replace and verify all lamps".to_string(),
            created_by: None,
        })
        .await
        .unwrap();
    assert_eq!(caf.status, CafStatus::Draft);

    let mut assigned = caf.clone();
    assigned.status = CafStatus::Assigned;
    assigned.assigned_to = Some(driver.id);
    let saved = repo.save_caf(&assigned).await.unwrap();
    assert_eq!(saved.status, CafStatus::Assigned);

    let mine = repo
        .list_cafs(&CafFilter {
            organization_id: Some(carrier.id),
            assigned_to: Some(driver.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    assert!(repo.delete_issue(license.issue.id).await.unwrap());
    assert!(repo.get_issue(license.issue.id).await.unwrap().is_none());
    assert!(!repo.delete_issue(license.issue.id).await.unwrap());
}

async fn registration_contract(repo: &dyn Repository) {
    let email = format!("{}@carrier.test", Uuid::new_v4());
    let carrier = |name: &str| NewCarrier {
        user_id: Uuid::new_v4(),
        email: email.clone(),
        organization: NewOrganization {
            name: name.to_string(),
            dot_number: Some("7654321".to_string()),
            ..Default::default()
        },
        admin: CreatePersonRequest {
            first_name: "Pat".to_string(),
            last_name: "Owner".to_string(),
            email: Some(email.clone()),
            ..Default::default()
        },
        start_date: today(),
    };

    let first = format!("Carrier {}", Uuid::new_v4());
    let registered = repo.register_carrier(carrier(&first)).await.unwrap();
    assert_eq!(registered.organization.name, first);
    assert_eq!(registered.role.role_type, RoleType::Admin);
    assert_eq!(registered.role.organization_id, registered.organization.id);
    assert_eq!(registered.role.location_id, None);
    assert_eq!(registered.user.party_id, registered.person.id);
    let stored = repo.get_user(registered.user.id).await.unwrap().unwrap();
    assert_eq!(stored.email, email);

    // Same login email: the whole registration is refused and nothing is written.
    let second = format!("Carrier {}", Uuid::new_v4());
    let err = repo.register_carrier(carrier(&second)).await.unwrap_err();
    assert_eq!(
        err.as_database_error().and_then(|e| e.code()).as_deref(),
        Some("23505")
    );
    assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    let names: Vec<String> = repo
        .list_organizations()
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.name)
        .collect();
    assert!(names.contains(&first));
    assert!(!names.contains(&second));
}

// --- In-memory runs ---

#[tokio::test]
async fn test_memory_organizations_and_roles() {
    organization_and_roles_contract(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_equipment() {
    equipment_contract(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_issues() {
    issue_contract(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_registration() {
    registration_contract(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_constraint_errors_keep_their_meaning() {
    let repo = InMemoryRepository::new();
    let missing = repo
        .create_location(
            Uuid::new_v4(),
            CreateLocationRequest {
                name: "Nowhere".to_string(),
                address: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        missing.as_database_error().and_then(|e| e.code()).as_deref(),
        Some("23503")
    );
    assert!(matches!(AppError::from(missing), AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_memory_stats() {
    let repo = InMemoryRepository::new();
    organization_and_roles_contract(&repo).await;
    equipment_contract(&repo).await;

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_organizations, 3);
    assert_eq!(stats.master_organizations, 1);
    assert_eq!(stats.total_users, 1);
    // The only driver role was ended and the only unit retired.
    assert_eq!(stats.total_drivers, 0);
    assert_eq!(stats.total_equipment, 0);
}

// --- Postgres runs ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_organizations_and_roles() {
    let ctx = DbTestContext::setup().await;
    organization_and_roles_contract(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_equipment() {
    let ctx = DbTestContext::setup().await;
    equipment_contract(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_issues() {
    let ctx = DbTestContext::setup().await;
    issue_contract(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_registration() {
    let ctx = DbTestContext::setup().await;
    registration_contract(&ctx.repository()).await;
}
