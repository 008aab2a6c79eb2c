#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Days, NaiveDate, Utc};
use fleet_compliance::{
    AppConfig, AppState, InMemoryRepository, MockIdentityProvider, MockStorageService,
    create_router,
    identity::IdentityState,
    models::{
        CreateEquipmentRequest, CreateIssueRequest, CreateLocationRequest, CreatePersonRequest,
        Equipment, EquipmentCategory, IssueDetail, IssueRecord, LicenseDetail, Location,
        NewOrganization, NewRole, Organization, Person, Priority, RoadsideInspectionDetail,
        RoleType, User,
    },
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_from_today(days: i64) -> NaiveDate {
    if days >= 0 {
        today() + Days::new(days as u64)
    } else {
        today() - Days::new(days.unsigned_abs())
    }
}

pub fn license(expiration_date: NaiveDate) -> IssueDetail {
    IssueDetail::License(LicenseDetail {
        license_number: "D1234567".to_string(),
        state: "TX".to_string(),
        class: "A".to_string(),
        expiration_date,
        ..Default::default()
    })
}

pub fn inspection() -> IssueDetail {
    IssueDetail::RoadsideInspection(RoadsideInspectionDetail {
        report_number: "TX0001234".to_string(),
        inspection_date: today(),
        level: 1,
        state: "TX".to_string(),
        ..Default::default()
    })
}

/// A seeded member with a login.
#[derive(Debug, Clone)]
pub struct Seat {
    pub user_id: Uuid,
    pub person: Person,
}

impl Seat {
    pub fn party_id(&self) -> Uuid {
        self.person.id
    }
}

/// The full router over an in-memory repository, mock storage and mock identity.
/// Requests authenticate with the local `x-user-id` header.
pub struct TestApp {
    pub repo: Arc<InMemoryRepository>,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(
            Arc::new(MockStorageService::new()),
            Arc::new(MockIdentityProvider::new()),
        )
    }

    pub fn build(storage: StorageState, identity: IdentityState) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            storage,
            identity,
            config: AppConfig::default(),
        };
        let router = create_router(state.clone());
        Self { repo, state, router }
    }

    // --- Seeding ---

    pub async fn organization(&self, name: &str) -> Organization {
        self.repo
            .create_organization(NewOrganization {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// A master organization and one carrier it manages.
    pub async fn master_with_sub(&self) -> (Organization, Organization) {
        let master = self
            .repo
            .create_organization(NewOrganization {
                name: "Safety Consultants".to_string(),
                is_master: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let sub = self
            .repo
            .create_organization(NewOrganization {
                name: "Managed Carrier".to_string(),
                master_id: Some(master.id),
                ..Default::default()
            })
            .await
            .unwrap();
        (master, sub)
    }

    pub async fn location(&self, org: &Organization, name: &str) -> Location {
        self.repo
            .create_location(
                org.id,
                CreateLocationRequest {
                    name: name.to_string(),
                    address: None,
                },
            )
            .await
            .unwrap()
    }

    /// A person holding `role_type` in `org` since last month, without a login.
    pub async fn person(
        &self,
        org: &Organization,
        role_type: RoleType,
        location_id: Option<Uuid>,
        last_name: &str,
    ) -> Person {
        let person = self
            .repo
            .create_person(&CreatePersonRequest {
                first_name: "Test".to_string(),
                last_name: last_name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        self.repo
            .create_role(NewRole {
                party_id: person.id,
                organization_id: org.id,
                location_id,
                role_type,
                start_date: days_from_today(-30),
                end_date: None,
            })
            .await
            .unwrap();
        person
    }

    pub async fn login_for(&self, person: &Person, is_superuser: bool) -> Uuid {
        let user = self
            .repo
            .create_user(User {
                id: Uuid::new_v4(),
                email: format!("{}@fleet.test", person.id),
                party_id: person.id,
                is_superuser,
            })
            .await
            .unwrap();
        user.id
    }

    pub async fn seat(&self, org: &Organization, role_type: RoleType, location_id: Option<Uuid>) -> Seat {
        let person = self.person(org, role_type, location_id, &format!("{:?}", role_type)).await;
        let user_id = self.login_for(&person, false).await;
        Seat { user_id, person }
    }

    pub async fn superuser(&self) -> Uuid {
        let person = self
            .repo
            .create_person(&CreatePersonRequest {
                first_name: "Platform".to_string(),
                last_name: "Operator".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        self.login_for(&person, true).await
    }

    pub async fn equipment(&self, org: &Organization, unit_number: &str, location_id: Option<Uuid>) -> Equipment {
        self.repo
            .create_equipment(
                org.id,
                CreateEquipmentRequest {
                    unit_number: unit_number.to_string(),
                    category: EquipmentCategory::Tractor,
                    odometer: 100_000,
                    location_id,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    pub async fn issue(&self, org: &Organization, party_id: Uuid, detail: IssueDetail) -> IssueRecord {
        self.repo
            .create_issue(
                org.id,
                None,
                CreateIssueRequest {
                    party_id,
                    title: "Seeded record".to_string(),
                    description: None,
                    priority: Priority::Medium,
                    due_date: None,
                    detail,
                },
            )
            .await
            .unwrap()
    }

    // --- Requests ---

    /// Sends one request through the router and returns the status and JSON body
    /// (`Value::Null` when empty, a string when not JSON).
    pub async fn call(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(user), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(user), None).await
    }
}

/// Ids of every element of a JSON array response.
pub fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
