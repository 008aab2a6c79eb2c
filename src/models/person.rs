use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Person
///
/// A human party: driver, office staff or consultant. A person only has rights
/// through the roles attached to their party id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Person {
    #[sqlx(rename = "party_id")]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub hire_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// User
///
/// Login identity mirrored from the auth provider. `id` is the provider's user id
/// (the JWT `sub`), `party_id` links the login to its person record.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub party_id: Uuid,
    /// Platform operator. Bypasses tenant checks.
    pub is_superuser: bool,
}

/// RoleType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "role_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RoleType {
    /// Consultant seat in a master organization; oversees every managed sub-organization.
    Master,
    Admin,
    Staff,
    #[default]
    Driver,
}

impl RoleType {
    /// Role types that may manage compliance records.
    pub fn is_manager(self) -> bool {
        matches!(self, RoleType::Master | RoleType::Admin | RoleType::Staff)
    }

    /// Database label of the variant.
    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::Master => "master",
            RoleType::Admin => "admin",
            RoleType::Staff => "staff",
            RoleType::Driver => "driver",
        }
    }
}

/// Role
///
/// Assignment of a party to an organization (optionally narrowed to one location)
/// with an active/inactive lifecycle bounded by `start_date` and `end_date`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    pub party_id: Uuid,
    pub organization_id: Uuid,
    pub location_id: Option<Uuid>,
    pub role_type: RoleType,
    pub is_active: bool,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// A role grants rights only while flagged active and inside its date bounds.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.is_active && self.start_date <= today && self.end_date.is_none_or(|end| end >= today)
    }
}

/// Member
///
/// A person joined with one of their roles inside an organization. Used for the
/// driver and staff listings.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Member {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub person: Person,
    pub role_id: Uuid,
    pub role_type: RoleType,
    pub location_id: Option<Uuid>,
    pub is_active: bool,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl Member {
    /// Same window as [`Role::is_active_on`], for the role this row carries.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.is_active && self.start_date <= today && self.end_date.is_none_or(|end| end >= today)
    }
}

// --- Request Payloads ---

/// CreatePersonRequest
///
/// Input for `POST /organizations/{id}/drivers` and `POST /organizations/{id}/staff`.
/// The person record and its role in the organization are created together.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePersonRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub hire_date: Option<NaiveDate>,
    /// Binds the new role to a location of the organization.
    pub location_id: Option<Uuid>,
    /// Only read by the staff endpoint (`staff` or `admin`). Ignored for drivers.
    #[serde(default)]
    pub role_type: Option<RoleType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePersonRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
}

/// AssignRoleRequest
///
/// Input for `POST /organizations/{id}/roles`. `start_date` defaults to today.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignRoleRequest {
    pub party_id: Uuid,
    pub role_type: RoleType,
    pub location_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// NewRole
///
/// Internal insert shape for `roles`.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub party_id: Uuid,
    pub organization_id: Uuid,
    pub location_id: Option<Uuid>,
    pub role_type: RoleType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// CreateUserRequest
///
/// Input for `POST /organizations/{id}/users`: gives an existing person a login.
/// The password is forwarded to the auth provider and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub party_id: Uuid,
    pub email: String,
    pub password: String,
}

/// RegisterRequest
///
/// Self-service carrier sign-up (`POST /register`). Creates the organization, its first
/// administrator and the administrator's login in one call.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub organization_name: String,
    pub dot_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// UserProfile
///
/// Output of `GET /me`: the login, its person record and every role it holds.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub is_superuser: bool,
    pub person: Option<Person>,
    pub roles: Vec<Role>,
}

/// DriverProfile
///
/// Output of `GET /organizations/{id}/drivers/{party_id}`: the person and the roles
/// they hold in that organization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DriverProfile {
    pub person: Person,
    pub roles: Vec<Role>,
}
