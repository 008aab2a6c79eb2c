use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// PartyType
///
/// Discriminates the identity record behind a `parties.id`. Persons, organizations and
/// equipment all share the party id space so roles and issues can point at any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "party_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PartyType {
    #[default]
    Person,
    Organization,
    Equipment,
}

/// Organization
///
/// A carrier (tenant) or a master organization. Sub-organizations point at their
/// master through `master_id`; master organizations carry `is_master = true`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Organization {
    /// The organization's party id.
    #[sqlx(rename = "party_id")]
    pub id: Uuid,
    pub name: String,
    /// USDOT number, when the carrier has one.
    pub dot_number: Option<String>,
    pub is_master: bool,
    pub master_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Location
///
/// A terminal, yard or office belonging to a single organization. Roles may be
/// restricted to a location, which narrows what the holder can see.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Location {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads ---

/// CreateOrganizationRequest
///
/// Input for `POST /organizations` (sub-organization under a master) and
/// `POST /admin/organizations` (new master organization).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub dot_number: Option<String>,
    /// The managing master organization. Required for sub-organizations.
    pub master_id: Option<Uuid>,
}

/// UpdateOrganizationRequest
///
/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateOrganizationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dot_number: Option<String>,
}

/// NewOrganization
///
/// Internal insert shape, resolved by the handler from the request and the caller's rights.
#[derive(Debug, Clone, Default)]
pub struct NewOrganization {
    pub name: String,
    pub dot_number: Option<String>,
    pub is_master: bool,
    pub master_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateLocationRequest {
    pub name: String,
    pub address: Option<String>,
}
