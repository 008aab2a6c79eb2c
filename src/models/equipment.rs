use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// EquipmentCategory
///
/// Selects which rows of the A/B maintenance schedule apply to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "equipment_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum EquipmentCategory {
    #[default]
    Tractor,
    StraightTruck,
    Trailer,
    Bus,
    Van,
}

/// Equipment
///
/// A power unit or trailer. Equipment is a party so inspections and accidents can be
/// filed against it the same way they are filed against drivers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Equipment {
    #[sqlx(rename = "party_id")]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub location_id: Option<Uuid>,
    pub unit_number: String,
    pub vin: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub category: EquipmentCategory,
    /// Last reported odometer reading in miles.
    pub odometer: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateEquipmentRequest {
    pub unit_number: String,
    pub vin: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub category: EquipmentCategory,
    #[serde(default)]
    pub odometer: i64,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateEquipmentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    /// Odometer readings only move forward; lower values are rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// ServiceLevel
///
/// Preventive maintenance tier. A B-service is a superset of the A-service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "service_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceLevel {
    #[default]
    A,
    B,
}

/// MaintenanceRecord
///
/// One completed preventive-maintenance service.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub service_level: ServiceLevel,
    pub performed_on: NaiveDate,
    pub odometer: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RecordMaintenanceRequest {
    pub service_level: ServiceLevel,
    pub performed_on: NaiveDate,
    pub odometer: i64,
    pub notes: Option<String>,
}
