//! Preventive-maintenance A/B schedule.
//!
//! The intervals follow the usual DOT-derived fleet practice: an "A" service (lube,
//! brake and light inspection) at a short interval and a "B" service (A plus fluids,
//! filters and the annual 49 CFR 396.17 inspection) at a long one. Whichever limit
//! (days or miles) is reached first makes the service due.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Equipment, EquipmentCategory, MaintenanceRecord, ServiceLevel};

/// Days before the due date at which a service is reported as due soon.
pub const DUE_SOON_DAYS: i64 = 14;
/// Miles before the due odometer at which a service is reported as due soon.
pub const DUE_SOON_MILES: i64 = 1_000;

/// ScheduleRule
///
/// One row of the static schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRule {
    pub category: EquipmentCategory,
    pub level: ServiceLevel,
    pub interval_days: Option<u32>,
    pub interval_miles: Option<u32>,
    pub description: &'static str,
}

const fn rule(
    category: EquipmentCategory,
    level: ServiceLevel,
    interval_days: Option<u32>,
    interval_miles: Option<u32>,
    description: &'static str,
) -> ScheduleRule {
    ScheduleRule {
        category,
        level,
        interval_days,
        interval_miles,
        description,
    }
}

use EquipmentCategory::{Bus, StraightTruck, Tractor, Trailer, Van};
use ServiceLevel::{A, B};

pub static AB_SCHEDULE: &[ScheduleRule] = &[
    rule(Tractor, A, Some(90), Some(15_000), "Lube, brake adjustment, lights, tires, coupling devices"),
    rule(Tractor, B, Some(365), Some(45_000), "A service plus oil and filters, driveline, annual DOT inspection"),
    rule(StraightTruck, A, Some(90), Some(10_000), "Lube, brake adjustment, lights, tires, steering"),
    rule(StraightTruck, B, Some(365), Some(30_000), "A service plus oil and filters, cooling system, annual DOT inspection"),
    rule(Trailer, A, Some(90), None, "Brakes, lights, tires, landing gear, suspension"),
    rule(Trailer, B, Some(365), None, "A service plus wheel bearings, kingpin, annual DOT inspection"),
    rule(Bus, A, Some(45), Some(6_000), "Brakes, lights, tires, emergency exits, passenger doors"),
    rule(Bus, B, Some(180), Some(24_000), "A service plus oil and filters, wheelchair lift, annual DOT inspection"),
    rule(Van, A, Some(120), Some(7_500), "Oil change, brakes, lights, tires"),
    rule(Van, B, Some(365), Some(30_000), "A service plus fluids, filters, annual DOT inspection"),
];

/// Schedule rows that apply to a category, A before B.
pub fn rules_for(category: EquipmentCategory) -> impl Iterator<Item = &'static ScheduleRule> {
    AB_SCHEDULE.iter().filter(move |r| r.category == category)
}

/// ScheduleInterval
///
/// API view of a schedule row (`GET /maintenance/schedules`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ScheduleInterval {
    pub category: EquipmentCategory,
    pub service_level: ServiceLevel,
    pub interval_days: Option<u32>,
    pub interval_miles: Option<u32>,
    pub description: String,
}

impl From<&ScheduleRule> for ScheduleInterval {
    fn from(rule: &ScheduleRule) -> Self {
        Self {
            category: rule.category,
            service_level: rule.level,
            interval_days: rule.interval_days,
            interval_miles: rule.interval_miles,
            description: rule.description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DueStatus {
    #[default]
    Current,
    DueSoon,
    Overdue,
    NeverServiced,
}

/// ServiceDue
///
/// Where a unit stands against one schedule row.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ServiceDue {
    pub service_level: ServiceLevel,
    pub description: String,
    pub last_performed_on: Option<NaiveDate>,
    pub last_odometer: Option<i64>,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_odometer: Option<i64>,
    pub status: DueStatus,
}

/// Whether a completed service satisfies the given level. A B-service covers A items.
fn satisfies(performed: ServiceLevel, required: ServiceLevel) -> bool {
    performed == required || (performed == ServiceLevel::B && required == ServiceLevel::A)
}

/// Evaluates one schedule row against a unit's service history.
pub fn service_due(
    rule: &ScheduleRule,
    history: &[MaintenanceRecord],
    odometer: i64,
    today: NaiveDate,
) -> ServiceDue {
    let last = history
        .iter()
        .filter(|r| satisfies(r.service_level, rule.level))
        .max_by_key(|r| (r.performed_on, r.odometer));

    let Some(last) = last else {
        return ServiceDue {
            service_level: rule.level,
            description: rule.description.to_string(),
            status: DueStatus::NeverServiced,
            ..ServiceDue::default()
        };
    };

    let next_due_date = rule
        .interval_days
        .and_then(|d| last.performed_on.checked_add_days(Days::new(d.into())));
    // A reading too large to add the interval to has no mileage limit left to track.
    let next_due_odometer = rule
        .interval_miles
        .and_then(|m| last.odometer.checked_add(i64::from(m)));

    let by_date = next_due_date.map(|due| (due - today).num_days());
    let by_miles = next_due_odometer.map(|due| due.saturating_sub(odometer));

    let status = if by_date.is_some_and(|d| d < 0) || by_miles.is_some_and(|m| m < 0) {
        DueStatus::Overdue
    } else if by_date.is_some_and(|d| d <= DUE_SOON_DAYS) || by_miles.is_some_and(|m| m <= DUE_SOON_MILES) {
        DueStatus::DueSoon
    } else {
        DueStatus::Current
    };

    ServiceDue {
        service_level: rule.level,
        description: rule.description.to_string(),
        last_performed_on: Some(last.performed_on),
        last_odometer: Some(last.odometer),
        next_due_date,
        next_due_odometer,
        status,
    }
}

/// Status of every schedule row for a unit.
pub fn maintenance_status(
    equipment: &Equipment,
    history: &[MaintenanceRecord],
    today: NaiveDate,
) -> Vec<ServiceDue> {
    rules_for(equipment.category)
        .map(|rule| service_due(rule, history, equipment.odometer, today))
        .collect()
}

/// MaintenanceOverview
///
/// Output of `GET /equipment/{id}/maintenance`: the service history, newest first, and
/// where the unit stands against each schedule row.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MaintenanceOverview {
    pub equipment_id: Uuid,
    pub odometer: i64,
    pub history: Vec<MaintenanceRecord>,
    pub schedule: Vec<ServiceDue>,
}
