//! Expiration badges and the driver qualification summary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{IssueDetail, IssueRecord};

/// Default warning window (days before expiration) when none is configured.
pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 30;

/// Badge
///
/// Declared in increasing severity so `max()` over a set of badges yields the worst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Badge {
    #[default]
    Current,
    ExpiringSoon,
    Missing,
    Expired,
}

/// Signed day count from `today` to `expiration`; negative once expired.
pub fn days_until(expiration: NaiveDate, today: NaiveDate) -> i64 {
    (expiration - today).num_days()
}

/// The badge for a credential expiring on `expiration`.
///
/// A credential expiring today is still current for the day; it is expired from the
/// next day on.
pub fn badge_for(expiration: Option<NaiveDate>, today: NaiveDate, window_days: i64) -> Badge {
    match expiration {
        None => Badge::Missing,
        Some(date) => {
            let remaining = days_until(date, today);
            if remaining < 0 {
                Badge::Expired
            } else if remaining <= window_days {
                Badge::ExpiringSoon
            } else {
                Badge::Current
            }
        }
    }
}

/// CredentialStatus
///
/// One credential line of a driver's qualification summary.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CredentialStatus {
    /// The issue backing this line, if any record exists.
    pub issue_id: Option<Uuid>,
    pub label: String,
    pub expiration_date: Option<NaiveDate>,
    pub days_remaining: Option<i64>,
    pub badge: Badge,
}

impl CredentialStatus {
    fn missing(label: &str) -> Self {
        Self {
            label: label.to_string(),
            badge: Badge::Missing,
            ..Self::default()
        }
    }

    fn from_record(label: String, record: &IssueRecord, today: NaiveDate, window: i64) -> Self {
        let expiration = record.detail.expiration_date();
        Self {
            issue_id: Some(record.issue.id),
            label,
            expiration_date: expiration,
            days_remaining: expiration.map(|e| days_until(e, today)),
            badge: badge_for(expiration, today, window),
        }
    }
}

/// DriverCompliance
///
/// Output of `GET /organizations/{id}/drivers/{party_id}/compliance`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DriverCompliance {
    pub party_id: Uuid,
    pub license: CredentialStatus,
    pub mvr: CredentialStatus,
    pub trainings: Vec<CredentialStatus>,
    /// Worst badge across every line. A missing license or MVR makes the driver
    /// non-compliant.
    pub overall: Badge,
}

/// Summarizes a driver's credentials from their issue records.
///
/// Only the most recent license and MVR count (latest expiration wins), and the most
/// recent record per training type. Records of other parties are ignored.
pub fn driver_compliance(
    party_id: Uuid,
    records: &[IssueRecord],
    today: NaiveDate,
    window_days: i64,
) -> DriverCompliance {
    let own = records.iter().filter(|r| r.issue.party_id == party_id);

    let mut license: Option<&IssueRecord> = None;
    let mut mvr: Option<&IssueRecord> = None;
    let mut trainings: BTreeMap<String, Option<&IssueRecord>> = BTreeMap::new();

    for record in own {
        match &record.detail {
            IssueDetail::License(_) => keep_latest(&mut license, record),
            IssueDetail::Mvr(_) => keep_latest(&mut mvr, record),
            IssueDetail::Training(t) => {
                keep_latest(trainings.entry(t.training_type.clone()).or_default(), record)
            }
            _ => {}
        }
    }

    let license = license
        .map(|r| CredentialStatus::from_record("License".into(), r, today, window_days))
        .unwrap_or_else(|| CredentialStatus::missing("License"));
    let mvr = mvr
        .map(|r| CredentialStatus::from_record("MVR".into(), r, today, window_days))
        .unwrap_or_else(|| CredentialStatus::missing("MVR"));
    let trainings: Vec<CredentialStatus> = trainings
        .into_iter()
        .filter_map(|(name, r)| r.map(|r| CredentialStatus::from_record(name, r, today, window_days)))
        .collect();

    let overall = std::iter::once(license.badge)
        .chain(std::iter::once(mvr.badge))
        .chain(trainings.iter().map(|t| t.badge))
        .max()
        .unwrap_or_default();

    DriverCompliance {
        party_id,
        license,
        mvr,
        trainings,
        overall,
    }
}

fn keep_latest<'a>(slot: &mut Option<&'a IssueRecord>, record: &'a IssueRecord) {
    let newer = match slot {
        None => true,
        Some(current) => record.detail.expiration_date() > current.detail.expiration_date(),
    };
    if newer {
        *slot = Some(record);
    }
}

/// Counts credentials that are expired and expiring soon across a set of records,
/// keeping only the latest record per (party, credential) pair.
pub fn credential_counts(records: &[IssueRecord], today: NaiveDate, window_days: i64) -> (i64, i64) {
    let mut latest: BTreeMap<(Uuid, String), Option<NaiveDate>> = BTreeMap::new();
    for record in records {
        let key = match &record.detail {
            IssueDetail::License(_) => "license".to_string(),
            IssueDetail::Mvr(_) => "mvr".to_string(),
            IssueDetail::Training(t) => format!("training:{}", t.training_type),
            _ => continue,
        };
        let expiration = record.detail.expiration_date();
        latest
            .entry((record.issue.party_id, key))
            .and_modify(|e| *e = (*e).max(expiration))
            .or_insert(expiration);
    }

    latest.values().fold((0, 0), |(expired, expiring), exp| {
        match badge_for(*exp, today, window_days) {
            Badge::Expired => (expired + 1, expiring),
            Badge::ExpiringSoon => (expired, expiring + 1),
            _ => (expired, expiring),
        }
    })
}
