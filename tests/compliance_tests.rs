use chrono::{NaiveDate, Utc};
use fleet_compliance::{
    compliance::{Badge, badge_for, credential_counts, days_until, driver_compliance},
    models::{
        Issue, IssueDetail, IssueRecord, LicenseDetail, MvrDetail, RoadsideInspectionDetail,
        TrainingDetail,
    },
};
use uuid::Uuid;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const WINDOW: i64 = 30;

fn today() -> NaiveDate {
    day(2025, 3, 1)
}

fn record(party_id: Uuid, detail: IssueDetail) -> IssueRecord {
    IssueRecord {
        issue: Issue {
            id: Uuid::new_v4(),
            issue_type: detail.issue_type(),
            party_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..Default::default()
        },
        detail,
    }
}

fn license(expiration_date: NaiveDate) -> IssueDetail {
    IssueDetail::License(LicenseDetail {
        license_number: "X1".to_string(),
        state: "CA".to_string(),
        class: "A".to_string(),
        expiration_date,
        ..Default::default()
    })
}

fn mvr(mvr_date: NaiveDate) -> IssueDetail {
    IssueDetail::Mvr(MvrDetail {
        state: "CA".to_string(),
        mvr_date,
        ..Default::default()
    })
}

fn training(kind: &str, expiration_date: Option<NaiveDate>) -> IssueDetail {
    IssueDetail::Training(TrainingDetail {
        training_type: kind.to_string(),
        expiration_date,
        ..Default::default()
    })
}

#[test]
fn test_badge_boundaries() {
    assert_eq!(badge_for(None, today(), WINDOW), Badge::Missing);
    assert_eq!(badge_for(Some(day(2025, 2, 28)), today(), WINDOW), Badge::Expired);
    // Expiring today is still valid today.
    assert_eq!(badge_for(Some(today()), today(), WINDOW), Badge::ExpiringSoon);
    assert_eq!(badge_for(Some(day(2025, 3, 31)), today(), WINDOW), Badge::ExpiringSoon);
    assert_eq!(badge_for(Some(day(2025, 4, 1)), today(), WINDOW), Badge::Current);
    assert_eq!(badge_for(Some(day(2025, 3, 2)), today(), 0), Badge::Current);
}

#[test]
fn test_days_until_is_signed() {
    assert_eq!(days_until(day(2025, 3, 11), today()), 10);
    assert_eq!(days_until(day(2025, 2, 19), today()), -10);
}

#[test]
fn test_badge_severity_order() {
    assert!(Badge::Current < Badge::ExpiringSoon);
    assert!(Badge::ExpiringSoon < Badge::Missing);
    assert!(Badge::Missing < Badge::Expired);
}

#[test]
fn test_driver_without_records_is_missing() {
    let summary = driver_compliance(Uuid::new_v4(), &[], today(), WINDOW);
    assert_eq!(summary.license.badge, Badge::Missing);
    assert_eq!(summary.mvr.badge, Badge::Missing);
    assert!(summary.trainings.is_empty());
    assert_eq!(summary.overall, Badge::Missing);
}

#[test]
fn test_latest_license_wins() {
    let driver = Uuid::new_v4();
    let old = record(driver, license(day(2024, 12, 31)));
    let renewed = record(driver, license(day(2029, 12, 31)));
    let records = vec![old, renewed.clone(), record(driver, mvr(day(2025, 1, 15)))];

    let summary = driver_compliance(driver, &records, today(), WINDOW);
    assert_eq!(summary.license.issue_id, Some(renewed.issue.id));
    assert_eq!(summary.license.badge, Badge::Current);
    assert_eq!(summary.overall, Badge::Current);
}

#[test]
fn test_mvr_defaults_to_annual_review() {
    let driver = Uuid::new_v4();
    let records = vec![
        record(driver, license(day(2029, 1, 1))),
        record(driver, mvr(day(2024, 3, 10))),
    ];

    let summary = driver_compliance(driver, &records, today(), WINDOW);
    assert_eq!(summary.mvr.expiration_date, Some(day(2025, 3, 10)));
    assert_eq!(summary.mvr.days_remaining, Some(9));
    assert_eq!(summary.mvr.badge, Badge::ExpiringSoon);
    assert_eq!(summary.overall, Badge::ExpiringSoon);
}

#[test]
fn test_trainings_are_tracked_per_type() {
    let driver = Uuid::new_v4();
    let records = vec![
        record(driver, license(day(2029, 1, 1))),
        record(driver, mvr(day(2025, 1, 1))),
        record(driver, training("Hazmat", Some(day(2024, 1, 1)))),
        record(driver, training("Hazmat", Some(day(2026, 1, 1)))),
        record(driver, training("Entry Level", Some(day(2025, 1, 1)))),
    ];

    let summary = driver_compliance(driver, &records, today(), WINDOW);
    assert_eq!(summary.trainings.len(), 2);
    let labels: Vec<&str> = summary.trainings.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["Entry Level", "Hazmat"]);
    assert_eq!(summary.trainings[0].badge, Badge::Expired);
    assert_eq!(summary.trainings[1].badge, Badge::Current);
    assert_eq!(summary.overall, Badge::Expired);
}

#[test]
fn test_other_parties_and_types_are_ignored() {
    let driver = Uuid::new_v4();
    let records = vec![
        record(Uuid::new_v4(), license(day(2029, 1, 1))),
        record(
            driver,
            IssueDetail::RoadsideInspection(RoadsideInspectionDetail {
                report_number: "R1".to_string(),
                inspection_date: today(),
                level: 2,
                state: "CA".to_string(),
                ..Default::default()
            }),
        ),
    ];

    let summary = driver_compliance(driver, &records, today(), WINDOW);
    assert_eq!(summary.license.badge, Badge::Missing);
    assert_eq!(summary.party_id, driver);
}

#[test]
fn test_credential_counts_use_latest_per_driver() {
    let renewed = Uuid::new_v4();
    let lapsed = Uuid::new_v4();
    let soon = Uuid::new_v4();
    let records = vec![
        record(renewed, license(day(2024, 1, 1))),
        record(renewed, license(day(2028, 1, 1))),
        record(lapsed, license(day(2025, 2, 1))),
        record(soon, license(day(2025, 3, 20))),
        record(soon, training("Hazmat", Some(day(2025, 1, 1)))),
    ];

    let (expired, expiring) = credential_counts(&records, today(), WINDOW);
    assert_eq!(expired, 2);
    assert_eq!(expiring, 1);
}
