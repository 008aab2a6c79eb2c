use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// IssueType
///
/// Which detail table specializes an issue. Also the URL segment of the per-type
/// listing routes (see [`IssueType::segment`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "issue_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IssueType {
    #[default]
    License,
    Mvr,
    Training,
    DrugAlcohol,
    RoadsideInspection,
    Accident,
}

impl IssueType {
    pub const ALL: [IssueType; 6] = [
        IssueType::License,
        IssueType::Mvr,
        IssueType::Training,
        IssueType::DrugAlcohol,
        IssueType::RoadsideInspection,
        IssueType::Accident,
    ];

    /// Path segment under `/organizations/{id}/` listing issues of this type.
    pub fn segment(self) -> &'static str {
        match self {
            IssueType::License => "licenses",
            IssueType::Mvr => "mvrs",
            IssueType::Training => "trainings",
            IssueType::DrugAlcohol => "drug-alcohol",
            IssueType::RoadsideInspection => "roadside-inspections",
            IssueType::Accident => "accidents",
        }
    }

    /// Only inspections and accidents produce violations and corrective actions.
    pub fn carries_violations(self) -> bool {
        matches!(self, IssueType::RoadsideInspection | IssueType::Accident)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "issue_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl IssueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IssueStatus::Resolved | IssueStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Issue
///
/// The generic compliance-record envelope stored in `issues`. `party_id` is the subject
/// of the record: a driver for licenses, MVRs, training and testing; a driver or a unit
/// for inspections and accidents.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Issue {
    pub id: Uuid,
    pub issue_type: IssueType,
    pub party_id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: IssueStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// --- Detail Tables ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct LicenseDetail {
    pub license_number: String,
    /// Issuing state (two-letter code).
    pub state: String,
    /// CDL class, e.g. "A".
    pub class: String,
    pub endorsements: Option<String>,
    pub restrictions: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiration_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MvrDetail {
    pub state: String,
    pub mvr_date: NaiveDate,
    pub points: i32,
    pub violations: i32,
    /// Annual review deadline. Defaults to one year after `mvr_date`.
    pub expiration_date: Option<NaiveDate>,
}

/// Days an MVR stays valid when no explicit expiration was recorded (annual review).
pub const MVR_VALIDITY_DAYS: u64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct TrainingDetail {
    pub training_type: String,
    pub provider: Option<String>,
    pub completed_on: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "drug_test_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DrugTestType {
    PreEmployment,
    #[default]
    Random,
    PostAccident,
    ReasonableSuspicion,
    ReturnToDuty,
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "drug_test_result", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DrugTestResult {
    #[default]
    Pending,
    Negative,
    Positive,
    Refused,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct DrugAlcoholDetail {
    pub test_type: DrugTestType,
    pub collected_on: NaiveDate,
    pub result: DrugTestResult,
    #[serde(default)]
    pub is_alcohol: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct RoadsideInspectionDetail {
    pub report_number: String,
    pub inspection_date: NaiveDate,
    /// CVSA inspection level, 1 through 6.
    pub level: i16,
    pub state: String,
    pub location: Option<String>,
    pub equipment_id: Option<Uuid>,
    #[serde(default)]
    pub out_of_service: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AccidentDetail {
    pub accident_date: NaiveDate,
    pub location: Option<String>,
    #[serde(default)]
    pub fatalities: i32,
    #[serde(default)]
    pub injuries: i32,
    #[serde(default)]
    pub hazmat_released: bool,
    #[serde(default)]
    pub tow_away: bool,
    pub preventable: Option<bool>,
    pub equipment_id: Option<Uuid>,
}

/// IssueDetail
///
/// The one-to-one specialization of an issue. Serialized with a `type` tag so the
/// client can switch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum IssueDetail {
    License(LicenseDetail),
    Mvr(MvrDetail),
    Training(TrainingDetail),
    DrugAlcohol(DrugAlcoholDetail),
    RoadsideInspection(RoadsideInspectionDetail),
    Accident(AccidentDetail),
}

impl IssueDetail {
    pub fn issue_type(&self) -> IssueType {
        match self {
            IssueDetail::License(_) => IssueType::License,
            IssueDetail::Mvr(_) => IssueType::Mvr,
            IssueDetail::Training(_) => IssueType::Training,
            IssueDetail::DrugAlcohol(_) => IssueType::DrugAlcohol,
            IssueDetail::RoadsideInspection(_) => IssueType::RoadsideInspection,
            IssueDetail::Accident(_) => IssueType::Accident,
        }
    }

    /// The date the underlying credential stops being valid, for records that expire.
    pub fn expiration_date(&self) -> Option<NaiveDate> {
        match self {
            IssueDetail::License(d) => Some(d.expiration_date),
            IssueDetail::Mvr(d) => d
                .expiration_date
                .or_else(|| d.mvr_date.checked_add_days(Days::new(MVR_VALIDITY_DAYS))),
            IssueDetail::Training(d) => d.expiration_date,
            _ => None,
        }
    }

    /// Field-level checks that the database constraints do not express.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            IssueDetail::License(d) if d.license_number.trim().is_empty() => {
                Err("license_number must not be empty".into())
            }
            IssueDetail::Mvr(d) if d.points < 0 || d.violations < 0 => {
                Err("points and violations must not be negative".into())
            }
            IssueDetail::Training(d) if d.training_type.trim().is_empty() => {
                Err("training_type must not be empty".into())
            }
            IssueDetail::RoadsideInspection(d) if !(1..=6).contains(&d.level) => {
                Err("inspection level must be between 1 and 6".into())
            }
            IssueDetail::Accident(d) if d.fatalities < 0 || d.injuries < 0 => {
                Err("fatalities and injuries must not be negative".into())
            }
            _ => Ok(()),
        }
    }
}

/// IssueRecord
///
/// Response shape for every issue endpoint: the envelope with its detail attached.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct IssueRecord {
    #[serde(flatten)]
    pub issue: Issue,
    pub detail: IssueDetail,
}

/// Violation
///
/// A cited regulation found during a roadside inspection or attributed to an accident.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Violation {
    pub id: Uuid,
    pub issue_id: Uuid,
    /// Regulation cited, e.g. "393.9(a)".
    pub code: String,
    pub description: String,
    pub out_of_service: bool,
    pub severity: i32,
    pub created_at: DateTime<Utc>,
}

/// Document
///
/// Evidence stored in object storage and attached to an issue.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Document {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads ---

/// CreateIssueRequest
///
/// The detail variant decides the issue type.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateIssueRequest {
    /// Subject of the record (driver or equipment party id).
    pub party_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub detail: IssueDetail,
}

/// UpdateIssueRequest
///
/// Partial update of the envelope. `detail`, when present, must be of the same type as
/// the stored issue.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateIssueRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<IssueDetail>,
}

/// IssueFilter
///
/// Repository-side filter. Every field narrows the result.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IssueFilter {
    #[serde(skip)]
    pub organization_id: Option<Uuid>,
    pub party_id: Option<Uuid>,
    pub issue_type: Option<IssueType>,
    pub status: Option<IssueStatus>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        self.organization_id.is_none_or(|id| issue.organization_id == id)
            && self.party_id.is_none_or(|id| issue.party_id == id)
            && self.issue_type.is_none_or(|t| issue.issue_type == t)
            && self.status.is_none_or(|s| issue.status == s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateViolationRequest {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub out_of_service: bool,
    #[serde(default = "default_severity")]
    pub severity: i32,
}

fn default_severity() -> i32 {
    1
}

/// UploadDocumentRequest
///
/// Asks for a presigned upload URL for evidence attached to an issue.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct UploadDocumentRequest {
    #[schema(example = "inspection_report.pdf")]
    pub filename: String,
    #[schema(example = "application/pdf")]
    pub content_type: String,
}

/// UploadDocumentResponse
///
/// The document row (already recorded) and the short-lived URL the client PUTs the file to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct UploadDocumentResponse {
    pub document: Document,
    pub upload_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct DownloadUrlResponse {
    pub download_url: String,
}
