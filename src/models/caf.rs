use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// CafStatus
///
/// Lifecycle of a corrective action form. Transitions live in `crate::caf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "caf_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CafStatus {
    #[default]
    Draft,
    Assigned,
    Signed,
    Approved,
    Rejected,
}

/// Caf
///
/// Corrective Action Form: remediation generated from a roadside inspection or accident,
/// routed to a staff member for signature and then to a manager for approval.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Caf {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub issue_id: Uuid,
    pub violation_id: Option<Uuid>,
    pub title: String,
    pub corrective_action: String,
    pub status: CafStatus,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    /// Typed name captured when the assignee signs.
    pub signature: Option<String>,
    pub signed_by: Option<Uuid>,
    pub signed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCafRequest {
    pub violation_id: Option<Uuid>,
    pub title: String,
    pub corrective_action: String,
    pub assigned_to: Option<Uuid>,
}

/// NewCaf
///
/// Internal insert shape, always starts in `Draft`.
#[derive(Debug, Clone)]
pub struct NewCaf {
    pub organization_id: Uuid,
    pub issue_id: Uuid,
    pub violation_id: Option<Uuid>,
    pub title: String,
    pub corrective_action: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AssignCafRequest {
    pub assignee: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignCafRequest {
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReviewCafRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CafFilter {
    #[serde(skip)]
    pub organization_id: Option<Uuid>,
    #[serde(skip)]
    pub issue_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<CafStatus>,
}

impl CafFilter {
    pub fn matches(&self, caf: &Caf) -> bool {
        self.organization_id.is_none_or(|id| caf.organization_id == id)
            && self.issue_id.is_none_or(|id| caf.issue_id == id)
            && self.assigned_to.is_none_or(|id| caf.assigned_to == Some(id))
            && self.status.is_none_or(|s| caf.status == s)
    }
}
