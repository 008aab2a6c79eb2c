use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::IssueType;

/// OrganizationDashboard
///
/// Output of `GET /organizations/{id}/dashboard`. Counts are limited to what the caller
/// is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct OrganizationDashboard {
    pub organization_id: Uuid,
    pub active_drivers: i64,
    pub active_staff: i64,
    pub active_equipment: i64,
    pub open_issues: i64,
    pub open_issues_by_type: Vec<IssueTypeCount>,
    /// Licenses, MVRs and trainings past their expiration date.
    pub expired_credentials: i64,
    /// Credentials expiring inside the configured warning window.
    pub expiring_credentials: i64,
    pub cafs_awaiting_signature: i64,
    pub cafs_awaiting_approval: i64,
    pub maintenance_overdue: i64,
    pub maintenance_due_soon: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct IssueTypeCount {
    pub issue_type: IssueType,
    pub count: i64,
}

/// PlatformStats
///
/// Output of `GET /admin/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PlatformStats {
    pub total_organizations: i64,
    pub master_organizations: i64,
    pub total_users: i64,
    pub total_drivers: i64,
    pub total_equipment: i64,
    pub open_issues: i64,
    pub pending_cafs: i64,
}
