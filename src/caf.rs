//! Corrective action form workflow.
//!
//! - `assign`: Draft, Assigned or Rejected → Assigned
//! - `sign`: Assigned → Signed (assignee only)
//! - `approve`: Signed → Approved
//! - `reject`: Signed → Rejected
//!
//! `Approved` is terminal.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Caf, CafStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CafAction {
    Assign { assignee: Uuid },
    Sign { signature: String },
    Approve { note: Option<String> },
    Reject { note: Option<String> },
}

impl CafAction {
    pub fn name(&self) -> &'static str {
        match self {
            CafAction::Assign { .. } => "assign",
            CafAction::Sign { .. } => "sign",
            CafAction::Approve { .. } => "approve",
            CafAction::Reject { .. } => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CafError {
    #[error("cannot {action} a corrective action form in status {from:?}")]
    InvalidTransition { from: CafStatus, action: &'static str },
    #[error("only the assignee may sign this corrective action form")]
    NotAssignee,
    #[error("the signer may not review their own corrective action form")]
    SelfReview,
    #[error("signature must not be empty")]
    EmptySignature,
}

impl CafStatus {
    /// The status reached by applying `action`, if the transition exists.
    pub fn next(self, action: &CafAction) -> Result<CafStatus, CafError> {
        use CafStatus::*;
        let next = match (self, action) {
            (Draft | Assigned | Rejected, CafAction::Assign { .. }) => Assigned,
            (Assigned, CafAction::Sign { .. }) => Signed,
            (Signed, CafAction::Approve { .. }) => Approved,
            (Signed, CafAction::Reject { .. }) => Rejected,
            (from, action) => {
                return Err(CafError::InvalidTransition {
                    from,
                    action: action.name(),
                });
            }
        };
        Ok(next)
    }
}

/// Applies `action` performed by `actor` to `caf`, stamping the audit fields.
///
/// Role checks (who may assign or review at all) belong to the caller; this only
/// enforces the rules that depend on the form itself.
pub fn apply(caf: &mut Caf, action: CafAction, actor: Uuid, now: DateTime<Utc>) -> Result<(), CafError> {
    let next = caf.status.next(&action)?;

    match action {
        CafAction::Assign { assignee } => {
            caf.assigned_to = Some(assignee);
            caf.signature = None;
            caf.signed_by = None;
            caf.signed_at = None;
        }
        CafAction::Sign { signature } => {
            if caf.assigned_to != Some(actor) {
                return Err(CafError::NotAssignee);
            }
            let signature = signature.trim();
            if signature.is_empty() {
                return Err(CafError::EmptySignature);
            }
            caf.signature = Some(signature.to_string());
            caf.signed_by = Some(actor);
            caf.signed_at = Some(now);
        }
        CafAction::Approve { note } | CafAction::Reject { note } => {
            if caf.signed_by == Some(actor) {
                return Err(CafError::SelfReview);
            }
            caf.reviewed_by = Some(actor);
            caf.reviewed_at = Some(now);
            caf.review_note = note;
        }
    }

    caf.status = next;
    caf.updated_at = now;
    Ok(())
}
