//! Request lifecycle: the status state machine and the client-side guards
//! that decide whether a transition call may be issued at all.
//!
//! ```text
//! draft -> applied -> approved | rejected | returned
//! returned -> applied
//! any non-terminal -> cancelled
//! ```

use chrono::NaiveDate;
use dashmap::DashSet;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::models::{DecisionBody, Request, RequestStatus};

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Cancelled | Self::Completed
        )
    }

    /// Waiting for an approver (`pending` is the legacy spelling)
    pub fn awaits_decision(&self) -> bool {
        matches!(self, Self::Applied | Self::Pending)
    }

    pub fn can_submit(&self) -> bool {
        matches!(self, Self::Draft | Self::Returned)
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal() && *self != Self::Unknown
    }
}

/// An approver's verdict on an applied request
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approve {
        comment: Option<String>,
        /// Date the cash was handed over; required for advance payments
        received_date: Option<NaiveDate>,
    },
    Reject {
        comment: Option<String>,
    },
    Return {
        comment: Option<String>,
    },
}

impl Decision {
    /// Endpoint suffix, `POST /api/v1/requests/{id}/{action}`
    pub fn action(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Return { .. } => "return",
        }
    }

    /// Status the request moves to once the backend accepts the decision
    pub fn next_status(&self) -> RequestStatus {
        match self {
            Self::Approve { .. } => RequestStatus::Approved,
            Self::Reject { .. } => RequestStatus::Rejected,
            Self::Return { .. } => RequestStatus::Returned,
        }
    }

    fn comment(&self) -> Option<String> {
        let comment = match self {
            Self::Approve { comment, .. } | Self::Reject { comment } | Self::Return { comment } => {
                comment
            }
        };
        comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Check the decision against the request and build the call body.
    pub fn validate(&self, request: &Request) -> Result<DecisionBody, ApiError> {
        if !request.status.awaits_decision() {
            return Err(ApiError::validation_field(
                "status",
                format!("この申請は{}のため処理できません", request.status.label()),
            ));
        }

        let received_date = match self {
            Self::Approve { received_date, .. } => {
                if request.is_advance_payment() && received_date.is_none() {
                    return Err(ApiError::validation_field(
                        "received_date",
                        "仮払金申請の承認には受領日の入力が必要です",
                    ));
                }
                *received_date
            }
            _ => None,
        };

        Ok(DecisionBody {
            comment: self.comment(),
            received_date,
        })
    }
}

/// Guard for a request that must be in a submittable state
pub fn check_submit(request: &Request) -> Result<(), ApiError> {
    if request.status.can_submit() {
        Ok(())
    } else {
        Err(ApiError::validation_field(
            "status",
            format!("{}の申請は提出できません", request.status.label()),
        ))
    }
}

/// Guard for a request that may still be cancelled
pub fn check_cancel(request: &Request) -> Result<(), ApiError> {
    if request.status.can_cancel() {
        Ok(())
    } else {
        Err(ApiError::validation_field(
            "status",
            format!("{}の申請は取り消せません", request.status.label()),
        ))
    }
}

/// Ids of requests with a transition call in flight
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<DashSet<String>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for the duration of the returned guard.
    ///
    /// Fails with `CONFLICT` while another call holds the id.
    pub fn acquire(&self, id: &str) -> Result<InFlightGuard, ApiError> {
        if !self.ids.insert(id.to_string()) {
            return Err(ApiError::conflict(format!(
                "申請 {} は処理中です。しばらくしてから再度お試しください",
                id
            )));
        }
        Ok(InFlightGuard {
            ids: self.ids.clone(),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

/// Releases the id when dropped, whatever the call outcome
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<DashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use tokio_test::{assert_err, assert_ok};

    fn request(json: &str) -> Request {
        serde_json::from_str(json).unwrap()
    }

    fn approve(received_date: Option<NaiveDate>) -> Decision {
        Decision::Approve {
            comment: Some("OK".to_string()),
            received_date,
        }
    }

    #[test]
    fn test_status_predicates() {
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(!RequestStatus::Returned.is_terminal());
        assert!(RequestStatus::Pending.awaits_decision());
        assert!(RequestStatus::Returned.can_submit());
        assert!(!RequestStatus::Applied.can_submit());
        assert!(RequestStatus::Draft.can_cancel());
        assert!(!RequestStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_advance_payment_needs_received_date() {
        let req = request(r#"{"id":"e1","type":"expense","status":"applied"}"#);

        let err = assert_err!(approve(None).validate(&req));
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let date = NaiveDate::from_ymd_opt(2024, 5, 10);
        let body = assert_ok!(approve(date).validate(&req));
        assert_eq!(body.received_date, date);
        assert_eq!(body.comment.as_deref(), Some("OK"));
    }

    #[test]
    fn test_other_kinds_approve_without_date() {
        let leave = request(r#"{"id":"l1","type":"leave","status":"pending"}"#);
        assert_ok!(approve(None).validate(&leave));

        let reimbursement = request(
            r#"{"id":"e2","type":"expense","status":"applied","expense_type":"reimbursement"}"#,
        );
        assert_ok!(approve(None).validate(&reimbursement));
    }

    #[test]
    fn test_reject_drops_date_and_blank_comment() {
        let req = request(r#"{"id":"e1","type":"expense","status":"applied"}"#);
        let body = Decision::Reject {
            comment: Some("  ".to_string()),
        }
        .validate(&req)
        .unwrap();
        assert_eq!(body.comment, None);
        assert_eq!(body.received_date, None);
    }

    #[test]
    fn test_decision_on_terminal_request_is_refused() {
        let req = request(r#"{"id":"l1","type":"leave","status":"approved"}"#);
        let err = Decision::Return { comment: None }.validate(&req).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_next_status() {
        assert_eq!(approve(None).next_status(), RequestStatus::Approved);
        assert_eq!(
            Decision::Return { comment: None }.next_status(),
            RequestStatus::Returned
        );
    }

    #[test]
    fn test_submit_and_cancel_guards() {
        let returned = request(r#"{"id":"r","type":"leave","status":"returned"}"#);
        assert!(check_submit(&returned).is_ok());
        assert!(check_cancel(&returned).is_ok());

        let rejected = request(r#"{"id":"r","type":"leave","status":"rejected"}"#);
        assert!(check_submit(&rejected).is_err());
        assert!(check_cancel(&rejected).is_err());
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let in_flight = InFlight::new();

        let guard = assert_ok!(in_flight.acquire("r1"));
        let err = assert_err!(in_flight.acquire("r1"));
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.status(), 409);
        assert!(in_flight.acquire("r2").is_ok());

        drop(guard);
        assert!(!in_flight.contains("r1"));
        assert!(in_flight.acquire("r1").is_ok());
    }
}
