//! Request models and response envelopes.

use serde::{Deserialize, Serialize};

use super::{de_id, de_opt_id};
use crate::api::error::ApiError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Overtime,
    #[serde(alias = "holiday-work")]
    HolidayWork,
    Expense,
    Reimbursement,
    Settlement,
    #[serde(alias = "construction-daily")]
    ConstructionDaily,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RequestType {
    /// Path segment of the creation endpoint, `POST /api/v1/requests/{segment}`
    pub fn endpoint_segment(&self) -> Option<&'static str> {
        match self {
            Self::Leave => Some("leave"),
            Self::Overtime => Some("overtime"),
            Self::HolidayWork => Some("holiday-work"),
            // Settlements are expense requests with expense_type = settlement
            Self::Expense | Self::Settlement => Some("expense"),
            Self::Reimbursement => Some("reimbursement"),
            Self::ConstructionDaily => Some("construction-daily"),
            Self::Unknown => None,
        }
    }

    /// Japanese label used in listings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Leave => "休暇",
            Self::Overtime => "時間外",
            Self::HolidayWork => "休日出勤",
            Self::Expense => "仮払・立替",
            Self::Reimbursement => "立替金",
            Self::Settlement => "仮払金精算",
            Self::ConstructionDaily => "工事日報",
            Self::Unknown => "不明",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leave => write!(f, "leave"),
            Self::Overtime => write!(f, "overtime"),
            Self::HolidayWork => write!(f, "holiday_work"),
            Self::Expense => write!(f, "expense"),
            Self::Reimbursement => write!(f, "reimbursement"),
            Self::Settlement => write!(f, "settlement"),
            Self::ConstructionDaily => write!(f, "construction_daily"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Applied,
    /// Legacy alias of `Applied` used by some screens
    Pending,
    Approved,
    Rejected,
    Returned,
    Cancelled,
    Completed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Applied => write!(f, "applied"),
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Returned => write!(f, "returned"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Completed => write!(f, "completed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl RequestStatus {
    /// Japanese label used in listings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "下書き",
            Self::Applied | Self::Pending => "申請中",
            Self::Approved => "承認済み",
            Self::Rejected => "却下",
            Self::Returned => "差戻し",
            Self::Cancelled => "取消",
            Self::Completed => "完了",
            Self::Unknown => "不明",
        }
    }
}

/// Subtype of an `expense` request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseType {
    /// Cash handed out before the expense (仮払金)
    Advance,
    Reimbursement,
    Settlement,
    #[serde(other)]
    Unknown,
}

/// A request as returned by the listing and detail endpoints.
///
/// Type-specific fields are kept in `details` as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub request_type: RequestType,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub applicant_id: Option<String>,
    #[serde(default)]
    pub applicant_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub applied_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub approved_at: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub approver_id: Option<String>,
    #[serde(default)]
    pub comments: Option<serde_json::Value>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl Request {
    /// Look a type-specific field up either at the top level or inside the
    /// nested `<kind>_request` / `details` object.
    fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        if let Some(value) = self.details.get(key) {
            return Some(value);
        }

        ["expense_request", "details"].iter().find_map(|nested| {
            self.details
                .get(*nested)
                .and_then(|obj| obj.as_object())
                .and_then(|obj| obj.get(key))
        })
    }

    /// Expense subtype, when the backend reported one
    pub fn expense_type(&self) -> Option<ExpenseType> {
        self.detail("expense_type")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether this is an advance-payment expense (仮払金申請).
    ///
    /// An expense with no reported subtype counts as an advance payment, the
    /// default subtype of the expense form.
    pub fn is_advance_payment(&self) -> bool {
        self.request_type == RequestType::Expense
            && matches!(self.expense_type(), None | Some(ExpenseType::Advance))
    }

    /// Whether an advance payment has already been settled
    pub fn is_settled(&self) -> bool {
        self.detail("is_settled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Requested or total amount in yen, if present
    pub fn amount(&self) -> Option<i64> {
        ["request_amount", "total_amount"]
            .iter()
            .find_map(|key| self.detail(key).and_then(|v| v.as_f64()))
            .map(|v| v.round() as i64)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("-")
    }
}

/// The `{success, data, total}` wrapper used by list and admin endpoints
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T: Default> Envelope<T> {
    /// Unwrap the payload; a missing `data` yields the empty value.
    ///
    /// An explicit `success: false` is a backend-reported failure.
    pub fn into_data(self) -> Result<T, ApiError> {
        if self.success == Some(false) {
            return Err(ApiError::from_status(400, "Bad Request")
                .with_message_from(self.message.as_deref()));
        }
        Ok(self.data.unwrap_or_default())
    }
}

/// Plain acknowledgement answered by mutating endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of the approve / reject / return calls
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecisionBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_date: Option<chrono::NaiveDate>,
}
