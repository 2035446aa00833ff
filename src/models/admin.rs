//! Admin dashboard models.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::de_id;
use super::request::{Envelope, RequestStatus, RequestType};
use super::user::Role;
use crate::api::error::ApiError;

/// Dashboard counters from `GET /api/v1/admin/stats`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminStats {
    pub total_requests: u64,
    pub pending_requests: u64,
    pub approved_requests: u64,
    pub rejected_requests: u64,
    pub total_users: u64,
    pub active_users: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// A row of the admin user list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub last_login: Option<String>,
}

impl UserSummary {
    /// Status column; derived from `is_active` when no status string is sent
    pub fn status_label(&self) -> &str {
        match (&self.status, self.is_active) {
            (Some(status), _) => status,
            (None, Some(false)) => "inactive",
            (None, _) => "active",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatusUpdate {
    pub status: UserStatus,
}

/// Daily-report reminder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// HH:MM, local time of the backend
    pub send_time: String,
    pub skip_weekends: bool,
    pub skip_holidays: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            send_time: "18:00".to_string(),
            skip_weekends: true,
            skip_holidays: true,
        }
    }
}

/// Period filter shared by the summary report and summary export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl PeriodFilter {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_date {
            pairs.push(("start_date", start.to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date", end.to_string()));
        }
        pairs
    }
}

/// Filters for the request exports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilters {
    pub status: Option<RequestStatus>,
    pub request_type: Option<RequestType>,
    pub period: PeriodFilter,
}

impl ExportFilters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(kind) = self.request_type {
            pairs.push(("type", kind.to_string()));
        }
        pairs.extend(self.period.query_pairs());
        pairs
    }
}

/// Aggregates returned by `GET /api/v1/reports/summary`.
///
/// The breakdowns vary by backend version and are kept as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryReport {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Some list endpoints answer a bare array, others the `{success, data}`
/// envelope. Items that fail to decode are dropped, not the whole list.
#[derive(Debug, Deserialize)]
#[serde(untagged, bound = "T: DeserializeOwned")]
pub enum Listing<T> {
    Plain(Vec<Lenient<T>>),
    Wrapped(Envelope<Vec<Lenient<T>>>),
}

impl<T> Listing<T> {
    pub fn into_vec(self) -> Result<Vec<T>, ApiError> {
        let items = match self {
            Self::Plain(items) => items,
            Self::Wrapped(envelope) => envelope.into_data()?,
        };
        Ok(items.into_iter().filter_map(|item| item.0).collect())
    }
}

/// One list element; `None` when it did not decode
#[derive(Debug)]
pub struct Lenient<T>(Option<T>);

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match serde_json::from_value(value) {
            Ok(item) => Ok(Self(Some(item))),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed list item");
                Ok(Self(None))
            }
        }
    }
}
