//! Unified error taxonomy for the API client.
//!
//! Every failure the client can produce (transport errors, backend error
//! payloads, malformed responses, client-side validation) is normalized into
//! a single [`ApiError`] carrying a machine-readable [`ErrorCode`], an
//! HTTP-like status and a non-empty, user-facing message.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Error codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Transport
    NetworkError,
    RequestCancelled,

    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    TooManyRequests,
    ValidationError,

    // Server errors (5xx)
    InternalServerError,
    UnknownError,
}

impl ErrorCode {
    /// Get the default status for this error code (0 for transport-level failures)
    pub fn default_status(&self) -> u16 {
        match self {
            ErrorCode::NetworkError => 0,
            ErrorCode::RequestCancelled => 0,
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::ValidationError => 400,
            ErrorCode::InternalServerError => 500,
            ErrorCode::UnknownError => 500,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::RequestCancelled => "REQUEST_CANCELLED",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// User-facing message used when the backend supplied none
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::NetworkError => {
                "サーバーに接続できませんでした。ネットワーク接続を確認してください。"
            }
            ErrorCode::RequestCancelled => "リクエストはキャンセルされました。",
            ErrorCode::BadRequest => "入力内容に問題があります。",
            ErrorCode::Unauthorized => "認証が必要です。再度ログインしてください。",
            ErrorCode::Forbidden => "この操作を行う権限がありません。",
            ErrorCode::NotFound => "要求されたリソースが見つかりません。",
            ErrorCode::Conflict => "他の操作と競合しました。最新の状態を確認してください。",
            ErrorCode::TooManyRequests => {
                "リクエストが多すぎます。しばらく時間をおいてください。"
            }
            ErrorCode::ValidationError => "入力エラーがあります。",
            ErrorCode::InternalServerError => {
                "サーバーエラーが発生しました。しばらく時間をおいてください。"
            }
            ErrorCode::UnknownError => "予期しないエラーが発生しました。",
        }
    }

    /// Whether a failure with this code may succeed when attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError | ErrorCode::TooManyRequests | ErrorCode::InternalServerError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional error details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    /// Field-level validation errors
    ValidationErrors(BTreeMap<String, Vec<String>>),
    /// Raw backend error payload
    Generic(HashMap<String, serde_json::Value>),
}

/// Unified client error type
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    status: u16,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    /// Create a new error with a specific code and message.
    ///
    /// A blank message falls back to the code's default message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.default_message().to_string()
        } else {
            message
        };

        Self {
            status: code.default_status(),
            code,
            message,
            details: None,
        }
    }

    /// Create an error carrying the code's default message
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Override the status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Replace the message when `message` is present and not blank
    pub fn with_message_from(mut self, message: Option<&str>) -> Self {
        if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
            self.message = message.to_string();
        }
        self
    }

    /// Add details to the error
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        self.details.as_ref()
    }

    /// True for missing, expired or rejected credentials
    pub fn is_auth_error(&self) -> bool {
        self.code == ErrorCode::Unauthorized || self.status == 401
    }

    // -------------------------------------------------------------------------
    // Normalization
    // -------------------------------------------------------------------------

    /// Map an HTTP status to its taxonomy entry.
    ///
    /// The result depends only on `status` and `reason`.
    pub fn from_status(status: u16, reason: &str) -> Self {
        let code = match status {
            400 => ErrorCode::BadRequest,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            429 => ErrorCode::TooManyRequests,
            500..=599 => ErrorCode::InternalServerError,
            _ => {
                return Self::new(
                    ErrorCode::UnknownError,
                    format!("サーバーエラー ({}): {}", status, reason),
                )
                .with_status(status)
            }
        };

        Self::from_code(code).with_status(status)
    }

    /// Build an error from a non-2xx response.
    ///
    /// The server's own message wins over the taxonomy default; the parsed
    /// body is attached as details when it is a JSON object.
    pub fn from_response(status: u16, reason: &str, body: &[u8]) -> Self {
        let mut error = Self::from_status(status, reason);

        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return error;
        };

        if let Some(message) = server_message(&value) {
            error.message = message;
        }

        if let Some(fields) = detail_field_errors(&value) {
            error.details = Some(ErrorDetails::ValidationErrors(fields));
        } else if let serde_json::Value::Object(map) = value {
            error.details = Some(ErrorDetails::Generic(map.into_iter().collect()));
        }

        error
    }

    // -------------------------------------------------------------------------
    // Convenience constructors
    // -------------------------------------------------------------------------

    /// Transport failure (status 0)
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Missing or rejected credentials (401)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Authenticated but not allowed (403)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Conflicting operation (409)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// The call was abandoned through the client's cancellation token
    pub fn cancelled() -> Self {
        Self::from_code(ErrorCode::RequestCancelled)
    }

    /// Response that could not be interpreted
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnknownError, message)
    }

    /// Client-side validation failure with field-level details
    pub fn validation(errors: BTreeMap<String, Vec<String>>) -> Self {
        let summary = errors
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| format!("{}: {}", field, m))
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self::new(ErrorCode::ValidationError, format!("入力エラー: {}", summary))
            .with_details(ErrorDetails::ValidationErrors(errors))
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

/// Extract a human-readable message from a backend error body.
///
/// Accepts `{"message": ..}`, `{"detail": "..."}` and the list form
/// `{"detail": [{"loc": [..], "msg": ".."}]}`.
pub(crate) fn server_message(value: &serde_json::Value) -> Option<String> {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };

    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        if let Some(message) = non_empty(message) {
            return Some(message);
        }
    }

    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => non_empty(detail),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
            .find_map(non_empty),
        _ => None,
    }
}

fn detail_field_errors(value: &serde_json::Value) -> Option<BTreeMap<String, Vec<String>>> {
    let items = value.get("detail")?.as_array()?;
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for item in items {
        let Some(msg) = item.get("msg").and_then(|m| m.as_str()) else {
            continue;
        };
        let field = item
            .get("loc")
            .and_then(|loc| loc.as_array())
            .and_then(|loc| loc.last())
            .map(|last| match last {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "body".to_string());
        errors.entry(field).or_default().push(msg.to_string());
    }

    (!errors.is_empty()).then_some(errors)
}

// -------------------------------------------------------------------------
// Conversion implementations for transport errors
// -------------------------------------------------------------------------

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        tracing::debug!(error = %err, "HTTP transport error");

        if err.is_timeout() {
            ApiError::network("サーバーからの応答がタイムアウトしました。しばらく時間をおいてください。")
        } else if err.is_connect() || err.is_request() {
            ApiError::from_code(ErrorCode::NetworkError)
        } else if err.is_decode() || err.is_body() {
            ApiError::unknown("サーバーからの応答を解釈できませんでした。")
        } else if let Some(status) = err.status() {
            ApiError::from_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            )
        } else if err.is_builder() {
            ApiError::unknown(format!("リクエストを作成できませんでした: {}", err))
        } else {
            ApiError::from_code(ErrorCode::NetworkError)
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::warn!(error = %err, "Malformed response body");
        ApiError::unknown("サーバーからの応答を解釈できませんでした。")
    }
}

// -------------------------------------------------------------------------
// Builder for validation errors
// -------------------------------------------------------------------------

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    /// Create a new validation error builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the outcome of a validator returning `Result<(), String>`
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Build the ApiError if there are any errors
    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
