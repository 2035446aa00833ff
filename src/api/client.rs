//! Gateway to the attendance backend.
//!
//! Every call goes through [`ApiClient`], which attaches the bearer token from
//! the injected [`SessionStore`], normalizes failures into [`ApiError`] and
//! hands authentication failures to the [`AuthBoundary`] before returning
//! them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{server_message, ApiError, ErrorCode, ValidationErrorBuilder};
use super::retry::{with_retry, RetryPolicy};
use super::validation::{validate_email, validate_id, validate_password, validate_required};
use crate::auth::{AuthBoundary, Navigator};
use crate::models::{Envelope, LoginRequest, LoginResponse, Session, User};
use crate::session::{load_session, SessionStore};
use crate::workflow::InFlight;

/// Connection settings for [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Applied to idempotent reads only
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A file answered by an export endpoint
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: bytes::Bytes,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    store: Arc<dyn SessionStore>,
    boundary: AuthBoundary,
    cancel: CancellationToken,
    pub(crate) in_flight: InFlight,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            boundary: AuthBoundary::new(store.clone(), navigator),
            store,
            cancel: CancellationToken::new(),
            in_flight: InFlight::new(),
        })
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that abandons every call made by this client when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The stored session, if a token and a readable user are both present
    pub fn session(&self) -> Option<Session> {
        load_session(self.store.as_ref())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    /// Log in and persist the session.
    ///
    /// The user record is stored exactly as the backend sent it.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let mut errors = ValidationErrorBuilder::new();
        errors.check("email", validate_required(email));
        if !email.trim().is_empty() {
            errors.check("email", validate_email(email.trim()));
        }
        errors.check("password", validate_required(password));
        if !password.is_empty() {
            errors.check("password", validate_password(password));
        }
        errors.finish()?;

        let request = self
            .http
            .post(self.url("/api/v1/auth/login"))
            .json(&LoginRequest {
                email: email.trim(),
                password,
            });
        let response = self.execute(request).await?;
        let status = response.status();

        if !status.is_success() {
            let body = self.cancellable(response.bytes()).await?.unwrap_or_default();
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .as_ref()
                .and_then(server_message);
            warn!(status = status.as_u16(), "Login rejected");
            return Err(ApiError::unauthorized(
                message.unwrap_or_else(|| "メールアドレスまたはパスワードが正しくありません".to_string()),
            )
            .with_status(status.as_u16()));
        }

        let body = self.cancellable(response.bytes()).await??;
        let login: LoginResponse = serde_json::from_slice(&body)?;

        let token = login
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unknown("ログイン応答にアクセストークンが含まれていません"))?;
        let raw_user = login
            .user
            .ok_or_else(|| ApiError::unknown("ログイン応答にユーザー情報が含まれていません"))?;

        let user: User = serde_json::from_str(raw_user.get())?;
        self.store
            .persist(&token, raw_user.get())
            .map_err(|e| ApiError::unknown(format!("セッションを保存できませんでした: {}", e)))?;

        info!(user_id = %user.id, role = %user.role, "Logged in");
        Ok(Session { token, user })
    }

    /// Log out. The local session is cleared whatever the server answers.
    pub async fn logout(&self) {
        let _clear = ClearOnDrop(self.store.as_ref());

        let Some(token) = self.store.load_token() else {
            debug!("Logout without a stored token");
            return;
        };

        let request = self
            .http
            .post(self.url("/api/v1/auth/logout"))
            .bearer_auth(token);

        match self.execute(request).await {
            Ok(response) if response.status().is_success() => info!("Logged out"),
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Server refused logout")
            }
            Err(e) => warn!(error = %e, "Logout call failed"),
        }
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_record("/api/v1/auth/me", &[]).await
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    /// Issue an authenticated call and decode the JSON answer.
    pub async fn authenticated_request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, path, &[], body).await?;
        self.decode(response).await
    }

    /// Authenticated call returning the raw response after status checks
    pub(crate) async fn send<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let Some(token) = self.store.load_token() else {
            debug!(path = path, "No stored token; refusing to send");
            self.boundary.on_unauthorized();
            return Err(ApiError::unauthorized("認証が必要です。ログインしてください。"));
        };

        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .header(AUTHORIZATION, format!("Bearer {}", token));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.execute(request).await?;
        let status = response.status();
        debug!(method = %method, path = path, status = status.as_u16(), "API call");

        if status.is_success() {
            return Ok(response);
        }

        // The status line alone decides the 401 reaction
        let unauthorized = status == StatusCode::UNAUTHORIZED;
        if unauthorized {
            self.boundary.on_unauthorized();
        }

        // The body only refines the message
        let body = match self.cancellable(response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                debug!(path = path, error = %e, "Failed to read error body");
                Bytes::new()
            }
            Err(cancelled) if !unauthorized => return Err(cancelled),
            Err(_) => Bytes::new(),
        };
        let reason = status.canonical_reason().unwrap_or("Unknown");
        let error = ApiError::from_response(status.as_u16(), reason, &body);

        if unauthorized {
            warn!(path = path, message = error.message(), "Authentication failed");
        } else if status.is_server_error() {
            warn!(path = path, status = status.as_u16(), "Backend error");
        }

        Err(error)
    }

    /// GET a single object, unwrapping the envelope when present
    pub(crate) async fn get_record<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        with_retry(self.retry, move || async move {
            let value: Value = self.fetch(path, query).await?;
            unwrap_record(value)
        })
        .await
    }

    /// GET envelope-wrapped data; missing data yields the empty value
    pub(crate) async fn get_data<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        with_retry(self.retry, move || async move {
            let envelope: Envelope<T> = self.fetch(path, query).await?;
            envelope.into_data()
        })
        .await
    }

    /// GET decoded as-is, for endpoints that answer a bare value
    pub(crate) async fn get_plain<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        with_retry(self.retry, move || self.fetch(path, query)).await
    }

    async fn fetch<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.send::<()>(Method::GET, path, query, None).await?;
        self.decode(response).await
    }

    /// Fetch a file from an export endpoint
    pub(crate) async fn download(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Download, ApiError> {
        let response = self.send::<()>(Method::GET, path, query, None).await?;
        let headers = response.headers().clone();
        let bytes = self.cancellable(response.bytes()).await??;

        let download = Download {
            filename: filename_from_headers(&headers),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            bytes,
        };
        debug!(path = path, filename = %download.filename, size = download.bytes.len(), "Downloaded");
        Ok(download)
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        let body = self.cancellable(response.bytes()).await??;

        // Empty answers (204) decode as an empty object
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        Ok(self.cancellable(request.send()).await??)
    }

    /// Race `fut` against the client's cancellation token
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, ApiError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Call cancelled");
                Err(ApiError::cancelled())
            }
            output = fut => Ok(output),
        }
    }
}

/// Clears the session when logout finishes, even if its future is dropped
struct ClearOnDrop<'a>(&'a dyn SessionStore);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.clear() {
            warn!(error = %e, "Failed to clear session");
        }
    }
}

/// Check `id` before splicing it into a URL path
pub(crate) fn path_id(id: &str) -> Result<&str, ApiError> {
    validate_id(id).map_err(|message| ApiError::validation_field("id", message))?;
    Ok(id)
}

/// Detail endpoints answer either the bare object or `{success, data}`.
fn unwrap_record<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    let is_envelope = value
        .as_object()
        .is_some_and(|obj| obj.get("success").is_some_and(Value::is_boolean));
    if !is_envelope {
        return Ok(serde_json::from_value(value)?);
    }

    let envelope: Envelope<Value> = serde_json::from_value(value)?;
    match envelope.into_data()? {
        Value::Null => Err(ApiError::new(
            ErrorCode::NotFound,
            "データが見つかりませんでした",
        )),
        data => Ok(serde_json::from_value(data)?),
    }
}

/// Filename from `Content-Disposition: attachment; filename="x.pdf"`;
/// `download` when absent.
pub fn filename_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split("filename=").nth(1))
        .map(|name| name.split(';').next().unwrap_or(name).replace('"', ""))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{harness, harness_at, truncated_reply, MockBackend, Reply};
    use crate::models::Request;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    const ADMIN: &str = r#"{"id":"u1","email":"admin@example.com","name":"管理者","role":"admin"}"#;

    #[tokio::test]
    async fn test_login_persists_and_attaches_token() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/api/v1/auth/login",
            Reply::json(200, json!({"access_token": "t1", "token_type": "bearer", "user": {"id": "u1", "email": "a@b.co", "name": "山田", "role": "user"}})),
        );
        backend.on(
            "GET",
            "/api/v1/requests/",
            Reply::json(200, json!({"success": true, "data": [], "total": 0})),
        );
        let (client, store, _nav) = harness(&backend, "/auth/login");

        let session = client.login("a@b.co", "secret1").await.unwrap();
        assert_eq!(session.token, "t1");
        assert_eq!(session.user.name, "山田");
        assert_eq!(store.load_token().as_deref(), Some("t1"));

        let requests = client.get_requests().await.unwrap();
        assert!(requests.is_empty());

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].authorization, None);
        assert_eq!(calls[0].body, json!({"email": "a@b.co", "password": "secret1"}));
        assert_eq!(calls[1].authorization.as_deref(), Some("Bearer t1"));
    }

    #[tokio::test]
    async fn test_login_stores_user_verbatim() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/api/v1/auth/login",
            Reply::raw(
                200,
                r#"{"access_token":"t1","user":{"id": 7, "role": "employee", "extra": [1, 2]}}"#,
            ),
        );
        let (client, store, _nav) = harness(&backend, "/auth/login");

        let session = client.login("a@b.co", "secret1").await.unwrap();
        assert_eq!(session.user.id, "7");
        assert!(!session.is_admin());
        assert_eq!(
            store.load_user().as_deref(),
            Some(r#"{"id": 7, "role": "employee", "extra": [1, 2]}"#)
        );
    }

    #[tokio::test]
    async fn test_login_validation_sends_nothing() {
        let backend = MockBackend::start().await;
        let (client, _store, _nav) = harness(&backend, "/auth/login");

        let err = client.login("not-an-email", "123").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_rejected_keeps_server_message() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/api/v1/auth/login",
            Reply::json(401, json!({"detail": "Incorrect email or password"})),
        );
        let (client, store, nav) = harness(&backend, "/auth/login");

        let err = client.login("a@b.co", "wrongpass").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert_eq!(err.status(), 401);
        assert_eq!(err.message(), "Incorrect email or password");
        assert!(store.load_token().is_none());
        assert_eq!(nav.redirects(), 0);
    }

    #[tokio::test]
    async fn test_login_without_token_is_unknown_error() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/api/v1/auth/login",
            Reply::json(200, json!({"user": {"id": "u1"}})),
        );
        let (client, store, _nav) = harness(&backend, "/auth/login");

        let err = client.login("a@b.co", "secret1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownError);
        assert!(store.load_token().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_clears_session_and_redirects() {
        let backend = MockBackend::start().await;
        backend.on(
            "GET",
            "/api/v1/requests/",
            Reply::json(401, json!({"message": "Token expired"})),
        );
        let (client, store, nav) = harness(&backend, "/requests");
        store.persist("t1", ADMIN).unwrap();

        let err = client.get_requests().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert_eq!(err.status(), 401);
        assert_eq!(err.message(), "Token expired");

        assert!(store.load_token().is_none());
        assert!(store.load_user().is_none());
        assert_eq!(nav.redirects(), 1);

        // 401 is never retried
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_with_truncated_body_still_clears_session() {
        let url = truncated_reply("401 Unauthorized", 100, r#"{"mess"#).await;
        let (client, store, nav) = harness_at(&url, "/requests");
        store.persist("t1", ADMIN).unwrap();

        let err = client.get_requests().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert_eq!(err.status(), 401);
        assert!(store.load_token().is_none());
        assert_eq!(nav.redirects(), 1);
    }

    #[tokio::test]
    async fn test_rejection_with_truncated_body_keeps_status() {
        let url = truncated_reply("400 Bad Request", 64, "{").await;
        let (client, store, nav) = harness_at(&url, "/requests");
        store.persist("t1", ADMIN).unwrap();

        let err = client.cancel_request("r1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.status(), 400);
        assert_eq!(store.load_token().as_deref(), Some("t1"));
        assert_eq!(nav.redirects(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_fails_without_sending() {
        let backend = MockBackend::start().await;
        let (client, _store, nav) = harness(&backend, "/dashboard");

        let err = client.get_request("r1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(backend.calls().is_empty());
        assert_eq!(nav.redirects(), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_call_fails() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/api/v1/auth/logout",
            Reply::json(500, json!({"message": "boom"})),
        );
        let (client, store, _nav) = harness(&backend, "/dashboard");
        store.persist("t1", ADMIN).unwrap();

        client.logout().await;
        assert!(store.load_token().is_none());
        assert!(store.load_user().is_none());
        assert_eq!(backend.calls()[0].authorization.as_deref(), Some("Bearer t1"));

        // Second logout is a no-op
        client.logout().await;
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_network_error() {
        let store = Arc::new(crate::session::MemorySessionStore::new());
        store.persist("t1", ADMIN).unwrap();
        let config = ClientConfig::new("http://127.0.0.1:1").with_retry(RetryPolicy::none());
        let client = ApiClient::new(
            config,
            store.clone(),
            Arc::new(crate::auth::testing::RecordingNavigator::at("/")),
        )
        .unwrap();

        let err = client.get_requests().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert_eq!(err.status(), 0);
        // Transport failures leave the session alone
        assert_eq!(store.load_token().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_login_network_error() {
        let (client, store, nav) = harness_at("http://127.0.0.1:1", "/auth/login");

        let err = client.login("a@b.co", "secret1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert_eq!(err.status(), 0);
        assert!(store.load_token().is_none());
        assert_eq!(nav.redirects(), 0);
    }

    #[tokio::test]
    async fn test_reads_retry_on_server_error() {
        let backend = MockBackend::start().await;
        backend.on_sequence(
            "GET",
            "/api/v1/requests/r1",
            vec![
                Reply::json(503, json!({"message": "maintenance"})),
                Reply::json(200, json!({"id": "r1", "type": "leave", "status": "applied"})),
            ],
        );
        let (client, store, _nav) = harness(&backend, "/requests/r1");
        store.persist("t1", ADMIN).unwrap();

        let request: Request = client.get_request("r1").await.unwrap();
        assert_eq!(request.id, "r1");
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_keeps_real_status() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/api/v1/requests/r1/submit",
            Reply::json(502, json!({})),
        );
        let (client, store, _nav) = harness(&backend, "/requests/r1");
        store.persist("t1", ADMIN).unwrap();

        let err = client.submit_request("r1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalServerError);
        assert_eq!(err.status(), 502);
        // Mutations are not retried
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_call() {
        let backend = MockBackend::start().await;
        backend.on(
            "GET",
            "/api/v1/auth/me",
            Reply::json(200, json!({"id": "u1"})).delayed(Duration::from_secs(5)),
        );
        let (client, store, _nav) = harness(&backend, "/");
        store.persist("t1", ADMIN).unwrap();

        let token = client.cancellation_token();
        let call = tokio::spawn({
            let client = client.clone();
            async move { client.current_user().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestCancelled);
        assert_eq!(err.status(), 0);
    }

    #[tokio::test]
    async fn test_record_unwraps_envelope() {
        let backend = MockBackend::start().await;
        backend.on(
            "GET",
            "/api/v1/auth/me",
            Reply::json(200, json!({"success": true, "data": {"id": 3, "name": "佐藤"}})),
        );
        let (client, store, _nav) = harness(&backend, "/");
        store.persist("t1", ADMIN).unwrap();

        let user = client.current_user().await.unwrap();
        assert_eq!(user.id, "3");
        assert_eq!(user.name, "佐藤");
    }

    #[test]
    fn test_filename_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(filename_from_headers(&headers), "download");

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"requests_20240401.csv\""),
        );
        assert_eq!(filename_from_headers(&headers), "requests_20240401.csv");

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=summary.pdf; size=1024"),
        );
        assert_eq!(filename_from_headers(&headers), "summary.pdf");
    }
}
