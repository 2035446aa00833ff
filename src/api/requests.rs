//! Request listing, creation and lifecycle calls.

use chrono::NaiveDate;
use reqwest::Method;
use tracing::info;

use super::client::{path_id, ApiClient};
use super::error::ApiError;
use crate::models::{Ack, DecisionBody, Listing, Request, RequestPayload, RequestStatus};
use crate::workflow::{check_cancel, check_submit, Decision};

impl ApiClient {
    /// Requests visible to the current user
    pub async fn get_requests(&self) -> Result<Vec<Request>, ApiError> {
        let listing: Listing<Request> = self.get_plain("/api/v1/requests/", &[]).await?;
        listing.into_vec()
    }

    pub async fn get_request(&self, id: &str) -> Result<Request, ApiError> {
        let id = path_id(id)?;
        self.get_record(&format!("/api/v1/requests/{}", id), &[])
            .await
    }

    /// Requests waiting for the current user's decision
    pub async fn get_approval_requests(&self) -> Result<Vec<Request>, ApiError> {
        let listing: Listing<Request> = self.get_plain("/api/v1/approvals/", &[]).await?;
        listing.into_vec()
    }

    /// Approved advance payments that have not been settled yet
    pub async fn settleable_advances(&self) -> Result<Vec<Request>, ApiError> {
        let requests = self.get_requests().await?;
        Ok(requests
            .into_iter()
            .filter(|r| {
                r.status == RequestStatus::Approved && r.is_advance_payment() && !r.is_settled()
            })
            .collect())
    }

    /// Validate and post a new request to its kind's endpoint
    pub async fn create_request(&self, payload: &RequestPayload) -> Result<Ack, ApiError> {
        payload.validate()?;
        let body = payload.to_body()?;

        let ack: Ack = self
            .authenticated_request(Method::POST, &payload.endpoint(), Some(&body))
            .await?;
        info!(kind = %payload.request_type(), "Request created");
        Ok(ack)
    }

    pub async fn submit_request(&self, id: &str) -> Result<Ack, ApiError> {
        let id = path_id(id)?;
        let _guard = self.in_flight.acquire(id)?;
        self.authenticated_request::<Ack, ()>(
            Method::POST,
            &format!("/api/v1/requests/{}/submit", id),
            None,
        )
        .await
    }

    pub async fn cancel_request(&self, id: &str) -> Result<Ack, ApiError> {
        let id = path_id(id)?;
        let _guard = self.in_flight.acquire(id)?;
        let ack = self
            .authenticated_request::<Ack, ()>(
                Method::DELETE,
                &format!("/api/v1/requests/{}", id),
                None,
            )
            .await?;
        info!(request_id = id, "Request cancelled");
        Ok(ack)
    }

    /// Submit after checking the request is still a draft or returned
    pub async fn submit(&self, request: &Request) -> Result<Ack, ApiError> {
        check_submit(request)?;
        self.submit_request(&request.id).await
    }

    /// Cancel after checking the request is not yet final
    pub async fn cancel(&self, request: &Request) -> Result<Ack, ApiError> {
        check_cancel(request)?;
        self.cancel_request(&request.id).await
    }

    pub async fn approve_request(
        &self,
        id: &str,
        comment: Option<&str>,
        received_date: Option<NaiveDate>,
    ) -> Result<Ack, ApiError> {
        let body = DecisionBody {
            comment: comment.map(str::to_string),
            received_date,
        };
        self.post_decision(id, "approve", &body).await
    }

    pub async fn reject_request(&self, id: &str, comment: Option<&str>) -> Result<Ack, ApiError> {
        let body = DecisionBody {
            comment: comment.map(str::to_string),
            received_date: None,
        };
        self.post_decision(id, "reject", &body).await
    }

    pub async fn return_request(&self, id: &str, comment: Option<&str>) -> Result<Ack, ApiError> {
        let body = DecisionBody {
            comment: comment.map(str::to_string),
            received_date: None,
        };
        self.post_decision(id, "return", &body).await
    }

    /// Apply a decision after the client-side checks pass.
    ///
    /// Nothing is sent when the request is not awaiting a decision or an
    /// advance payment is approved without a received date.
    pub async fn decide(&self, request: &Request, decision: Decision) -> Result<Ack, ApiError> {
        let body = decision.validate(request)?;
        let ack = self
            .post_decision(&request.id, decision.action(), &body)
            .await?;
        info!(
            request_id = %request.id,
            status = %decision.next_status(),
            "Decision recorded"
        );
        Ok(ack)
    }

    async fn post_decision(
        &self,
        id: &str,
        action: &str,
        body: &DecisionBody,
    ) -> Result<Ack, ApiError> {
        let id = path_id(id)?;
        let _guard = self.in_flight.acquire(id)?;
        self.authenticated_request(
            Method::POST,
            &format!("/api/v1/requests/{}/{}", id, action),
            Some(body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::api::testing::{harness, MockBackend, Reply, PLAIN_USER};
    use crate::models::{LeaveRequest, LeaveType};
    use crate::session::SessionStore;
    use serde_json::json;
    use std::time::Duration;

    fn request(json: serde_json::Value) -> Request {
        serde_json::from_value(json).unwrap()
    }

    async fn logged_in() -> (MockBackend, ApiClient) {
        let backend = MockBackend::start().await;
        let (client, store, _nav) = harness(&backend, "/approvals");
        store.persist("t1", PLAIN_USER).unwrap();
        (backend, client)
    }

    #[tokio::test]
    async fn test_advance_payment_approve_without_date_sends_nothing() {
        let (backend, client) = logged_in().await;
        let expense = request(json!({"id": "e1", "type": "expense", "status": "applied"}));

        let err = client
            .decide(
                &expense,
                Decision::Approve {
                    comment: None,
                    received_date: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_id_is_rejected_without_sending() {
        let (backend, client) = logged_in().await;

        for id in ["r1/approve", "../users", "r1?force=1", ""] {
            let err = client.get_request(id).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
            let err = client.cancel_request(id).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
            let err = client.reject_request(id, None).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_advance_payment_approve_with_date() {
        let (backend, client) = logged_in().await;
        backend.on(
            "POST",
            "/api/v1/requests/e1/approve",
            Reply::json(200, json!({"success": true, "message": "承認しました"})),
        );
        let expense = request(json!({"id": "e1", "type": "expense", "status": "applied"}));

        let ack = client
            .decide(
                &expense,
                Decision::Approve {
                    comment: Some("確認済み".to_string()),
                    received_date: NaiveDate::from_ymd_opt(2024, 5, 10),
                },
            )
            .await
            .unwrap();
        assert_eq!(ack.message.as_deref(), Some("承認しました"));

        let calls = backend.calls();
        assert_eq!(
            calls[0].body,
            json!({"comment": "確認済み", "received_date": "2024-05-10"})
        );
    }

    #[tokio::test]
    async fn test_leave_approves_without_date() {
        let (backend, client) = logged_in().await;
        backend.on(
            "POST",
            "/api/v1/requests/l1/approve",
            Reply::json(200, json!({"success": true})),
        );
        let leave = request(json!({"id": "l1", "type": "leave", "status": "pending"}));

        client
            .decide(
                &leave,
                Decision::Approve {
                    comment: None,
                    received_date: None,
                },
            )
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/api/v1/requests/l1/approve");
        assert_eq!(calls[0].body, json!({}));
    }

    #[tokio::test]
    async fn test_backend_refusal_is_surfaced() {
        let (backend, client) = logged_in().await;
        backend.on(
            "POST",
            "/api/v1/requests/l1/reject",
            Reply::json(400, json!({"detail": "この申請は既に処理されています"})),
        );

        let err = client.reject_request("l1", Some("不備")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.message(), "この申請は既に処理されています");
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_decision_conflicts() {
        let (backend, client) = logged_in().await;
        backend.on(
            "POST",
            "/api/v1/requests/r1/return",
            Reply::json(200, json!({"success": true})).delayed(Duration::from_millis(200)),
        );

        let (first, second) = tokio::join!(
            client.return_request("r1", Some("再確認")),
            client.return_request("r1", Some("再確認")),
        );
        assert!(first.is_ok());
        let err = second.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.status(), 409);
        assert_eq!(backend.calls().len(), 1);

        // Released once the first call finished
        assert!(client.return_request("r1", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_leave_posts_nested_shape() {
        let (backend, client) = logged_in().await;
        backend.on(
            "POST",
            "/api/v1/requests/leave",
            Reply::json(200, json!({"success": true, "id": "n1"})),
        );

        let payload = RequestPayload::Leave(LeaveRequest {
            leave_type: LeaveType::Sick,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            days: 1.0,
            hours: None,
            reason: None,
            handover_notes: None,
        });
        let ack = client.create_request(&payload).await.unwrap();
        assert_eq!(ack.extra.get("id"), Some(&json!("n1")));

        let calls = backend.calls();
        assert_eq!(calls[0].body["leave_request"]["leave_type"], "sick");
        assert_eq!(calls[0].body["request"]["description"], "");
    }

    #[tokio::test]
    async fn test_cancel_uses_delete_and_accepts_empty_answer() {
        let (backend, client) = logged_in().await;
        backend.on("DELETE", "/api/v1/requests/r9", Reply::raw(200, ""));

        let draft = request(json!({"id": "r9", "type": "overtime", "status": "draft"}));
        client.cancel(&draft).await.unwrap();
        assert_eq!(backend.calls()[0].method, "DELETE");

        let approved = request(json!({"id": "r9", "type": "overtime", "status": "approved"}));
        assert!(client.cancel(&approved).await.is_err());
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_settleable_advances() {
        let (backend, client) = logged_in().await;
        backend.on(
            "GET",
            "/api/v1/requests/",
            Reply::json(
                200,
                json!({"success": true, "total": 4, "data": [
                    {"id": "a1", "type": "expense", "status": "approved", "expense_type": "advance"},
                    {"id": "a2", "type": "expense", "status": "approved", "expense_type": "advance", "is_settled": true},
                    {"id": "a3", "type": "expense", "status": "applied"},
                    {"id": "a4", "type": "expense", "status": "approved", "expense_type": "reimbursement"}
                ]}),
            ),
        );

        let advances = client.settleable_advances().await.unwrap();
        let ids: Vec<_> = advances.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[tokio::test]
    async fn test_approval_queue_missing_data_is_empty() {
        let (backend, client) = logged_in().await;
        backend.on(
            "GET",
            "/api/v1/approvals/",
            Reply::json(200, json!({"success": true})),
        );
        assert!(client.get_approval_requests().await.unwrap().is_empty());
    }
}
