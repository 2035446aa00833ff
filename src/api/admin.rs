//! Admin-only calls.
//!
//! Each wrapper checks the stored session before sending anything: no session
//! is `UNAUTHORIZED`, a non-admin role is `FORBIDDEN`.

use reqwest::Method;
use tracing::info;

use super::client::{path_id, ApiClient};
use super::error::ApiError;
use crate::models::{
    Ack, AdminStats, Listing, NotificationSettings, PeriodFilter, Session, SummaryReport,
    UserStatus, UserStatusUpdate, UserSummary,
};

impl ApiClient {
    /// The stored session, provided it belongs to an administrator
    pub fn require_admin(&self) -> Result<Session, ApiError> {
        let session = self
            .session()
            .ok_or_else(|| ApiError::unauthorized("認証が必要です。ログインしてください。"))?;

        if !session.is_admin() {
            return Err(ApiError::forbidden("管理者権限が必要です"));
        }
        Ok(session)
    }

    pub async fn get_admin_stats(&self) -> Result<AdminStats, ApiError> {
        self.require_admin()?;
        self.get_data("/api/v1/admin/stats", &[]).await
    }

    pub async fn get_users(&self) -> Result<Vec<UserSummary>, ApiError> {
        self.require_admin()?;
        let listing: Listing<UserSummary> = self.get_plain("/api/v1/users/", &[]).await?;
        listing.into_vec()
    }

    pub async fn get_user(&self, id: &str) -> Result<UserSummary, ApiError> {
        self.require_admin()?;
        let id = path_id(id)?;
        self.get_record(&format!("/api/v1/users/{}", id), &[]).await
    }

    pub async fn update_user_status(&self, id: &str, status: UserStatus) -> Result<Ack, ApiError> {
        self.require_admin()?;
        let id = path_id(id)?;
        let ack = self
            .authenticated_request(
                Method::POST,
                &format!("/api/v1/users/{}/status", id),
                Some(&UserStatusUpdate { status }),
            )
            .await?;
        info!(user_id = id, status = %status, "User status updated");
        Ok(ack)
    }

    pub async fn get_notification_settings(&self) -> Result<NotificationSettings, ApiError> {
        self.require_admin()?;
        self.get_data("/api/v1/notifications/settings", &[]).await
    }

    pub async fn update_notification_settings(
        &self,
        settings: &NotificationSettings,
    ) -> Result<Ack, ApiError> {
        self.require_admin()?;
        super::validation::validate_time(&settings.send_time)
            .map_err(|message| ApiError::validation_field("send_time", message))?;

        self.authenticated_request(Method::PUT, "/api/v1/notifications/settings", Some(settings))
            .await
    }

    /// Send today's daily-report reminder immediately
    pub async fn send_daily_report_reminder(&self) -> Result<Ack, ApiError> {
        self.require_admin()?;
        let ack = self
            .authenticated_request::<Ack, ()>(
                Method::POST,
                "/api/v1/notifications/daily-report-reminder",
                None,
            )
            .await?;
        info!("Daily report reminder sent");
        Ok(ack)
    }

    pub async fn get_summary_report(&self, period: &PeriodFilter) -> Result<SummaryReport, ApiError> {
        self.get_plain("/api/v1/reports/summary", &period.query_pairs())
            .await
    }
}
