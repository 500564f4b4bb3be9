use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::models::{ClassType, SlotGroup, UpcomingBooking};

/// Credentials established for one worker: bearer token plus the caller's
/// identity. Owned by exactly one worker and threaded through every call,
/// replaced only by re-authentication.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

/// The remote operations the control loop consumes. A trait so workers can
/// run against a scripted fake in tests.
#[async_trait]
pub trait ScheduleApi {
    /// Obtain a session token and resolve the caller's identity.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, ApiError>;

    /// The user's upcoming reservations for one class type.
    async fn scheduled_classes(
        &self,
        session: &Session,
        class_type: ClassType,
    ) -> Result<Vec<UpcomingBooking>, ApiError>;

    /// Live slot inventory for one class type, one group per calendar day.
    async fn slot_inventory(
        &self,
        session: &Session,
        class_type: ClassType,
    ) -> Result<Vec<SlotGroup>, ApiError>;

    /// Reserve a slot. Failures propagate unchanged; retrying here could
    /// double-book, so retries belong to the control loop.
    async fn book(&self, session: &Session, class_id: &str) -> Result<(), ApiError>;

    /// Cancel a booking. Same contract as `book`; the daemon never calls
    /// this, it backs the manual `cancel` command.
    async fn cancel(&self, session: &Session, booking_id: &str) -> Result<(), ApiError>;
}

pub struct BookingClient {
    client: Client,
    base_url: String,
    facility_id: String,
}

impl BookingClient {
    pub fn new(base_url: &str, facility_id: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            facility_id: facility_id.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Exchange credentials for a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.url("auth/local"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            debug!("Login rejected with status {}", status);
            return Err(ApiError::Auth);
        }

        let body: serde_json::Value = parse_json(resp).await?;
        let token = body
            .get("token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ApiError::DataShape("login response missing token".into()))?;
        Ok(token.to_string())
    }

    /// Resolve the authenticated user's identifier.
    pub async fn identity(&self, token: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .get(self.url("api/users/me"))
            .bearer_auth(token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            debug!("Identity lookup rejected with status {}", status);
            return Err(ApiError::Auth);
        }

        let body: serde_json::Value = parse_json(resp).await?;
        let id = body
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::DataShape("identity response missing _id".into()))?;
        Ok(id.to_string())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        session: &Session,
    ) -> Result<T, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&session.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status));
        }
        parse_json(resp).await
    }
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::DataShape(format!("{e}: {text}")))
}

#[async_trait]
impl ScheduleApi for BookingClient {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let token = self.login(email, password).await?;
        let user_id = self.identity(&token).await?;
        debug!("Authenticated as user {}", user_id);
        Ok(Session { token, user_id })
    }

    async fn scheduled_classes(
        &self,
        session: &Session,
        class_type: ClassType,
    ) -> Result<Vec<UpcomingBooking>, ApiError> {
        let path = format!("api/users/{}/upcoming", class_type.api_name());
        let bookings: Vec<UpcomingBooking> = self.get_json(&path, session).await?;
        debug!("Fetched {} upcoming {} bookings", bookings.len(), class_type);
        Ok(bookings)
    }

    async fn slot_inventory(
        &self,
        session: &Session,
        class_type: ClassType,
    ) -> Result<Vec<SlotGroup>, ApiError> {
        let path = format!(
            "api/class/gym/{}/{}",
            self.facility_id,
            class_type.api_name()
        );
        let groups: Vec<SlotGroup> = self.get_json(&path, session).await?;
        debug!("Fetched {} {} inventory days", groups.len(), class_type);
        Ok(groups)
    }

    async fn book(&self, session: &Session, class_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url(&format!("api/class/{}", class_id)))
            .bearer_auth(&session.token)
            .json(&serde_json::json!({
                "userId": session.user_id,
                "isSinglePayment": true,
            }))
            .send()
            .await?;

        let status = resp.status();
        debug!("Booking {} returned status {}", class_id, status);
        if !status.is_success() {
            return Err(ApiError::from_status(status));
        }
        Ok(())
    }

    async fn cancel(&self, session: &Session, booking_id: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .patch(self.url(&format!("api/attendance/{}/cancel", booking_id)))
            .bearer_auth(&session.token)
            .json(&serde_json::json!({ "userId": session.user_id }))
            .send()
            .await?;

        let status = resp.status();
        debug!("Cancel {} returned status {}", booking_id, status);
        if !status.is_success() {
            return Err(ApiError::from_status(status));
        }
        Ok(())
    }
}
