//! Authenticated request pipeline for the clinic API.
//!
//! Every call goes through [`ApiClient::send`]: it asks the session manager
//! for a valid access token, attaches it as a bearer header, and on a 401
//! refreshes once and resends the same request. The retry budget travels
//! with the request in its [`RequestEnvelope`].

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::auth::SessionManager;
use crate::models::{
    AppointmentStatus, AppointmentsParams, AppointmentsResponse, AvailabilitySlot,
    AvailabilityUpdate,
};

use super::auth::check_response;
use super::{endpoint_url, ApiError};

// ============================================================================
// Constants
// ============================================================================

/// Resends allowed after a 401 and a successful refresh
pub const DEFAULT_AUTH_RETRIES: u8 = 1;

/// A request and how many more times it may be resent after a 401.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    retries_remaining: u8,
}

impl RequestEnvelope {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retries_remaining: DEFAULT_AUTH_RETRIES,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn retries(mut self, retries: u8) -> Self {
        self.retries_remaining = retries;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn retries_remaining(&self) -> u8 {
        self.retries_remaining
    }

    /// The same request with one retry spent
    fn retried(mut self) -> Self {
        self.retries_remaining = self.retries_remaining.saturating_sub(1);
        self
    }
}

/// API client for the clinic backend.
/// Clone is cheap - reqwest::Client and SessionManager are both shared handles.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: SessionManager,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, session))
    }

    /// Build on an existing connection pool
    pub fn with_client(client: Client, base_url: impl Into<String>, session: SessionManager) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send a request with the current access token, refreshing and
    /// resending after a 401 while the envelope has retries left.
    ///
    /// Without a token the request goes out unauthenticated. A 401 that
    /// survives the retry, or a failed refresh, comes back as
    /// [`ApiError::Unauthorized`].
    pub async fn send(&self, envelope: RequestEnvelope) -> Result<reqwest::Response, ApiError> {
        let mut envelope = envelope;
        let mut token = self.session.get_valid_access_token().await;

        loop {
            let response = self.dispatch(&envelope, token.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED || envelope.retries_remaining == 0 {
                return check_response(response).await;
            }

            debug!(path = %envelope.path, "Unauthorized, refreshing access token");
            match self.session.force_refresh().await {
                Some(new_token) => {
                    info!(path = %envelope.path, "Retrying request with refreshed token");
                    token = Some(new_token);
                    envelope = envelope.retried();
                }
                None => return check_response(response).await,
            }
        }
    }

    /// Send and parse a JSON response body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        envelope: RequestEnvelope,
    ) -> Result<T, ApiError> {
        let path = envelope.path.clone();
        let response = self.send(envelope).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = endpoint_url(&self.base_url, &envelope.path);
        let mut request = self.client.request(envelope.method.clone(), &url);
        if !envelope.query.is_empty() {
            request = request.query(&envelope.query);
        }
        if let Some(ref body) = envelope.body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        debug!(
            method = %envelope.method,
            url = %url,
            authenticated = token.is_some(),
            retries_remaining = envelope.retries_remaining,
            "Sending request"
        );
        Ok(request.send().await?)
    }

    // ===== Appointments =====

    /// Fetch the logged-in doctor's appointments, one page at a time
    pub async fn fetch_appointments(
        &self,
        params: &AppointmentsParams,
    ) -> Result<AppointmentsResponse, ApiError> {
        let mut envelope = RequestEnvelope::get("appointments/doctor/me");
        for (key, value) in params.to_query() {
            envelope = envelope.query(key, value);
        }
        self.send_json(envelope).await
    }

    pub async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<(), ApiError> {
        let envelope = RequestEnvelope::patch(format!("appointments/{}/status", appointment_id))
            .json(&serde_json::json!({ "status": status }))?;
        self.send(envelope).await?;
        Ok(())
    }

    // ===== Availability =====

    /// Fetch the doctor's availability slots for one day
    pub async fn fetch_availability(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, ApiError> {
        let envelope = RequestEnvelope::get("availability/my-slots")
            .query("date", date.format("%Y-%m-%d").to_string());
        self.send_json(envelope).await
    }

    pub async fn update_availability(&self, update: &AvailabilityUpdate) -> Result<(), ApiError> {
        let envelope = RequestEnvelope::post("availability/update").json(update)?;
        self.send(envelope).await?;
        Ok(())
    }
}
