//! Backend authentication endpoints.
//!
//! The session manager talks to the backend only through [`AuthApi`], so
//! tests and alternative transports can stand in for [`HttpAuthApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::models::auth::{LoginRequest, LogoutRequest, RefreshRequest};
use crate::models::{AuthResponse, SignupData};

use super::{endpoint_url, ApiError};

const LOGIN_PATH: &str = "auth/login";
const SIGNUP_PATH: &str = "auth/signup";
const REFRESH_PATH: &str = "auth/refresh";
const LOGOUT_PATH: &str = "auth/logout";

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn signup(&self, data: &SignupData) -> Result<AuthResponse, ApiError>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;

    /// Tell the backend the refresh token is no longer in use.
    async fn logout(&self, email: &str, refresh_token: &str) -> Result<(), ApiError>;
}

/// [`AuthApi`] over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing connection pool
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let url = endpoint_url(&self.base_url, path);
        debug!(url = %url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        check_response(response).await
    }

    async fn post_for_tokens<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, ApiError> {
        let response = self.post(path, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{} response: {}", path, e)))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.post_for_tokens(LOGIN_PATH, &LoginRequest { email, password })
            .await
    }

    async fn signup(&self, data: &SignupData) -> Result<AuthResponse, ApiError> {
        self.post_for_tokens(SIGNUP_PATH, data).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        self.post_for_tokens(REFRESH_PATH, &RefreshRequest { refresh_token })
            .await
    }

    async fn logout(&self, email: &str, refresh_token: &str) -> Result<(), ApiError> {
        self.post(
            LOGOUT_PATH,
            &LogoutRequest {
                email,
                refresh_token,
            },
        )
        .await?;
        Ok(())
    }
}

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}
