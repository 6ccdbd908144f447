//! Wire types for the authentication endpoints.

use serde::{Deserialize, Serialize};

/// Body returned by login, signup and refresh.
///
/// Every field is optional on the wire: refresh may send `token` or
/// `accessToken`, and may leave out the refresh token, role or email. Empty
/// strings count as omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(rename = "accessToken", default)]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl AuthResponse {
    /// The new access token, preferring `token` over `accessToken`
    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.token).or_else(|| non_empty(&self.access_token))
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    pub fn role(&self) -> Option<&str> {
        non_empty(&self.role)
    }

    pub fn email(&self) -> Option<&str> {
        non_empty(&self.email)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LogoutRequest<'a> {
    pub email: &'a str,
    #[serde(rename = "refreshToken")]
    pub refresh_token: &'a str,
}

/// Doctor registration payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct SignupData {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "passwordConfirmation")]
    pub password_confirmation: String,
    pub role: i32,
    pub specialty: String,
}

/// Who is logged in, as far as the local session knows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct UserInfo {
    pub email: Option<String>,
    pub role: Option<String>,
}
