//! REST API client module for the clinic backend.
//!
//! - `AuthApi` / `HttpAuthApi`: login, signup, refresh and logout endpoints
//!   used by the session manager
//! - `ApiClient`: the authenticated request pipeline for every other call.
//!   It attaches the current bearer token and retries once after a refresh
//!   when the backend answers 401.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthApi, HttpAuthApi};
pub use client::{ApiClient, RequestEnvelope};
pub use error::ApiError;

/// Join a base URL and a relative endpoint path with exactly one slash.
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
