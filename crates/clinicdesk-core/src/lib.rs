//! Core library for clinicdesk.
//!
//! Owns the doctor's session: token persistence, expiry checks, refresh
//! coordination, and the authenticated request pipeline used for every call
//! to the clinic backend.
//!
//! The composition root builds one [`SessionManager`] and hands clones of it
//! to whatever needs tokens:
//!
//! ```no_run
//! use std::sync::Arc;
//! use clinicdesk_core::api::{ApiClient, HttpAuthApi};
//! use clinicdesk_core::auth::{NoopNavigator, SessionManager, SessionStore};
//! use clinicdesk_core::Config;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let storage = config.storage.open(&config.data_dir()?)?;
//! let auth_api = HttpAuthApi::new(config.api_base_url.clone(), config.request_timeout())?;
//! let session = SessionManager::new(
//!     SessionStore::new(storage),
//!     Arc::new(auth_api),
//!     Arc::new(NoopNavigator),
//! );
//! let api = ApiClient::new(config.api_base_url.clone(), config.request_timeout(), session)?;
//! let appointments = api.fetch_appointments(&Default::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionError, SessionManager, SessionState, TokenData};
pub use config::Config;
