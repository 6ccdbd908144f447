//! Authentication module for managing the doctor's session tokens.
//!
//! This module provides:
//! - `SessionManager`: the entry point consumers use to get a valid access
//!   token, refresh, save tokens after login, and log out
//! - `SessionStore`: durable token persistence with an in-memory mirror
//! - `TokenStorage` backends: session file, OS keychain, or memory
//! - JWT expiry evaluation (malformed tokens always count as expired)

pub mod error;
pub mod manager;
pub mod storage;
pub mod store;
pub mod token;

pub use error::SessionError;
pub use manager::{Navigator, NoopNavigator, SessionManager, SessionState, DEFAULT_ROLE};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, StorageKind, TokenStorage};
pub use store::{SessionFields, SessionStore};
pub use token::{is_token_expired, is_token_expired_at, token_expiry, TokenData};
