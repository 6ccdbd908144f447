//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use clinicdesk_core::api::{ApiClient, HttpAuthApi};
use clinicdesk_core::auth::{MemoryStorage, Navigator, SessionManager, SessionStore, TokenStorage};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Unsigned JWT whose `exp` is `offset_secs` from now
pub fn jwt(offset_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({ "sub": "doctor-1", "exp": Utc::now().timestamp() + offset_secs });
    format!("{}.{}.sig", header, URL_SAFE_NO_PAD.encode(claims.to_string()))
}

#[derive(Default)]
pub struct CountingNavigator {
    redirects: AtomicUsize,
}

impl CountingNavigator {
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestSession {
    pub manager: SessionManager,
    pub navigator: Arc<CountingNavigator>,
    pub storage: Arc<MemoryStorage>,
}

/// Session manager backed by memory storage, talking HTTP to `base_url`
pub fn session(base_url: &str) -> TestSession {
    session_with_storage(base_url, Arc::new(MemoryStorage::default()))
}

pub fn session_with_storage(base_url: &str, storage: Arc<MemoryStorage>) -> TestSession {
    let navigator = Arc::new(CountingNavigator::default());
    let auth_api = HttpAuthApi::new(base_url, TIMEOUT).unwrap();
    let manager = SessionManager::new(
        SessionStore::new(Box::new(storage.clone())),
        Arc::new(auth_api),
        navigator.clone(),
    );
    TestSession {
        manager,
        navigator,
        storage,
    }
}

pub fn api_client(base_url: &str, session: &SessionManager) -> ApiClient {
    ApiClient::new(base_url, TIMEOUT, session.clone()).unwrap()
}

pub fn stored(storage: &MemoryStorage, key: &str) -> Option<String> {
    storage.get(key).unwrap()
}
