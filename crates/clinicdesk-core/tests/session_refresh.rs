//! Session manager against a mocked auth backend.

mod common;

use std::sync::Arc;

use clinicdesk_core::auth::{FileStorage, SessionStore, StorageKind, TokenStorage};
use clinicdesk_core::models::SignupData;
use clinicdesk_core::{SessionManager, SessionState, TokenData};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{jwt, session, stored, CountingNavigator};

const SESSION_KEYS: [&str; 4] = ["access_token", "refresh_token", "user_role", "user_email"];

#[tokio::test]
async fn unexpired_access_token_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "C" })))
        .expect(0)
        .mount(&server)
        .await;

    let s = session(&server.uri());
    let access = jwt(3600);
    s.manager
        .save_tokens(TokenData::new(access.clone(), jwt(86_400), "doctor", "x@y.com"))
        .await
        .unwrap();

    assert_eq!(s.manager.get_valid_access_token().await, Some(access));
}

#[tokio::test]
async fn expired_access_token_refreshes_once_and_keeps_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "B" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "C" })))
        .expect(1)
        .mount(&server)
        .await;

    let s = session(&server.uri());
    s.manager
        .save_tokens(TokenData::new(jwt(-60), "B", "doctor", "x@y.com"))
        .await
        .unwrap();
    assert_eq!(s.manager.state(), SessionState::Invalid);

    assert_eq!(s.manager.get_valid_access_token().await.as_deref(), Some("C"));
    assert_eq!(stored(&s.storage, "access_token").as_deref(), Some("C"));
    assert_eq!(stored(&s.storage, "refresh_token").as_deref(), Some("B"));
    assert_eq!(stored(&s.storage, "user_role").as_deref(), Some("doctor"));
    assert_eq!(stored(&s.storage, "user_email").as_deref(), Some("x@y.com"));
    assert_eq!(s.navigator.redirects(), 0);
}

#[tokio::test]
async fn stale_session_refreshes_with_access_token_field() {
    let server = MockServer::start().await;
    let new_access = jwt(3600);
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": new_access,
            "refreshToken": "R2",
            "email": "new@y.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let s = session(&server.uri());
    s.manager
        .save_tokens(TokenData::new(jwt(-60), jwt(86_400), "doctor", "x@y.com"))
        .await
        .unwrap();
    assert_eq!(s.manager.state(), SessionState::Stale);

    assert_eq!(s.manager.get_valid_access_token().await, Some(new_access));
    assert_eq!(s.manager.state(), SessionState::Authenticated);
    assert_eq!(s.manager.current_refresh_token().as_deref(), Some("R2"));
    assert_eq!(s.manager.user_info().email.as_deref(), Some("new@y.com"));
}

#[tokio::test]
async fn rejected_refresh_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(403).set_body_string("refresh token revoked"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(body_json(json!({ "email": "x@y.com", "refreshToken": "B" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let s = session(&server.uri());
    s.manager
        .save_tokens(TokenData::new(jwt(-60), "B", "doctor", "x@y.com"))
        .await
        .unwrap();

    assert_eq!(s.manager.get_valid_access_token().await, None);
    assert!(!s.manager.is_logged_in().await);
    assert_eq!(s.manager.state(), SessionState::Anonymous);
    assert_eq!(s.navigator.redirects(), 1);
    for key in SESSION_KEYS {
        assert_eq!(stored(&s.storage, key), None, "{} should be cleared", key);
    }
}

#[tokio::test]
async fn malformed_refresh_body_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let s = session(&server.uri());
    s.manager
        .save_tokens(TokenData::new(jwt(-60), "B", "doctor", "x@y.com"))
        .await
        .unwrap();

    assert_eq!(s.manager.force_refresh().await, None);
    assert_eq!(stored(&s.storage, "access_token"), None);
}

#[tokio::test]
async fn unreachable_backend_still_logs_out_locally() {
    // Nothing listens on the mock server once it is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let s = session(&uri);
    s.manager
        .save_tokens(TokenData::new(jwt(-60), jwt(86_400), "doctor", "x@y.com"))
        .await
        .unwrap();

    assert_eq!(s.manager.get_valid_access_token().await, None);
    assert!(!s.manager.is_logged_in().await);
    assert_eq!(s.navigator.redirects(), 1);
}

#[tokio::test]
async fn logout_clears_even_when_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let s = session(&server.uri());
    s.manager
        .save_tokens(TokenData::new(jwt(3600), jwt(86_400), "doctor", "x@y.com"))
        .await
        .unwrap();
    assert!(s.manager.is_logged_in().await);

    s.manager.logout().await;

    assert!(!s.manager.is_logged_in().await);
    assert_eq!(s.navigator.redirects(), 1);
    for key in SESSION_KEYS {
        assert_eq!(stored(&s.storage, key), None);
    }
}

#[tokio::test]
async fn login_saves_tokens_with_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "x@y.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "A" })))
        .mount(&server)
        .await;

    let s = session(&server.uri());
    let data = s.manager.login("x@y.com", "pw").await.unwrap();

    assert_eq!(data, TokenData::new("A", "A", "doctor", "x@y.com"));
    assert_eq!(stored(&s.storage, "refresh_token").as_deref(), Some("A"));
}

#[tokio::test]
async fn login_rejection_saves_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let s = session(&server.uri());
    assert!(s.manager.login("x@y.com", "wrong").await.is_err());
    assert_eq!(s.manager.current_access_token(), None);
}

#[tokio::test]
async fn signup_saves_tokens_only_when_issued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/signup"))
        .and(body_partial_json(json!({ "email": "new@y.com" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "token": "A", "role": "doctor" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/signup"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "message": "created" })))
        .mount(&server)
        .await;

    let s = session(&server.uri());
    let signup = |email: &str| SignupData {
        name: "Dr. Who".to_string(),
        email: email.to_string(),
        password: "pw".to_string(),
        password_confirmation: "pw".to_string(),
        role: 1,
        specialty: "General".to_string(),
    };

    assert_eq!(s.manager.signup(&signup("pending@y.com")).await.unwrap(), None);
    assert_eq!(stored(&s.storage, "access_token"), None);

    let data = s.manager.signup(&signup("new@y.com")).await.unwrap();
    assert_eq!(data, Some(TokenData::new("A", "A", "doctor", "new@y.com")));
    assert_eq!(stored(&s.storage, "user_email").as_deref(), Some("new@y.com"));
}

#[tokio::test]
async fn file_storage_round_trips_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let data = TokenData::new("A", "B", "doctor", "x@y.com");

    let open = || {
        let storage = StorageKind::File.open(dir.path()).unwrap();
        SessionManager::new(
            SessionStore::new(storage),
            Arc::new(clinicdesk_core::api::HttpAuthApi::new(server.uri(), common::TIMEOUT).unwrap()),
            Arc::new(CountingNavigator::default()),
        )
    };

    open().save_tokens(data.clone()).await.unwrap();

    let restarted = open();
    restarted.initialize().await;
    assert_eq!(restarted.current_access_token().as_deref(), Some("A"));
    assert_eq!(restarted.current_refresh_token().as_deref(), Some("B"));
    let info = restarted.user_info();
    assert_eq!(info.email.as_deref(), Some("x@y.com"));
    assert_eq!(info.role.as_deref(), Some("doctor"));

    restarted.clear_tokens();
    let file = FileStorage::new(dir.path().join("session.json"));
    assert!(!file.path().exists());
    assert_eq!(file.get("access_token").unwrap(), None);
}
