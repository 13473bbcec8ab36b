mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cgmsync_core::auth::SessionFile;
use cgmsync_core::{AuthError, Credentials, Session, SessionManager};

use common::*;

#[tokio::test]
async fn test_two_ensures_within_validity_log_in_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .and(header("product", "llu.ios"))
        .and(body_json(json!({ "email": EMAIL, "password": PASSWORD })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("tok-1")))
        .expect(1)
        .mount(&server)
        .await;

    let manager = SessionManager::new(libre_client(&server));
    let creds = libre_credentials();

    let first = manager.ensure_valid_session(&creds).await.expect("login");
    let second = manager.ensure_valid_session(&creds).await.expect("cached");

    let first = first.expect("session");
    assert_eq!(first.token, "tok-1");
    assert_eq!(first.account_id.as_deref(), Some("user-1"));
    assert_eq!(second.map(|s| s.token), Some("tok-1".to_string()));
    assert_eq!(manager.login_count(), 1);
}

#[tokio::test]
async fn test_concurrent_ensures_share_one_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(login_body("shared"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(SessionManager::new(libre_client(&server)));
    let creds = libre_credentials();

    let results = join_all((0..8).map(|_| {
        let manager = Arc::clone(&manager);
        let creds = creds.clone();
        tokio::spawn(async move { manager.ensure_valid_session(&creds).await })
    }))
    .await;

    for result in results {
        let session = result.expect("task").expect("login").expect("session");
        assert_eq!(session.token, "shared");
    }
    assert_eq!(manager.login_count(), 1);
}

#[tokio::test]
async fn test_nightscout_needs_no_session() {
    let server = MockServer::start().await;
    let manager = SessionManager::new(libre_client(&server));
    let creds = Credentials::nightscout("ns.example.com", "tok").expect("valid");
    assert_eq!(manager.ensure_valid_session(&creds).await, Ok(None));
    assert_eq!(manager.login_count(), 0);
}

#[tokio::test]
async fn test_bad_credentials_keep_previous_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 2, "error": { "message": "notAuthenticated" } })))
        .mount(&server)
        .await;

    let manager = SessionManager::new(libre_client(&server));
    let expired = Session::new("old", chrono::Utc::now() - chrono::Duration::minutes(1), EMAIL);
    manager.set_session(expired).await;

    let result = manager.ensure_valid_session(&libre_credentials()).await;
    assert_eq!(result, Err(AuthError::InvalidCredentials));
    assert_eq!(manager.current().await.map(|s| s.token), Some("old".to_string()));
}

#[tokio::test]
async fn test_terms_of_use_status_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 4, "data": {} })))
        .mount(&server)
        .await;

    let manager = SessionManager::new(libre_client(&server));
    let err = manager
        .ensure_valid_session(&libre_credentials())
        .await
        .expect_err("rejected");
    assert_eq!(err, AuthError::Rejected { status: 4 });
}

#[tokio::test]
async fn test_malformed_login_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let manager = SessionManager::new(libre_client(&server));
    let err = manager
        .ensure_valid_session(&libre_credentials())
        .await
        .expect_err("malformed");
    assert!(matches!(err, AuthError::MalformedResponse(_)));
    assert!(manager.current().await.is_none());
}

#[tokio::test]
async fn test_http_401_on_login_is_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let manager = SessionManager::new(libre_client(&server));
    assert_eq!(
        manager.ensure_valid_session(&libre_credentials()).await,
        Err(AuthError::InvalidCredentials)
    );
}

#[tokio::test]
async fn test_region_redirect_logs_in_against_regional_host() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "data": { "redirect": true, "region": "eu" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/eu/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("eu-token")))
        .expect(1)
        .mount(&server)
        .await;

    let client = libre_client(&server).with_region_template(format!("{}/{{region}}", server.uri()));
    let manager = SessionManager::new(client);

    let session = manager
        .ensure_valid_session(&libre_credentials())
        .await
        .expect("login")
        .expect("session");
    assert_eq!(session.token, "eu-token");
    assert_eq!(session.region.as_deref(), Some("eu"));
}

#[tokio::test]
async fn test_invalidate_only_drops_matching_token() {
    let server = MockServer::start().await;
    let manager = SessionManager::new(libre_client(&server));
    manager.set_session(valid_session("current")).await;

    assert!(!manager.invalidate("stale").await);
    assert!(manager.current().await.is_some());
    assert!(manager.invalidate("current").await);
    assert!(manager.current().await.is_none());
}

#[tokio::test]
async fn test_session_file_skips_login_after_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("persisted")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let creds = libre_credentials();

    let first = SessionManager::new(libre_client(&server))
        .with_session_file(SessionFile::new(dir.path().to_path_buf()));
    first.ensure_valid_session(&creds).await.expect("login");

    let restarted = SessionManager::new(libre_client(&server))
        .with_session_file(SessionFile::new(dir.path().to_path_buf()));
    let session = restarted
        .ensure_valid_session(&creds)
        .await
        .expect("cached")
        .expect("session");
    assert_eq!(session.token, "persisted");
    assert_eq!(restarted.login_count(), 0);

    restarted.logout().await.expect("logout");
    assert!(SessionFile::new(dir.path().to_path_buf())
        .load()
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn test_other_account_forces_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/llu/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body("other")))
        .expect(1)
        .mount(&server)
        .await;

    let manager = SessionManager::new(libre_client(&server));
    manager.set_session(valid_session("mine")).await;

    let other = Credentials::libre_link_up("someone@example.com", "pw").expect("valid");
    let session = manager
        .ensure_valid_session(&other)
        .await
        .expect("login")
        .expect("session");
    assert_eq!(session.token, "other");
    assert_eq!(session.email, "someone@example.com");
}
