//! Token refresh interceptor behaviour against a mocked API.

use evento::client::{
    ApiClient, ApiRequest, ClientConfig, ClientError, CredentialStore, Credentials,
    MemoryCredentialStore, SessionEvents,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorder {
    expired: AtomicUsize,
    unverified: AtomicUsize,
}

impl SessionEvents for Recorder {
    fn session_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }

    fn email_not_verified(&self, _detail: &str) {
        self.unverified.fetch_add(1, Ordering::SeqCst);
    }
}

fn stored(access: &str, refresh: &str) -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credentials(Credentials {
        access: access.to_string(),
        refresh: refresh.to_string(),
    }))
}

fn client(server: &MockServer, store: Arc<MemoryCredentialStore>) -> ApiClient {
    ApiClient::new(ClientConfig::new(server.uri()), store).unwrap()
}

fn token_not_valid() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "detail": "Token is invalid or expired",
        "error_code": "token_not_valid"
    }))
}

fn profile() -> Value {
    json!({
        "id": 1,
        "username": "ana",
        "email": "ana@example.com",
        "role": "attendee",
        "phone": null,
        "bio": null,
        "email_verified": true,
        "is_staff": false
    })
}

#[tokio::test]
async fn test_concurrent_401s_trigger_a_single_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/events/"))
        .and(header("authorization", "Bearer old"))
        .respond_with(token_not_valid())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/events/"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_json(json!({ "refresh": "r1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": "new" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = stored("old", "r1");
    let api = client(&server, store.clone());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let api = api.clone();
        handles.push(tokio::spawn(async move {
            api.send_json::<Value>(ApiRequest::get("events/")).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), json!([]));
    }

    assert_eq!(
        store.load().await.unwrap(),
        Some(Credentials {
            access: "new".to_string(),
            refresh: "r1".to_string(),
        })
    );
}

#[tokio::test]
async fn test_failed_refresh_clears_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/events/"))
        .respond_with(token_not_valid())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Authentication credentials were not provided",
            "error_code": "not_authenticated"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(token_not_valid().set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let store = stored("old", "r1");
    let recorder = Arc::new(Recorder::default());
    let api = client(&server, store.clone()).with_events(recorder.clone());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let api = api.clone();
        handles.push(tokio::spawn(async move {
            api.send_json::<Value>(ApiRequest::get("events/")).await
        }));
    }
    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            Err(ClientError::SessionExpired)
        ));
    }

    assert!(store.load().await.unwrap().is_none());
    assert_eq!(recorder.expired.load(Ordering::SeqCst), 1);

    // The next call goes out without a bearer token
    let result = api.me().await;
    assert!(matches!(result, Err(ClientError::Unauthorized { .. })));

    let requests = server.received_requests().await.unwrap();
    let last_me = requests
        .iter()
        .rev()
        .find(|r| r.url.path() == "/api/users/me/")
        .unwrap();
    assert!(!last_me.headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_request_is_retried_at_most_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .respond_with(token_not_valid())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, stored("old", "r1"));

    match api.me().await {
        Err(ClientError::Unauthorized { detail }) => {
            assert_eq!(detail, "Token is invalid or expired")
        }
        other => panic!("expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_email_not_verified_skips_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/events/"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "detail": "Email address must be verified before using this service",
            "error_code": "EMAIL_NOT_VERIFIED",
            "email_verified": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
        .expect(0)
        .mount(&server)
        .await;

    let store = stored("old", "r1");
    let recorder = Arc::new(Recorder::default());
    let api = client(&server, store.clone()).with_events(recorder.clone());

    let result = api.send_json::<Value>(ApiRequest::get("events/")).await;
    assert!(matches!(result, Err(ClientError::EmailNotVerified { .. })));
    assert_eq!(recorder.unverified.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.expired.load(Ordering::SeqCst), 0);

    // The session survives
    assert_eq!(store.load().await.unwrap().unwrap().access, "old");
}

#[tokio::test]
async fn test_login_stores_credentials_then_me_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token/"))
        .and(body_json(json!({ "username": "ana", "password": "password123" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access": "a1", "refresh": "r1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile()))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let api = client(&server, store.clone());
    assert!(!api.is_authenticated().await);

    api.login("ana", "password123").await.unwrap();
    assert!(api.is_authenticated().await);
    assert_eq!(
        store.load().await.unwrap(),
        Some(Credentials {
            access: "a1".to_string(),
            refresh: "r1".to_string(),
        })
    );

    let me = api.me().await.unwrap();
    assert_eq!(me.username, "ana");

    api.logout().await.unwrap();
    assert!(!api.is_authenticated().await);
}

#[tokio::test]
async fn test_login_failure_surfaces_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "No active account found with the given credentials",
            "error_code": "invalid_credentials"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let api = client(&server, store.clone());

    let result = api.login("ana", "wrong").await;
    assert!(matches!(result, Err(ClientError::Unauthorized { .. })));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_access_is_refreshed_transparently() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .and(header("authorization", "Bearer old"))
        .respond_with(token_not_valid())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me/"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = stored("old", "r1");
    let api = client(&server, store.clone());

    let me = api.me().await.unwrap();
    assert_eq!(me.email, "ana@example.com");
    assert_eq!(store.load().await.unwrap().unwrap().refresh, "r1");
}

#[tokio::test]
async fn test_401_from_replaced_token_retries_without_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/events/"))
        .and(header("authorization", "Bearer old"))
        .respond_with(token_not_valid().set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/events/"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "other" })))
        .expect(0)
        .mount(&server)
        .await;

    let store = stored("old", "r1");
    let api = client(&server, store.clone());

    let pending = {
        let api = api.clone();
        tokio::spawn(async move { api.send_json::<Value>(ApiRequest::get("events/")).await })
    };

    // Another refresh finished while the request was in flight
    tokio::time::sleep(Duration::from_millis(100)).await;
    store
        .save(&Credentials {
            access: "new".to_string(),
            refresh: "r1".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(pending.await.unwrap().unwrap(), json!([]));
}

#[tokio::test]
async fn test_anonymous_requests_are_not_intercepted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "nope",
            "error_code": "not_authenticated"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "new" })))
        .expect(0)
        .mount(&server)
        .await;

    let api = client(&server, stored("old", "r1"));
    let response = api
        .execute(ApiRequest::post("users/register/").anonymous())
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 401);

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_validation_errors_are_typed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/users/register/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": "Passwords do not match",
            "error_code": "invalid",
            "field": "password"
        })))
        .mount(&server)
        .await;

    let api = client(&server, Arc::new(MemoryCredentialStore::new()));
    let request = ApiRequest::post("users/register/")
        .anonymous()
        .json(&json!({ "username": "ana" }))
        .unwrap();

    match api.send_json::<Value>(request).await {
        Err(ClientError::Validation { field, detail }) => {
            assert_eq!(field, "password");
            assert_eq!(detail, "Passwords do not match");
        }
        other => panic!("expected Validation, got {:?}", other),
    }
}
