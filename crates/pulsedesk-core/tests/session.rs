mod common;

use std::sync::Arc;
use std::time::Duration;

use pulsedesk_core::auth::{FileStore, KeyValueStore, MemoryStore, TOKEN_KEY, USER_KEY};
use pulsedesk_core::models::{Role, User};
use pulsedesk_core::{PatientStore, ResponseOrdering, Session};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

#[tokio::test]
async fn test_login_stores_and_persists_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStore::default());
    let session = session(&server, storage.clone());

    assert!(session.login("a@x.com", "secret").await);

    let user = session.user().expect("user should be set");
    assert_eq!(user.id, 1);
    assert_eq!(user.role, Role::Doctor);
    assert_eq!(session.credential().as_deref(), Some(TOKEN));
    assert!(session.last_error().is_none());
    assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some(TOKEN));

    let stored_user: User = serde_json::from_str(&storage.get(USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored_user, user);
}

#[tokio::test]
async fn test_failed_login_keeps_previous_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid email or password"})),
        )
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStore::default());
    storage.set(TOKEN_KEY, "previous").unwrap();
    let session = session(&server, storage.clone());
    let before = session.snapshot();

    assert!(!session.login("a@x.com", "wrong").await);

    let after = session.snapshot();
    assert_eq!(after.user, before.user);
    assert_eq!(after.credential, before.credential);
    assert_eq!(after.last_error.as_deref(), Some("Invalid email or password"));
    // No storage writes on failure
    assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("previous"));
}

#[tokio::test]
async fn test_login_transport_failure_records_message() {
    // Port 9 (discard) is not listening on loopback
    let storage = Arc::new(MemoryStore::default());
    let api = pulsedesk_core::ApiClient::new("http://127.0.0.1:9", std::time::Duration::from_secs(2)).unwrap();
    let session = pulsedesk_core::SessionManager::new(api, storage);

    assert!(!session.login("a@x.com", "secret").await);
    assert!(!session.is_authenticated());
    let message = session.last_error().expect("transport failure should be recorded");
    assert!(!message.is_empty());
}

#[tokio::test]
async fn test_logout_then_failed_login_leaves_session_cleared() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid email or password"})))
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStore::default());
    let session = session(&server, storage.clone());
    assert!(session.login("a@x.com", "secret").await);

    session.logout();
    session.logout();
    assert!(!session.login("a@x.com", "wrong").await);

    assert!(session.user().is_none());
    assert!(session.credential().is_none());
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(USER_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_register_defaults_role_and_does_not_log_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(body_json(json!({"email": "new@x.com", "password": "pw", "role": "doctor"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "User registered successfully"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, Arc::new(MemoryStore::default()));
    assert!(session.register("new@x.com", "pw", None).await);
    assert_eq!(session.snapshot(), Session::default());
}

#[tokio::test]
async fn test_register_with_explicit_role() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(body_json(json!({"email": "boss@x.com", "password": "pw", "role": "admin"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "User registered successfully"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, Arc::new(MemoryStore::default()));
    assert!(session.register("boss@x.com", "pw", Some(Role::Admin)).await);
}

#[tokio::test]
async fn test_register_conflict_records_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "Email already exists"})))
        .mount(&server)
        .await;

    let session = session(&server, Arc::new(MemoryStore::default()));
    assert!(!session.register("a@x.com", "pw", None).await);
    assert_eq!(session.last_error().as_deref(), Some("Email already exists"));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_error_cleared_by_next_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "Internal server error"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_login_ok(&server).await;

    let session = session(&server, Arc::new(MemoryStore::default()));
    assert!(!session.login("a@x.com", "secret").await);
    assert_eq!(session.last_error().as_deref(), Some("Internal server error"));

    assert!(session.login("a@x.com", "secret").await);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn test_session_survives_restart_with_file_storage() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    let first = session(&server, Arc::new(FileStore::new(path.clone())));
    assert!(first.login("a@x.com", "secret").await);
    drop(first);

    let second = session(&server, Arc::new(FileStore::new(path.clone())));
    assert_eq!(second.credential().as_deref(), Some(TOKEN));
    assert_eq!(second.user().map(|u| u.id), Some(1));

    second.logout();
    let third = session(&server, Arc::new(FileStore::new(path)));
    assert!(!third.is_authenticated());
}

#[tokio::test]
async fn test_auth_requests_carry_no_credential() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;

    let (session, _patients) = logged_in(&server, ResponseOrdering::LastCompleted);
    assert!(session.login("a@x.com", "secret").await);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_rejected_credential_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(header("Authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid or expired token"})))
        .expect(1)
        .mount(&server)
        .await;

    let (session, patients) = logged_in(&server, ResponseOrdering::LastCompleted);
    let mut updates = session.subscribe();
    assert!(!patients.fetch_all().await);

    assert!(!session.is_authenticated());
    assert_eq!(patients.last_error().as_deref(), Some("Invalid or expired token"));
    assert!(session.last_error().is_some());
    assert!(updates.has_changed().unwrap());
}

#[tokio::test]
async fn test_login_replaces_credential_for_later_requests() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(header("Authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, Arc::new(MemoryStore::default()));
    let patients = PatientStore::new(session.api(), ResponseOrdering::LastCompleted);
    assert!(session.login("a@x.com", "secret").await);
    assert!(patients.fetch_all().await);
}

/// Memory storage that stalls after writing one particular token
struct StallingStore {
    inner: MemoryStore,
    stall_on: &'static str,
    stall: Duration,
}

impl KeyValueStore for StallingStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set(key, value)?;
        if key == TOKEN_KEY && value == self.stall_on {
            std::thread::sleep(self.stall);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }
}

fn login_response(id: i64, token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "message": "Login successful",
        "token": token,
        "user": {"id": id, "email": format!("user{}@x.com", id), "role": "doctor"}
    }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_keep_storage_and_memory_in_step() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "secret"})))
        .respond_with(login_response(1, "tokA"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "b@x.com", "password": "secret"})))
        .respond_with(login_response(2, "tokB").set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let storage = Arc::new(StallingStore {
        inner: MemoryStore::default(),
        stall_on: "tokA",
        stall: Duration::from_millis(300),
    });
    let session = session(&server, storage.clone());

    let a = tokio::spawn({
        let session = session.clone();
        async move { session.login("a@x.com", "secret").await }
    });
    let b = tokio::spawn({
        let session = session.clone();
        async move { session.login("b@x.com", "secret").await }
    });
    assert!(a.await.unwrap());
    assert!(b.await.unwrap());

    let memory = session.snapshot();
    let stored_user: User = serde_json::from_str(&storage.get(USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), memory.credential);
    assert_eq!(Some(stored_user), memory.user);
    // The stalled login finished its write before the other could start
    assert_eq!(memory.credential.as_deref(), Some("tokB"));
}

#[tokio::test]
async fn test_login_recovers_from_corrupt_storage_file() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    std::fs::write(&path, "{truncated").unwrap();

    let first = session(&server, Arc::new(FileStore::new(path.clone())));
    assert!(!first.is_authenticated());

    assert!(first.login("a@x.com", "secret").await);
    assert!(first.last_error().is_none());

    let restarted = session(&server, Arc::new(FileStore::new(path.clone())));
    assert_eq!(restarted.credential().as_deref(), Some(TOKEN));

    restarted.logout();
    assert!(restarted.last_error().is_none());
    assert!(!path.exists());
}
