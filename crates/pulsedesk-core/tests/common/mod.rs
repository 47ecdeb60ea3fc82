#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pulsedesk_core::auth::{KeyValueStore, MemoryStore, TOKEN_KEY};
use pulsedesk_core::{ApiClient, PatientStore, ResponseOrdering, SessionManager};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "abc123";

pub fn api(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), Duration::from_secs(5))
        .expect("Failed to build test client")
        .with_initial_backoff(Duration::from_millis(10))
}

pub fn session(server: &MockServer, storage: Arc<dyn KeyValueStore>) -> SessionManager {
    SessionManager::new(api(server), storage)
}

/// Session already holding `TOKEN` plus a patient store sharing its client
pub fn logged_in(server: &MockServer, ordering: ResponseOrdering) -> (SessionManager, PatientStore) {
    let storage = Arc::new(MemoryStore::default());
    storage.set(TOKEN_KEY, TOKEN).expect("Failed to seed storage");
    let session = session(server, storage);
    let patients = PatientStore::new(session.api(), ordering);
    (session, patients)
}

pub fn login_body() -> Value {
    json!({
        "message": "Login successful",
        "token": TOKEN,
        "user": {"id": 1, "email": "a@x.com", "role": "doctor"}
    })
}

pub fn patient_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "gender": "Female",
        "birth_date": "1980-01-01",
        "contact_info": null,
        "created_at": "2024-05-01T10:00:00"
    })
}

pub async fn mount_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(server)
        .await;
}
