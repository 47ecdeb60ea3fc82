//! API client for the patient monitoring backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! API requests for login, registration and patient data.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{CreatedPatient, Heartbeat, NewPatient, Patient, PatientId, PatientStatus, Role, User};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of retries for rate-limited (429) requests.
const DEFAULT_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Source of the bearer credential attached to authenticated requests.
///
/// The client asks for the token right before each request is dispatched, so
/// a login or logout takes effect on the very next request.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    /// Called when the backend answered 401 to a request that carried `token`.
    fn token_rejected(&self, _token: &str) {}
}

/// Body of a successful `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    role: &'a Role,
}

/// API client for the backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    tokens: Option<Arc<dyn TokenProvider>>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("has_token_provider", &self.tokens.is_some())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ApiClient {
    /// Create a new API client for the given backend base URL
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot be used as a base: {}", base_url);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            tokens: None,
            max_retries: DEFAULT_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.api_base_url, config.request_timeout())?
            .with_rate_limit_retries(config.rate_limit_retries))
    }

    /// Attach the source of bearer tokens, sharing the connection pool.
    pub fn with_token_provider(&self, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            tokens: Some(tokens),
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
        }
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new(), so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Build the authorization header from the current token, if any.
    /// Returns the token used so a 401 can be reported against it.
    fn auth_headers(&self) -> (header::HeaderMap, Option<String>) {
        let mut headers = header::HeaderMap::new();
        let token = self.tokens.as_ref().and_then(|t| t.bearer_token());
        if let Some(ref token) = token {
            match header::HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => {
                    warn!("Stored token is not a valid header value, sending request without it");
                    return (headers, None);
                }
            }
        }
        (headers, token)
    }

    /// Send a request, retrying only on 429 with exponential backoff.
    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>, authenticated: bool) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let (headers, token) = if authenticated {
                self.auth_headers()
            } else {
                (header::HeaderMap::new(), None)
            };

            debug!(method = %method, url = %url, authenticated = token.is_some(), "Sending request");
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(header::ACCEPT, "application/json")
                .headers(headers);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                let text = response.text().await?;
                return serde_json::from_str(&text).map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
                });
            }

            if status.as_u16() == 429 && retries < self.max_retries {
                retries += 1;
                warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);

            if let (true, Some(token), Some(tokens)) = (error.is_unauthorized(), token, self.tokens.as_ref()) {
                warn!(url = %url, "Bearer token rejected by backend");
                tokens.token_rejected(&token);
            }

            return Err(error);
        }
    }

    // ===== Authentication =====

    /// Authenticate and return the user and bearer token
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = self.endpoint(&["auth", "login"]);
        self.send(Method::POST, url, Some(&LoginRequest { email, password }), false)
            .await
    }

    /// Register a new account. The response body is backend-defined.
    pub async fn register(&self, email: &str, password: &str, role: &Role) -> Result<Value, ApiError> {
        let url = self.endpoint(&["auth", "register"]);
        self.send(Method::POST, url, Some(&RegisterRequest { email, password, role }), false)
            .await
    }

    // ===== Patients =====

    pub async fn list_patients(&self) -> Result<Vec<Patient>, ApiError> {
        let url = self.endpoint(&["patients"]);
        self.send::<(), _>(Method::GET, url, None, true).await
    }

    pub async fn get_patient(&self, id: &PatientId) -> Result<Patient, ApiError> {
        let url = self.endpoint(&["patients", id.as_str()]);
        self.send::<(), _>(Method::GET, url, None, true).await
    }

    pub async fn create_patient(&self, patient: &NewPatient) -> Result<CreatedPatient, ApiError> {
        let url = self.endpoint(&["patients"]);
        self.send(Method::POST, url, Some(patient), true).await
    }

    pub async fn patient_status(&self, id: &PatientId) -> Result<PatientStatus, ApiError> {
        let url = self.endpoint(&["patients", id.as_str(), "status"]);
        self.send::<(), _>(Method::GET, url, None, true).await
    }

    pub async fn patient_heartbeats(&self, id: &PatientId) -> Result<Vec<Heartbeat>, ApiError> {
        let url = self.endpoint(&["patients", id.as_str(), "heartbeats"]);
        self.send::<(), _>(Method::GET, url, None, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedToken(Mutex<Option<String>>);

    impl TokenProvider for FixedToken {
        fn bearer_token(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).expect("Failed to build test client")
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let api = client("http://localhost:5000");
        assert_eq!(
            api.endpoint(&["patients", "7", "status"]).as_str(),
            "http://localhost:5000/patients/7/status"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = client("https://example.org/api/");
        assert_eq!(
            api.endpoint(&["auth", "login"]).as_str(),
            "https://example.org/api/auth/login"
        );
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let api = client("http://localhost:5000");
        assert_eq!(
            api.endpoint(&["patients", "a/b c"]).as_str(),
            "http://localhost:5000/patients/a%2Fb%20c"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(ApiClient::new("mailto:someone@example.org", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_auth_headers_follow_provider() {
        let provider = Arc::new(FixedToken(Mutex::new(None)));
        let api = client("http://localhost:5000").with_token_provider(provider.clone());

        let (headers, token) = api.auth_headers();
        assert!(headers.get(header::AUTHORIZATION).is_none());
        assert!(token.is_none());

        *provider.0.lock().unwrap() = Some("abc123".to_string());
        let (headers, token) = api.auth_headers();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc123");
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_register_payload_includes_role() {
        let body = RegisterRequest { email: "a@x.com", password: "pw", role: &Role::Doctor };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["role"], "doctor");
    }
}
