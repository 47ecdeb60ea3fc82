use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, TokenProvider};
use crate::models::{Role, User};

use super::KeyValueStore;

/// Durable storage key for the bearer credential
pub const TOKEN_KEY: &str = "token";

/// Durable storage key for the serialized user
pub const USER_KEY: &str = "user";

const SESSION_REJECTED_MESSAGE: &str = "Your session has expired, please log in again";

/// Snapshot of the authenticated identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub credential: Option<String>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }
}

/// Shared state behind every `SessionManager` handle.
///
/// Also the `TokenProvider` of the API client, so outgoing requests always
/// read the credential as it is at dispatch time.
struct SessionState {
    state: watch::Sender<Session>,
    storage: Arc<dyn KeyValueStore>,
}

impl SessionState {
    /// Read the persisted session once. Storage problems yield an empty session.
    fn hydrate(storage: &dyn KeyValueStore) -> Session {
        let credential = match storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential, starting logged out");
                return Session::default();
            }
        };

        let Some(credential) = credential else {
            // A user without a credential is a leftover; drop it
            if let Err(e) = storage.remove(USER_KEY) {
                debug!(error = %e, "Failed to remove orphaned user entry");
            }
            return Session::default();
        };

        let user = match storage.get(USER_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<User>(&json) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Stored user is unreadable, keeping credential only");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored user");
                None
            }
        };

        debug!(has_user = user.is_some(), "Session hydrated from storage");
        Session {
            user,
            credential: Some(credential),
            last_error: None,
        }
    }

    /// Write the identity fields of `session` to storage
    fn persist(&self, user: Option<&User>, credential: Option<&str>) -> Result<()> {
        match credential {
            Some(token) => self.storage.set(TOKEN_KEY, token)?,
            None => self.storage.remove(TOKEN_KEY)?,
        }
        match user {
            Some(user) => {
                let json = serde_json::to_string(user).context("Failed to serialize user")?;
                self.storage.set(USER_KEY, &json)?;
            }
            None => self.storage.remove(USER_KEY)?,
        }
        Ok(())
    }

    fn clear_error(&self) {
        self.state.send_if_modified(|s| s.last_error.take().is_some());
    }

    fn record_error(&self, message: String) {
        self.state.send_modify(|s| s.last_error = Some(message));
    }

    /// Drop the identity from memory and storage when `matches` holds.
    ///
    /// Storage is written while the watch value is held, so no other
    /// transition can land between the two copies. Returns whether the
    /// session was cleared.
    fn clear_if(&self, matches: impl FnOnce(&Session) -> bool) -> Result<bool> {
        let mut outcome = Ok(false);
        self.state.send_if_modified(|s| {
            if !matches(s) {
                return false;
            }
            let had_identity = s.user.is_some() || s.credential.is_some();
            s.user = None;
            s.credential = None;
            outcome = self.persist(None, None).map(|()| true);
            had_identity
        });
        outcome
    }
}

impl TokenProvider for SessionState {
    fn bearer_token(&self) -> Option<String> {
        self.state.borrow().credential.clone()
    }

    fn token_rejected(&self, token: &str) {
        // A newer login may have replaced the rejected token in the meantime
        match self.clear_if(|s| s.credential.as_deref() == Some(token)) {
            Ok(false) => return,
            Ok(true) => warn!("Credential rejected by backend, session cleared"),
            Err(e) => error!(error = %e, "Credential rejected, failed to clear persisted session"),
        }
        self.record_error(SESSION_REJECTED_MESSAGE.to_string());
    }
}

/// Owns the authenticated user, the bearer credential and their persistence.
///
/// Cloning yields another handle onto the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionState>,
    api: ApiClient,
}

impl SessionManager {
    /// Create the manager, hydrating the session from `storage`.
    ///
    /// `api` is re-wired so every authenticated request carries this
    /// session's credential; get it back with [`SessionManager::api`].
    pub fn new(api: ApiClient, storage: Arc<dyn KeyValueStore>) -> Self {
        let session = SessionState::hydrate(storage.as_ref());
        let inner = Arc::new(SessionState {
            state: watch::Sender::new(session),
            storage,
        });
        let api = api.with_token_provider(inner.clone());
        Self { inner, api }
    }

    /// API client that authenticates with this session's credential
    pub fn api(&self) -> ApiClient {
        self.api.clone()
    }

    /// Log in. On success the user and credential are stored and persisted.
    /// On failure the session is left as it was and `last_error` explains why.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.inner.clear_error();

        let response = match self.api.login(email, password).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Login failed");
                self.inner.record_error(e.user_message());
                return false;
            }
        };

        // Storage and memory change under the same watch write lock, so a
        // concurrent login or logout cannot interleave between them
        let user_id = response.user.id;
        let mut saved = Ok(());
        self.inner.state.send_if_modified(|s| {
            if let Err(e) = self.inner.persist(Some(&response.user), Some(&response.token)) {
                // Put storage back in line with the unchanged in-memory session
                if let Err(e) = self.inner.persist(s.user.as_ref(), s.credential.as_deref()) {
                    error!(error = %e, "Failed to restore persisted session");
                }
                saved = Err(e);
                return false;
            }
            s.user = Some(response.user);
            s.credential = Some(response.token);
            true
        });

        if let Err(e) = saved {
            error!(error = %e, "Failed to persist session, login not completed");
            self.inner.record_error(format!("Failed to save session: {}", e));
            return false;
        }
        info!(user_id = user_id, "Login successful");
        true
    }

    /// Register a new account. Does not log in.
    pub async fn register(&self, email: &str, password: &str, role: Option<Role>) -> bool {
        self.inner.clear_error();
        let role = role.unwrap_or_default();

        match self.api.register(email, password, &role).await {
            Ok(response) => {
                info!(role = %role, "Registration successful");
                debug!(email = email, response = %response, "Registration response");
                true
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                self.inner.record_error(e.user_message());
                false
            }
        }
    }

    /// Clear the session from memory and storage. Idempotent.
    pub fn logout(&self) {
        self.inner.clear_error();
        match self.inner.clear_if(|_| true) {
            Ok(_) => info!("Logged out"),
            Err(e) => {
                error!(error = %e, "Failed to remove persisted session");
                self.inner
                    .record_error(format!("Logged out, but the saved session could not be removed: {}", e));
            }
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub fn credential(&self) -> Option<String> {
        self.inner.state.borrow().credential.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.borrow().last_error.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Receive a fresh `Session` after every change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.state.borrow();
        f.debug_struct("SessionManager")
            .field("user", &session.user)
            .field("authenticated", &session.credential.is_some())
            .field("last_error", &session.last_error)
            .finish()
    }
}
