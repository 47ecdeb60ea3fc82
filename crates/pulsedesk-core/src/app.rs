//! Wiring of the session manager and the patient store.
//!
//! `App` builds both stores from a `Config` so that they share one HTTP
//! client whose bearer token always comes from the session.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::api::ApiClient;
use crate::auth::{open_storage, KeyValueStore, SessionManager};
use crate::config::Config;
use crate::store::PatientStore;

#[derive(Clone, Debug)]
pub struct App {
    pub session: SessionManager,
    pub patients: PatientStore,
}

impl App {
    /// Build the stores using the storage backend selected in `config`
    pub fn new(config: &Config) -> Result<Self> {
        let storage = open_storage(config)?;
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: &Config, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        debug!(base_url = %api.base_url(), storage = ?config.storage, "Building stores");

        let session = SessionManager::new(api, storage);
        let patients = PatientStore::new(session.api(), config.response_ordering);
        Ok(Self { session, patients })
    }

    /// Log out and forget every cached patient record. Patient fetches still
    /// in flight are discarded when they land.
    pub fn logout(&self) {
        self.session.logout();
        self.patients.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }
}
