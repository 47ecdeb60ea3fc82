use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::api::{ApiClient, ApiError};
use crate::config::ResponseOrdering;
use crate::models::{
    CreatedPatient, Heartbeat, HeartbeatSummary, NewPatient, Patient, PatientId, PatientStatus,
};

use super::ordering::{Sequencer, Slot, Ticket};
use super::CachedData;

/// Everything the patient store has cached.
#[derive(Debug, Clone, Default)]
pub struct PatientState {
    /// Result of the last successful list fetch, `None` until the first one
    pub collection: Option<CachedData<Vec<Patient>>>,
    pub selected: Option<CachedData<Patient>>,
    pub status_by_patient: HashMap<PatientId, CachedData<PatientStatus>>,
    pub heartbeats_by_patient: HashMap<PatientId, CachedData<Vec<Heartbeat>>>,
    pub last_error: Option<String>,
}

/// Outcome of [`PatientStore::refresh_patient`], one flag per fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatientRefresh {
    pub details: bool,
    pub status: bool,
    pub heartbeats: bool,
}

impl PatientRefresh {
    pub fn all_succeeded(&self) -> bool {
        self.details && self.status && self.heartbeats
    }
}

struct StoreInner {
    state: watch::Sender<PatientState>,
    sequencer: Sequencer,
}

/// Fetches, caches and exposes patient data; creates patients.
///
/// Cloning yields another handle onto the same cache. Actions take `&self`
/// and may be in flight concurrently.
#[derive(Clone)]
pub struct PatientStore {
    api: ApiClient,
    inner: Arc<StoreInner>,
}

impl PatientStore {
    pub fn new(api: ApiClient, ordering: ResponseOrdering) -> Self {
        Self {
            api,
            inner: Arc::new(StoreInner {
                state: watch::Sender::new(PatientState::default()),
                sequencer: Sequencer::new(ordering),
            }),
        }
    }

    pub fn ordering(&self) -> ResponseOrdering {
        self.inner.sequencer.policy()
    }

    // ===== Action plumbing =====

    /// Start an action writing `slot`: clear the previous error and take a ticket
    fn begin(&self, slot: Slot) -> Ticket {
        self.clear_error();
        self.inner.sequencer.issue(slot)
    }

    fn clear_error(&self) {
        self.inner.state.send_if_modified(|s| s.last_error.take().is_some());
    }

    fn record_error(&self, message: String) {
        self.inner.state.send_modify(|s| s.last_error = Some(message));
    }

    /// Apply a finished fetch. Success replaces the slot, failure records the
    /// error and leaves the slot alone. Responses the ordering policy rejects
    /// are dropped without touching state.
    fn complete<T>(
        &self,
        ticket: Ticket,
        result: Result<T, ApiError>,
        apply: impl FnOnce(&mut PatientState, T),
    ) -> bool {
        let sequencer = &self.inner.sequencer;
        match result {
            Ok(data) => {
                let written = self.inner.state.send_if_modified(|s| {
                    if !sequencer.may_write(&ticket) {
                        return false;
                    }
                    apply(s, data);
                    true
                });
                if !written {
                    debug!(slot = ?ticket.slot, seq = ticket.seq, "Discarding superseded response");
                }
                true
            }
            Err(e) => {
                let message = e.user_message();
                let recorded = self.inner.state.send_if_modified(|s| {
                    if !sequencer.may_write(&ticket) {
                        return false;
                    }
                    s.last_error = Some(message);
                    true
                });
                if recorded {
                    error!(slot = ?ticket.slot, error = %e, "Fetch failed");
                } else {
                    debug!(slot = ?ticket.slot, error = %e, "Discarding superseded failure");
                }
                false
            }
        }
    }

    // ===== Actions =====

    /// Fetch the full patient list, replacing `collection` on success.
    pub async fn fetch_all(&self) -> bool {
        let ticket = self.begin(Slot::Collection);
        let result = self.api.list_patients().await;
        if let Ok(ref patients) = result {
            debug!(count = patients.len(), "Fetched patient list");
        }
        self.complete(ticket, result, |s, patients| {
            s.collection = Some(CachedData::new(patients));
        })
    }

    /// Fetch one patient's full record into `selected`.
    ///
    /// There is a single `selected` slot; with concurrent calls the ordering
    /// policy decides which response ends up in it.
    pub async fn fetch_details(&self, patient_id: impl Into<PatientId>) -> bool {
        let id = patient_id.into();
        let ticket = self.begin(Slot::Selected);
        let result = self.api.get_patient(&id).await;
        debug!(patient_id = %id, ok = result.is_ok(), "Fetched patient details");
        self.complete(ticket, result, |s, patient| {
            s.selected = Some(CachedData::new(patient));
        })
    }

    /// Fetch a patient's current status into `status_by_patient[id]`.
    pub async fn fetch_status(&self, patient_id: impl Into<PatientId>) -> bool {
        let id = patient_id.into();
        let ticket = self.begin(Slot::Status(id.clone()));
        let result = self.api.patient_status(&id).await;
        debug!(patient_id = %id, ok = result.is_ok(), "Fetched patient status");
        self.complete(ticket, result, move |s, status| {
            s.status_by_patient.insert(id, CachedData::new(status));
        })
    }

    /// Fetch a patient's heartbeat series into `heartbeats_by_patient[id]`.
    pub async fn fetch_heartbeats(&self, patient_id: impl Into<PatientId>) -> bool {
        let id = patient_id.into();
        let ticket = self.begin(Slot::Heartbeats(id.clone()));
        let result = self.api.patient_heartbeats(&id).await;
        if let Ok(ref series) = result {
            debug!(patient_id = %id, count = series.len(), "Fetched heartbeats");
        }
        self.complete(ticket, result, move |s, series| {
            s.heartbeats_by_patient.insert(id, CachedData::new(series));
        })
    }

    /// Create a patient.
    ///
    /// Unlike the fetches, a failure is returned to the caller as well as
    /// recorded in `last_error`. The new patient only shows up in
    /// `collection` after the next [`PatientStore::fetch_all`].
    pub async fn create(&self, patient: &NewPatient) -> Result<CreatedPatient, ApiError> {
        self.clear_error();
        match self.api.create_patient(patient).await {
            Ok(created) => {
                info!(patient_id = %created.patient_id, "Patient created");
                Ok(created)
            }
            Err(e) => {
                error!(name = %patient.name, error = %e, "Failed to create patient");
                self.record_error(e.user_message());
                Err(e)
            }
        }
    }

    /// Fetch details, status and heartbeats of one patient concurrently.
    pub async fn refresh_patient(&self, patient_id: impl Into<PatientId>) -> PatientRefresh {
        let id = patient_id.into();
        let (details, status, heartbeats) = futures::join!(
            self.fetch_details(&id),
            self.fetch_status(&id),
            self.fetch_heartbeats(&id)
        );
        PatientRefresh {
            details,
            status,
            heartbeats,
        }
    }

    /// Drop all cached data, e.g. after logout.
    ///
    /// Fetches still in flight are discarded when they complete, so nothing
    /// requested before the clear reappears afterwards.
    pub fn clear(&self) {
        let sequencer = &self.inner.sequencer;
        self.inner.state.send_modify(|s| {
            sequencer.reset();
            *s = PatientState::default();
        });
    }

    // ===== Read-only views =====

    pub fn snapshot(&self) -> PatientState {
        self.inner.state.borrow().clone()
    }

    /// Patients from the last successful list fetch (empty before the first)
    pub fn collection(&self) -> Vec<Patient> {
        self.inner
            .state
            .borrow()
            .collection
            .as_ref()
            .map(|c| c.data.clone())
            .unwrap_or_default()
    }

    /// "5m ago" style age of the patient list, `None` if never fetched
    pub fn collection_age(&self) -> Option<String> {
        self.inner.state.borrow().collection.as_ref().map(|c| c.age_display())
    }

    pub fn is_collection_stale(&self) -> bool {
        self.inner
            .state
            .borrow()
            .collection
            .as_ref()
            .map(|c| c.is_stale())
            .unwrap_or(true)
    }

    pub fn selected(&self) -> Option<Patient> {
        self.inner.state.borrow().selected.as_ref().map(|c| c.data.clone())
    }

    pub fn status(&self, patient_id: &PatientId) -> Option<PatientStatus> {
        self.inner
            .state
            .borrow()
            .status_by_patient
            .get(patient_id)
            .map(|c| c.data.clone())
    }

    pub fn heartbeats(&self, patient_id: &PatientId) -> Option<Vec<Heartbeat>> {
        self.inner
            .state
            .borrow()
            .heartbeats_by_patient
            .get(patient_id)
            .map(|c| c.data.clone())
    }

    pub fn heartbeat_summary(&self, patient_id: &PatientId) -> Option<HeartbeatSummary> {
        self.inner
            .state
            .borrow()
            .heartbeats_by_patient
            .get(patient_id)
            .map(|c| HeartbeatSummary::from_series(&c.data))
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.borrow().last_error.clone()
    }

    /// Receive a fresh `PatientState` after every change
    pub fn subscribe(&self) -> watch::Receiver<PatientState> {
        self.inner.state.subscribe()
    }
}

impl std::fmt::Debug for PatientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("PatientStore")
            .field("patients", &state.collection.as_ref().map(|c| c.data.len()))
            .field("selected", &state.selected.as_ref().map(|c| &c.data.id))
            .field("statuses", &state.status_by_patient.len())
            .field("heartbeat_series", &state.heartbeats_by_patient.len())
            .field("last_error", &state.last_error)
            .finish()
    }
}
