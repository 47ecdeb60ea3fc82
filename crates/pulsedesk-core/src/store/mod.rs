//! In-memory caching of patient data fetched from the backend.
//!
//! This module provides the `PatientStore`, which caches the patient list,
//! one selected patient, and per-patient status and heartbeat series. Every
//! slot is fully replaced by a successful fetch and keeps its previous value
//! when a fetch fails.

pub mod cache;
pub mod ordering;
pub mod patients;

pub use cache::CachedData;
pub use patients::{PatientRefresh, PatientState, PatientStore};
