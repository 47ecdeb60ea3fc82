//! Data models for the patient monitoring backend.
//!
//! This module contains the data structures exchanged with the backend:
//!
//! - `User`, `Role`: The authenticated staff member
//! - `Patient`, `NewPatient`, `CreatedPatient`: Patient records and creation payloads
//! - `Heartbeat`, `HeartbeatSummary`: Heartbeat samples and series summaries
//! - `PatientStatus`: The current status payload of one patient

pub mod heartbeat;
pub mod patient;
pub mod user;

pub use heartbeat::{Heartbeat, HeartbeatSummary};
pub use patient::{CreatedPatient, Gender, NewPatient, Patient, PatientId, PatientStatus};
pub use user::{Role, User};
