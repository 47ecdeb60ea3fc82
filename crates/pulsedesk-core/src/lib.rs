//! pulsedesk core library.
//!
//! Client-side session and data-store layer for the patient monitoring
//! backend:
//!
//! - `auth`: `SessionManager` (login, registration, logout, persistence)
//! - `store`: `PatientStore` (patient list, details, status, heartbeats)
//! - `api`: `ApiClient`, the HTTP collaborator both stores use
//! - `models`: wire types
//! - `config`: `Config` loading and environment overrides

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;

pub use api::{ApiClient, ApiError};
pub use app::App;
pub use auth::{Session, SessionManager};
pub use config::{Config, ResponseOrdering, StorageBackend};
pub use store::{PatientState, PatientStore};
