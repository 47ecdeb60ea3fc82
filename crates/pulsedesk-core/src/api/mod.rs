//! REST API client module for the patient monitoring backend.
//!
//! This module provides the `ApiClient` for communicating with the backend
//! to authenticate staff and to read and create patient data.
//!
//! Authenticated requests carry a bearer token obtained from a
//! `TokenProvider`, which is consulted immediately before every request.

pub mod client;
pub mod error;

pub use client::{ApiClient, LoginResponse, TokenProvider};
pub use error::ApiError;
