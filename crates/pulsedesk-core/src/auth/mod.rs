//! Authentication module for managing the user session and its persistence.
//!
//! This module provides:
//! - `SessionManager`: login, registration and logout, plus read-only views
//!   of the current `Session`
//! - `KeyValueStore`: durable storage for the credential, with file, OS
//!   keychain (`KeyringStore`) and in-memory implementations
//!
//! The credential is stored under the `token` key and the user under `user`.

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::KeyringStore;
pub use session::{Session, SessionManager, TOKEN_KEY, USER_KEY};
pub use storage::{open_storage, FileStore, KeyValueStore, MemoryStore};
