//! # API crate: HTTP client for the hosted Daybook backend
//!
//! Implements the backend contract of the `store` crate ([`store::AuthBackend`] and
//! [`store::RecordStore`]) against a hosted auth + table service.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | Auth API calls (sign in/up/out, password reset and update, refresh), [`BackendConfig`] from env, [`SessionFile`] persistence |
//! | [`client`] | [`HttpBackend`]: shared HTTP client, header handling, session state and change broadcast |
//! | [`rest`] | Table API calls: filtered single and list reads, insert, update-by-id, upsert |
//! | [`error`] | [`ConfigError`] for client construction |
//!
//! ## Typical setup
//!
//! ```no_run
//! use api::{BackendConfig, HttpBackend, SessionFile};
//!
//! # fn main() -> Result<(), api::ConfigError> {
//! let backend = HttpBackend::new(BackendConfig::from_env()?)?
//!     .with_session_file(SessionFile::default_location());
//! # let _ = backend;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod rest;

pub use auth::{BackendConfig, SessionFile};
pub use client::HttpBackend;
pub use error::ConfigError;
