//! # Backend contract: auth API and table API
//!
//! Daybook delegates every piece of persistence to a hosted backend. This module
//! describes what the client needs from it as two async traits:
//!
//! - [`AuthBackend`]: sign in, sign up, sign out, password reset and update,
//!   current-session lookup, and a broadcast channel of [`AuthEvent`]s.
//! - [`RecordStore`]: generic per-table reads and writes filtered by equality
//!   predicates ([`Filter`]), with ordered/limited list reads ([`Order`]).
//!
//! Implementations live in [`crate::memory`] (tests, offline) and in the `api`
//! crate (HTTP). Rows are any `serde` type; the table API returns the stored
//! representation of every write.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{AuthEvent, AuthSession, AuthUser, SignUpResponse, UserMetadata};

/// Async interface to the backend's authentication API.
pub trait AuthBackend: Send + Sync {
    /// The currently active session, if any.
    fn get_session(&self) -> impl Future<Output = Result<Option<AuthSession>>> + Send;

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession>> + Send;

    /// Create an account. Fails with [`crate::BackendError::UserAlreadyRegistered`]
    /// when the email is taken.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> impl Future<Output = Result<SignUpResponse>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<()>> + Send;

    /// Send a password-reset email whose link lands on `redirect_to`.
    fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Change the password of the signed-in user.
    fn update_user_password(&self, password: &str)
        -> impl Future<Output = Result<AuthUser>> + Send;

    /// Subscribe to session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Async interface to the backend's table API.
pub trait RecordStore: Send + Sync {
    /// Single row matching `filter`; `Ok(None)` when nothing matches.
    fn select_one<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<Option<T>>> + Send;

    fn select_list<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: &Filter,
        order: &Order,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<T>>> + Send;

    fn insert<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        row: &T,
    ) -> impl Future<Output = Result<R>> + Send;

    fn update_by_id<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        id: &str,
        patch: &T,
    ) -> impl Future<Output = Result<R>> + Send;

    /// Insert, or merge into the row whose `on_conflict` column matches.
    fn upsert<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        row: &T,
        on_conflict: &str,
    ) -> impl Future<Output = Result<R>> + Send;
}

/// Conjunction of `column = value` predicates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    eqs: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method adding an equality predicate.
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.eqs.push((column.to_string(), value.to_string()));
        self
    }

    pub fn predicates(&self) -> &[(String, String)] {
        &self.eqs
    }

    /// Whether a JSON row satisfies every predicate.
    pub fn matches(&self, row: &Value) -> bool {
        self.eqs.iter().all(|(column, expected)| match row.get(column) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == *expected,
        })
    }
}

/// Sort order for list reads.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }
}
