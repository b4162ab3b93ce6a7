//! # In-memory backend
//!
//! [`MemoryBackend`] implements both [`AuthBackend`] and [`RecordStore`] without a
//! network. It is used by the test suites and by frontends running offline.
//!
//! Accounts are kept by email with a salted SHA-1 digest of the password. Table
//! rows are JSON objects; inserts receive a UUID v4 `id` when the row has none.
//! Every session change is broadcast as an [`AuthEvent`].
//!
//! Tests can steer it with [`fail_next`](MemoryBackend::fail_next) (one-shot
//! failure of a named operation) and
//! [`delay_reads_for`](MemoryBackend::delay_reads_for) (latency on reads filtered
//! by a given `user_id`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{AuthBackend, Filter, Order, RecordStore};
use crate::error::{BackendError, Result, NO_ROWS_CODE};
use crate::models::{
    AuthEvent, AuthEventKind, AuthSession, AuthUser, SignUpResponse, UserMetadata,
};

/// Backend operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetSession,
    SignIn,
    SignUp,
    SignOut,
    ResetPassword,
    UpdatePassword,
    Select,
    Insert,
    Update,
    Upsert,
}

#[derive(Clone, Debug)]
struct Account {
    user: AuthUser,
    salt: String,
    password_digest: String,
}

#[derive(Debug)]
struct Inner {
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<AuthSession>>,
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failures: Mutex<HashMap<Operation, String>>,
    read_delays: Mutex<HashMap<String, Duration>>,
    reset_requests: Mutex<Vec<(String, String)>>,
    require_confirmation: AtomicBool,
    events: broadcast::Sender<AuthEvent>,
}

/// In-memory auth + table backend.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                accounts: Mutex::new(HashMap::new()),
                session: Mutex::new(None),
                tables: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                read_delays: Mutex::new(HashMap::new()),
                reset_requests: Mutex::new(Vec::new()),
                require_confirmation: AtomicBool::new(false),
                events,
            }),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: signups return no session until the email is confirmed.
    pub fn with_email_confirmation(self) -> Self {
        self.inner.require_confirmation.store(true, Ordering::SeqCst);
        self
    }

    /// Seed an account without signing in or emitting events.
    pub fn register(&self, email: &str, password: &str, name: Option<&str>) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            phone: None,
            user_metadata: UserMetadata {
                name: name.map(str::to_string),
                phone: None,
            },
        };
        self.insert_account(email, password, user.clone());
        user
    }

    /// Replace the active session and broadcast the change.
    pub fn set_session(&self, session: Option<AuthSession>) {
        let kind = if session.is_some() {
            AuthEventKind::SignedIn
        } else {
            AuthEventKind::SignedOut
        };
        *self.inner.session.lock().unwrap() = session.clone();
        self.emit(kind, session);
    }

    /// Build a session for a user without checking credentials.
    pub fn session_for(user: &AuthUser) -> AuthSession {
        AuthSession {
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: Some(Uuid::new_v4().simple().to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            user: user.clone(),
        }
    }

    /// Make the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: Operation, message: &str) {
        self.inner
            .failures
            .lock()
            .unwrap()
            .insert(op, message.to_string());
    }

    /// Delay every read filtered by `user_id` by `delay`.
    pub fn delay_reads_for(&self, user_id: &str, delay: Duration) {
        self.inner
            .read_delays
            .lock()
            .unwrap()
            .insert(user_id.to_string(), delay);
    }

    /// All rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str, filter: &Filter) -> usize {
        self.rows(table).iter().filter(|r| filter.matches(r)).count()
    }

    pub fn account_count(&self) -> usize {
        self.inner.accounts.lock().unwrap().len()
    }

    /// `(email, redirect_to)` of every password-reset request.
    pub fn reset_requests(&self) -> Vec<(String, String)> {
        self.inner.reset_requests.lock().unwrap().clone()
    }

    fn insert_account(&self, email: &str, password: &str, user: AuthUser) {
        let salt = Uuid::new_v4().simple().to_string();
        let account = Account {
            user,
            password_digest: digest(&salt, password),
            salt,
        };
        self.inner
            .accounts
            .lock()
            .unwrap()
            .insert(normalize_email(email), account);
    }

    fn take_failure(&self, op: Operation) -> Result<()> {
        match self.inner.failures.lock().unwrap().remove(&op) {
            Some(message) => Err(BackendError::Injected(message)),
            None => Ok(()),
        }
    }

    fn emit(&self, kind: AuthEventKind, session: Option<AuthSession>) {
        // No subscribers is fine.
        let _ = self.inner.events.send(AuthEvent::new(kind, session));
    }

    async fn read_delay(&self, filter: &Filter) {
        let delay = filter
            .predicates()
            .iter()
            .filter(|(column, _)| column == "user_id")
            .find_map(|(_, user_id)| self.inner.read_delays.lock().unwrap().get(user_id).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn no_rows() -> BackendError {
    BackendError::Api {
        status: 406,
        code: Some(NO_ROWS_CODE.to_string()),
        message: "The result contains 0 rows".to_string(),
    }
}

fn to_object<T: Serialize>(row: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(row)? {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::Decode(format!("expected a JSON object, got {other}"))),
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

impl AuthBackend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        self.take_failure(Operation::GetSession)?;
        Ok(self.inner.session.lock().unwrap().clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.take_failure(Operation::SignIn)?;
        let account = self
            .inner
            .accounts
            .lock()
            .unwrap()
            .get(&normalize_email(email))
            .cloned();
        let Some(account) = account else {
            return Err(BackendError::Auth {
                status: Some(400),
                message: "Invalid login credentials".to_string(),
            });
        };
        if digest(&account.salt, password) != account.password_digest {
            return Err(BackendError::Auth {
                status: Some(400),
                message: "Invalid login credentials".to_string(),
            });
        }

        let session = Self::session_for(&account.user);
        *self.inner.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<SignUpResponse> {
        self.take_failure(Operation::SignUp)?;
        if self
            .inner
            .accounts
            .lock()
            .unwrap()
            .contains_key(&normalize_email(email))
        {
            return Err(BackendError::UserAlreadyRegistered);
        }

        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: Some(normalize_email(email)),
            phone: metadata.phone.clone(),
            user_metadata: metadata,
        };
        self.insert_account(email, password, user.clone());

        if self.inner.require_confirmation.load(Ordering::SeqCst) {
            return Ok(SignUpResponse {
                user,
                session: None,
            });
        }

        let session = Self::session_for(&user);
        *self.inner.session.lock().unwrap() = Some(session.clone());
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(SignUpResponse {
            user,
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        self.take_failure(Operation::SignOut)?;
        *self.inner.session.lock().unwrap() = None;
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()> {
        self.take_failure(Operation::ResetPassword)?;
        // Unknown emails succeed too, so callers cannot probe for accounts.
        self.inner
            .reset_requests
            .lock()
            .unwrap()
            .push((normalize_email(email), redirect_to.to_string()));
        Ok(())
    }

    async fn update_user_password(&self, password: &str) -> Result<AuthUser> {
        self.take_failure(Operation::UpdatePassword)?;
        let session = self.inner.session.lock().unwrap().clone();
        let Some(session) = session else {
            return Err(BackendError::NotAuthenticated);
        };
        let email = session.user.email.clone().unwrap_or_default();
        self.insert_account(&email, password, session.user.clone());
        self.emit(AuthEventKind::UserUpdated, Some(session.clone()));
        Ok(session.user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

impl RecordStore for MemoryBackend {
    async fn select_one<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: &Filter,
    ) -> Result<Option<T>> {
        self.take_failure(Operation::Select)?;
        self.read_delay(filter).await;
        let found = self
            .rows(table)
            .into_iter()
            .find(|row| filter.matches(row));
        match found {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    async fn select_list<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: &Filter,
        order: &Order,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        self.take_failure(Operation::Select)?;
        self.read_delay(filter).await;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| filter.matches(row))
            .collect();
        rows.sort_by(|a, b| {
            let ord = compare(
                a.get(&order.column).unwrap_or(&Value::Null),
                b.get(&order.column).unwrap_or(&Value::Null),
            );
            if order.ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(BackendError::from))
            .collect()
    }

    async fn insert<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<R> {
        self.take_failure(Operation::Insert)?;
        let mut object = to_object(row)?;
        object
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        let stored = Value::Object(object);
        self.inner
            .tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(serde_json::from_value(stored)?)
    }

    async fn update_by_id<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        id: &str,
        patch: &T,
    ) -> Result<R> {
        self.take_failure(Operation::Update)?;
        let patch = to_object(patch)?;
        let updated = {
            let mut tables = self.inner.tables.lock().unwrap();
            let rows = tables.entry(table.to_string()).or_default();
            let target = rows
                .iter_mut()
                .find(|row| row.get("id").and_then(Value::as_str) == Some(id));
            match target {
                Some(Value::Object(existing)) => {
                    for (key, value) in patch {
                        if key != "id" {
                            existing.insert(key, value);
                        }
                    }
                    Value::Object(existing.clone())
                }
                _ => return Err(no_rows()),
            }
        };
        Ok(serde_json::from_value(updated)?)
    }

    async fn upsert<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        row: &T,
        on_conflict: &str,
    ) -> Result<R> {
        self.take_failure(Operation::Upsert)?;
        let mut object = to_object(row)?;
        let key = object.get(on_conflict).cloned();
        let stored = {
            let mut tables = self.inner.tables.lock().unwrap();
            let rows = tables.entry(table.to_string()).or_default();
            let existing = key.as_ref().and_then(|key| {
                rows.iter_mut()
                    .find(|r| r.get(on_conflict) == Some(key))
            });
            match existing {
                Some(Value::Object(existing)) => {
                    existing.append(&mut object);
                    Value::Object(existing.clone())
                }
                _ => {
                    object
                        .entry("id")
                        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                    let stored = Value::Object(object);
                    rows.push(stored.clone());
                    stored
                }
            }
        };
        Ok(serde_json::from_value(stored)?)
    }
}
