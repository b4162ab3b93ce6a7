//! # HTTP backend client
//!
//! [`HttpBackend`] talks to a hosted backend exposing a GoTrue-style auth API
//! under `/auth/v1` and a PostgREST-style table API under `/rest/v1`. It keeps the
//! current [`AuthSession`] in memory, mirrors it to an optional [`SessionFile`],
//! and broadcasts every change as an [`AuthEvent`].
//!
//! The trait implementations live in [`crate::auth`] ([`store::AuthBackend`]) and
//! [`crate::rest`] ([`store::RecordStore`]).

use std::sync::Mutex;
use std::time::Duration;

use reqwest::RequestBuilder;
use store::{AuthEvent, AuthEventKind, AuthSession, BackendError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::{BackendConfig, SessionFile};
use crate::error::ConfigError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend client over HTTP.
#[derive(Debug)]
pub struct HttpBackend {
    pub(crate) http: reqwest::Client,
    pub(crate) config: BackendConfig,
    session: Mutex<Option<AuthSession>>,
    session_file: Option<SessionFile>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            http,
            config,
            session: Mutex::new(None),
            session_file: None,
            events,
        })
    }

    /// Builder method: persist sessions to `file`, resuming any stored session.
    pub fn with_session_file(mut self, file: SessionFile) -> Self {
        let restored = file.load();
        if restored.is_some() {
            debug!(path = %file.path().display(), "restored persisted session");
        }
        *self.session.get_mut().unwrap_or_else(|e| e.into_inner()) = restored;
        self.session_file = Some(file);
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub(crate) fn current_session(&self) -> Option<AuthSession> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the session, persist it, and notify subscribers.
    pub(crate) fn replace_session(&self, session: Option<AuthSession>, kind: AuthEventKind) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = session.clone();
        if let Some(file) = &self.session_file {
            if let Err(e) = file.store(session.as_ref()) {
                warn!(path = %file.path().display(), "failed to persist session: {}", e);
            }
        }
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Token sent as `Authorization: Bearer`: the user's access token when signed
    /// in, the public key otherwise.
    pub(crate) fn bearer(&self) -> String {
        self.current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    /// Attach the `apikey` and bearer headers.
    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer())
    }

    /// Attach the public key as both `apikey` and bearer, regardless of session.
    pub(crate) fn anonymous(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    /// Send a request and return the status code and raw body.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<(u16, String), BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok((status, body))
    }
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
