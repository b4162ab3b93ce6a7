//! Session service: who is signed in, and the operations that change it.

use std::sync::{Arc, Mutex};

use store::{
    save_profile, AuthBackend, AuthEvent, AuthSession, BackendError, DaybookConfig, Identity, Profile,
    RecordStore, UserMetadata,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity_log::{ActivityLog, LogLevel};
use crate::loading::{Flags, LoadingGuard};
use crate::navigation::{Navigator, Route};

const ALREADY_REGISTERED: &str = "An account with this email already exists. Please log in instead.";

/// Authentication state for the application.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<Identity>,
    pub authenticated: bool,
    pub loading: bool,
    /// Message of the last failed operation; reset when the next one starts.
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            authenticated: false,
            loading: true,
            error: None,
        }
    }
}

impl Flags for AuthState {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }
}

/// Result of a successful signup.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The backend issued a session right away.
    SignedIn(Identity),
    /// The account exists but must be confirmed by email before signing in.
    ConfirmationRequired(Identity),
}

impl SignUpOutcome {
    pub fn identity(&self) -> &Identity {
        match self {
            SignUpOutcome::SignedIn(identity) | SignUpOutcome::ConfirmationRequired(identity) => {
                identity
            }
        }
    }
}

struct SessionInner<B> {
    backend: Arc<B>,
    state: Arc<watch::Sender<AuthState>>,
    log: ActivityLog,
    navigator: Arc<dyn Navigator>,
    reset_redirect: String,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<B> Drop for SessionInner<B> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().ok().and_then(Option::take) {
            listener.abort();
        }
    }
}

/// Tracks the signed-in identity and exposes the auth operations.
///
/// Cloning is cheap; every clone drives the same state.
pub struct SessionService<B> {
    inner: Arc<SessionInner<B>>,
}

impl<B> Clone for SessionService<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: AuthBackend + RecordStore + 'static> SessionService<B> {
    pub fn new(
        backend: Arc<B>,
        log: ActivityLog,
        navigator: Arc<dyn Navigator>,
        config: &DaybookConfig,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(SessionInner {
                backend,
                state: Arc::new(state),
                log,
                navigator,
                reset_redirect: config.reset_password_redirect(),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Check the current session, then follow session changes until
    /// [`shutdown`](Self::shutdown) or until the last handle is dropped.
    pub async fn start(&self) {
        // Subscribe first so nothing emitted during the check is missed.
        let events = self.inner.backend.subscribe();
        self.check_session().await;

        let task = tokio::spawn(listen(
            self.inner.backend.clone(),
            events,
            self.inner.state.clone(),
        ));
        let previous = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop following session changes.
    pub fn shutdown(&self) {
        if let Some(listener) = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            listener.abort();
        }
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().authenticated
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.inner.log
    }

    pub async fn check_session(&self) {
        let _loading = LoadingGuard::begin(self.inner.state.as_ref());
        match self.inner.backend.get_session().await {
            Ok(session) => apply_session(&self.inner.state, session.as_ref()),
            Err(e) => {
                warn!("Session check failed: {}", e);
                self.fail(&e);
            }
        }
    }

    /// Sign in with email and password. Returns whether it succeeded.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let _loading = LoadingGuard::begin(self.inner.state.as_ref());
        match self
            .inner
            .backend
            .sign_in_with_password(email.trim(), password)
            .await
        {
            Ok(session) => {
                apply_session(&self.inner.state, Some(&session));
                info!(user_id = %session.user.id, "Signed in");
                self.inner.log.push(LogLevel::Success, "Signed in successfully");
                self.inner.navigator.navigate(Route::Dashboard);
                true
            }
            Err(e) => {
                self.fail(&e);
                self.inner.log.push(LogLevel::Error, &format!("Sign in failed: {}", e));
                false
            }
        }
    }

    /// Create an account and its profile row.
    ///
    /// Returns `None` when no account was created; the reason is in the
    /// state's `error` and in the activity log.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
        phone: Option<&str>,
    ) -> Option<SignUpOutcome> {
        let _loading = LoadingGuard::begin(self.inner.state.as_ref());
        let metadata = UserMetadata {
            name: Some(name.trim().to_string()).filter(|n| !n.is_empty()),
            phone: phone
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        };

        let response = match self
            .inner
            .backend
            .sign_up(email.trim(), password, metadata)
            .await
        {
            Ok(response) => response,
            Err(BackendError::UserAlreadyRegistered) => {
                self.set_error(ALREADY_REGISTERED);
                self.inner.log.push(LogLevel::Warning, ALREADY_REGISTERED);
                self.inner.navigator.navigate(Route::Login);
                return None;
            }
            Err(e) => {
                self.set_error(&e.to_string());
                self.inner.log.push(LogLevel::Error, &format!("Sign up failed: {}", e));
                return None;
            }
        };

        let identity = Identity::from_user(&response.user);
        let profile = Profile::for_identity(&identity);
        if let Err(e) = save_profile(self.inner.backend.as_ref(), &profile).await {
            warn!(user_id = %identity.id, "Saving profile failed: {}", e);
            self.inner.log.push(
                LogLevel::Error,
                &format!("Account created, but saving your profile failed: {}", e),
            );
        }

        info!(user_id = %identity.id, confirmed = response.session.is_some(), "Account created");
        match response.session {
            Some(session) => {
                apply_session(&self.inner.state, Some(&session));
                self.inner.log.push(LogLevel::Success, "Account created");
                self.inner.navigator.navigate(Route::Dashboard);
                Some(SignUpOutcome::SignedIn(identity))
            }
            None => {
                self.inner.log.push(
                    LogLevel::Info,
                    "Account created. Check your email to confirm it, then sign in.",
                );
                self.inner.navigator.navigate(Route::Login);
                Some(SignUpOutcome::ConfirmationRequired(identity))
            }
        }
    }

    pub async fn logout(&self) -> bool {
        let _loading = LoadingGuard::begin(self.inner.state.as_ref());
        match self.inner.backend.sign_out().await {
            Ok(()) => {
                apply_session(&self.inner.state, None);
                info!("Signed out");
                self.inner.log.push(LogLevel::Info, "Signed out");
                self.inner.navigator.navigate(Route::Login);
                true
            }
            Err(e) => {
                self.set_error(&e.to_string());
                self.inner.log.push(LogLevel::Error, &format!("Sign out failed: {}", e));
                false
            }
        }
    }

    /// Email a password-reset link that lands on the reset screen.
    pub async fn reset_password(&self, email: &str) -> bool {
        let _loading = LoadingGuard::begin(self.inner.state.as_ref());
        match self
            .inner
            .backend
            .reset_password_for_email(email.trim(), &self.inner.reset_redirect)
            .await
        {
            Ok(()) => {
                debug!(redirect = %self.inner.reset_redirect, "Reset email requested");
                self.inner.log.push(
                    LogLevel::Success,
                    "Password reset email sent. Check your inbox.",
                );
                true
            }
            Err(e) => {
                self.set_error(&e.to_string());
                self.inner
                    .log
                    .push(LogLevel::Error, &format!("Password reset failed: {}", e));
                false
            }
        }
    }

    /// Change the signed-in user's password.
    pub async fn update_password(&self, password: &str) -> bool {
        let _loading = LoadingGuard::begin(self.inner.state.as_ref());
        match self.inner.backend.update_user_password(password).await {
            Ok(user) => {
                info!(user_id = %user.id, "Password updated");
                self.inner.log.push(LogLevel::Success, "Password updated");
                self.inner.navigator.navigate(Route::Dashboard);
                true
            }
            Err(e) => {
                self.set_error(&e.to_string());
                self.inner
                    .log
                    .push(LogLevel::Error, &format!("Password update failed: {}", e));
                false
            }
        }
    }

    fn set_error(&self, message: &str) {
        self.inner
            .state
            .send_modify(|s| s.error = Some(message.to_string()));
    }

    /// Record `e` and drop the identity.
    fn fail(&self, e: &BackendError) {
        self.inner.state.send_modify(|s| {
            s.user = None;
            s.authenticated = false;
            s.error = Some(e.to_string());
        });
    }
}

fn apply_session(state: &watch::Sender<AuthState>, session: Option<&AuthSession>) {
    let user = session.map(Identity::from_session);
    state.send_if_modified(|s| {
        let authenticated = user.is_some();
        if s.user == user && s.authenticated == authenticated {
            return false;
        }
        s.user = user;
        s.authenticated = authenticated;
        true
    });
}

async fn listen<B: AuthBackend>(
    backend: Arc<B>,
    mut events: broadcast::Receiver<AuthEvent>,
    state: Arc<watch::Sender<AuthState>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(kind = ?event.kind, "Session change");
                apply_session(&state, event.session.as_ref());
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Missed {} session events, re-reading session", missed);
                match backend.get_session().await {
                    Ok(session) => apply_session(&state, session.as_ref()),
                    Err(e) => warn!("Session re-read failed: {}", e),
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::HistoryNavigator;
    use store::{MemoryBackend, Operation};

    fn service(backend: &MemoryBackend) -> (SessionService<MemoryBackend>, HistoryNavigator) {
        let nav = HistoryNavigator::new();
        let config = DaybookConfig::new("http://localhost:54321", "anon")
            .with_site_url("https://daybook.example");
        let svc = SessionService::new(
            Arc::new(backend.clone()),
            ActivityLog::new(),
            Arc::new(nav.clone()),
            &config,
        );
        (svc, nav)
    }

    #[tokio::test]
    async fn test_check_session_without_session() {
        let backend = MemoryBackend::new();
        let (svc, _) = service(&backend);
        assert!(svc.state().loading);

        svc.check_session().await;
        let state = svc.state();
        assert!(!state.loading);
        assert!(!state.authenticated);
        assert!(state.user.is_none());
    }

    #[tokio::test]
    async fn test_check_session_failure_records_error() {
        let backend = MemoryBackend::new();
        let (svc, _) = service(&backend);
        backend.fail_next(Operation::GetSession, "offline");

        svc.check_session().await;
        let state = svc.state();
        assert!(!state.loading);
        assert!(state.error.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_reset_password_uses_site_redirect() {
        let backend = MemoryBackend::new();
        let (svc, _) = service(&backend);

        assert!(svc.reset_password("ana@example.com").await);
        assert_eq!(
            backend.reset_requests(),
            vec![(
                "ana@example.com".to_string(),
                "https://daybook.example/reset-password".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_logout_failure_keeps_session() {
        let backend = MemoryBackend::new();
        backend.register("ana@example.com", "pw", Some("Ana"));
        let (svc, nav) = service(&backend);
        assert!(svc.login("ana@example.com", "pw").await);

        backend.fail_next(Operation::SignOut, "network down");
        assert!(!svc.logout().await);

        let state = svc.state();
        assert!(!state.loading);
        assert!(state.authenticated);
        assert_eq!(state.error.as_deref(), Some("network down"));
        assert_eq!(nav.history(), vec![Route::Dashboard]);
        let last = svc.activity_log().last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.message, "Sign out failed: network down");
    }

    #[tokio::test]
    async fn test_signup_failure_creates_nothing() {
        let backend = MemoryBackend::new();
        let (svc, nav) = service(&backend);

        backend.fail_next(Operation::SignUp, "rate limited");
        let outcome = svc.signup("Ana", "ana@example.com", "pw", None).await;

        assert!(outcome.is_none());
        assert_eq!(backend.account_count(), 0);
        assert!(backend.rows(Profile::TABLE).is_empty());
        assert!(nav.history().is_empty());
        let state = svc.state();
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("rate limited"));
        assert_eq!(svc.activity_log().last().unwrap().message, "Sign up failed: rate limited");
    }

    #[tokio::test]
    async fn test_signup_survives_profile_failure() {
        let backend = MemoryBackend::new();
        let (svc, nav) = service(&backend);

        backend.fail_next(Operation::Upsert, "profiles unavailable");
        let outcome = svc.signup("Ana", "ana@example.com", "pw", None).await;

        assert!(matches!(outcome, Some(SignUpOutcome::SignedIn(_))));
        assert_eq!(backend.account_count(), 1);
        assert!(backend.rows(Profile::TABLE).is_empty());
        assert!(svc.is_authenticated());
        assert_eq!(nav.history(), vec![Route::Dashboard]);
        assert!(svc
            .activity_log()
            .entries()
            .iter()
            .any(|e| e.level == LogLevel::Error
                && e.message.contains("saving your profile failed")));
    }

    #[tokio::test]
    async fn test_update_password_goes_to_dashboard() {
        let backend = MemoryBackend::new();
        backend.register("ana@example.com", "old", Some("Ana"));
        let (svc, nav) = service(&backend);
        assert!(svc.login("ana@example.com", "old").await);

        assert!(svc.update_password("new").await);
        assert_eq!(nav.history(), vec![Route::Dashboard, Route::Dashboard]);
        assert_eq!(svc.activity_log().last().unwrap().message, "Password updated");
        assert!(!svc.state().loading);
    }

    #[tokio::test]
    async fn test_update_password_failure_stays_put() {
        let backend = MemoryBackend::new();
        backend.register("ana@example.com", "old", Some("Ana"));
        let (svc, nav) = service(&backend);
        assert!(svc.login("ana@example.com", "old").await);

        backend.fail_next(Operation::UpdatePassword, "too weak");
        assert!(!svc.update_password("x").await);

        let state = svc.state();
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("too weak"));
        assert_eq!(nav.history(), vec![Route::Dashboard]);
        let last = svc.activity_log().last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.message, "Password update failed: too weak");
    }

    #[tokio::test]
    async fn test_listener_stops_on_shutdown() {
        let backend = MemoryBackend::new();
        let user = backend.register("ana@example.com", "pw", Some("Ana"));
        let (svc, _) = service(&backend);
        svc.start().await;
        svc.shutdown();
        tokio::task::yield_now().await;

        backend.set_session(Some(MemoryBackend::session_for(&user)));
        tokio::task::yield_now().await;
        assert!(!svc.is_authenticated());
    }
}
