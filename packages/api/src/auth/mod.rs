//! # Auth API: `/auth/v1`
//!
//! [`store::AuthBackend`] for [`HttpBackend`] over a GoTrue-style API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | sign in | `POST /auth/v1/token?grant_type=password` |
//! | refresh | `POST /auth/v1/token?grant_type=refresh_token` |
//! | sign up | `POST /auth/v1/signup` with `data` = user metadata |
//! | sign out | `POST /auth/v1/logout` (bearer = access token) |
//! | reset email | `POST /auth/v1/recover?redirect_to=...` |
//! | password update | `PUT /auth/v1/user` (bearer = access token) |
//!
//! Sessions are kept client-side; `get_session` refreshes an expired session
//! with its refresh token before returning it.

mod config;
mod session;

pub use config::BackendConfig;
pub use session::{SessionFile, SESSION_FILE_NAME};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use store::{
    AuthBackend, AuthEvent, AuthEventKind, AuthSession, AuthUser, BackendError, SignUpResponse,
    UserMetadata,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::{is_success, HttpBackend};

/// Token grant response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    pub(crate) fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Error body shapes returned by the auth API across versions.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

pub(crate) fn auth_error(status: u16, body: &str) -> BackendError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    if parsed.error_code.as_deref() == Some("user_already_exists") {
        return BackendError::UserAlreadyRegistered;
    }
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| format!("auth request failed with status {status}"));
    if message.to_lowercase().contains("already registered") {
        return BackendError::UserAlreadyRegistered;
    }
    BackendError::Auth {
        status: Some(status),
        message,
    }
}

/// Decode a signup body: a token grant when the account is confirmed at once,
/// otherwise the bare user awaiting email confirmation.
pub(crate) fn signup_response(body: &str, now: DateTime<Utc>) -> Result<SignUpResponse, BackendError> {
    let mut value: Value = serde_json::from_str(body)?;
    if value.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(value)?;
        let user = token.user.clone();
        return Ok(SignUpResponse {
            user,
            session: Some(token.into_session(now)),
        });
    }
    if value.get("id").is_none() {
        if let Some(user) = value.get_mut("user").map(Value::take) {
            value = user;
        }
    }
    // An existing email gets an obfuscated user with no identities.
    let no_identities = value
        .get("identities")
        .and_then(Value::as_array)
        .is_some_and(|identities| identities.is_empty());
    if no_identities {
        return Err(BackendError::UserAlreadyRegistered);
    }
    let user: AuthUser = serde_json::from_value(value)?;
    Ok(SignUpResponse {
        user,
        session: None,
    })
}

impl HttpBackend {
    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<AuthSession, BackendError> {
        let request = self
            .http
            .post(self.config.endpoint("auth/v1/token"))
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let (status, text) = self.execute(self.anonymous(request)).await?;
        if !is_success(status) {
            return Err(auth_error(status, &text));
        }
        let token: TokenResponse = serde_json::from_str(&text)?;
        Ok(token.into_session(Utc::now()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        debug!("refreshing expired session");
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.replace_session(Some(session.clone()), AuthEventKind::TokenRefreshed);
        Ok(session)
    }
}

impl AuthBackend for HttpBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        match session.refresh_token.as_deref() {
            Some(refresh_token) => match self.refresh(refresh_token).await {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    warn!("session refresh failed: {}", e);
                    self.replace_session(None, AuthEventKind::SignedOut);
                    Err(e)
                }
            },
            None => {
                self.replace_session(None, AuthEventKind::SignedOut);
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let session = self
            .token_grant(
                "password",
                json!({ "email": email.trim(), "password": password }),
            )
            .await?;
        info!(user_id = %session.user.id, "signed in");
        self.replace_session(Some(session.clone()), AuthEventKind::SignedIn);
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<SignUpResponse, BackendError> {
        let request = self
            .http
            .post(self.config.endpoint("auth/v1/signup"))
            .json(&json!({ "email": email.trim(), "password": password, "data": metadata }));
        let (status, text) = self.execute(self.anonymous(request)).await?;
        if !is_success(status) {
            return Err(auth_error(status, &text));
        }

        let response = signup_response(&text, Utc::now())?;
        info!(user_id = %response.user.id, confirmed = response.session.is_some(), "account created");
        if let Some(session) = &response.session {
            self.replace_session(Some(session.clone()), AuthEventKind::SignedIn);
        }
        Ok(response)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.current_session().is_some() {
            let request = self.http.post(self.config.endpoint("auth/v1/logout"));
            let (status, text) = self.execute(self.authorize(request)).await?;
            // A token the server no longer knows is as good as signed out.
            if !is_success(status) && !matches!(status, 401 | 403 | 404) {
                return Err(auth_error(status, &text));
            }
        }
        self.replace_session(None, AuthEventKind::SignedOut);
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.config.endpoint("auth/v1/recover"))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email.trim() }));
        let (status, text) = self.execute(self.anonymous(request)).await?;
        if !is_success(status) {
            return Err(auth_error(status, &text));
        }
        Ok(())
    }

    async fn update_user_password(&self, password: &str) -> Result<AuthUser, BackendError> {
        let Some(mut session) = self.current_session() else {
            return Err(BackendError::NotAuthenticated);
        };
        let request = self
            .http
            .put(self.config.endpoint("auth/v1/user"))
            .json(&json!({ "password": password }));
        let (status, text) = self.execute(self.authorize(request)).await?;
        if !is_success(status) {
            return Err(auth_error(status, &text));
        }

        let user: AuthUser = serde_json::from_str(&text)?;
        session.user = user.clone();
        self.replace_session(Some(session), AuthEventKind::UserUpdated);
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.subscribe_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    const USER: &str = r#"{"id":"u1","email":"ada@example.com","user_metadata":{"name":"Ada"},"identities":[{"id":"i1"}]}"#;

    #[test]
    fn test_token_response_expiry_from_expires_in() {
        let body = format!(
            r#"{{"access_token":"a","refresh_token":"r","expires_in":3600,"token_type":"bearer","user":{USER}}}"#
        );
        let token: TokenResponse = serde_json::from_str(&body).unwrap();
        let session = token.into_session(now());
        assert_eq!(session.expires_at, Some(now() + chrono::Duration::seconds(3600)));
        assert_eq!(session.user.user_metadata.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_auth_error_messages() {
        let err = auth_error(
            400,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(err.to_string(), "Invalid login credentials");

        let err = auth_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#,
        );
        assert_eq!(err.to_string(), "Email not confirmed");

        let err = auth_error(502, "<html>bad gateway</html>");
        assert_eq!(err.to_string(), "auth request failed with status 502");
    }

    #[test]
    fn test_already_registered_is_distinct() {
        let err = auth_error(
            422,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert_eq!(err, BackendError::UserAlreadyRegistered);

        let err = auth_error(400, r#"{"msg":"User already registered"}"#);
        assert_eq!(err, BackendError::UserAlreadyRegistered);
    }

    #[test]
    fn test_signup_response_variants() {
        let confirmed = format!(r#"{{"access_token":"a","expires_in":60,"user":{USER}}}"#);
        let response = signup_response(&confirmed, now()).unwrap();
        assert!(response.session.is_some());

        let pending = signup_response(USER, now()).unwrap();
        assert_eq!(pending.user.id, "u1");
        assert!(pending.session.is_none());

        let wrapped = format!(r#"{{"user":{USER},"session":null}}"#);
        assert_eq!(signup_response(&wrapped, now()).unwrap().user.id, "u1");

        let obfuscated = r#"{"id":"u9","email":"ada@example.com","identities":[]}"#;
        assert_eq!(
            signup_response(obfuscated, now()).unwrap_err(),
            BackendError::UserAlreadyRegistered
        );
    }
}
