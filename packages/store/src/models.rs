//! # Domain models for identities, sessions and daily records
//!
//! Defines the data structures exchanged with the backend collaborator. Every type
//! is `Serialize + Deserialize` so it can travel over the HTTP API, live as a JSON
//! row in [`crate::MemoryBackend`], or be persisted in a session file.
//!
//! ## Types
//!
//! | Struct | Represents |
//! |--------|-----------|
//! | [`AuthUser`] | The user object carried by a backend session: id, email, and free-form signup metadata. |
//! | [`AuthSession`] | An issued session: access/refresh tokens, expiry, and the [`AuthUser`] it belongs to. |
//! | [`AuthEvent`] | A session-change notification (`SIGNED_IN`, `SIGNED_OUT`, ...) with the session payload, if any. |
//! | [`Identity`] | The fields the UI shows for the signed-in user, derived from an [`AuthUser`]. |
//! | [`DailyRecord`] | One free-text entry for a `(user_id, date)` pair, as stored in a record table. |
//! | [`Profile`] | The row written to the `profiles` table when an account is created. |
//!
//! [`RecordKind`] names the two daily-record tables (`journal_entries` and
//! `book_reviews`); both share the [`DailyRecord`] shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Profile metadata attached to an account at signup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// User object as returned by the auth API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// An authenticated session issued by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry, if the backend reported one.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Kind of session-change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session-change notification broadcast by an [`crate::AuthBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<AuthSession>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<AuthSession>) -> Self {
        Self { kind, session }
    }
}

/// Result of a successful signup call.
#[derive(Clone, Debug, PartialEq)]
pub struct SignUpResponse {
    pub user: AuthUser,
    /// `None` while the backend waits for email confirmation.
    pub session: Option<AuthSession>,
}

/// The signed-in user as the UI sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl Identity {
    /// Derive an identity from a session user.
    ///
    /// The display name comes from the signup metadata and falls back to the
    /// local part of the email address.
    pub fn from_user(user: &AuthUser) -> Self {
        let email = user.email.clone().unwrap_or_default();
        let name = user
            .user_metadata
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email_local_part(&email).to_string());
        let phone = user
            .user_metadata
            .phone
            .clone()
            .or_else(|| user.phone.clone())
            .filter(|p| !p.is_empty());

        Self {
            id: user.id.clone(),
            name,
            email,
            phone,
        }
    }

    pub fn from_session(session: &AuthSession) -> Self {
        Self::from_user(&session.user)
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// The two kinds of per-day records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    JournalEntry,
    BookReview,
}

impl RecordKind {
    /// Backend table holding records of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::JournalEntry => "journal_entries",
            RecordKind::BookReview => "book_reviews",
        }
    }

    /// Human-readable label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::JournalEntry => "Journal entry",
            RecordKind::BookReview => "Book review",
        }
    }
}

/// A daily record row: at most one per `(user_id, date)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    /// Backend-assigned id
    pub id: String,
    pub user_id: String,
    /// Serialised as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub text: String,
}

/// Insert payload for a daily record; the backend assigns the id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDailyRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub text: String,
}

/// Patch payload used when a record for the day already exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyRecordText {
    pub text: String,
}

/// Row of the `profiles` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Profile {
    pub const TABLE: &'static str = "profiles";

    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            phone: identity.phone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: Option<&str>, email: &str) -> AuthUser {
        AuthUser {
            id: "u1".to_string(),
            email: Some(email.to_string()),
            phone: None,
            user_metadata: UserMetadata {
                name: name.map(str::to_string),
                phone: Some("555-0100".to_string()),
            },
        }
    }

    #[test]
    fn test_identity_uses_metadata_name() {
        let identity = Identity::from_user(&user(Some("Ada"), "ada@example.com"));
        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.phone.as_deref(), Some("555-0100"));
    }

    #[test]
    fn test_identity_defaults_name_to_email_local_part() {
        let identity = Identity::from_user(&user(None, "reader@example.com"));
        assert_eq!(identity.name, "reader");

        let identity = Identity::from_user(&user(Some("   "), "blank@example.com"));
        assert_eq!(identity.name, "blank");
    }

    #[test]
    fn test_daily_record_date_is_iso_day() {
        let record = DailyRecord {
            id: "r1".to_string(),
            user_id: "u1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            text: "Finished chapter 3".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["user_id"], "u1");
    }

    #[test]
    fn test_record_kind_tables() {
        assert_eq!(RecordKind::JournalEntry.table(), "journal_entries");
        assert_eq!(RecordKind::BookReview.table(), "book_reviews");
    }

    #[test]
    fn test_auth_event_kind_wire_names() {
        let json = serde_json::to_string(&AuthEventKind::SignedIn).unwrap();
        assert_eq!(json, "\"SIGNED_IN\"");
    }
}
