//! Typed access to daily-record and profile tables.
//!
//! [`DailyRecords`] layers the one-record-per-day rule on top of a generic
//! [`RecordStore`]: the backend does not enforce uniqueness of
//! `(user_id, date)`, so every write is preceded by a lookup and becomes an
//! update-by-id when a row for the day exists.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::backend::{Filter, Order, RecordStore};
use crate::day::iso_date;
use crate::error::Result;
use crate::models::{DailyRecord, DailyRecordText, NewDailyRecord, Profile, RecordKind};

/// Outcome of [`DailyRecords::save`].
#[derive(Clone, Debug, PartialEq)]
pub enum Saved {
    Created(DailyRecord),
    Updated(DailyRecord),
}

impl Saved {
    pub fn record(&self) -> &DailyRecord {
        match self {
            Saved::Created(r) | Saved::Updated(r) => r,
        }
    }

    pub fn into_record(self) -> DailyRecord {
        match self {
            Saved::Created(r) | Saved::Updated(r) => r,
        }
    }
}

/// Daily records of one [`RecordKind`].
pub struct DailyRecords<S> {
    store: Arc<S>,
    kind: RecordKind,
}

impl<S> Clone for DailyRecords<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind,
        }
    }
}

impl<S: RecordStore> DailyRecords<S> {
    pub fn new(store: Arc<S>, kind: RecordKind) -> Self {
        Self { store, kind }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// The record for `(user_id, date)`. A missing row is `Ok(None)`.
    pub async fn find(&self, user_id: &str, date: NaiveDate) -> Result<Option<DailyRecord>> {
        let filter = day_filter(user_id, date);
        self.store.select_one(self.kind.table(), &filter).await
    }

    /// Write `text` as the record for `(user_id, date)`, updating the existing
    /// row in place when there is one.
    pub async fn save(&self, user_id: &str, date: NaiveDate, text: &str) -> Result<Saved> {
        let table = self.kind.table();
        match self.find(user_id, date).await? {
            Some(existing) => {
                debug!(table, id = %existing.id, "updating daily record");
                let patch = DailyRecordText {
                    text: text.to_string(),
                };
                let record = self.store.update_by_id(table, &existing.id, &patch).await?;
                Ok(Saved::Updated(record))
            }
            None => {
                debug!(table, user_id, date = %date, "inserting daily record");
                let row = NewDailyRecord {
                    user_id: user_id.to_string(),
                    date,
                    text: text.to_string(),
                };
                let record = self.store.insert(table, &row).await?;
                Ok(Saved::Created(record))
            }
        }
    }

    /// Most recent records for a user, newest day first.
    pub async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<DailyRecord>> {
        let filter = Filter::new().eq("user_id", user_id);
        self.store
            .select_list(self.kind.table(), &filter, &Order::desc("date"), Some(limit))
            .await
    }
}

fn day_filter(user_id: &str, date: NaiveDate) -> Filter {
    Filter::new().eq("user_id", user_id).eq("date", iso_date(date))
}

/// Create or refresh the profile row keyed by the profile id.
pub async fn save_profile<S: RecordStore>(store: &S, profile: &Profile) -> Result<Profile> {
    store.upsert(Profile::TABLE, profile, "id").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, Operation};
    use crate::BackendError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_missing_day_is_empty_not_error() {
        let backend = Arc::new(MemoryBackend::new());
        let journal = DailyRecords::new(backend, RecordKind::JournalEntry);

        assert_eq!(journal.find("u1", day(15)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_creates_then_updates_same_row() {
        let backend = Arc::new(MemoryBackend::new());
        let journal = DailyRecords::new(backend.clone(), RecordKind::JournalEntry);

        let first = journal.save("u1", day(15), "Finished chapter 3").await.unwrap();
        assert!(matches!(first, Saved::Created(_)));

        let second = journal
            .save("u1", day(15), "Finished chapter 3 and 4")
            .await
            .unwrap();
        assert!(matches!(second, Saved::Updated(_)));
        assert_eq!(second.record().id, first.record().id);

        let rows = backend.rows("journal_entries");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_id"], "u1");
        assert_eq!(rows[0]["date"], "2024-01-15");
        assert_eq!(rows[0]["text"], "Finished chapter 3 and 4");
    }

    #[tokio::test]
    async fn test_kinds_and_users_are_separate() {
        let backend = Arc::new(MemoryBackend::new());
        let journal = DailyRecords::new(backend.clone(), RecordKind::JournalEntry);
        let reviews = DailyRecords::new(backend.clone(), RecordKind::BookReview);

        journal.save("u1", day(15), "entry").await.unwrap();
        reviews.save("u1", day(15), "review").await.unwrap();
        journal.save("u2", day(15), "other user").await.unwrap();

        assert_eq!(backend.rows("journal_entries").len(), 2);
        assert_eq!(backend.rows("book_reviews").len(), 1);
        assert_eq!(
            reviews.find("u1", day(15)).await.unwrap().unwrap().text,
            "review"
        );
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let backend = Arc::new(MemoryBackend::new());
        let journal = DailyRecords::new(backend, RecordKind::JournalEntry);
        for d in [12, 14, 13] {
            journal.save("u1", day(d), &format!("day {d}")).await.unwrap();
        }

        let recent = journal.recent("u1", 2).await.unwrap();
        let dates: Vec<NaiveDate> = recent.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(14), day(13)]);
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts_save() {
        let backend = Arc::new(MemoryBackend::new());
        let journal = DailyRecords::new(backend.clone(), RecordKind::JournalEntry);
        backend.fail_next(Operation::Select, "connection reset");

        let err = journal.save("u1", day(15), "text").await.unwrap_err();
        assert_eq!(err, BackendError::Injected("connection reset".to_string()));
        assert!(backend.rows("journal_entries").is_empty());
    }

    #[tokio::test]
    async fn test_save_profile_is_idempotent() {
        let backend = MemoryBackend::new();
        let profile = Profile {
            id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: Some("555-0100".to_string()),
        };
        save_profile(&backend, &profile).await.unwrap();
        save_profile(&backend, &profile).await.unwrap();
        assert_eq!(backend.rows(Profile::TABLE).len(), 1);
    }
}
