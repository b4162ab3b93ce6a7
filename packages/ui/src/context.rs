//! Service container handed to frontends.

use std::sync::Arc;

use store::{AuthBackend, Calendar, DaybookConfig, RecordKind, RecordStore};

use crate::activity_log::ActivityLog;
use crate::auth::SessionService;
use crate::daily_record::DailyRecordService;
use crate::navigation::Navigator;

/// Holds the services a frontend may ask for.
///
/// Asking for a service that was never provided is a wiring bug and panics.
pub struct AppContext<B> {
    log: ActivityLog,
    session: Option<SessionService<B>>,
    journal: Option<DailyRecordService<B>>,
    book_reviews: Option<DailyRecordService<B>>,
}

impl<B> Clone for AppContext<B> {
    fn clone(&self) -> Self {
        Self {
            log: self.log.clone(),
            session: self.session.clone(),
            journal: self.journal.clone(),
            book_reviews: self.book_reviews.clone(),
        }
    }
}

impl<B: AuthBackend + RecordStore + 'static> AppContext<B> {
    /// An empty container; services are added with the `provide_*` methods.
    pub fn new(log: ActivityLog) -> Self {
        Self {
            log,
            session: None,
            journal: None,
            book_reviews: None,
        }
    }

    /// Wire the session service and both record services against one backend.
    /// The record services follow the session's identity.
    pub fn assemble(
        backend: Arc<B>,
        navigator: Arc<dyn Navigator>,
        config: &DaybookConfig,
        calendar: Calendar,
    ) -> Self {
        let log = ActivityLog::new();
        let session = SessionService::new(backend.clone(), log.clone(), navigator, config);
        let journal = DailyRecordService::journal(backend.clone(), log.clone(), calendar.clone());
        let book_reviews = DailyRecordService::book_reviews(backend, log.clone(), calendar);
        journal.follow(session.subscribe());
        book_reviews.follow(session.subscribe());

        Self::new(log)
            .provide_session(session)
            .provide_records(journal)
            .provide_records(book_reviews)
    }

    pub fn provide_session(mut self, session: SessionService<B>) -> Self {
        self.session = Some(session);
        self
    }

    /// Register a record service under its kind.
    pub fn provide_records(mut self, records: DailyRecordService<B>) -> Self {
        match records.kind() {
            RecordKind::JournalEntry => self.journal = Some(records),
            RecordKind::BookReview => self.book_reviews = Some(records),
        }
        self
    }

    /// Start the session service if one was provided.
    pub async fn start(&self) {
        if let Some(session) = &self.session {
            session.start().await;
        }
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn session(&self) -> &SessionService<B> {
        match &self.session {
            Some(session) => session,
            None => panic!("SessionService requested but not provided to AppContext"),
        }
    }

    pub fn records(&self, kind: RecordKind) -> &DailyRecordService<B> {
        let records = match kind {
            RecordKind::JournalEntry => &self.journal,
            RecordKind::BookReview => &self.book_reviews,
        };
        match records {
            Some(records) => records,
            None => panic!(
                "DailyRecordService for {:?} requested but not provided to AppContext",
                kind
            ),
        }
    }

    pub fn journal(&self) -> &DailyRecordService<B> {
        self.records(RecordKind::JournalEntry)
    }

    pub fn book_reviews(&self) -> &DailyRecordService<B> {
        self.records(RecordKind::BookReview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::LogLevel;
    use crate::auth::SignUpOutcome;
    use crate::navigation::{HistoryNavigator, Route};
    use store::{DayPolicy, FixedClock, Filter, MemoryBackend, Profile};

    fn context(backend: &MemoryBackend) -> (AppContext<MemoryBackend>, HistoryNavigator) {
        let nav = HistoryNavigator::new();
        let calendar = Calendar::new(Arc::new(FixedClock::at_day(2024, 1, 15)), DayPolicy::Utc);
        let ctx = AppContext::assemble(
            Arc::new(backend.clone()),
            Arc::new(nav.clone()),
            &DaybookConfig::default(),
            calendar,
        );
        (ctx, nav)
    }

    /// Let the follower pick up the signed-in identity and finish its fetch.
    async fn settled(records: &DailyRecordService<MemoryBackend>) {
        while records.identity().is_none() || records.state().loading {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_login_failure_then_success() {
        let backend = MemoryBackend::new();
        backend.register("ana@example.com", "correct horse", Some("Ana"));
        let (ctx, nav) = context(&backend);
        ctx.start().await;

        assert!(!ctx.session().login("ana@example.com", "wrong").await);
        let state = ctx.session().state();
        assert!(!state.authenticated);
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Invalid login credentials"));
        assert_eq!(ctx.activity_log().last().unwrap().level, LogLevel::Error);

        assert!(ctx.session().login("ana@example.com", "correct horse").await);
        let state = ctx.session().state();
        assert!(state.authenticated);
        assert!(state.error.is_none());
        assert_eq!(state.user.unwrap().name, "Ana");
        assert_eq!(nav.current(), Some(Route::Dashboard));
    }

    #[tokio::test]
    async fn test_duplicate_signup_creates_nothing() {
        let backend = MemoryBackend::new();
        let (ctx, nav) = context(&backend);
        ctx.start().await;

        let first = ctx
            .session()
            .signup("Ana", "ana@example.com", "pw-123456", Some("555-0100"))
            .await
            .unwrap();
        assert!(matches!(first, SignUpOutcome::SignedIn(_)));
        assert!(ctx.session().logout().await);

        let second = ctx
            .session()
            .signup("Ana again", "ana@example.com", "pw-654321", None)
            .await;
        assert!(second.is_none());
        assert_eq!(backend.account_count(), 1);
        assert_eq!(backend.rows(Profile::TABLE).len(), 1);
        assert_eq!(backend.rows(Profile::TABLE)[0]["phone"], "555-0100");
        assert!(ctx.session().state().error.unwrap().contains("already exists"));
        assert_eq!(nav.current(), Some(Route::Login));
    }

    #[tokio::test]
    async fn test_signup_awaiting_confirmation() {
        let backend = MemoryBackend::new().with_email_confirmation();
        let (ctx, nav) = context(&backend);

        let outcome = ctx
            .session()
            .signup("", "bo@example.com", "pw-123456", None)
            .await
            .unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationRequired(_)));
        assert_eq!(outcome.identity().name, "bo");
        assert!(!ctx.session().is_authenticated());
        assert_eq!(nav.current(), Some(Route::Login));

        let profile = Filter::new().eq("id", &outcome.identity().id);
        assert_eq!(backend.count(Profile::TABLE, &profile), 1);
    }

    #[tokio::test]
    async fn test_save_creates_then_updates_todays_row() {
        let backend = MemoryBackend::new();
        backend.register("ana@example.com", "pw", None);
        let (ctx, _) = context(&backend);
        ctx.start().await;
        assert!(ctx.session().login("ana@example.com", "pw").await);

        settled(ctx.journal()).await;

        let created = ctx.journal().save_for_today("Started").await.unwrap().unwrap();
        let updated = ctx
            .journal()
            .save_for_today("Finished chapter 3")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.date.to_string(), "2024-01-15");
        assert_eq!(backend.rows("journal_entries").len(), 1);
        assert_eq!(backend.rows("journal_entries")[0]["date"], "2024-01-15");
        assert_eq!(backend.rows("journal_entries")[0]["text"], "Finished chapter 3");
        assert!(backend.rows("book_reviews").is_empty());
        assert_eq!(ctx.journal().state().text(), "Finished chapter 3");
    }

    #[tokio::test]
    async fn test_records_follow_session() {
        let backend = MemoryBackend::new();
        backend.register("ana@example.com", "pw", None);
        let (ctx, _) = context(&backend);
        ctx.start().await;

        ctx.session().login("ana@example.com", "pw").await;
        settled(ctx.book_reviews()).await;
        ctx.book_reviews().save_for_today("Dune, 5 stars").await.unwrap();

        ctx.session().logout().await;
        let mut reviews = ctx.book_reviews().subscribe();
        reviews.wait_for(|s| s.record.is_none()).await.unwrap();
        assert!(ctx.book_reviews().identity().is_none());

        ctx.session().login("ana@example.com", "pw").await;
        let state = reviews
            .wait_for(|s| s.record.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(state.text(), "Dune, 5 stars");
    }

    #[tokio::test]
    async fn test_save_without_identity_is_noop() {
        let backend = MemoryBackend::new();
        let (ctx, _) = context(&backend);
        ctx.start().await;

        let saved = ctx.journal().save_for_today("orphan").await.unwrap();
        assert!(saved.is_none());
        assert!(backend.rows("journal_entries").is_empty());
        assert_eq!(ctx.activity_log().last().unwrap().level, LogLevel::Error);
    }

    #[test]
    #[should_panic(expected = "not provided")]
    fn test_missing_service_panics() {
        let ctx: AppContext<MemoryBackend> = AppContext::new(ActivityLog::new());
        ctx.session();
    }
}
