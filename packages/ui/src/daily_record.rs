//! Today's record of one kind for the signed-in user.
//!
//! The service keeps the record for the current identity and calendar day in
//! a `watch` value. Whenever the identity changes the visible record is
//! cleared at once and today's row is fetched again. Each change bumps a
//! generation counter; a fetch applies its result only if the generation it
//! started under is still current, so a slow fetch for a previous user can
//! never overwrite the state of the next one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use store::{BackendError, Calendar, DailyRecord, DailyRecords, Identity, RecordKind, RecordStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::activity_log::{ActivityLog, LogLevel};
use crate::auth::AuthState;
use crate::loading::{Flags, LoadingGuard};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordState {
    pub record: Option<DailyRecord>,
    pub loading: bool,
    pub error: Option<String>,
}

impl RecordState {
    /// Text of today's record, empty when there is none yet.
    pub fn text(&self) -> &str {
        self.record.as_ref().map(|r| r.text.as_str()).unwrap_or("")
    }
}

impl Flags for RecordState {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }
}

struct RecordInner<B> {
    records: DailyRecords<B>,
    calendar: Calendar,
    log: ActivityLog,
    state: watch::Sender<RecordState>,
    identity: Mutex<Option<Identity>>,
    generation: AtomicU64,
    /// Bumped on identity changes only; saves leave it alone.
    epoch: AtomicU64,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl<B> Drop for RecordInner<B> {
    fn drop(&mut self) {
        if let Some(follower) = self.follower.get_mut().ok().and_then(Option::take) {
            follower.abort();
        }
    }
}

pub struct DailyRecordService<B> {
    inner: Arc<RecordInner<B>>,
}

impl<B> Clone for DailyRecordService<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: RecordStore + 'static> DailyRecordService<B> {
    pub fn new(backend: Arc<B>, kind: RecordKind, log: ActivityLog, calendar: Calendar) -> Self {
        let (state, _) = watch::channel(RecordState::default());
        Self {
            inner: Arc::new(RecordInner {
                records: DailyRecords::new(backend, kind),
                calendar,
                log,
                state,
                identity: Mutex::new(None),
                generation: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                follower: Mutex::new(None),
            }),
        }
    }

    pub fn journal(backend: Arc<B>, log: ActivityLog, calendar: Calendar) -> Self {
        Self::new(backend, RecordKind::JournalEntry, log, calendar)
    }

    pub fn book_reviews(backend: Arc<B>, log: ActivityLog, calendar: Calendar) -> Self {
        Self::new(backend, RecordKind::BookReview, log, calendar)
    }

    pub fn kind(&self) -> RecordKind {
        self.inner.records.kind()
    }

    pub fn state(&self) -> RecordState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecordState> {
        self.inner.state.subscribe()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.inner.log
    }

    pub fn record(&self) -> Option<DailyRecord> {
        self.inner.state.borrow().record.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner
            .identity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// React to identity changes published by the session service.
    ///
    /// The current value is applied right away. Replaces any previous
    /// follower; the task ends with the session state or with this service.
    pub fn follow(&self, mut auth: watch::Receiver<AuthState>) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut current: Option<Option<String>> = None;
            loop {
                let identity = auth.borrow_and_update().user.clone();
                let id = identity.as_ref().map(|i| i.id.clone());
                if current.as_ref() != Some(&id) {
                    let Some(service) = upgrade(&weak) else { break };
                    tokio::spawn(service.identity_changed(identity));
                    current = Some(id);
                }
                if auth.changed().await.is_err() {
                    break;
                }
            }
        });

        let previous = self
            .inner
            .follower
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Switch to `identity`.
    ///
    /// The visible record is cleared before this returns; the returned future
    /// fetches today's row and applies it unless a newer change superseded it.
    pub fn identity_changed(
        &self,
        identity: Option<Identity>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let generation = self.begin(identity.clone());
        let service = self.clone();
        async move {
            if let Some(identity) = identity {
                service.fetch(generation, &identity).await;
            }
        }
    }

    /// Create or update today's record for the signed-in user.
    ///
    /// `Ok(None)` when nobody is signed in.
    pub async fn save_for_today(&self, text: &str) -> Result<Option<DailyRecord>, BackendError> {
        let label = self.kind().label();
        let Some(identity) = self.identity() else {
            let message = format!("Sign in to save your {}", label.to_lowercase());
            self.inner
                .state
                .send_modify(|s| s.error = Some(message.clone()));
            self.inner.log.push(LogLevel::Error, &message);
            return Ok(None);
        };

        // A fetch started by a later identity change owns `loading` from then on.
        let epochs = &self.inner.epoch;
        let epoch = epochs.load(Ordering::SeqCst);
        let _loading = LoadingGuard::begin_while(&self.inner.state, move || {
            epochs.load(Ordering::SeqCst) == epoch
        });
        let today = self.inner.calendar.today();
        match self.inner.records.save(&identity.id, today, text).await {
            Ok(saved) => {
                let record = saved.into_record();
                info!(kind = ?self.kind(), user_id = %identity.id, date = %record.date, "Saved");
                self.inner.state.send_if_modified(|s| {
                    if self.current_user_id().as_deref() != Some(identity.id.as_str()) {
                        return false;
                    }
                    // Fetches still in flight would carry the pre-save row.
                    self.inner.generation.fetch_add(1, Ordering::SeqCst);
                    s.record = Some(record.clone());
                    true
                });
                self.inner.log.push(LogLevel::Success, &format!("{} saved", label));
                Ok(Some(record))
            }
            Err(e) => {
                self.inner
                    .state
                    .send_modify(|s| s.error = Some(e.to_string()));
                self.inner
                    .log
                    .push(LogLevel::Error, &format!("Failed to save {}: {}", label.to_lowercase(), e));
                Err(e)
            }
        }
    }

    /// The signed-in user's most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<DailyRecord> {
        let Some(identity) = self.identity() else {
            debug!(kind = ?self.kind(), "No identity, no recent records");
            return Vec::new();
        };
        match self.inner.records.recent(&identity.id, limit).await {
            Ok(records) => records,
            Err(e) => {
                self.inner.log.push(
                    LogLevel::Error,
                    &format!("Failed to load recent {}s: {}", self.kind().label().to_lowercase(), e),
                );
                Vec::new()
            }
        }
    }

    /// Store the new identity, bump the generation and clear the record.
    fn begin(&self, identity: Option<Identity>) -> u64 {
        let fetching = identity.is_some();
        *self
            .inner
            .identity
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = identity;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_modify(|s| {
            s.record = None;
            s.error = None;
            s.loading = fetching;
        });
        generation
    }

    async fn fetch(&self, generation: u64, identity: &Identity) {
        let today = self.inner.calendar.today();
        let result = self.inner.records.find(&identity.id, today).await;

        let mut failure = None;
        let applied = self.inner.state.send_if_modified(|s| {
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            s.loading = false;
            match &result {
                Ok(record) => s.record = record.clone(),
                Err(e) => {
                    s.error = Some(e.to_string());
                    failure = Some(e.clone());
                }
            }
            true
        });

        if !applied {
            debug!(user_id = %identity.id, generation, "Discarding stale fetch");
        } else if let Some(e) = failure {
            self.inner.log.push(
                LogLevel::Error,
                &format!("Failed to load today's {}: {}", self.kind().label().to_lowercase(), e),
            );
        }
    }

    fn current_user_id(&self) -> Option<String> {
        self.inner
            .identity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|i| i.id.clone())
    }
}

fn upgrade<B>(inner: &Weak<RecordInner<B>>) -> Option<DailyRecordService<B>> {
    inner.upgrade().map(|inner| DailyRecordService { inner })
}
