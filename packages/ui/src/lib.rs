//! Client-side services shared by every Daybook frontend.
//!
//! Frontends do not talk to the backend directly. They get an [`AppContext`]
//! and observe the `watch` states of its services:
//!
//! - [`SessionService`]: the signed-in [`store::Identity`] and the auth operations.
//! - [`DailyRecordService`]: today's journal entry or book review, following
//!   the session's identity.
//!
//! Outcomes meant for the user go to the [`ActivityLog`]; screen changes go to
//! the [`Navigator`].

pub mod activity_log;
pub use activity_log::{ActivityLog, LogEntry, LogLevel};

mod auth;
pub use auth::{AuthState, SessionService, SignUpOutcome};

mod daily_record;
pub use daily_record::{DailyRecordService, RecordState};

mod context;
pub use context::AppContext;

mod navigation;
pub use navigation::{HistoryNavigator, Navigator, Route};

mod loading;
