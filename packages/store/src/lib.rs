pub mod backend;
pub mod config;
pub mod day;
pub mod error;
pub mod models;
pub mod records;

mod memory;
pub use memory::{MemoryBackend, Operation};

pub use backend::{AuthBackend, Filter, Order, RecordStore};
pub use config::DaybookConfig;
pub use day::{Calendar, Clock, DayPolicy, FixedClock, SystemClock};
pub use error::{BackendError, Result};
pub use models::{
    AuthEvent, AuthEventKind, AuthSession, AuthUser, DailyRecord, Identity, Profile, RecordKind,
    SignUpResponse, UserMetadata,
};
pub use records::{save_profile, DailyRecords, Saved};
