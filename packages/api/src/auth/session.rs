//! Session persistence between runs.
//!
//! The backend issues tokens; the client keeps the latest [`AuthSession`] in a
//! JSON file so a restarted frontend can resume without signing in again.

use std::path::{Path, PathBuf};

use store::AuthSession;
use tracing::warn;

/// Filename of the persisted session under the data directory.
pub const SESSION_FILE_NAME: &str = "session.json";

/// A JSON file holding the current session, if any.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Platform data directory location: `<data_dir>/daybook/session.json`.
    pub fn default_location() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daybook");
        Self::new(base.join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session. Missing or unreadable files count as no session.
    pub fn load(&self) -> Option<AuthSession> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring corrupt session file: {}", e);
                None
            }
        }
    }

    /// Write or delete the stored session.
    pub fn store(&self, session: Option<&AuthSession>) -> std::io::Result<()> {
        match session {
            Some(session) => {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let json = serde_json::to_string_pretty(session)?;
                std::fs::write(&self.path, json)
            }
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }
}
