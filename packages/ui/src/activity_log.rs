//! Transient user-facing notifications.
//!
//! Services report outcomes here; frontends render them as toasts (via
//! [`ActivityLog::subscribe`]) or as a scrollable log (via
//! [`ActivityLog::entries`]). Every entry is mirrored to `tracing`.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// Shared handle to the notification list.
#[derive(Clone, Debug)]
pub struct ActivityLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    toasts: broadcast::Sender<LogEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        let (toasts, _) = broadcast::channel(32);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            toasts,
        }
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => error!(target: "daybook::activity", "{}", message),
            LogLevel::Warning => warn!(target: "daybook::activity", "{}", message),
            LogLevel::Info | LogLevel::Success => info!(target: "daybook::activity", "{}", message),
        }

        let entry = LogEntry {
            timestamp: current_time(),
            level,
            message: message.to_string(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        let _ = self.toasts.send(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Remove and return all entries.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Entries pushed from now on, for toast renderers.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.toasts.subscribe()
    }
}

fn current_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_and_toasts() {
        let log = ActivityLog::new();
        let mut toasts = log.subscribe();

        log.push(LogLevel::Success, "Saved");
        log.push(LogLevel::Error, "Failed");

        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.last().unwrap().level, LogLevel::Error);
        assert_eq!(toasts.recv().await.unwrap().message, "Saved");
        assert_eq!(log.entries()[0].timestamp.len(), "00:00:00".len());

        assert_eq!(log.drain().len(), 2);
        assert!(log.entries().is_empty());
    }
}
