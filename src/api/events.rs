//! Structured event buffer backing `/data/log`
//!
//! Every event is forwarded to the `log` facade and kept in a bounded ring
//! buffer so the status interface can show recent node activity.

use chrono::{DateTime, Utc};
use log::Level;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of events kept in memory
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// A single recorded event
#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    /// Subsystem that produced the event (`mine`, `pull`, `push`, ...)
    pub category: String,
    pub message: String,
}

/// Append-only, bounded event buffer
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl EventLog {
    /// Create a buffer keeping at most `capacity` entries (oldest evicted first)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn info(&self, category: &str, message: impl Into<String>) {
        self.record(Level::Info, category, message.into());
    }

    pub fn warn(&self, category: &str, message: impl Into<String>) {
        self.record(Level::Warn, category, message.into());
    }

    pub fn error(&self, category: &str, message: impl Into<String>) {
        self.record(Level::Error, category, message.into());
    }

    /// Emit through `log` and append to the buffer
    pub fn record(&self, level: Level, category: &str, message: String) {
        log::log!(level, "[{}] {}", category, message);

        let entry = LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            category: category.to_string(),
            message,
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of the buffered events, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
