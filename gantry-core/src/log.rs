//! Run log types
//!
//! Every run owns a `RunLog`: a mutex-guarded buffer of leveled entries
//! shared between the stage executor and the process output streams.
//! The buffer is drained once at the end of a stage so the captured
//! lines can be attached to that stage's result.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A log entry captured during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Log buffer shared across one pipeline run
#[derive(Debug, Default)]
pub struct RunLog {
    buffer: Mutex<Vec<LogEntry>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry to the buffer
    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push(LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// Logs a debug message
    pub fn debug(&self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message);
    }

    /// Logs an info message
    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    /// Logs a warning message
    pub fn warning(&self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    /// Logs an error message
    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    /// Drains all entries from the buffer
    pub fn drain(&self) -> Vec<LogEntry> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.drain(..).collect()
    }

    /// Snapshot of current entries without draining
    pub fn peek(&self) -> Vec<LogEntry> {
        self.buffer.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain() {
        let log = RunLog::new();
        log.info("first");
        log.error("second");

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, LogLevel::Info);
        assert_eq!(drained[1].level, LogLevel::Error);
        assert_eq!(drained[1].message, "second");

        // Buffer should be empty after drain
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_peek_keeps_entries() {
        let log = RunLog::new();
        log.warning("kept");

        assert_eq!(log.peek().len(), 1);
        assert_eq!(log.peek().len(), 1);
        assert_eq!(log.drain().len(), 1);
    }
}
