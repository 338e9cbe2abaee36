//! Append-only console log shown next to the result. Entries are mirrored to tracing.

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
    Debug,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsoleLogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub level: LogLevel,
}

#[derive(Debug, Default)]
pub struct ConsoleLog {
    entries: Vec<ConsoleLogEntry>,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(target: "codecanvas::console", "{}", message),
            LogLevel::Error => error!(target: "codecanvas::console", "{}", message),
            LogLevel::Debug => debug!(target: "codecanvas::console", "{}", message),
        }
        self.entries.push(ConsoleLogEntry { timestamp: Local::now(), message, level });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ConsoleLogEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_order_and_level() {
        let mut log = ConsoleLog::new();
        log.info("one");
        log.error("two");
        log.success("three");
        let got: Vec<(&str, LogLevel)> = log.entries().iter().map(|e| (e.message.as_str(), e.level)).collect();
        assert_eq!(got, vec![("one", LogLevel::Info), ("two", LogLevel::Error), ("three", LogLevel::Success)]);
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);

        log.clear();
        assert!(log.entries().is_empty());
    }
}
