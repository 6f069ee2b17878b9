//! Leveled logging to stderr.
//!
//! A small logger for a library crate: a global atomic level filter, a
//! wall-clock timestamp per line, and a cloneable [`Logger`] carrying a
//! component id so messages from different subsystems can be told apart.

use std::fmt::Display;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Initialize the logger with the given minimum level.
pub fn init(level: Level) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns true if the given level should be logged.
#[inline]
fn enabled(level: Level) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Writes one timestamped line to stderr.
fn emit(level: Level, id: &str, message: &str) {
    if !enabled(level) {
        return;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    eprintln!(
        "{:02}:{:02}:{:02}.{:03} [{:5}] [{}] {}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        now.subsec_millis(),
        level,
        id,
        message
    );
}

/// Logger instance with an identifier prefix.
///
/// Cloning is cheap; clones share the id.
#[derive(Clone)]
pub struct Logger {
    id: Arc<str>,
}

impl Logger {
    /// Creates a new logger with the given identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    /// Logs a debug-level message.
    pub fn debug(&self, message: &str) {
        emit(Level::Debug, &self.id, message);
    }

    /// Logs an info-level message.
    pub fn info(&self, message: &str) {
        emit(Level::Info, &self.id, message);
    }

    /// Logs a warning-level message.
    pub fn warn(&self, message: &str) {
        emit(Level::Warn, &self.id, message);
    }

    /// Logs an error-level message.
    pub fn error(&self, message: &str) {
        emit(Level::Error, &self.id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Debug), "DEBUG");
        assert_eq!(format!("{}", Level::Info), "INFO");
        assert_eq!(format!("{}", Level::Warn), "WARN");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    #[test]
    fn enabled_respects_level() {
        init(Level::Warn);
        assert!(!enabled(Level::Info));
        assert!(enabled(Level::Warn));
        assert!(enabled(Level::Error));

        // Reset to default for other tests
        init(Level::Info);
    }

    #[test]
    fn logger_clone_shares_id() {
        let logger = Logger::new("vm");
        let clone = logger.clone();
        clone.info("clone works");
        logger.info("original works");
    }
}
