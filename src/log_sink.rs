//! Pluggable logging sink for the compaction engine.
//!
//! The engine logs from several independent worker threads (one per
//! `DirCompactor`) and wants severities distinguishable without parsing
//! strings, so this is a small trait rather than a bare `Fn(String)`
//! callback.

use std::fmt;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// A destination for engine log records.
///
/// Implementations must be cheap to call from any DirCompactor worker
/// thread without additional synchronization on the caller's part.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, target: &str, message: &str);
}

/// Default sink: forwards to the `log` crate, so the host process's own
/// logger configuration (env_logger, tracing-log, etc.) decides where
/// records end up.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLogSink;

impl LogSink for StdLogSink {
    fn log(&self, level: LogLevel, target: &str, message: &str) {
        log::log!(target: "vprlog", level.into(), "[{target}] {message}");
    }
}
