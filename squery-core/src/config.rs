use std::fmt;
use std::sync::Arc;

/// Default path under which operations are mounted.
pub const DEFAULT_BASE_PATH: &str = "/query";

/// Sink for the diagnostics emitted by callers, handlers and operations.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to `tracing` at info, warn and error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "squery", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "squery", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "squery", "{}", message);
    }
}

/// Shared client configuration.
///
/// Read-only after construction; clones share the logger.
#[derive(Clone)]
pub struct Config {
    pub base_path: String,
    pub logger: Arc<dyn Logger>,
}

impl Config {
    pub fn new(base_path: impl Into<String>) -> Self {
        Config {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// `{base_path}/{id}`.
    pub fn operation_path(&self, id: &str) -> String {
        format!("{}/{}", self.base_path, id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_path: DEFAULT_BASE_PATH.to_string(),
            logger: Arc::new(TracingLogger),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

/// Logger that records every message, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: std::sync::Mutex<Vec<(LogLevel, String)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(level, _)| *level == LogLevel::Error)
            .map(|(_, message)| message)
            .collect()
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

impl Logger for MemoryLogger {
    fn log(&self, message: &str) {
        self.push(LogLevel::Log, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}
