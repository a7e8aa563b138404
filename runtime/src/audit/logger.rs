//! Per-recipe structured log, attached to the run report.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Severity of a recipe log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single recipe log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// Log sink handed to a recipe's `collect`.
///
/// Every entry is mirrored to `tracing` with the recipe's identity as
/// fields and kept in memory for the report. Cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct RecipeLog {
    builder: String,
    community: String,
    kind: String,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecipeLog {
    pub fn new(builder: &str, community: &str, kind: &str) -> Self {
        Self {
            builder: builder.to_string(),
            community: community.to_string(),
            kind: kind.to_string(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.record(LogLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message.into());
    }

    fn record(&self, level: LogLevel, message: String) {
        let (builder, community, kind) = (&self.builder, &self.community, &self.kind);
        match level {
            LogLevel::Debug => tracing::debug!(%builder, %community, %kind, "{message}"),
            LogLevel::Info => tracing::info!(%builder, %community, %kind, "{message}"),
            LogLevel::Warn => tracing::warn!(%builder, %community, %kind, "{message}"),
            LogLevel::Error => tracing::error!(%builder, %community, %kind, "{message}"),
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level,
            message,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Snapshot of the entries recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Number of entries at `warn` or above.
    pub fn warning_count(&self) -> usize {
        self.entries()
            .iter()
            .filter(|e| matches!(e.level, LogLevel::Warn | LogLevel::Error))
            .count()
    }
}
