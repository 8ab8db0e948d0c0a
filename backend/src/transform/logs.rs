//! Per-run processing log.
//!
//! Every pipeline run keeps an ordered list of user-facing [`LogEntry`]
//! values in its report. Each entry is mirrored to `tracing`: top-level
//! entries at their own level, indented (per-row) entries at `debug`.

use serde::{Deserialize, Serialize};

/// Log level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level (0 for run-level messages, 1 for row-level)
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Console rendering, prefixed by level.
    pub fn render(&self) -> String {
        let prefix = match self.level {
            LogLevel::Info => "  ",
            LogLevel::Success => "✓ ",
            LogLevel::Warning => "⚠ ",
            LogLevel::Error => "✗ ",
        };
        format!("{}{}{}", "   ".repeat(self.indent as usize), prefix, self.message)
    }
}

/// Ordered log of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry and mirror it to `tracing`.
    pub fn push(&mut self, entry: LogEntry) {
        if entry.indent > 0 {
            tracing::debug!(level = ?entry.level, "{}", entry.message);
        } else {
            match entry.level {
                LogLevel::Info | LogLevel::Success => tracing::info!("{}", entry.message),
                LogLevel::Warning => tracing::warn!("{}", entry.message),
                LogLevel::Error => tracing::error!("{}", entry.message),
            }
        }
        self.entries.push(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogEntry::info(message));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogEntry::success(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogEntry::warning(message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogEntry::error(message));
    }

    /// Row-level entry, one indent deep.
    pub fn row(&mut self, entry: LogEntry) {
        self.push(entry.with_indent(1));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_keeps_order() {
        let mut log = RunLog::new();
        log.info("Processing 2 rows");
        log.row(LogEntry::warning("Line 2: Skipped (filtered out)"));
        log.success("Done");

        let levels: Vec<LogLevel> = log.entries().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warning, LogLevel::Success]);
        assert_eq!(log.entries()[1].indent, 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_entry_serialization() {
        let entry = LogEntry::error("Line 3: 2 error(s)").with_indent(1);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["indent"], 1);
        assert_eq!(entry.render(), "   ✗ Line 3: 2 error(s)");
    }
}
