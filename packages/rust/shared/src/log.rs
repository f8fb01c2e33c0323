//! Log sinks threaded through every pipeline component.
//!
//! Components never log through a process-wide handle directly; they receive
//! a `&dyn PipelineLog`. The production sink forwards to `tracing`, tests use
//! [`MemoryLog`] to capture output deterministically.

use std::sync::Mutex;

use tracing::Level;

/// Sink for pipeline progress messages and streamed tool output.
pub trait PipelineLog: Send + Sync {
    /// A pipeline-level message at the given level.
    fn event(&self, level: Level, message: &str);

    /// One decoded line of an external tool's merged output.
    fn tool_line(&self, tool: &str, line: &str);

    fn info(&self, message: &str) {
        self.event(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.event(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.event(Level::ERROR, message);
    }
}

/// Forwards everything to the global `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl PipelineLog for TracingLog {
    fn event(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            Level::TRACE => tracing::trace!("{message}"),
        }
    }

    fn tool_line(&self, tool: &str, line: &str) {
        tracing::info!(tool, "[{tool}] {line}");
    }
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Event { level: Level, message: String },
    ToolLine { tool: String, line: String },
}

/// In-memory sink that records every entry in order.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Messages of pipeline events at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Event { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Lines streamed from the tool tagged `tool`.
    pub fn tool_lines(&self, tool: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::ToolLine { tool: t, line } if t == tool => Some(line),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: LogEntry) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry);
        }
    }
}

impl PipelineLog for MemoryLog {
    fn event(&self, level: Level, message: &str) {
        self.push(LogEntry::Event {
            level,
            message: message.to_string(),
        });
    }

    fn tool_line(&self, tool: &str, line: &str) {
        self.push(LogEntry::ToolLine {
            tool: tool.to_string(),
            line: line.to_string(),
        });
    }
}
