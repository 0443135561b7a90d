//! Per-invocation diagnostics
//!
//! Every pipeline call takes a [`Diagnostics`] context. It wraps an optional
//! [`DiagnosticSink`]; with no sink attached every call is a no-op, so the
//! pipeline behaves identically whether or not anyone is listening.
//!
//! Sinks receive whole lines only. Worker threads never write to a sink;
//! they report counts that are summarized once all results are collected.

use log::Level;
use std::fmt;
use std::sync::Mutex;

/// Receiver of leveled, line-oriented diagnostic messages
pub trait DiagnosticSink: Send + Sync {
    /// Record a single diagnostic line
    fn record(&self, level: Level, message: fmt::Arguments<'_>);
}

/// Diagnostic context passed into each pipeline call
#[derive(Clone, Copy, Default)]
pub struct Diagnostics<'a> {
    sink: Option<&'a dyn DiagnosticSink>,
}

impl<'a> Diagnostics<'a> {
    /// Diagnostics that forward to `sink`
    pub fn new(sink: &'a dyn DiagnosticSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// Diagnostics that discard everything
    pub fn silent() -> Self {
        Self { sink: None }
    }

    /// True if a sink is attached
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn error(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Error, message);
    }

    pub fn warn(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Warn, message);
    }

    pub fn info(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Info, message);
    }

    pub fn debug(&self, message: fmt::Arguments<'_>) {
        self.emit(Level::Debug, message);
    }

    fn emit(&self, level: Level, message: fmt::Arguments<'_>) {
        if let Some(sink) = self.sink {
            sink.record(level, message);
        }
    }
}

impl fmt::Debug for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Sink that forwards to the `log` facade, tagged with the file being processed
#[derive(Debug, Clone)]
pub struct LogSink {
    key: String,
}

impl LogSink {
    /// Create a sink for the logical file `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl DiagnosticSink for LogSink {
    fn record(&self, level: Level, message: fmt::Arguments<'_>) {
        log::log!(target: "buslog::file", level, "[{}] {}", self.key, message);
    }
}

/// Sink that buffers every line in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded lines, in recording order
    pub fn lines(&self) -> Vec<(Level, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any recorded line at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, level: Level, message: fmt::Arguments<'_>) {
        let line = message.to_string();
        match self.lines.lock() {
            Ok(mut lines) => lines.push((level, line)),
            Err(poisoned) => poisoned.into_inner().push((level, line)),
        }
    }
}
