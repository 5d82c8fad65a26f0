//! User-facing warning/error log
//!
//! Keeps the most recent entries in memory for display and appends every
//! entry to a plain-text file at the root of the takeout folder. Every entry
//! is mirrored to `tracing` as well.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Number of entries kept for live display
pub const RECENT_CAPACITY: usize = 25;

/// Severity of a log sink entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One log sink entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    /// Line as written to the log file
    pub fn to_line(&self) -> String {
        format!(
            "{} at {}: {}",
            self.severity,
            self.at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.message
        )
    }
}

/// Append-only, concurrent-safe log shared by all pipeline stages
pub struct LogSink {
    recent: Mutex<VecDeque<LogEntry>>,
    /// Flushed after every line
    file: Mutex<Option<LineWriter<File>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LogSink {
    /// Log sink without a backing file
    pub fn in_memory() -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            file: Mutex::new(None),
        }
    }

    /// Log sink appending to `path`, keeping existing content
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::storage(path, e))?;

        Ok(Self {
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            file: Mutex::new(Some(LineWriter::new(file))),
        })
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.append(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(Severity::Error, message);
    }

    /// Record an entry
    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let entry = LogEntry {
            severity,
            message: message.into(),
            at: Utc::now(),
        };

        match severity {
            Severity::Warning => warn!(message = %entry.message, "log sink"),
            Severity::Error => error!(message = %entry.message, "log sink"),
        }

        if let Some(writer) = lock(&self.file).as_mut()
            && let Err(e) = writeln!(writer, "{}", entry.to_line())
        {
            error!(error = %e, "Failed to write log file entry");
        }

        let mut recent = lock(&self.recent);
        recent.push_front(entry);
        recent.truncate(RECENT_CAPACITY);
    }

    /// Most recent entries, newest first
    pub fn recent(&self) -> Vec<LogEntry> {
        lock(&self.recent).iter().cloned().collect()
    }

    /// Flush buffered file output
    pub fn flush(&self) -> Result<()> {
        if let Some(writer) = lock(&self.file).as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
