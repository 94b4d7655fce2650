//! Buffered per-test logging.
//!
//! Every test writes into an in-memory buffer; nothing reaches disk or the
//! console unless the test fails or skips. On a terminal outcome the buffer
//! is either flushed to the test's artifact directory in original order
//! (fail/skip/error) or discarded (pass). The buffer is bounded: a runaway
//! test evicts its oldest entries and the flushed file carries a truncation
//! marker instead of the process growing without limit.

use crate::artifacts::ArtifactPaths;
use crate::result::TestigoResult;
use crate::config::LogBounds;
use crate::suite::Outcome;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Severity of one buffered entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal progress
    Info,
    /// Something odd but recoverable
    Warn,
    /// Failure context
    Error,
}

impl LogLevel {
    /// Fixed-width label matching the flushed line format
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
struct LogEntry {
    elapsed: Duration,
    level: LogLevel,
    message: String,
}

impl LogEntry {
    fn cost(&self) -> usize {
        // message plus the fixed line furniture
        self.message.len() + 24
    }

    fn render(&self, out: &mut String) {
        let total = self.elapsed.as_secs();
        let _ = writeln!(
            out,
            "{:02}:{:02}:{:02} | {:<8} | {}",
            total / 3600,
            (total / 60) % 60,
            total % 60,
            self.level.label(),
            self.message
        );
    }
}

/// What happened to a buffer when it was finalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDisposition {
    /// Entries were written to the test's log file
    Flushed(std::path::PathBuf),
    /// Pass outcome: entries were dropped without any I/O
    Discarded,
}

/// In-memory, bounded, ordered log sink for one test.
#[derive(Debug)]
pub struct LogBuffer {
    test_id: String,
    bounds: LogBounds,
    started: Instant,
    entries: VecDeque<LogEntry>,
    buffered_bytes: usize,
    evicted: u64,
    disposition: Option<LogDisposition>,
}

impl LogBuffer {
    /// Open a buffer for one test
    #[must_use]
    pub fn open(test_id: impl Into<String>, bounds: LogBounds) -> Self {
        Self {
            test_id: test_id.into(),
            bounds,
            started: Instant::now(),
            entries: VecDeque::new(),
            buffered_bytes: 0,
            evicted: 0,
            disposition: None,
        }
    }

    /// Append an entry. O(1) amortized, no I/O. Exceeding the bounds
    /// evicts the oldest entries; it never errors.
    pub fn write(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.disposition.is_some() {
            return;
        }
        let entry = LogEntry {
            elapsed: self.started.elapsed(),
            level,
            message: message.into(),
        };
        self.buffered_bytes += entry.cost();
        self.entries.push_back(entry);

        while self.entries.len() > self.bounds.max_entries
            || self.buffered_bytes > self.bounds.max_bytes
        {
            if let Some(old) = self.entries.pop_front() {
                self.buffered_bytes -= old.cost();
                self.evicted += 1;
            } else {
                break;
            }
        }
        if self.evicted > 0 && self.evicted % 1000 == 1 {
            tracing::warn!(test = %self.test_id, evicted = self.evicted, "log buffer truncating oldest entries");
        }
    }

    /// Convenience wrappers
    pub fn debug(&mut self, message: impl Into<String>) {
        self.write(LogLevel::Debug, message);
    }

    /// Info-level entry
    pub fn info(&mut self, message: impl Into<String>) {
        self.write(LogLevel::Info, message);
    }

    /// Warning-level entry
    pub fn warn(&mut self, message: impl Into<String>) {
        self.write(LogLevel::Warn, message);
    }

    /// Error-level entry
    pub fn error(&mut self, message: impl Into<String>) {
        self.write(LogLevel::Error, message);
    }

    /// Buffered entry count (after any eviction)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many entries have been evicted by the bounds
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Whether finalize has already run
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.disposition.is_some()
    }

    /// Settle the buffer for a terminal outcome.
    ///
    /// Fail/skip/error: append a status line (and the reason, when given),
    /// then write every surviving entry in original order to `paths.log`.
    /// Pass: drop everything without touching disk. At most one flush per
    /// test — a second call is a no-op returning the first disposition.
    pub fn finalize(
        &mut self,
        outcome: Outcome,
        reason: Option<&str>,
        paths: &ArtifactPaths,
    ) -> TestigoResult<LogDisposition> {
        if let Some(existing) = &self.disposition {
            return Ok(existing.clone());
        }

        if !outcome.needs_artifacts() {
            self.entries.clear();
            self.buffered_bytes = 0;
            let disposition = LogDisposition::Discarded;
            self.disposition = Some(disposition.clone());
            return Ok(disposition);
        }

        self.write(
            LogLevel::Error,
            format!("{}: {}", outcome.label(), self.test_id),
        );
        if let Some(reason) = reason {
            self.write(LogLevel::Error, format!("Reason:\n{reason}"));
        }

        let mut out = String::new();
        if self.evicted > 0 {
            let _ = writeln!(out, "... {} earlier entries truncated ...", self.evicted);
        }
        for entry in &self.entries {
            entry.render(&mut out);
        }

        paths.ensure_dir()?;
        std::fs::write(&paths.log, out.as_bytes())?;
        self.entries.clear();
        self.buffered_bytes = 0;

        let disposition = LogDisposition::Flushed(paths.log.clone());
        self.disposition = Some(disposition.clone());
        Ok(disposition)
    }
}
