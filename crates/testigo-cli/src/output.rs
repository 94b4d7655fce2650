//! Terminal output for suite runs

use console::{style, Term};
use testigo::{Outcome, SuiteManifest};

/// Writes human-readable progress and summaries to stderr
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode suppresses everything but failures
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Reporter {
    /// Create a reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
        }
    }

    /// Print an info line
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(message);
    }

    /// Print a success line
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure line (always, even in quiet mode)
    pub fn failure(&self, message: &str) {
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print the merged manifest summary, grouped by browser
    pub fn summary(&self, manifest: &SuiteManifest) {
        for run in &manifest.runs {
            if let Some(reason) = &run.failed_to_start {
                self.failure(&format!("{}: failed to start ({reason})", run.browser));
                continue;
            }
            for record in &run.records {
                let line = format!("[{}] {} ({}ms)", run.browser, record.title, record.duration_ms);
                match record.outcome {
                    Outcome::Passed => self.success(&line),
                    Outcome::Skipped => self.info(&format!("- {line}")),
                    Outcome::Failed | Outcome::Errored => {
                        let reason = record.reason.as_deref().unwrap_or("no reason");
                        self.failure(&format!("{line}: {reason}"));
                    }
                }
            }
        }

        if self.quiet {
            return;
        }
        let _ = self.term.write_line(&format!(
            "\n{} passed, {} failed, {} errored, {} skipped ({} total)",
            manifest.count(Outcome::Passed),
            manifest.count(Outcome::Failed),
            manifest.count(Outcome::Errored),
            manifest.count(Outcome::Skipped),
            manifest.total(),
        ));
    }
}
