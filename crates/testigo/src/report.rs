//! Result records and manifest merging.
//!
//! One [`ResultRecord`] is produced per test execution and is read-only
//! from then on; the orchestrator aggregates per-browser
//! [`BrowserRun`] streams into a single [`SuiteManifest`] without mutating
//! them. The manifest is what the (external) report renderer consumes —
//! nothing here renders HTML.
//!
//! Sensitive parameter values are masked before they can reach any
//! persisted artifact, and oversized values are truncated with a marker.

use crate::config::Browser;
use crate::result::TestigoResult;
use crate::suite::{Outcome, TestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Replacement text for masked parameter values
pub const MASKED: &str = "<masked>";

/// Test severity, derived from plain tag strings by lookup
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic
    Trivial,
    /// Low impact
    Minor,
    /// Default
    #[default]
    Normal,
    /// Must work for a release
    Critical,
    /// Blocks everything
    Blocker,
}

impl Severity {
    /// Map one tag to a severity, if it names one. Includes the
    /// convenience aliases smoke/sanity (critical) and regression
    /// (normal).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "blocker" => Some(Self::Blocker),
            "critical" | "smoke" | "sanity" => Some(Self::Critical),
            "normal" | "regression" => Some(Self::Normal),
            "minor" => Some(Self::Minor),
            "trivial" => Some(Self::Trivial),
            _ => None,
        }
    }

    /// Resolve a tag set to the highest severity it names
    #[must_use]
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        tags.iter()
            .filter_map(|t| Self::from_tag(t.as_ref()))
            .max()
            .unwrap_or_default()
    }
}

/// Whether a parameter name looks sensitive enough to mask
#[must_use]
pub fn should_mask(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    ["pass", "pwd", "password", "secret", "token", "key"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

/// Clamp a parameter value for display, marking the truncation
#[must_use]
pub fn safe_value(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let mut clipped: String = value.chars().take(limit.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

/// Mask and truncate a parameter list for inclusion in a record
#[must_use]
pub fn sanitize_params(params: &[(String, String)], limit: usize) -> Vec<Parameter> {
    params
        .iter()
        .map(|(name, value)| Parameter {
            name: name.clone(),
            value: if should_mask(name) {
                MASKED.to_string()
            } else {
                safe_value(value, limit)
            },
        })
        .collect()
}

/// One reported parameter (already masked/truncated)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Display value
    pub value: String,
}

/// Kinds of evidence files attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Final-state screenshot
    Screenshot,
    /// Viewport video
    Video,
    /// Flushed log
    Log,
}

/// One attached evidence file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// What the file is
    pub kind: AttachmentKind,
    /// Where it lives
    pub path: PathBuf,
}

/// The structured, serializable summary of one test execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Test identity
    pub id: TestId,
    /// Browser this execution ran on
    pub browser: Browser,
    /// Short stable title (base name plus row index)
    pub title: String,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Severity resolved from tags
    pub severity: Severity,
    /// Declaration index within the suite (part of the stable sort)
    pub decl_index: usize,
    /// When the test started
    pub started_at: DateTime<Utc>,
    /// When the test finished
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Masked/truncated parameters
    pub parameters: Vec<Parameter>,
    /// Evidence files kept for this execution
    pub attachments: Vec<Attachment>,
    /// Failure/skip reason, when the body gave one
    pub reason: Option<String>,
    /// Why the video attachment is missing despite video being enabled
    pub video_error: Option<String>,
}

impl ResultRecord {
    /// Add an attachment
    pub fn attach(&mut self, kind: AttachmentKind, path: impl Into<PathBuf>) {
        self.attachments.push(Attachment {
            kind,
            path: path.into(),
        });
    }

    /// Whether a given attachment kind is present
    #[must_use]
    pub fn has_attachment(&self, kind: AttachmentKind) -> bool {
        self.attachments.iter().any(|a| a.kind == kind)
    }
}

/// The result stream of one browser's run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserRun {
    /// Browser that ran
    pub browser: Browser,
    /// Browser version, when the backend reported one
    pub browser_version: Option<String>,
    /// Set when no session could be started at all; the run carries its
    /// tests as errored records
    pub failed_to_start: Option<String>,
    /// Per-test records
    pub records: Vec<ResultRecord>,
}

impl BrowserRun {
    /// Create an empty run for a browser
    #[must_use]
    pub fn new(browser: Browser) -> Self {
        Self {
            browser,
            browser_version: None,
            failed_to_start: None,
            records: Vec::new(),
        }
    }

    /// Whether this browser never got a working session
    #[must_use]
    pub const fn is_failed_to_start(&self) -> bool {
        self.failed_to_start.is_some()
    }
}

/// The merged manifest of one suite invocation.
///
/// Records are grouped by browser and ordered by
/// (module, class, declaration index) within each browser — a stable
/// ordering independent of worker completion order. The same
/// (module, class, test) under two browsers stays two entries; entries are
/// never collapsed across browsers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteManifest {
    /// Run identifier this manifest belongs to
    pub run_id: String,
    /// When the merge happened
    pub generated_at: DateTime<Utc>,
    /// Per-browser runs, in canonical browser order
    pub runs: Vec<BrowserRun>,
}

impl SuiteManifest {
    /// Merge per-browser runs into one manifest with a stable ordering
    #[must_use]
    pub fn merge(run_id: impl Into<String>, mut runs: Vec<BrowserRun>) -> Self {
        runs.sort_by_key(|run| run.browser);
        for run in &mut runs {
            run.records.sort_by(|a, b| {
                (&a.id.module, &a.id.class, a.decl_index).cmp(&(
                    &b.id.module,
                    &b.id.class,
                    b.decl_index,
                ))
            });
        }
        Self {
            run_id: run_id.into(),
            generated_at: Utc::now(),
            runs,
        }
    }

    /// All records across browsers, in manifest order
    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.runs.iter().flat_map(|run| run.records.iter())
    }

    /// Count records with a given outcome
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.records().filter(|r| r.outcome == outcome).count()
    }

    /// Total record count
    #[must_use]
    pub fn total(&self) -> usize {
        self.records().count()
    }

    /// Whether any browser failed to produce a session
    #[must_use]
    pub fn any_failed_start(&self) -> bool {
        self.runs.iter().any(BrowserRun::is_failed_to_start)
    }

    /// Process exit code: non-zero when any test failed/errored or any
    /// requested browser could not start a session. Partial results are
    /// still merged; they just don't buy a green exit.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let failing = self.records().any(|r| r.outcome.is_failure());
        i32::from(failing || self.any_failed_start())
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> TestigoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest to a file
    pub fn save(&self, path: &Path) -> TestigoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a manifest back from a file
    pub fn load(path: &Path) -> TestigoResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Write a `key=value` environment summary next to the results, the way
/// report tooling expects it
pub fn write_environment(dir: &Path, entries: &[(String, String)]) -> TestigoResult<()> {
    std::fs::create_dir_all(dir)?;
    let mut out = String::new();
    for (key, value) in entries {
        let _ = writeln!(out, "{key}={value}");
    }
    std::fs::write(dir.join("environment.properties"), out)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(browser: Browser, module: &str, class: &str, name: &str, decl: usize) -> ResultRecord {
        let id = TestId::new(module, class, name);
        ResultRecord {
            title: id.short_title(),
            id,
            browser,
            outcome: Outcome::Passed,
            severity: Severity::Normal,
            decl_index: decl,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 10,
            parameters: Vec::new(),
            attachments: Vec::new(),
            reason: None,
            video_error: None,
        }
    }

    mod masking_tests {
        use super::*;

        #[test]
        fn test_sensitive_names_masked() {
            for name in ["password", "Pwd", "api_token", "SECRET_KEY", "passphrase"] {
                assert!(should_mask(name), "{name} should be masked");
            }
            assert!(!should_mask("username"));
            assert!(!should_mask("row"));
        }

        #[test]
        fn test_masked_value_never_appears() {
            let params = vec![
                ("user".to_string(), "alice".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ];
            let sanitized = sanitize_params(&params, 60);
            assert_eq!(sanitized[0].value, "alice");
            assert_eq!(sanitized[1].value, MASKED);
            let json = serde_json::to_string(&sanitized).unwrap();
            assert!(!json.contains("hunter2"));
        }

        #[test]
        fn test_long_values_truncated_with_marker() {
            let long = "v".repeat(100);
            let safe = safe_value(&long, 60);
            assert_eq!(safe.chars().count(), 60);
            assert!(safe.ends_with('…'));
        }

        #[test]
        fn test_short_values_untouched() {
            assert_eq!(safe_value("short", 60), "short");
        }
    }

    mod severity_tests {
        use super::*;

        #[test]
        fn test_alias_lookup() {
            assert_eq!(Severity::from_tag("smoke"), Some(Severity::Critical));
            assert_eq!(Severity::from_tag("regression"), Some(Severity::Normal));
            assert_eq!(Severity::from_tag("wip"), None);
        }

        #[test]
        fn test_highest_rank_wins() {
            assert_eq!(
                Severity::from_tags(&["regression", "blocker", "minor"]),
                Severity::Blocker
            );
        }

        #[test]
        fn test_defaults_to_normal() {
            assert_eq!(Severity::from_tags(&["wip", "flaky"]), Severity::Normal);
        }
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn test_browser_then_module_class_decl_ordering() {
            let mut firefox = BrowserRun::new(Browser::Firefox);
            firefox.records.push(record(Browser::Firefox, "b_mod", "C", "t", 5));
            firefox.records.push(record(Browser::Firefox, "a_mod", "C", "t", 9));
            firefox.records.push(record(Browser::Firefox, "a_mod", "C", "s", 2));
            let chrome = BrowserRun::new(Browser::Chrome);

            // Completion order reversed on purpose
            let manifest = SuiteManifest::merge("run", vec![firefox, chrome]);
            assert_eq!(manifest.runs[0].browser, Browser::Chrome);
            assert_eq!(manifest.runs[1].browser, Browser::Firefox);

            let ff = &manifest.runs[1].records;
            assert_eq!(ff[0].id.module, "a_mod");
            assert_eq!(ff[0].decl_index, 2);
            assert_eq!(ff[1].decl_index, 9);
            assert_eq!(ff[2].id.module, "b_mod");
        }

        #[test]
        fn test_same_test_in_two_browsers_stays_distinct() {
            let mut chrome = BrowserRun::new(Browser::Chrome);
            chrome.records.push(record(Browser::Chrome, "m", "C", "t", 0));
            let mut firefox = BrowserRun::new(Browser::Firefox);
            let mut failing = record(Browser::Firefox, "m", "C", "t", 0);
            failing.outcome = Outcome::Failed;
            firefox.records.push(failing);

            let manifest = SuiteManifest::merge("run", vec![chrome, firefox]);
            assert_eq!(manifest.total(), 2);
            assert_eq!(manifest.count(Outcome::Passed), 1);
            assert_eq!(manifest.count(Outcome::Failed), 1);
        }

        #[test]
        fn test_exit_code_zero_when_green() {
            let mut chrome = BrowserRun::new(Browser::Chrome);
            chrome.records.push(record(Browser::Chrome, "m", "C", "t", 0));
            let manifest = SuiteManifest::merge("run", vec![chrome]);
            assert_eq!(manifest.exit_code(), 0);
        }

        #[test]
        fn test_exit_code_nonzero_on_failure() {
            let mut chrome = BrowserRun::new(Browser::Chrome);
            let mut rec = record(Browser::Chrome, "m", "C", "t", 0);
            rec.outcome = Outcome::Errored;
            chrome.records.push(rec);
            let manifest = SuiteManifest::merge("run", vec![chrome]);
            assert_eq!(manifest.exit_code(), 1);
        }

        #[test]
        fn test_exit_code_nonzero_on_failed_start() {
            let mut edge = BrowserRun::new(Browser::Edge);
            edge.failed_to_start = Some("no driver".to_string());
            let manifest = SuiteManifest::merge("run", vec![edge]);
            assert_eq!(manifest.exit_code(), 1);
        }

        #[test]
        fn test_skip_alone_is_green_exit() {
            let mut chrome = BrowserRun::new(Browser::Chrome);
            let mut rec = record(Browser::Chrome, "m", "C", "t", 0);
            rec.outcome = Outcome::Skipped;
            chrome.records.push(rec);
            let manifest = SuiteManifest::merge("run", vec![chrome]);
            assert_eq!(manifest.exit_code(), 0);
        }
    }

    mod persistence_tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_manifest_roundtrip() {
            let tmp = TempDir::new().unwrap();
            let mut chrome = BrowserRun::new(Browser::Chrome);
            let mut rec = record(Browser::Chrome, "m", "C", "t", 0);
            rec.attach(AttachmentKind::Log, "/tmp/x.log");
            chrome.records.push(rec);
            let manifest = SuiteManifest::merge("run-7", vec![chrome]);

            let path = tmp.path().join("manifest.json");
            manifest.save(&path).unwrap();
            let back = SuiteManifest::load(&path).unwrap();
            assert_eq!(back.run_id, "run-7");
            assert_eq!(back.total(), 1);
            assert!(back.runs[0].records[0].has_attachment(AttachmentKind::Log));
        }

        #[test]
        fn test_environment_file() {
            let tmp = TempDir::new().unwrap();
            write_environment(
                tmp.path(),
                &[
                    ("browser".to_string(), "chrome".to_string()),
                    ("os".to_string(), "linux".to_string()),
                ],
            )
            .unwrap();
            let content =
                std::fs::read_to_string(tmp.path().join("environment.properties")).unwrap();
            assert!(content.contains("browser=chrome"));
            assert!(content.contains("os=linux"));
        }
    }
}
