//! Suite and test-case model.
//!
//! Test bodies are opaque to the orchestration core: a case hands back a
//! [`CaseStatus`] and the core only ever branches on the resulting
//! [`Outcome`] — it never re-evaluates test logic.

use crate::session::BrowserSession;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Terminal outcome of one test execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Test passed
    Passed,
    /// An assertion in the body failed
    Failed,
    /// The body skipped itself
    Skipped,
    /// The body panicked, timed out, or its session could not exist
    Errored,
}

impl Outcome {
    /// Whether artifacts (log, screenshot, video) should be kept for this
    /// outcome. Passing tests keep nothing; that silence is the point.
    #[must_use]
    pub const fn needs_artifacts(self) -> bool {
        matches!(self, Self::Failed | Self::Skipped | Self::Errored)
    }

    /// Whether this outcome counts against the suite exit status
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }

    /// Uppercase label used in flushed log headers
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Errored => "ERRORED",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a test body reports when it finishes on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    /// Body completed successfully
    Passed,
    /// Body failed with a reason
    Failed(String),
    /// Body skipped itself with a reason
    Skipped(String),
}

impl CaseStatus {
    /// The outcome this status maps to
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::Passed => Outcome::Passed,
            Self::Failed(_) => Outcome::Failed,
            Self::Skipped(_) => Outcome::Skipped,
        }
    }

    /// The reason attached to a non-passing status
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Failed(r) | Self::Skipped(r) => Some(r),
        }
    }
}

/// Identifies one test, including its parameter row when parametrized
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestId {
    /// Source module the test belongs to
    pub module: String,
    /// Class / group within the module
    pub class: String,
    /// Base test name
    pub name: String,
    /// 1-based parameter row, for parametrized tests
    pub param_index: Option<u32>,
}

impl TestId {
    /// Create an unparametrized id
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            class: class.into(),
            name: name.into(),
            param_index: None,
        }
    }

    /// Attach a 1-based parameter row index
    #[must_use]
    pub const fn with_param_row(mut self, row: u32) -> Self {
        self.param_index = Some(row);
        self
    }

    /// Full identifier used for artifact paths:
    /// `module::class::name[row-N]`
    #[must_use]
    pub fn full(&self) -> String {
        match self.param_index {
            Some(row) => format!("{}::{}::{}[row-{row}]", self.module, self.class, self.name),
            None => format!("{}::{}::{}", self.module, self.class, self.name),
        }
    }

    /// Short stable title for reports: the base name plus the row index,
    /// never the full parameter dump
    #[must_use]
    pub fn short_title(&self) -> String {
        match self.param_index {
            Some(row) => format!("{} · row-{row}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full())
    }
}

/// The async body of one test, run against a checked-out session
pub type CaseBody =
    Arc<dyn Fn(Arc<dyn BrowserSession>) -> BoxFuture<'static, CaseStatus> + Send + Sync>;

/// One test case: identity, tags, parameters, timeout, and an opaque body
#[derive(Clone)]
pub struct TestCase {
    /// Test identity
    pub id: TestId,
    /// Tags used for severity lookup
    pub tags: Vec<String>,
    /// Parameter name/value pairs for this row (masked before reporting)
    pub params: Vec<(String, String)>,
    /// Per-case timeout override
    pub timeout: Option<Duration>,
    /// The test body
    pub body: CaseBody,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("tags", &self.tags)
            .field("params", &self.params.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TestCase {
    /// Create a test case from an id and a body closure
    #[must_use]
    pub fn new<F>(id: TestId, body: F) -> Self
    where
        F: Fn(Arc<dyn BrowserSession>) -> BoxFuture<'static, CaseStatus> + Send + Sync + 'static,
    {
        Self {
            id,
            tags: Vec::new(),
            params: Vec::new(),
            timeout: None,
            body: Arc::new(body),
        }
    }

    /// Add tags
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Add a parameter name/value pair
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Set a per-case timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An ordered collection of test cases. Declaration order is preserved and
/// is part of the manifest's stable sort.
#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// Cases in declaration order
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    /// Create an empty suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    /// Append a case, preserving declaration order
    #[must_use]
    pub fn with_case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    /// Append a case in place
    pub fn add_case(&mut self, case: TestCase) {
        self.cases.push(case);
    }

    /// Number of cases
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the suite has no cases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
