//! Suite configuration values.
//!
//! The orchestration core consumes configuration as plain immutable values.
//! Parsing (YAML files, CLI flags, environment precedence) belongs to the
//! caller; nothing in this module reads the process environment, and no
//! option lives in process-global state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Browser engines a suite can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    /// Chrome / Chromium
    Chrome,
    /// Firefox
    Firefox,
    /// Edge (Chromium)
    Edge,
}

impl Browser {
    /// All supported browsers, in merge order
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Chrome, Self::Firefox, Self::Edge]
    }

    /// Stable lowercase name used in paths and manifests
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Self::Chrome),
            "firefox" | "ff" => Ok(Self::Firefox),
            "edge" | "msedge" | "microsoft-edge" => Ok(Self::Edge),
            other => Err(format!("unsupported browser: {other}")),
        }
    }
}

/// Whether a session persists across tests or is recreated per test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReusePolicy {
    /// One session serves every test assigned to its worker (default)
    #[default]
    Shared,
    /// Fresh session per test, trading speed for isolation
    PerTest,
}

/// What the caller selected, used for the default browser-set policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// A single file / single test was targeted: defaults to chrome only
    SingleTarget,
    /// The full suite was selected: defaults to the configured browser set
    #[default]
    FullSuite,
}

/// Document load strategy requested from the automation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLoadStrategy {
    /// Wait for the full load event
    #[default]
    Normal,
    /// Return once the DOM is interactive
    Eager,
    /// Return immediately after navigation starts
    None,
}

/// Options passed to the automation layer when launching a session.
///
/// An immutable value handed to the session manager at construction; there
/// is no process-wide options builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Run headless
    pub headless: bool,
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
    /// Private / incognito profile
    pub incognito: bool,
    /// Page load strategy
    pub page_load_strategy: PageLoadStrategy,
    /// Browser binary override (None = let the backend resolve it)
    pub binary_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            incognito: false,
            page_load_strategy: PageLoadStrategy::Normal,
            binary_path: None,
        }
    }
}

impl SessionOptions {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set incognito mode
    #[must_use]
    pub const fn with_incognito(mut self, incognito: bool) -> Self {
        self.incognito = incognito;
        self
    }

    /// Set the page load strategy
    #[must_use]
    pub const fn with_page_load_strategy(mut self, strategy: PageLoadStrategy) -> Self {
        self.page_load_strategy = strategy;
        self
    }
}

/// Video recording settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Record viewport video for each test
    pub enabled: bool,
    /// Target sampling / playback frame rate (clamped to 1-60)
    pub fps: u8,
    /// Encoder program: an explicit path, or a name resolved on PATH
    pub encoder: PathBuf,
    /// How long the finalizing worker waits for the encoder process
    #[serde(with = "duration_ms")]
    pub encode_timeout: Duration,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fps: 10,
            encoder: PathBuf::from("ffmpeg"),
            encode_timeout: Duration::from_secs(60),
        }
    }
}

impl VideoSettings {
    /// Set the target frame rate (clamped to 1-60)
    #[must_use]
    pub fn with_fps(mut self, fps: u8) -> Self {
        self.fps = fps.clamp(1, 60);
        self
    }

    /// Set the encoder program
    #[must_use]
    pub fn with_encoder(mut self, encoder: impl Into<PathBuf>) -> Self {
        self.encoder = encoder.into();
        self
    }
}

/// Bounds on the in-memory log buffer of one test
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LogBounds {
    /// Maximum buffered entries before the oldest are evicted
    pub max_entries: usize,
    /// Maximum buffered bytes before the oldest are evicted
    pub max_bytes: usize,
}

impl Default for LogBounds {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Configuration for one suite invocation.
///
/// Assembled by the caller (CLI, CI glue) and treated as read-only by the
/// orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Browser set to run against when the full suite is selected
    pub browsers: Vec<Browser>,
    /// Explicit override: wins over both scope defaults when set
    pub browser_override: Option<Vec<Browser>>,
    /// Origin the suite tests against; also the warm-up target
    pub base_url: String,
    /// Parallel workers per browser (tests within a worker run serially)
    pub workers: usize,
    /// Session reuse policy
    pub reuse: ReusePolicy,
    /// Options handed to the automation layer per session
    pub session: SessionOptions,
    /// Video recording settings
    pub video: VideoSettings,
    /// Log buffer bounds
    pub log_bounds: LogBounds,
    /// Warm-up wait for a DOM-interactive document
    #[serde(with = "duration_ms")]
    pub warmup_timeout: Duration,
    /// Default per-test timeout
    #[serde(with = "duration_ms")]
    pub test_timeout: Duration,
    /// Root under which per-test artifact directories are allocated
    pub artifacts_root: PathBuf,
    /// Root for per-browser result manifests
    pub results_root: PathBuf,
    /// Parameter values longer than this are truncated in records
    pub param_value_limit: usize,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            browsers: vec![Browser::Chrome, Browser::Firefox, Browser::Edge],
            browser_override: None,
            base_url: "http://localhost:8080/".to_string(),
            workers: 1,
            reuse: ReusePolicy::Shared,
            session: SessionOptions::default(),
            video: VideoSettings::default(),
            log_bounds: LogBounds::default(),
            warmup_timeout: Duration::from_secs(5),
            test_timeout: Duration::from_secs(60),
            artifacts_root: PathBuf::from("artifacts"),
            results_root: PathBuf::from("reports/results"),
            param_value_limit: 60,
        }
    }
}

impl SuiteConfig {
    /// Create a new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the browser set used for full-suite runs
    #[must_use]
    pub fn with_browsers(mut self, browsers: Vec<Browser>) -> Self {
        self.browsers = browsers;
        self
    }

    /// Force an explicit browser set regardless of scope
    #[must_use]
    pub fn with_browser_override(mut self, browsers: Vec<Browser>) -> Self {
        self.browser_override = Some(browsers);
        self
    }

    /// Set the number of workers per browser (minimum 1)
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the reuse policy
    #[must_use]
    pub const fn with_reuse(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    /// Set video settings
    #[must_use]
    pub fn with_video(mut self, video: VideoSettings) -> Self {
        self.video = video;
        self
    }

    /// Disable video recording
    #[must_use]
    pub fn without_video(mut self) -> Self {
        self.video.enabled = false;
        self
    }

    /// Set the artifacts root
    #[must_use]
    pub fn with_artifacts_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifacts_root = root.into();
        self
    }

    /// Set the results root
    #[must_use]
    pub fn with_results_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.results_root = root.into();
        self
    }

    /// Set the default per-test timeout
    #[must_use]
    pub const fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Resolve the browser set for a run.
    ///
    /// Explicit override wins; otherwise a single-target run gets chrome
    /// only and a full-suite run gets the configured set. The asymmetry is
    /// a speed/coverage tradeoff the caller can always override.
    #[must_use]
    pub fn resolve_browsers(&self, scope: Scope) -> Vec<Browser> {
        if let Some(ref explicit) = self.browser_override {
            return dedup_in_order(explicit);
        }
        match scope {
            Scope::SingleTarget => vec![Browser::Chrome],
            Scope::FullSuite => dedup_in_order(&self.browsers),
        }
    }

    /// URL used by the warm-up navigation (base URL + warmup marker)
    #[must_use]
    pub fn warmup_url(&self) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}warmup=1", self.base_url, sep)
    }
}

fn dedup_in_order(browsers: &[Browser]) -> Vec<Browser> {
    let mut seen = Vec::new();
    for b in browsers {
        if !seen.contains(b) {
            seen.push(*b);
        }
    }
    seen
}

/// Serialize `Duration` as integer milliseconds in config files
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
