//! Browser session lifecycle management.
//!
//! The automation layer itself (navigation commands, element queries) is an
//! external collaborator reached through the [`BrowserSession`] and
//! [`SessionFactory`] traits; this module owns everything around it: the
//! per-session state machine, the one-time warm-up navigation, the reuse
//! policy, bounded retry on startup failure, and best-effort teardown.
//!
//! One `SessionManager` exists per (browser, worker) pair and is driven by
//! exactly one worker task, so a live session is never shared across
//! concurrent tests.

use crate::config::{Browser, ReusePolicy, SessionOptions};
use crate::result::{TestigoError, TestigoResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Document readiness as reported by the automation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentReady {
    /// Document still loading
    Loading,
    /// DOM parsed, sub-resources may still be in flight
    Interactive,
    /// Load event fired
    Complete,
}

impl DocumentReady {
    /// Warm-up considers the page primed once the DOM is usable
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Interactive | Self::Complete)
    }
}

/// Capabilities the orchestration core needs from one live browser
/// instance. Navigation and readiness are used only during warm-up;
/// `capture_png` feeds the video recorder and failure screenshots.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate the session to a URL
    async fn navigate(&self, url: &str) -> TestigoResult<()>;

    /// Query current document readiness
    async fn ready_state(&self) -> TestigoResult<DocumentReady>;

    /// Capture a full-viewport PNG of the current page
    async fn capture_png(&self) -> TestigoResult<Vec<u8>>;

    /// Close the underlying browser instance
    async fn close(&self) -> TestigoResult<()>;

    /// Browser version string, when the backend knows it
    fn version(&self) -> Option<String> {
        None
    }
}

/// Launches sessions for a browser kind with the given options.
///
/// Options arrive as an immutable value per launch; implementations must
/// not stash tuning state in process-global builders.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Launch a new session
    async fn launch(
        &self,
        browser: Browser,
        options: &SessionOptions,
    ) -> TestigoResult<Arc<dyn BrowserSession>>;
}

/// Lifecycle states of one managed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists yet
    Uninitialized,
    /// Underlying browser is being launched
    Starting,
    /// One-time priming navigation in progress
    WarmingUp,
    /// Warmed up and idle
    Ready,
    /// Checked out to a running test
    InUse,
    /// Teardown in progress
    Closing,
    /// Torn down (terminal until the next checkout starts fresh)
    Closed,
}

/// How often warm-up polls document readiness
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns one browser session for a (browser, worker) pair.
///
/// `checkout` hands the session to a test, `checkin` takes it back and
/// applies the reuse policy. Warm-up runs exactly once per session
/// lifetime: a shared session warms up on first checkout only, a per-test
/// session warms up on every checkout because each checkout starts a fresh
/// session.
pub struct SessionManager {
    browser: Browser,
    worker_index: usize,
    factory: Arc<dyn SessionFactory>,
    options: SessionOptions,
    reuse: ReusePolicy,
    warmup_url: String,
    warmup_timeout: Duration,
    state: SessionState,
    session: Option<Arc<dyn BrowserSession>>,
    warmup_count: u32,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("browser", &self.browser)
            .field("worker_index", &self.worker_index)
            .field("state", &self.state)
            .field("warmup_count", &self.warmup_count)
            .finish()
    }
}

impl SessionManager {
    /// Create a manager; no browser is launched until the first checkout
    #[must_use]
    pub fn new(
        browser: Browser,
        worker_index: usize,
        factory: Arc<dyn SessionFactory>,
        options: SessionOptions,
        reuse: ReusePolicy,
        warmup_url: impl Into<String>,
        warmup_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            worker_index,
            factory,
            options,
            reuse,
            warmup_url: warmup_url.into(),
            warmup_timeout,
            state: SessionState::Uninitialized,
            session: None,
            warmup_count: 0,
        }
    }

    /// Browser kind this manager serves
    #[must_use]
    pub const fn browser(&self) -> Browser {
        self.browser
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// How many warm-ups have run over this manager's lifetime
    #[must_use]
    pub const fn warmup_count(&self) -> u32 {
        self.warmup_count
    }

    /// Check out the session for one test, starting and warming a fresh
    /// one when needed.
    ///
    /// A failure during `Starting`/`WarmingUp` is retried once with a
    /// fresh session; the second failure is returned and the manager ends
    /// up `Closed`.
    pub async fn checkout(&mut self) -> TestigoResult<Arc<dyn BrowserSession>> {
        if self.state == SessionState::InUse {
            return Err(TestigoError::InvalidState {
                message: format!(
                    "session for {} worker {} is already checked out",
                    self.browser, self.worker_index
                ),
            });
        }

        if self.session.is_none() || self.state != SessionState::Ready {
            if let Err(first) = self.start_and_warm().await {
                tracing::warn!(
                    browser = %self.browser,
                    worker = self.worker_index,
                    error = %first,
                    "session start failed, retrying once with a fresh session"
                );
                self.teardown().await;
                if let Err(second) = self.start_and_warm().await {
                    self.teardown().await;
                    return Err(second);
                }
            }
        }

        self.state = SessionState::InUse;
        // start_and_warm leaves a session behind on success
        Ok(Arc::clone(self.session.as_ref().ok_or(
            TestigoError::InvalidState {
                message: "checkout reached InUse without a live session".to_string(),
            },
        )?))
    }

    /// Return the session after a test. Shared sessions go back to
    /// `Ready`; per-test sessions are closed so the next checkout starts
    /// fresh.
    pub async fn checkin(&mut self) {
        if self.state != SessionState::InUse {
            return;
        }
        match self.reuse {
            ReusePolicy::Shared => self.state = SessionState::Ready,
            ReusePolicy::PerTest => self.teardown().await,
        }
    }

    /// Tear the session down. Best-effort: close failures must not fail
    /// the suite, so they are logged and swallowed.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn start_and_warm(&mut self) -> TestigoResult<()> {
        self.state = SessionState::Starting;
        let session = self
            .factory
            .launch(self.browser, &self.options)
            .await
            .map_err(|e| match e {
                already @ TestigoError::SessionStart { .. } => already,
                other => TestigoError::session_start(self.browser.as_str(), other.to_string()),
            })?;

        self.state = SessionState::WarmingUp;
        self.warm_up(session.as_ref()).await?;
        self.warmup_count += 1;

        self.session = Some(session);
        self.state = SessionState::Ready;
        tracing::debug!(
            browser = %self.browser,
            worker = self.worker_index,
            warmups = self.warmup_count,
            "session ready"
        );
        Ok(())
    }

    /// One lightweight navigation to the target origin, bounded wait for a
    /// usable DOM, then park on a blank page. Primes DNS/TLS/cache layers
    /// so the first real test is not penalized.
    async fn warm_up(&self, session: &dyn BrowserSession) -> TestigoResult<()> {
        session.navigate(&self.warmup_url).await?;

        let wait = tokio::time::timeout(self.warmup_timeout, async {
            loop {
                if session.ready_state().await?.is_usable() {
                    return Ok::<(), TestigoError>(());
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        })
        .await;

        match wait {
            Err(_elapsed) => {
                return Err(TestigoError::WarmUpTimeout {
                    browser: self.browser.as_str().to_string(),
                    ms: self.warmup_timeout.as_millis() as u64,
                })
            }
            Ok(result) => result?,
        }

        // Parking on a blank page is nice-to-have; a failure here must not
        // cost us the session.
        if let Err(e) = session.navigate("about:blank").await {
            tracing::debug!(browser = %self.browser, error = %e, "post-warm-up blank navigation failed");
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            self.state = SessionState::Closing;
            if let Err(e) = session.close().await {
                tracing::warn!(
                    browser = %self.browser,
                    worker = self.worker_index,
                    error = %e,
                    "session close failed"
                );
            }
        }
        self.state = SessionState::Closed;
    }
}
