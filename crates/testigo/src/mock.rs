//! Scripted session backend for tests.
//!
//! `MockSessionFactory` implements [`SessionFactory`] without any real
//! browser: launches can be scripted to fail, documents to never become
//! ready, captures to error, and teardown to misbehave — everything the
//! lifecycle and recording code paths need to be exercised hermetically.

use crate::config::{Browser, SessionOptions};
use crate::result::{TestigoError, TestigoResult};
use crate::session::{BrowserSession, DocumentReady, SessionFactory};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A valid 1x1 transparent PNG, served as every mock screenshot
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Scripted behavior for mock sessions
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    failing_launches: u32,
    never_ready: bool,
    failing_captures: u32,
    failing_close: bool,
}

impl MockBehavior {
    /// Make the first `n` launches fail with a session start error
    #[must_use]
    pub const fn failing_launches(mut self, n: u32) -> Self {
        self.failing_launches = n;
        self
    }

    /// Keep the document in `Loading` forever (warm-up will time out)
    #[must_use]
    pub const fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Make the first `n` captures of each session fail
    #[must_use]
    pub const fn failing_captures(mut self, n: u32) -> Self {
        self.failing_captures = n;
        self
    }

    /// Make close return an error (it must still be swallowed upstream)
    #[must_use]
    pub const fn failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }
}

/// One scripted browser session
#[derive(Debug)]
pub struct MockSession {
    browser: Browser,
    behavior: MockBehavior,
    navigations: Mutex<Vec<String>>,
    captures: AtomicU32,
    closed: AtomicBool,
}

impl MockSession {
    fn new(browser: Browser, behavior: MockBehavior) -> Self {
        Self {
            browser,
            behavior,
            navigations: Mutex::new(Vec::new()),
            captures: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// URLs navigated to, in order
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().map(|n| n.clone()).unwrap_or_default()
    }

    /// Whether close was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many captures were attempted
    #[must_use]
    pub fn capture_count(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> TestigoResult<()> {
        if let Ok(mut nav) = self.navigations.lock() {
            nav.push(url.to_string());
        }
        Ok(())
    }

    async fn ready_state(&self) -> TestigoResult<DocumentReady> {
        if self.behavior.never_ready {
            Ok(DocumentReady::Loading)
        } else {
            Ok(DocumentReady::Complete)
        }
    }

    async fn capture_png(&self) -> TestigoResult<Vec<u8>> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        if n < self.behavior.failing_captures {
            return Err(TestigoError::FrameCapture {
                message: format!("scripted capture failure #{n}"),
            });
        }
        Ok(TINY_PNG.to_vec())
    }

    async fn close(&self) -> TestigoResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.behavior.failing_close {
            return Err(TestigoError::InvalidState {
                message: "scripted close failure".to_string(),
            });
        }
        Ok(())
    }

    fn version(&self) -> Option<String> {
        Some(format!("mock-{}", self.browser))
    }
}

/// Factory producing scripted sessions; counts launches and keeps every
/// created session reachable for assertions.
#[derive(Debug)]
pub struct MockSessionFactory {
    behavior: MockBehavior,
    launches: AtomicU32,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    fail_browser: Mutex<Option<Browser>>,
}

impl MockSessionFactory {
    /// Create a factory with the given scripted behavior
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            launches: AtomicU32::new(0),
            sessions: Mutex::new(Vec::new()),
            fail_browser: Mutex::new(None),
        }
    }

    /// Always fail launches of one specific browser (others unaffected)
    #[must_use]
    pub fn failing_browser(self, browser: Browser) -> Self {
        if let Ok(mut b) = self.fail_browser.lock() {
            *b = Some(browser);
        }
        self
    }

    /// How many launches were attempted across every browser
    #[must_use]
    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Every session this factory created, in launch order
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new(MockBehavior::default())
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn launch(
        &self,
        browser: Browser,
        _options: &SessionOptions,
    ) -> TestigoResult<Arc<dyn BrowserSession>> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_browser
            .lock()
            .ok()
            .and_then(|b| *b)
            .is_some_and(|b| b == browser)
        {
            return Err(TestigoError::session_start(
                browser.as_str(),
                "scripted launch failure for this browser",
            ));
        }
        if n < self.behavior.failing_launches {
            return Err(TestigoError::session_start(
                browser.as_str(),
                format!("scripted launch failure #{n}"),
            ));
        }

        let session = Arc::new(MockSession::new(browser, self.behavior.clone()));
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(Arc::clone(&session));
        }
        Ok(session)
    }
}
