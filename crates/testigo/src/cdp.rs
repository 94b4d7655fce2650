//! CDP-backed session factory.
//!
//! Real browser control via the Chrome DevTools Protocol (chromiumoxide).
//! Only available with the `browser` feature; everything else in the crate
//! works against the [`SessionFactory`] trait and never needs a browser
//! binary installed.

use crate::config::{Browser, SessionOptions};
use crate::result::{TestigoError, TestigoResult};
use crate::session::{BrowserSession, DocumentReady, SessionFactory};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Launches chromium sessions over CDP.
///
/// The factory only drives chromium-family browsers; asking it for firefox
/// is a session start error, which the orchestrator already treats as
/// failed-to-start for that browser without touching the others.
#[derive(Debug, Default)]
pub struct CdpSessionFactory;

impl CdpSessionFactory {
    /// Create a factory
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionFactory for CdpSessionFactory {
    async fn launch(
        &self,
        browser: Browser,
        options: &SessionOptions,
    ) -> TestigoResult<Arc<dyn BrowserSession>> {
        if !matches!(browser, Browser::Chrome | Browser::Edge) {
            return Err(TestigoError::session_start(
                browser.as_str(),
                "CDP backend only drives chromium-family browsers",
            ));
        }

        let mut builder = CdpConfig::builder()
            .window_size(options.viewport_width, options.viewport_height)
            .no_sandbox();

        if !options.headless {
            builder = builder.with_head();
        }
        if options.incognito {
            builder = builder.arg("--incognito");
        }
        if let Some(ref path) = options.binary_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| TestigoError::session_start(browser.as_str(), e))?;

        let (cdp_browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| TestigoError::session_start(browser.as_str(), e.to_string()))?;

        // The handler stream must be drained for the connection to live
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = cdp_browser
            .new_page("about:blank")
            .await
            .map_err(|e| TestigoError::session_start(browser.as_str(), e.to_string()))?;

        Ok(Arc::new(CdpSession {
            browser,
            inner: Mutex::new(cdp_browser),
            page: Mutex::new(page),
            _handler: handle,
        }))
    }
}

/// One live CDP session
struct CdpSession {
    browser: Browser,
    inner: Mutex<CdpBrowser>,
    page: Mutex<CdpPage>,
    _handler: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn navigate(&self, url: &str) -> TestigoResult<()> {
        let page = self.page.lock().await;
        page.goto(url).await.map_err(|e| TestigoError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn ready_state(&self) -> TestigoResult<DocumentReady> {
        let page = self.page.lock().await;
        let result = page
            .evaluate("document.readyState")
            .await
            .map_err(|e| TestigoError::InvalidState {
                message: format!("readyState query failed: {e}"),
            })?;
        let state: String = result.into_value().map_err(|e| TestigoError::InvalidState {
            message: format!("readyState value unreadable: {e}"),
        })?;
        Ok(match state.as_str() {
            "interactive" => DocumentReady::Interactive,
            "complete" => DocumentReady::Complete,
            _ => DocumentReady::Loading,
        })
    }

    async fn capture_png(&self) -> TestigoResult<Vec<u8>> {
        let page = self.page.lock().await;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = page
            .execute(params)
            .await
            .map_err(|e| TestigoError::FrameCapture {
                message: e.to_string(),
            })?;

        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| TestigoError::FrameCapture {
                message: e.to_string(),
            })
    }

    async fn close(&self) -> TestigoResult<()> {
        let mut browser = self.inner.lock().await;
        browser
            .close()
            .await
            .map_err(|e| TestigoError::InvalidState {
                message: format!("close failed for {}: {e}", self.browser),
            })?;
        Ok(())
    }
}
