//! Result and error types for Testigo.

use thiserror::Error;

/// Result type for Testigo operations
pub type TestigoResult<T> = Result<T, TestigoError>;

/// Errors that can occur while orchestrating a suite.
///
/// The variants carry different blast radii: `Allocation` is fatal to one
/// test, `SessionStart`/`WarmUpTimeout` to one session, `FrameCapture` to a
/// single frame, and `Encoding` only to a test's video attachment. None of
/// them abort the suite.
#[derive(Debug, Error)]
pub enum TestigoError {
    /// Artifact directory could not be created
    #[error("artifact allocation failed for '{path}': {message}")]
    Allocation {
        /// Path that could not be created
        path: String,
        /// Error message
        message: String,
    },

    /// Browser session failed to start
    #[error("session start failed for {browser}: {message}")]
    SessionStart {
        /// Browser kind that failed
        browser: String,
        /// Error message
        message: String,
    },

    /// Warm-up navigation did not reach an interactive document in time
    #[error("warm-up timed out after {ms}ms for {browser}")]
    WarmUpTimeout {
        /// Browser kind being warmed up
        browser: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A single viewport frame could not be captured
    #[error("frame capture failed: {message}")]
    FrameCapture {
        /// Error message
        message: String,
    },

    /// External encoder failed, timed out, or produced no output
    #[error("video encoding failed: {message}")]
    Encoding {
        /// Error message
        message: String,
    },

    /// Navigation issued during warm-up failed
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Invalid state (operation called in the wrong lifecycle phase)
    #[error("invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Configuration value rejected
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TestigoError {
    /// Create an allocation error for the given path
    #[must_use]
    pub fn allocation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Allocation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a session start error
    #[must_use]
    pub fn session_start(browser: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionStart {
            browser: browser.into(),
            message: message.into(),
        }
    }

    /// Create an encoding error
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_error_display() {
        let err = TestigoError::allocation("/tmp/run/x", "permission denied");
        assert!(err.to_string().contains("/tmp/run/x"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_session_start_error_display() {
        let err = TestigoError::session_start("firefox", "driver missing");
        assert!(err.to_string().contains("firefox"));
    }

    #[test]
    fn test_warmup_timeout_display() {
        let err = TestigoError::WarmUpTimeout {
            browser: "edge".to_string(),
            ms: 2000,
        };
        assert!(err.to_string().contains("2000ms"));
        assert!(err.to_string().contains("edge"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TestigoError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }

    #[test]
    fn test_encoding_error_display() {
        let err = TestigoError::encoding("exit code 1");
        assert!(err.to_string().contains("encoding"));
    }
}
