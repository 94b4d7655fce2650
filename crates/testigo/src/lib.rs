//! Testigo: cross-browser test evidence orchestration.
//!
//! Testigo runs one test suite across multiple browser engines and keeps
//! trustworthy, low-noise evidence for every outcome. Driving the browser
//! is somebody else's job (the [`session::SessionFactory`] boundary); the
//! interesting work is everything around the test body:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ SuiteOrchestrator                                                 │
//! │   per browser ──► worker pool ──► SessionManager (warm-up, reuse) │
//! │   per test    ──► LogBuffer (memory only)                         │
//! │               ──► VideoRecorder (background sampling)             │
//! │               ──► ArtifactAllocator (lock-free unique paths)      │
//! │   outcome     ──► pass: discard everything                        │
//! │               ──► fail/skip: screenshot + log + encoded video     │
//! │   merge       ──► SuiteManifest (stable order, masked params)     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Passing tests leave no files behind; failing and skipped tests get a
//! screenshot, their full buffered log and (when enabled) a video muxed by
//! an external encoder — regardless of how the test ended.

#![warn(missing_docs)]

pub mod artifacts;
pub mod config;
pub mod logbuf;
pub mod mock;
pub mod orchestrator;
pub mod recorder;
pub mod report;
mod result;
pub mod session;
pub mod suite;

#[cfg(feature = "browser")]
pub mod cdp;

pub use artifacts::{slugify, ArtifactAllocator, ArtifactPaths};
pub use config::{
    Browser, LogBounds, PageLoadStrategy, ReusePolicy, Scope, SessionOptions, SuiteConfig,
    VideoSettings,
};
pub use logbuf::{LogBuffer, LogDisposition, LogLevel};
pub use orchestrator::{CancelHandle, CancelToken, SuiteOrchestrator};
pub use recorder::{Frame, Recording, VideoRecorder};
pub use report::{
    Attachment, AttachmentKind, BrowserRun, Parameter, ResultRecord, Severity, SuiteManifest,
};
pub use result::{TestigoError, TestigoResult};
pub use session::{
    BrowserSession, DocumentReady, SessionFactory, SessionManager, SessionState,
};
pub use suite::{CaseBody, CaseStatus, Outcome, TestCase, TestId, TestSuite};

#[cfg(feature = "browser")]
pub use cdp::CdpSessionFactory;
