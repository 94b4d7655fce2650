//! Top-level suite orchestration.
//!
//! For every requested browser an independent task runs the full test
//! selection against its own session pool; per-browser result streams are
//! merged afterwards into one [`SuiteManifest`]. A browser that cannot
//! start a session is recorded as failed-to-start without touching its
//! siblings.
//!
//! Within a browser, `workers` tasks each own one [`SessionManager`] and
//! execute their share of the tests sequentially (declaration index modulo
//! worker count). All artifact placement goes through the allocator, whose
//! paths are pure functions of (run, browser, worker, test) — the only
//! shared resource between workers is the filesystem namespace, and it
//! needs no locking.

use crate::artifacts::{write_file, ArtifactAllocator, ArtifactPaths};
use crate::config::{Browser, Scope, SuiteConfig};
use crate::logbuf::{LogBuffer, LogDisposition};
use crate::recorder::VideoRecorder;
use crate::report::{
    sanitize_params, write_environment, AttachmentKind, BrowserRun, ResultRecord, Severity,
    SuiteManifest,
};
use crate::result::TestigoResult;
use crate::session::{BrowserSession, SessionFactory, SessionManager};
use crate::suite::{Outcome, TestCase, TestSuite};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Requests suite-level cancellation (e.g. wired to a CI abort signal)
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Ask every in-flight worker to stop. Sessions are forced through
    /// `Closing`, recorders are stopped and their partial output
    /// discarded, and cancelled tests are not merged.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observes cancellation; cheap to clone into every worker
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    fn pair() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, Self { rx })
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling: never resolves
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Identifies one suite invocation: run id, config, collaborators.
/// Created once at suite start and shared read-only by every worker.
struct RunContext {
    config: SuiteConfig,
    factory: Arc<dyn SessionFactory>,
    allocator: ArtifactAllocator,
    cancel: CancelToken,
}

struct WorkerReport {
    records: Vec<ResultRecord>,
    fatal_session_error: Option<String>,
    browser_version: Option<String>,
}

/// Drives one suite invocation across the requested browsers
pub struct SuiteOrchestrator {
    config: SuiteConfig,
    factory: Arc<dyn SessionFactory>,
    run_id: String,
    cancel_handle: CancelHandle,
    cancel: CancelToken,
}

impl std::fmt::Debug for SuiteOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteOrchestrator")
            .field("run_id", &self.run_id)
            .field("workers", &self.config.workers)
            .finish()
    }
}

impl SuiteOrchestrator {
    /// Create an orchestrator for one invocation. The run identifier is
    /// minted here (timestamp plus random suffix) and scopes every
    /// artifact path of the run.
    #[must_use]
    pub fn new(config: SuiteConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let run_id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let (cancel_handle, cancel) = CancelToken::pair();
        Self {
            config,
            factory,
            run_id,
            cancel_handle,
            cancel,
        }
    }

    /// This invocation's run identifier
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Handle for requesting suite-level cancellation
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Run the suite against every resolved browser and merge the
    /// per-browser result streams.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures surface here (e.g. the results root
    /// cannot be written). Test failures, session failures and encoding
    /// failures are all folded into the returned manifest instead.
    pub async fn run(&self, suite: &TestSuite, scope: Scope) -> TestigoResult<SuiteManifest> {
        let browsers = self.config.resolve_browsers(scope);
        tracing::info!(
            run_id = %self.run_id,
            browsers = ?browsers,
            tests = suite.len(),
            "starting suite"
        );

        let ctx = Arc::new(RunContext {
            config: self.config.clone(),
            factory: Arc::clone(&self.factory),
            allocator: ArtifactAllocator::new(&self.config.artifacts_root, self.run_id.clone()),
            cancel: self.cancel.clone(),
        });
        let suite = Arc::new(suite.clone());

        let mut handles = Vec::with_capacity(browsers.len());
        for browser in browsers {
            let ctx = Arc::clone(&ctx);
            let suite = Arc::clone(&suite);
            handles.push(tokio::spawn(run_browser(ctx, suite, browser)));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => tracing::error!(error = %e, "browser task aborted"),
            }
        }

        let manifest = SuiteManifest::merge(self.run_id.clone(), runs);
        self.persist(&manifest);
        tracing::info!(
            run_id = %self.run_id,
            total = manifest.total(),
            failed = manifest.count(Outcome::Failed),
            errored = manifest.count(Outcome::Errored),
            exit = manifest.exit_code(),
            "suite finished"
        );
        Ok(manifest)
    }

    /// Best-effort persistence: per-browser manifests, the aggregate, and
    /// an environment summary. Failing to write reports must not discard
    /// the in-memory results.
    fn persist(&self, manifest: &SuiteManifest) {
        let root = &self.config.results_root;
        for run in &manifest.runs {
            let single = SuiteManifest::merge(self.run_id.clone(), vec![run.clone()]);
            let path = root.join(run.browser.as_str()).join("manifest.json");
            if let Err(e) = single.save(&path) {
                tracing::warn!(path = %path.display(), error = %e, "could not save browser manifest");
            }
        }
        if let Err(e) = manifest.save(&root.join("manifest.json")) {
            tracing::warn!(error = %e, "could not save aggregate manifest");
        }

        let mut env = vec![("run_id".to_string(), self.run_id.clone())];
        for run in &manifest.runs {
            if let Some(version) = &run.browser_version {
                env.push((format!("browser.{}", run.browser), version.clone()));
            }
        }
        env.push(("os".to_string(), std::env::consts::OS.to_string()));
        if let Err(e) = write_environment(root, &env) {
            tracing::warn!(error = %e, "could not write environment summary");
        }
    }
}

/// Run the full selection on one browser with its own worker pool
async fn run_browser(ctx: Arc<RunContext>, suite: Arc<TestSuite>, browser: Browser) -> BrowserRun {
    let worker_count = ctx.config.workers.max(1).min(suite.len().max(1));

    let mut handles = Vec::with_capacity(worker_count);
    for worker_index in 0..worker_count {
        let ctx = Arc::clone(&ctx);
        let suite = Arc::clone(&suite);
        handles.push(tokio::spawn(run_worker(ctx, suite, browser, worker_index)));
    }

    let mut run = BrowserRun::new(browser);
    let mut fatal_errors = Vec::new();
    let mut finished_workers = 0usize;
    for handle in handles {
        match handle.await {
            Ok(report) => {
                finished_workers += 1;
                if run.browser_version.is_none() {
                    run.browser_version = report.browser_version;
                }
                if let Some(fatal) = report.fatal_session_error {
                    fatal_errors.push(fatal);
                }
                run.records.extend(report.records);
            }
            Err(e) => tracing::error!(browser = %browser, error = %e, "worker task aborted"),
        }
    }

    // Only when no worker ever had a usable session is the whole browser
    // run considered failed-to-start.
    if !fatal_errors.is_empty() && fatal_errors.len() == finished_workers {
        run.failed_to_start = fatal_errors.into_iter().next();
        tracing::error!(
            browser = %browser,
            reason = run.failed_to_start.as_deref().unwrap_or(""),
            "browser run failed to start; continuing with remaining browsers"
        );
    }
    run
}

/// One worker: its share of the tests, sequentially, on its own session
async fn run_worker(
    ctx: Arc<RunContext>,
    suite: Arc<TestSuite>,
    browser: Browser,
    worker_index: usize,
) -> WorkerReport {
    let worker_count = ctx.config.workers.max(1).min(suite.len().max(1));
    let mut manager = SessionManager::new(
        browser,
        worker_index,
        Arc::clone(&ctx.factory),
        ctx.config.session.clone(),
        ctx.config.reuse,
        ctx.config.warmup_url(),
        ctx.config.warmup_timeout,
    );

    let mut report = WorkerReport {
        records: Vec::new(),
        fatal_session_error: None,
        browser_version: None,
    };

    for (decl_index, case) in suite
        .cases
        .iter()
        .enumerate()
        .filter(|(i, _)| i % worker_count == worker_index)
    {
        if ctx.cancel.is_cancelled() {
            break;
        }

        if let Some(fatal) = report.fatal_session_error.clone() {
            // Session is gone for good on this worker; remaining tests
            // are reported errored without running.
            report
                .records
                .push(errored_record(&ctx, case, decl_index, browser, &fatal));
            continue;
        }

        match manager.checkout().await {
            Err(e) => {
                let message = e.to_string();
                report.fatal_session_error = Some(message.clone());
                report
                    .records
                    .push(errored_record(&ctx, case, decl_index, browser, &message));
            }
            Ok(session) => {
                if report.browser_version.is_none() {
                    report.browser_version = session.version();
                }
                let record =
                    execute_case(&ctx, session, case, decl_index, browser, worker_index).await;
                manager.checkin().await;
                match record {
                    Some(record) => report.records.push(record),
                    // Cancelled mid-test: artifacts already discarded
                    None => break,
                }
            }
        }
    }

    manager.close().await;
    report
}

/// Execute one test: recording and logging wrap the opaque body, and the
/// outcome decides which evidence survives.
async fn execute_case(
    ctx: &RunContext,
    session: Arc<dyn BrowserSession>,
    case: &TestCase,
    decl_index: usize,
    browser: Browser,
    worker_index: usize,
) -> Option<ResultRecord> {
    let full_id = case.id.full();
    let paths = ctx.allocator.paths(browser, worker_index, &full_id);
    let started_at = Utc::now();
    let started = Instant::now();

    let mut log = LogBuffer::open(full_id.clone(), ctx.config.log_bounds);
    log.info(format!("{full_id} starting on {browser} (worker {worker_index})"));

    let recorder = if ctx.config.video.enabled {
        match VideoRecorder::start(
            Arc::clone(&session),
            ctx.config.video.fps,
            frames_dir(&paths, worker_index),
        ) {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                log.warn(format!("video recording unavailable: {e}"));
                None
            }
        }
    } else {
        None
    };

    let timeout = case.timeout.unwrap_or(ctx.config.test_timeout);
    let body = AssertUnwindSafe((case.body)(Arc::clone(&session))).catch_unwind();

    let mut cancelled = false;
    let (outcome, reason) = tokio::select! {
        () = ctx.cancel.cancelled() => {
            cancelled = true;
            (Outcome::Errored, Some("suite cancelled".to_string()))
        }
        finished = tokio::time::timeout(timeout, body) => match finished {
            Err(_elapsed) => (
                Outcome::Errored,
                Some(format!("timed out after {}ms", timeout.as_millis())),
            ),
            Ok(Err(panic)) => (Outcome::Errored, Some(panic_message(&panic))),
            Ok(Ok(status)) => (status.outcome(), status.reason().map(str::to_string)),
        },
    };

    // stop() is reached on every exit path above — pass, fail, panic,
    // timeout and cancellation all flow through here.
    let recording = match recorder {
        Some(recorder) => Some(recorder.stop().await),
        None => None,
    };

    if cancelled {
        if let Some(recording) = recording {
            recording.discard();
        }
        paths.discard();
        return None;
    }

    let mut record = ResultRecord {
        title: case.id.short_title(),
        id: case.id.clone(),
        browser,
        outcome,
        severity: Severity::from_tags(&case.tags),
        decl_index,
        started_at,
        finished_at: Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        parameters: sanitize_params(&case.params, ctx.config.param_value_limit),
        attachments: Vec::new(),
        reason: reason.clone(),
        video_error: None,
    };

    if outcome.needs_artifacts() {
        attach_evidence(ctx, &session, &paths, &mut log, recording, &mut record, reason).await;
    } else {
        let _ = log.finalize(outcome, None, &paths);
        if let Some(recording) = recording {
            recording.discard();
        }
        paths.remove_if_empty();
    }

    Some(record)
}

/// Failure path: screenshot, flushed log, encoded video. Every error in
/// here downgrades to a missing attachment; none of them may change the
/// test's outcome or abort sibling tests.
async fn attach_evidence(
    ctx: &RunContext,
    session: &Arc<dyn BrowserSession>,
    paths: &ArtifactPaths,
    log: &mut LogBuffer,
    recording: Option<crate::recorder::Recording>,
    record: &mut ResultRecord,
    reason: Option<String>,
) {
    if let Err(e) = paths.ensure_dir() {
        tracing::warn!(test = %record.id, error = %e, "artifact dir unavailable, evidence lost");
        if let Some(recording) = recording {
            recording.discard();
        }
        return;
    }

    match session.capture_png().await {
        Ok(png) => match write_file(&paths.screenshot, &png) {
            Ok(()) => record.attach(AttachmentKind::Screenshot, paths.screenshot.clone()),
            Err(e) => log.warn(format!("screenshot write failed: {e}")),
        },
        Err(e) => log.warn(format!("screenshot capture failed: {e}")),
    }

    match log.finalize(record.outcome, reason.as_deref(), paths) {
        Ok(LogDisposition::Flushed(path)) => record.attach(AttachmentKind::Log, path),
        Ok(LogDisposition::Discarded) => {}
        Err(e) => tracing::warn!(test = %record.id, error = %e, "log flush failed"),
    }

    if let Some(recording) = recording {
        if recording.frame_count() == 0 {
            record.video_error = Some("no frames captured".to_string());
        } else {
            let gaps = recording.gap_count();
            if gaps > 0 {
                tracing::debug!(test = %record.id, gaps, "recording has capture gaps");
            }
            match recording
                .encode(
                    &ctx.config.video.encoder,
                    ctx.config.video.encode_timeout,
                    &paths.video,
                )
                .await
            {
                Ok(()) => record.attach(AttachmentKind::Video, paths.video.clone()),
                Err(e) => {
                    tracing::warn!(test = %record.id, error = %e, "video attachment missing");
                    record.video_error = Some(e.to_string());
                }
            }
        }
    }
}

/// Record for a test that never ran because its session could not exist
fn errored_record(
    ctx: &RunContext,
    case: &TestCase,
    decl_index: usize,
    browser: Browser,
    reason: &str,
) -> ResultRecord {
    let now = Utc::now();
    ResultRecord {
        title: case.id.short_title(),
        id: case.id.clone(),
        browser,
        outcome: Outcome::Errored,
        severity: Severity::from_tags(&case.tags),
        decl_index,
        started_at: now,
        finished_at: now,
        duration_ms: 0,
        parameters: sanitize_params(&case.params, ctx.config.param_value_limit),
        attachments: Vec::new(),
        reason: Some(reason.to_string()),
        video_error: None,
    }
}

/// Frames live in a hidden sibling of the test dir so a passing test's
/// directory is never created at all.
fn frames_dir(paths: &ArtifactPaths, worker_index: usize) -> std::path::PathBuf {
    let name = paths
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("w{worker_index}"));
    match paths.dir.parent() {
        Some(parent) => parent.join(format!(".frames-{name}")),
        None => paths.dir.join(".frames"),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
