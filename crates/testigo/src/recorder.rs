//! Per-test video recording.
//!
//! A recorder is bound 1:1 to one test execution. `start` spawns a
//! background sampling task that captures a full-viewport frame from the
//! session on a fixed interval, independent of the test body's control
//! flow — the body never drives or polls the sampler, and long waits inside
//! the test do not pause it. `stop` consumes the recorder (so it can only
//! happen once) and yields a [`Recording`] which is then either encoded
//! into a video by an external encoder process or discarded.
//!
//! Frame sequence numbers follow the sampling ticks: they are strictly
//! increasing, and gapless exactly when every capture succeeded. A failed
//! capture skips that tick's frame and counts a gap — detectable, never
//! fatal.

use crate::result::{TestigoError, TestigoResult};
use crate::session::BrowserSession;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One captured viewport frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sampling tick this frame was captured on (strictly increasing)
    pub seq: u64,
    /// Capture time relative to recording start
    pub captured_at: Duration,
    /// Where the PNG was persisted
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct SamplerReport {
    frames: Vec<Frame>,
    gaps: u32,
}

/// A live recording: a background sampling task plus its stop signal
pub struct VideoRecorder {
    task: JoinHandle<SamplerReport>,
    stop_tx: watch::Sender<bool>,
    frames_dir: PathBuf,
    fps: u8,
}

impl std::fmt::Debug for VideoRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRecorder")
            .field("frames_dir", &self.frames_dir)
            .field("fps", &self.fps)
            .finish()
    }
}

impl VideoRecorder {
    /// Begin sampling `source` every `1/fps` seconds into `frames_dir`.
    ///
    /// # Errors
    ///
    /// Fails only when the frames directory cannot be created.
    pub fn start(
        source: Arc<dyn BrowserSession>,
        fps: u8,
        frames_dir: impl Into<PathBuf>,
    ) -> TestigoResult<Self> {
        let frames_dir = frames_dir.into();
        std::fs::create_dir_all(&frames_dir)?;

        let fps = fps.clamp(1, 60);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(sample_loop(source, fps, frames_dir.clone(), stop_rx));

        Ok(Self {
            task,
            stop_tx,
            frames_dir,
            fps,
        })
    }

    /// Halt sampling and collect what was captured.
    ///
    /// Consumes the recorder, so stopping is possible exactly once; the
    /// orchestrator reaches this call on every exit path of a test.
    pub async fn stop(self) -> Recording {
        let _ = self.stop_tx.send(true);
        let report = match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "frame sampler task did not shut down cleanly");
                SamplerReport::default()
            }
        };
        Recording {
            frames: report.frames,
            gaps: report.gaps,
            frames_dir: self.frames_dir,
            fps: self.fps,
        }
    }
}

async fn sample_loop(
    source: Arc<dyn BrowserSession>,
    fps: u8,
    frames_dir: PathBuf,
    mut stop_rx: watch::Receiver<bool>,
) -> SamplerReport {
    let period = Duration::from_secs_f64(1.0 / f64::from(fps));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let started = Instant::now();
    let mut report = SamplerReport::default();
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                match source.capture_png().await {
                    Ok(png) => {
                        // File numbering stays contiguous for the encoder's
                        // input pattern even when ticks were skipped.
                        let path = frames_dir.join(format!("frame_{:06}.png", report.frames.len()));
                        match tokio::fs::write(&path, &png).await {
                            Ok(()) => report.frames.push(Frame {
                                seq,
                                captured_at: started.elapsed(),
                                path,
                            }),
                            Err(e) => {
                                report.gaps += 1;
                                tracing::debug!(error = %e, "frame write failed, skipping frame");
                            }
                        }
                    }
                    Err(e) => {
                        report.gaps += 1;
                        tracing::debug!(error = %e, "frame capture failed, skipping frame");
                    }
                }
                seq += 1;
            }
        }
    }
    report
}

/// The stopped recording: captured frames awaiting encode or discard
#[derive(Debug)]
pub struct Recording {
    frames: Vec<Frame>,
    gaps: u32,
    frames_dir: PathBuf,
    fps: u8,
}

impl Recording {
    /// Number of frames actually captured
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Number of sampling ticks whose capture failed
    #[must_use]
    pub const fn gap_count(&self) -> u32 {
        self.gaps
    }

    /// Whether the sequence numbers are strictly increasing with no holes
    #[must_use]
    pub fn is_gapless(&self) -> bool {
        self.gaps == 0
            && self
                .frames
                .windows(2)
                .all(|pair| pair[1].seq == pair[0].seq + 1)
    }

    /// Captured frame metadata, in sequence order
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Mux the frames into `outfile` by invoking the external encoder.
    ///
    /// The encoder is an opaque subprocess contract: ordered frame files
    /// plus a frame rate in, one video file and exit code 0 out. The call
    /// blocks the finalizing worker until the process exits or `timeout`
    /// elapses. Frames are removed afterwards either way.
    ///
    /// # Errors
    ///
    /// `TestigoError::Encoding` when the encoder cannot be launched, exits
    /// nonzero, times out, or claims success without producing the file.
    /// Fatal only to this test's video attachment.
    pub async fn encode(
        self,
        encoder: &Path,
        timeout: Duration,
        outfile: &Path,
    ) -> TestigoResult<()> {
        let result = self.run_encoder(encoder, timeout, outfile).await;
        remove_dir_best_effort(&self.frames_dir);
        result
    }

    async fn run_encoder(
        &self,
        encoder: &Path,
        timeout: Duration,
        outfile: &Path,
    ) -> TestigoResult<()> {
        if self.frames.is_empty() {
            return Err(TestigoError::encoding("no frames captured"));
        }
        if self.frames.len() == 1 {
            duplicate_single_frame(&self.frames_dir)?;
        }

        if let Some(parent) = outfile.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pattern = self.frames_dir.join("frame_%06d.png");
        let mut command = tokio::process::Command::new(encoder);
        command
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-framerate")
            .arg(self.fps.to_string())
            .arg("-start_number")
            .arg("0")
            .arg("-i")
            .arg(&pattern)
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(outfile)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            TestigoError::encoding(format!(
                "could not launch encoder '{}': {e}",
                encoder.display()
            ))
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_elapsed) => {
                return Err(TestigoError::encoding(format!(
                    "encoder timed out after {}ms",
                    timeout.as_millis()
                )))
            }
            Ok(Err(e)) => return Err(TestigoError::encoding(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let brief: String = stderr.chars().take(200).collect();
            return Err(TestigoError::encoding(format!(
                "encoder exited with {}: {brief}",
                output.status
            )));
        }
        if !outfile.exists() {
            return Err(TestigoError::encoding(
                "encoder reported success but produced no output",
            ));
        }
        Ok(())
    }

    /// Drop the recording without encoding (pass outcome, cancellation).
    /// Frames are deleted; no encoder CPU is spent.
    pub fn discard(self) {
        remove_dir_best_effort(&self.frames_dir);
    }
}

/// The encoder needs at least two frames for a playable output; a
/// one-frame recording gets its frame duplicated.
fn duplicate_single_frame(frames_dir: &Path) -> TestigoResult<()> {
    let first = frames_dir.join("frame_000000.png");
    let second = frames_dir.join("frame_000001.png");
    std::fs::copy(&first, &second)?;
    Ok(())
}

fn remove_dir_best_effort(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "could not remove frames dir");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{Browser, SessionOptions};
    use crate::mock::{MockBehavior, MockSessionFactory};
    use crate::session::SessionFactory;
    use tempfile::TempDir;

    async fn mock_session(behavior: MockBehavior) -> Arc<dyn BrowserSession> {
        MockSessionFactory::new(behavior)
            .launch(Browser::Chrome, &SessionOptions::default())
            .await
            .expect("mock launch")
    }

    mod sampling_tests {
        use super::*;

        #[tokio::test]
        async fn test_samples_while_test_body_waits() {
            let tmp = TempDir::new().unwrap();
            let session = mock_session(MockBehavior::default()).await;
            let recorder =
                VideoRecorder::start(session, 50, tmp.path().join("frames")).expect("start");

            // The "test body" does nothing but sleep; sampling continues.
            tokio::time::sleep(Duration::from_millis(300)).await;
            let recording = recorder.stop().await;

            assert!(recording.frame_count() >= 2);
            assert!(recording.is_gapless());
        }

        #[tokio::test]
        async fn test_sequence_strictly_increasing() {
            let tmp = TempDir::new().unwrap();
            let session = mock_session(MockBehavior::default()).await;
            let recorder =
                VideoRecorder::start(session, 60, tmp.path().join("frames")).expect("start");
            tokio::time::sleep(Duration::from_millis(200)).await;
            let recording = recorder.stop().await;

            let seqs: Vec<u64> = recording.frames().iter().map(|f| f.seq).collect();
            for pair in seqs.windows(2) {
                assert!(pair[1] > pair[0], "sequence must strictly increase");
            }
        }

        #[tokio::test]
        async fn test_capture_failure_recorded_as_gap_not_fatal() {
            let tmp = TempDir::new().unwrap();
            let session = mock_session(MockBehavior::default().failing_captures(2)).await;
            let recorder =
                VideoRecorder::start(session, 50, tmp.path().join("frames")).expect("start");
            tokio::time::sleep(Duration::from_millis(300)).await;
            let recording = recorder.stop().await;

            assert_eq!(recording.gap_count(), 2);
            assert!(recording.frame_count() >= 1);
            assert!(!recording.is_gapless());
        }

        #[tokio::test]
        async fn test_stop_consumes_recorder() {
            let tmp = TempDir::new().unwrap();
            let session = mock_session(MockBehavior::default()).await;
            let recorder =
                VideoRecorder::start(session, 10, tmp.path().join("frames")).expect("start");
            let recording = recorder.stop().await;
            // `recorder` is moved; a second stop cannot compile. Discard
            // removes the frame store.
            let dir = tmp.path().join("frames");
            assert!(dir.exists());
            recording.discard();
            assert!(!dir.exists());
        }
    }

    mod encode_tests {
        use super::*;

        async fn recording_with_frames(tmp: &TempDir, millis: u64) -> Recording {
            let session = mock_session(MockBehavior::default()).await;
            let recorder =
                VideoRecorder::start(session, 50, tmp.path().join("frames")).expect("start");
            tokio::time::sleep(Duration::from_millis(millis)).await;
            recorder.stop().await
        }

        #[tokio::test]
        async fn test_missing_encoder_is_encoding_error() {
            let tmp = TempDir::new().unwrap();
            let recording = recording_with_frames(&tmp, 150).await;
            let err = recording
                .encode(
                    Path::new("/nonexistent/encoder-binary"),
                    Duration::from_secs(5),
                    &tmp.path().join("out.mp4"),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, TestigoError::Encoding { .. }));
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_nonzero_exit_is_encoding_error() {
            let tmp = TempDir::new().unwrap();
            let recording = recording_with_frames(&tmp, 150).await;
            let err = recording
                .encode(
                    Path::new("/bin/false"),
                    Duration::from_secs(5),
                    &tmp.path().join("out.mp4"),
                )
                .await
                .unwrap_err();
            assert!(err.to_string().contains("exited with"));
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_success_without_output_is_encoding_error() {
            let tmp = TempDir::new().unwrap();
            let recording = recording_with_frames(&tmp, 150).await;
            let err = recording
                .encode(
                    Path::new("/bin/true"),
                    Duration::from_secs(5),
                    &tmp.path().join("out.mp4"),
                )
                .await
                .unwrap_err();
            assert!(err.to_string().contains("no output"));
        }

        #[tokio::test]
        async fn test_empty_recording_cannot_encode() {
            let tmp = TempDir::new().unwrap();
            let session = mock_session(MockBehavior::default().failing_captures(u32::MAX)).await;
            let recorder =
                VideoRecorder::start(session, 50, tmp.path().join("frames")).expect("start");
            tokio::time::sleep(Duration::from_millis(100)).await;
            let recording = recorder.stop().await;
            assert_eq!(recording.frame_count(), 0);

            let err = recording
                .encode(
                    Path::new("/bin/true"),
                    Duration::from_secs(1),
                    &tmp.path().join("out.mp4"),
                )
                .await
                .unwrap_err();
            assert!(err.to_string().contains("no frames"));
        }

        #[tokio::test]
        async fn test_encode_cleans_frames_dir() {
            let tmp = TempDir::new().unwrap();
            let recording = recording_with_frames(&tmp, 150).await;
            let frames_dir = tmp.path().join("frames");
            assert!(frames_dir.exists());
            let _ = recording
                .encode(
                    Path::new("/nonexistent/encoder-binary"),
                    Duration::from_secs(1),
                    &tmp.path().join("out.mp4"),
                )
                .await;
            assert!(!frames_dir.exists());
        }
    }

    mod duplication_tests {
        use super::*;

        #[test]
        fn test_single_frame_duplicated() {
            let tmp = TempDir::new().unwrap();
            std::fs::write(tmp.path().join("frame_000000.png"), b"png-bytes").unwrap();
            duplicate_single_frame(tmp.path()).expect("duplicate");
            assert!(tmp.path().join("frame_000001.png").exists());
        }
    }
}
