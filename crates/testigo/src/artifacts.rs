//! Artifact path allocation.
//!
//! Every per-test output file (screenshot, video, log) lives in a directory
//! derived purely from `(run id, browser, worker, test id)`. Because the
//! path is a function of its inputs, two workers can allocate concurrently
//! without any locking and never produce the same string; the filesystem is
//! only touched to lazily create the directory, and concurrent creation of
//! the same directory is not an error.

use crate::config::Browser;
use crate::result::{TestigoError, TestigoResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum length of a generated slug component
const MAX_SLUG_LEN: usize = 120;

/// Turn an arbitrary test identifier into a safe file/dir slug.
///
/// `::` separators survive as `__`; any other unsafe run collapses to a
/// single `_`. `tests/test_signup.rs::signup[row-1]` becomes
/// `tests_test_signup.rs__signup_row-1`.
#[must_use]
pub fn slugify(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let segments: Vec<String> = lowered
        .split("::")
        .map(slug_segment)
        .filter(|s| !s.is_empty())
        .collect();
    let mut slug = segments.join("__");
    if slug.len() > MAX_SLUG_LEN {
        // Slugs are pure ASCII by construction, so this cannot split a char
        slug.truncate(MAX_SLUG_LEN);
    }
    slug
}

fn slug_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut prev_underscore = false;
    for ch in segment.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '.' | '-' => ch,
            _ => '_',
        };
        if mapped == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}

/// The file layout of one test's artifact directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// The per-test directory
    pub dir: PathBuf,
    /// Screenshot destination
    pub screenshot: PathBuf,
    /// Video destination
    pub video: PathBuf,
    /// Flushed log destination
    pub log: PathBuf,
}

impl ArtifactPaths {
    fn for_slug(dir: PathBuf, slug: &str) -> Self {
        Self {
            screenshot: dir.join(format!("{slug}.png")),
            video: dir.join(format!("{slug}.mp4")),
            log: dir.join(format!("{slug}.log")),
            dir,
        }
    }

    /// Create the directory if missing. Idempotent: an already-existing
    /// directory (including one racing into existence under a concurrent
    /// worker) is success.
    pub fn ensure_dir(&self) -> TestigoResult<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| TestigoError::allocation(self.dir.display().to_string(), e.to_string()))
    }

    /// Remove the directory if it exists and holds nothing
    pub fn remove_if_empty(&self) {
        if let Ok(mut entries) = fs::read_dir(&self.dir) {
            if entries.next().is_none() {
                let _ = fs::remove_dir(&self.dir);
            }
        }
    }

    /// Delete the directory and everything in it (cancelled runs leave no
    /// partial evidence behind)
    pub fn discard(&self) {
        if self.dir.exists() {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Derives collision-free artifact directories for a run.
///
/// One allocator exists per suite invocation; it is cheap to clone and
/// holds no mutable state.
#[derive(Debug, Clone)]
pub struct ArtifactAllocator {
    root: PathBuf,
    run_id: String,
}

impl ArtifactAllocator {
    /// Create an allocator rooted at `root` for the given run
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
        }
    }

    /// The run identifier this allocator serves
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Compute the paths for one test without touching the filesystem.
    ///
    /// The directory is `<root>/<run>/<browser>/w<worker>-<slug>`; run id,
    /// browser and worker all participate, so no two tests of a run can
    /// ever share a directory, across browsers or workers.
    #[must_use]
    pub fn paths(&self, browser: Browser, worker_index: usize, test_id: &str) -> ArtifactPaths {
        let slug = slugify(test_id);
        let dir = self
            .root
            .join(&self.run_id)
            .join(browser.as_str())
            .join(format!("w{worker_index}-{slug}"));
        ArtifactPaths::for_slug(dir, &slug)
    }

    /// Compute the paths and create the directory.
    ///
    /// # Errors
    ///
    /// Returns `TestigoError::Allocation` when the directory cannot be
    /// created; fatal to this test only.
    pub fn allocate(
        &self,
        browser: Browser,
        worker_index: usize,
        test_id: &str,
    ) -> TestigoResult<ArtifactPaths> {
        let paths = self.paths(browser, worker_index, test_id);
        paths.ensure_dir()?;
        Ok(paths)
    }

    /// Directory holding every artifact of this run
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.run_id)
    }
}

/// Write `content` to `path`, creating parent directories as needed
pub fn write_file(path: &Path, content: &[u8]) -> TestigoResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TestigoError::allocation(parent.display().to_string(), e.to_string()))?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod slug_tests {
        use super::*;

        #[test]
        fn test_nodeid_style_input() {
            assert_eq!(
                slugify("tests/test_signup.rs::signup[row-1]"),
                "tests_test_signup.rs__signup_row-1"
            );
        }

        #[test]
        fn test_collapses_runs_of_junk() {
            assert_eq!(slugify("a   b///c"), "a_b_c");
        }

        #[test]
        fn test_trims_edges() {
            assert_eq!(slugify("  ::name::  "), "name");
        }

        #[test]
        fn test_clamps_length() {
            let long = "x".repeat(500);
            assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
        }

        #[test]
        fn test_lowercases() {
            assert_eq!(slugify("Login::HappyPath"), "login__happypath");
        }
    }

    mod allocator_tests {
        use super::*;

        #[test]
        fn test_pure_path_composition() {
            let alloc = ArtifactAllocator::new("/tmp/arts", "run-1");
            let p = alloc.paths(Browser::Firefox, 2, "mod::case");
            assert_eq!(
                p.dir,
                PathBuf::from("/tmp/arts/run-1/firefox/w2-mod__case")
            );
            assert_eq!(p.log.file_name().unwrap(), "mod__case.log");
            assert_eq!(p.video.file_name().unwrap(), "mod__case.mp4");
            assert_eq!(p.screenshot.file_name().unwrap(), "mod__case.png");
        }

        #[test]
        fn test_distinct_across_browsers_workers_tests() {
            let alloc = ArtifactAllocator::new("/tmp/arts", "run-1");
            let combos = [
                alloc.paths(Browser::Chrome, 0, "t1"),
                alloc.paths(Browser::Chrome, 1, "t1"),
                alloc.paths(Browser::Firefox, 0, "t1"),
                alloc.paths(Browser::Chrome, 0, "t2"),
            ];
            for (i, a) in combos.iter().enumerate() {
                for (j, b) in combos.iter().enumerate() {
                    if i != j {
                        assert_ne!(a.dir, b.dir);
                    }
                }
            }
        }

        #[test]
        fn test_allocate_creates_dir_idempotently() {
            let tmp = TempDir::new().unwrap();
            let alloc = ArtifactAllocator::new(tmp.path(), "r");
            let first = alloc
                .allocate(Browser::Chrome, 0, "case")
                .expect("first allocate");
            assert!(first.dir.is_dir());
            // second creation of the same path is not an error
            let second = alloc
                .allocate(Browser::Chrome, 0, "case")
                .expect("second allocate");
            assert_eq!(first, second);
        }

        #[test]
        fn test_allocate_failure_is_allocation_error() {
            let tmp = TempDir::new().unwrap();
            // A file where the browser dir should be forces a failure
            let run_dir = tmp.path().join("r");
            fs::create_dir_all(&run_dir).unwrap();
            fs::write(run_dir.join("chrome"), b"not a dir").unwrap();

            let alloc = ArtifactAllocator::new(tmp.path(), "r");
            let err = alloc.allocate(Browser::Chrome, 0, "case").unwrap_err();
            assert!(matches!(err, TestigoError::Allocation { .. }));
        }

        #[test]
        fn test_remove_if_empty() {
            let tmp = TempDir::new().unwrap();
            let alloc = ArtifactAllocator::new(tmp.path(), "r");
            let paths = alloc.allocate(Browser::Chrome, 0, "case").unwrap();
            paths.remove_if_empty();
            assert!(!paths.dir.exists());
        }

        #[test]
        fn test_remove_if_empty_keeps_populated_dir() {
            let tmp = TempDir::new().unwrap();
            let alloc = ArtifactAllocator::new(tmp.path(), "r");
            let paths = alloc.allocate(Browser::Chrome, 0, "case").unwrap();
            fs::write(&paths.log, b"evidence").unwrap();
            paths.remove_if_empty();
            assert!(paths.dir.exists());
        }

        #[test]
        fn test_discard_removes_everything() {
            let tmp = TempDir::new().unwrap();
            let alloc = ArtifactAllocator::new(tmp.path(), "r");
            let paths = alloc.allocate(Browser::Chrome, 0, "case").unwrap();
            fs::write(&paths.log, b"partial").unwrap();
            paths.discard();
            assert!(!paths.dir.exists());
        }
    }
}
