//! Subcommand implementations

use crate::cli::{ConfigArgs, MergeArgs, RunArgs};
use crate::error::{CliError, CliResult};
use crate::output::Reporter;
use std::path::Path;
use testigo::{Browser, ReusePolicy, Scope, SuiteConfig, SuiteManifest};

/// Load a suite config, falling back to defaults when the file is absent
pub fn load_config(path: &Path) -> CliResult<SuiteConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SuiteConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml_ng::from_str(&raw)?)
}

/// Fold CLI flags into the loaded config, resolving the run scope
pub fn apply_overrides(mut config: SuiteConfig, args: &RunArgs) -> CliResult<(SuiteConfig, Scope)> {
    if let Some(value) = &args.browser {
        let browsers = if value.eq_ignore_ascii_case("all") {
            Browser::all().to_vec()
        } else {
            vec![value
                .parse::<Browser>()
                .map_err(|e| CliError::invalid_argument(e))?]
        };
        config = config.with_browser_override(browsers);
    }
    if args.headless {
        config.session.headless = true;
    }
    if args.no_video {
        config.video.enabled = false;
    }
    if args.per_test {
        config.reuse = ReusePolicy::PerTest;
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    let scope = if args.single_target {
        Scope::SingleTarget
    } else {
        Scope::FullSuite
    };
    Ok((config, scope))
}

/// `testigo run`: execute the built-in smoke suite against real browsers
#[cfg(feature = "browser")]
pub async fn run(args: &RunArgs, reporter: &Reporter) -> CliResult<i32> {
    use std::sync::Arc;
    use testigo::{CdpSessionFactory, SuiteOrchestrator};

    let (config, scope) = apply_overrides(load_config(&args.config)?, args)?;
    let suite = smoke_suite(&config.base_url);

    let orchestrator = SuiteOrchestrator::new(config, Arc::new(CdpSessionFactory::new()));
    reporter.info(&format!(
        "run {}: {} tests",
        orchestrator.run_id(),
        suite.len()
    ));
    let manifest = orchestrator.run(&suite, scope).await?;
    reporter.summary(&manifest);
    Ok(manifest.exit_code())
}

/// `testigo run` without browser support compiled in
#[cfg(not(feature = "browser"))]
pub async fn run(args: &RunArgs, _reporter: &Reporter) -> CliResult<i32> {
    // Still validate the config so the error is not misleading
    let _ = apply_overrides(load_config(&args.config)?, args)?;
    Err(CliError::config(
        "built without browser support; rebuild with --features browser",
    ))
}

/// The built-in smoke selection: enough to prove the evidence pipeline
/// works end to end against a live origin.
#[cfg(feature = "browser")]
fn smoke_suite(base_url: &str) -> testigo::TestSuite {
    use testigo::{BrowserSession, CaseStatus, TestCase, TestId, TestSuite};

    let url = base_url.to_string();
    let loads = TestCase::new(TestId::new("smoke", "Smoke", "loads_base_url"), move |s| {
        let url = url.clone();
        Box::pin(async move {
            match s.navigate(&url).await {
                Ok(()) => CaseStatus::Passed,
                Err(e) => CaseStatus::Failed(e.to_string()),
            }
        })
    })
    .with_tags(["smoke"]);

    let captures = TestCase::new(
        TestId::new("smoke", "Smoke", "captures_viewport"),
        |s| {
            Box::pin(async move {
                match s.capture_png().await {
                    Ok(png) if !png.is_empty() => CaseStatus::Passed,
                    Ok(_) => CaseStatus::Failed("empty screenshot".to_string()),
                    Err(e) => CaseStatus::Failed(e.to_string()),
                }
            })
        },
    )
    .with_tags(["smoke"]);

    TestSuite::new("smoke").with_case(loads).with_case(captures)
}

/// `testigo merge`: combine per-browser manifests into one aggregate
pub fn merge(args: &MergeArgs, reporter: &Reporter) -> CliResult<i32> {
    let mut runs = Vec::new();
    let mut first_run_id = None;

    let entries = std::fs::read_dir(&args.root).map_err(|_| CliError::NothingToMerge {
        root: args.root.display().to_string(),
    })?;
    let mut dirs: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.exists() {
            continue;
        }
        let manifest = SuiteManifest::load(&manifest_path)?;
        if first_run_id.is_none() {
            first_run_id = Some(manifest.run_id.clone());
        }
        runs.extend(manifest.runs);
    }

    if runs.is_empty() {
        return Err(CliError::NothingToMerge {
            root: args.root.display().to_string(),
        });
    }

    let run_id = args
        .run_id
        .clone()
        .or(first_run_id)
        .unwrap_or_else(|| "merged".to_string());
    let merged = SuiteManifest::merge(run_id, runs);
    merged.save(&args.root.join("manifest.json"))?;

    reporter.summary(&merged);
    Ok(merged.exit_code())
}

/// `testigo config`: print the effective configuration as YAML
pub fn show_config(args: &ConfigArgs) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => SuiteConfig::default(),
    };
    println!("{}", serde_yaml_ng::to_string(&config)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use testigo::{BrowserRun, Outcome};

    fn run_args() -> RunArgs {
        RunArgs {
            config: "missing.yaml".into(),
            browser: None,
            headless: false,
            no_video: false,
            per_test: false,
            workers: None,
            single_target: false,
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_missing_file_gives_defaults() {
            let config = load_config(Path::new("/nonexistent/testigo.yaml")).unwrap();
            assert_eq!(config.workers, 1);
        }

        #[test]
        fn test_yaml_file_parsed() {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("testigo.yaml");
            std::fs::write(
                &path,
                "browsers: [chrome, firefox]\nbrowser_override: null\nbase_url: http://qa.local/\nworkers: 2\nreuse: shared\nsession:\n  headless: true\n  viewport_width: 1280\n  viewport_height: 720\n  incognito: false\n  page_load_strategy: eager\n  binary_path: null\nvideo:\n  enabled: false\n  fps: 10\n  encoder: ffmpeg\n  encode_timeout: 60000\nlog_bounds:\n  max_entries: 100\n  max_bytes: 10000\nwarmup_timeout: 2000\ntest_timeout: 30000\nartifacts_root: artifacts\nresults_root: reports/results\nparam_value_limit: 60\n",
            )
            .unwrap();
            let config = load_config(&path).unwrap();
            assert_eq!(config.base_url, "http://qa.local/");
            assert_eq!(config.workers, 2);
            assert!(!config.video.enabled);
        }

        #[test]
        fn test_overrides_applied() {
            let mut args = run_args();
            args.browser = Some("all".to_string());
            args.per_test = true;
            args.no_video = true;
            args.workers = Some(3);
            args.single_target = true;

            let (config, scope) = apply_overrides(SuiteConfig::default(), &args).unwrap();
            assert_eq!(
                config.browser_override,
                Some(Browser::all().to_vec())
            );
            assert_eq!(config.reuse, ReusePolicy::PerTest);
            assert!(!config.video.enabled);
            assert_eq!(config.workers, 3);
            assert_eq!(scope, Scope::SingleTarget);
        }

        #[test]
        fn test_bad_browser_rejected() {
            let mut args = run_args();
            args.browser = Some("safari".to_string());
            let err = apply_overrides(SuiteConfig::default(), &args).unwrap_err();
            assert!(matches!(err, CliError::InvalidArgument { .. }));
        }
    }

    mod merge_tests {
        use super::*;

        fn write_browser_manifest(root: &Path, browser: Browser, outcome: Outcome) {
            let mut run = BrowserRun::new(browser);
            let id = testigo::TestId::new("m", "C", "t");
            run.records.push(testigo::ResultRecord {
                title: id.short_title(),
                id,
                browser,
                outcome,
                severity: testigo::Severity::Normal,
                decl_index: 0,
                started_at: chrono_now(),
                finished_at: chrono_now(),
                duration_ms: 1,
                parameters: Vec::new(),
                attachments: Vec::new(),
                reason: None,
                video_error: None,
            });
            let manifest = SuiteManifest::merge("run-x", vec![run]);
            manifest
                .save(&root.join(browser.as_str()).join("manifest.json"))
                .unwrap();
        }

        fn chrono_now() -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }

        #[test]
        fn test_merge_combines_browser_dirs() {
            let tmp = TempDir::new().unwrap();
            write_browser_manifest(tmp.path(), Browser::Chrome, Outcome::Passed);
            write_browser_manifest(tmp.path(), Browser::Firefox, Outcome::Failed);

            let args = MergeArgs {
                root: tmp.path().to_path_buf(),
                run_id: None,
            };
            let reporter = Reporter::new(false, true);
            let exit = merge(&args, &reporter).unwrap();
            assert_eq!(exit, 1);

            let merged = SuiteManifest::load(&tmp.path().join("manifest.json")).unwrap();
            assert_eq!(merged.run_id, "run-x");
            assert_eq!(merged.runs.len(), 2);
            assert_eq!(merged.total(), 2);
        }

        #[test]
        fn test_merge_empty_root_errors() {
            let tmp = TempDir::new().unwrap();
            let args = MergeArgs {
                root: tmp.path().to_path_buf(),
                run_id: None,
            };
            let reporter = Reporter::new(false, true);
            let err = merge(&args, &reporter).unwrap_err();
            assert!(matches!(err, CliError::NothingToMerge { .. }));
        }
    }
}
