//! Command-line argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Cross-browser test evidence orchestration
#[derive(Debug, Parser)]
#[command(name = "testigo", version, about)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print failures and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the smoke suite from a config file against real browsers
    Run(RunArgs),
    /// Merge per-browser manifests into one aggregate manifest
    Merge(MergeArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Arguments for `testigo run`
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Suite configuration file
    #[arg(short, long, default_value = "testigo.yaml")]
    pub config: PathBuf,

    /// Browser override: chrome|firefox|edge|all
    #[arg(long)]
    pub browser: Option<String>,

    /// Force headless mode
    #[arg(long)]
    pub headless: bool,

    /// Disable video recording
    #[arg(long)]
    pub no_video: bool,

    /// Fresh browser session per test (override shared-session default)
    #[arg(long)]
    pub per_test: bool,

    /// Parallel workers per browser
    #[arg(long)]
    pub workers: Option<usize>,

    /// Treat the run as a single-target invocation (defaults to chrome
    /// only unless --browser is given)
    #[arg(long)]
    pub single_target: bool,
}

/// Arguments for `testigo merge`
#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Results root holding per-browser `<browser>/manifest.json` files
    #[arg(default_value = "reports/results")]
    pub root: PathBuf,

    /// Run identifier for the merged manifest (defaults to the first
    /// manifest's run id)
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Arguments for `testigo config`
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Configuration file to show; defaults are printed when omitted or
    /// missing
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "testigo",
            "run",
            "--browser",
            "all",
            "--headless",
            "--no-video",
            "--per-test",
            "--workers",
            "4",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.browser.as_deref(), Some("all"));
                assert!(args.headless);
                assert!(args.no_video);
                assert!(args.per_test);
                assert_eq!(args.workers, Some(4));
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_merge_default_root() {
        let cli = Cli::parse_from(["testigo", "merge"]);
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.root, PathBuf::from("reports/results"));
            }
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
