//! Testigo CLI entry point
//!
//! ```bash
//! testigo run --browser all          # full suite on every browser
//! testigo run --single-target       # chrome-only fast path
//! testigo merge reports/results     # combine per-browser manifests
//! testigo config                    # show effective configuration
//! ```

use clap::Parser;
use std::process::ExitCode;
use testigo_cli::{commands, Cli, Commands, Reporter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let reporter = Reporter::new(!cli.no_color, cli.quiet);

    let result = match &cli.command {
        Commands::Run(args) => commands::run(args, &reporter).await,
        Commands::Merge(args) => commands::merge(args, &reporter),
        Commands::Config(args) => commands::show_config(args).map(|()| 0),
    };

    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "testigo=warn",
        1 => "testigo=info",
        _ => "testigo=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
