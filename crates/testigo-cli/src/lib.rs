//! Testigo CLI: run suites, merge manifests, inspect configuration.

#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, ConfigArgs, MergeArgs, RunArgs};
pub use error::{CliError, CliResult};
pub use output::Reporter;
