//! CLI module
//!
//! Command-line interface for running the pipeline.
//!
//! # Commands
//!
//! - `convert` - Convert raw inputs into one Parquet file
//! - `deltas` - Count new records per entity and advance watermarks
//! - `watermarks` - Print the watermark document
//! - `upload` - Upload a directory to a cloud destination
//! - `run` - Run the full pipeline from a config file
//! - `settings` - Print scraper settings

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;

/// Log filter directives: `RUST_LOG` when set and valid, otherwise `info`
/// (or `debug` with `--verbose`)
pub fn log_directives(verbose: bool, rust_log: Option<&str>) -> String {
    let from_env = rust_log
        .map(str::trim)
        .filter(|d| !d.is_empty() && tracing_subscriber::EnvFilter::try_new(d).is_ok());
    match from_env {
        Some(directives) => directives.to_string(),
        None if verbose => "debug".to_string(),
        None => "info".to_string(),
    }
}
