//! ETL pipeline CLI
//!
//! Command-line interface for converting, tracking and uploading entity data

use clap::Parser;
use etl_pipeline::cli::{log_directives, Cli, Runner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = log_directives(cli.verbose, rust_log.as_deref());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(directives))
        .init();

    let runner = Runner::new(cli);

    if let Err(e) = runner.run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
