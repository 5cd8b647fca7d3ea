//! Laconic CLI - development server and route inspection.
//!
//! # Usage
//!
//! ```bash
//! # Serve the demo API on the configured address
//! laconic serve
//!
//! # Override the address and enable debug mode
//! laconic serve --host 0.0.0.0 --port 9000 --debug
//!
//! # List the demo routes
//! laconic routes
//! ```
//!
//! # Environment Variables
//!
//! - `LACONIC_DEBUG` - Verbose errors and debug logging to stdout
//! - `LACONIC_HOST` / `LACONIC_PORT` - Bind address (flags take precedence)
//! - `LACONIC_LOG_FILENAME` - Log file outside debug mode
//! - `SENTRY_DSN` - Enables error tracking

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::IpAddr;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::MakeWriter;

mod commands;
mod demo;

#[derive(Parser)]
#[command(name = "laconic")]
#[command(author, version, about = "Laconic development tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo API with the development server
    Serve {
        /// IP address to bind to
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable debug mode
        #[arg(short, long)]
        debug: bool,
    },
    /// Print the demo route table
    Routes,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        // No-op when `serve` already installed its own subscriber
        let _ = tracing::subscriber::set_global_default(failure_subscriber(std::io::stderr));
        report_failure(e.as_ref());
        std::process::exit(1);
    }
}

/// Subscriber used to report a failed command.
fn failure_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .without_time()
        .finish()
}

fn report_failure(err: &dyn std::error::Error) {
    tracing::error!("Command failed: {err}");
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Serve { host, port, debug } => {
            commands::serve::run(commands::serve::Overrides { host, port, debug }).await?;
        }
        Commands::Routes => commands::routes::print()?,
    }
    Ok(())
}
