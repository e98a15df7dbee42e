// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mx - named-mutex coordination CLI

mod adapters;
mod commands;
mod harness;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{lock, test};
use mx_core::Endpoint;

#[derive(Parser)]
#[command(
    name = "mx",
    version,
    about = "mx - Named-mutex coordination for worker processes"
)]
struct Cli {
    /// Coordination server endpoint (unix:///path or tcp://host:port)
    #[arg(long, global = true)]
    endpoint: Option<Endpoint>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is reachable
    Ping,
    /// Print the value published by the holder of a key
    Get(lock::GetArgs),
    /// Take a key if it is free, publish a value and hold it until interrupted
    TryLock(lock::HoldArgs),
    /// Wait for a key, publish a value and hold it until interrupted
    Hold(lock::HoldArgs),
    /// Run the end-to-end test suite against a fresh environment
    Test(test::TestArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let endpoint = match cli.endpoint {
        Some(endpoint) => endpoint,
        None => mx_daemon::lifecycle::default_endpoint()?,
    };

    match cli.command {
        Commands::Ping => lock::ping(&endpoint).await,
        Commands::Get(args) => lock::get(&endpoint, args).await,
        Commands::TryLock(args) => lock::try_lock(&endpoint, args).await,
        Commands::Hold(args) => lock::hold(&endpoint, args).await,
        Commands::Test(args) => test::handle(endpoint, args).await,
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
