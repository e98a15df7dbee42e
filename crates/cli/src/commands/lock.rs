// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator commands against a running coordination server

use anyhow::{bail, Result};
use mx_client::MutexClient;
use mx_core::Endpoint;
use serde_json::Value;
use tokio::signal::unix::{signal, SignalKind};

#[derive(clap::Args)]
pub struct GetArgs {
    /// Key to read
    pub key: String,
}

#[derive(clap::Args)]
pub struct HoldArgs {
    /// Key to acquire
    pub key: String,

    /// Value to publish while holding (JSON, or a plain string)
    #[arg(long)]
    pub value: Option<String>,
}

pub async fn ping(endpoint: &Endpoint) -> Result<()> {
    let client = MutexClient::connect(endpoint).await?;
    client.ping().await?;
    println!("pong from {}", endpoint);
    client.close().await?;
    Ok(())
}

pub async fn get(endpoint: &Endpoint, args: GetArgs) -> Result<()> {
    let client = MutexClient::connect(endpoint).await?;
    match client.get_value(&args.key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("No value for {}", args.key),
    }
    client.close().await?;
    Ok(())
}

pub async fn try_lock(endpoint: &Endpoint, args: HoldArgs) -> Result<()> {
    let client = MutexClient::connect(endpoint).await?;
    if !client.try_lock(&args.key).await? {
        bail!("{} is held by another connection", args.key);
    }
    publish_and_hold(client, args).await
}

pub async fn hold(endpoint: &Endpoint, args: HoldArgs) -> Result<()> {
    let client = MutexClient::connect(endpoint).await?;
    eprintln!("Waiting for {}...", args.key);
    client.lock(&args.key).await?;
    publish_and_hold(client, args).await
}

async fn publish_and_hold(client: MutexClient, args: HoldArgs) -> Result<()> {
    if let Some(raw) = &args.value {
        client.set_value(&args.key, Some(parse_value(raw))).await?;
    }
    println!("Holding {} (Ctrl-C to release)", args.key);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }

    client.close().await?;
    println!("Released {}", args.key);
    Ok(())
}

/// Parse `raw` as JSON, treating anything else as a string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
