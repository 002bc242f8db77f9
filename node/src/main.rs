// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Murmur Gossip Node
//!
//! Entry point for the `murmur-node` binary. Parses CLI arguments,
//! initializes logging, binds the gossiper, registers bootstrap peers,
//! serves the HTTP controller for the UI, and runs until interrupted.

mod cli;
mod controller;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use murmur_protocol::Gossiper;

use cli::MurmurNodeCli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = MurmurNodeCli::parse();
    logging::init_logging("info", &args.log_format);

    let gossiper = Gossiper::new(
        &args.gossip_addr,
        &args.name,
        Duration::from_secs(args.anti_entropy),
        Duration::from_secs(args.rtimer),
    )
    .await
    .with_context(|| format!("failed to start gossiper on {}", args.gossip_addr))?;

    if !args.peers.is_empty() {
        if let Err(error) = gossiper.add_addresses(&args.peers) {
            warn!(%error, "some bootstrap peers were skipped");
        }
    }

    // Controller HTTP plane for the UI.
    let state = controller::AppState::new(gossiper.clone(), args.broadcast);
    let router = controller::create_router(state);

    let ui_addr = format!("127.0.0.1:{}", args.ui_port);
    let listener = tokio::net::TcpListener::bind(&ui_addr)
        .await
        .with_context(|| format!("failed to bind controller on {ui_addr}"))?;
    info!(%ui_addr, "controller listening");

    let controller_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!(error = %err, "controller server failed");
        }
    });

    // The gossiper itself.
    let (ready_tx, ready_rx) = oneshot::channel();
    let runner = gossiper.clone();
    tokio::spawn(async move { runner.run(ready_tx).await });
    ready_rx.await.ok();

    info!(
        addr = %gossiper.address(),
        name = %gossiper.get_identifier(),
        broadcast = args.broadcast,
        "gossiper running"
    );

    signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    gossiper.stop().await;
    controller_task.abort();
    info!("controller stopped");

    Ok(())
}
