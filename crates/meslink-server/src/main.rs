//! # meslinkd
//!
//! MES-link harness binary — binds the controller TCP listener and the
//! operator HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use meslink_server::broadcast::BroadcastHub;
use meslink_server::config::ServerConfig;
use meslink_server::controller::{self, ControllerHandle};
use meslink_server::coordinator::Coordinator;
use meslink_server::http::{AppState, build_router};
use meslink_wire::FrameFormat;

/// MES-link protocol harness.
#[derive(Parser, Debug)]
#[command(name = "meslinkd", about = "MES-link protocol harness")]
struct Cli {
    /// Host to bind both listeners on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port for the controller connection.
    #[arg(long, default_value = "50200")]
    tcp_port: u16,

    /// HTTP/WebSocket port for the operator surface.
    #[arg(long, default_value = "5179")]
    http_port: u16,

    /// Number of test channels to model.
    #[arg(long, default_value = "128")]
    channels: u32,

    /// Framing convention: `crlf` or `length-prefixed`.
    #[arg(long, default_value = "crlf")]
    framing: FrameFormat,
}

impl From<&Cli> for ServerConfig {
    fn from(args: &Cli) -> Self {
        Self {
            host: args.host.clone(),
            tcp_port: args.tcp_port,
            http_port: args.http_port,
            channel_count: args.channels,
            frame_format: args.framing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = ServerConfig::from(&args);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("meslink_server=info,meslink_wire=info,meslink_core=info")
        }))
        .init();

    let hub = Arc::new(BroadcastHub::new());
    let handle = ControllerHandle::new();
    let coordinator = Arc::new(Coordinator::new(
        config.channel_count,
        Arc::new(handle.clone()),
        hub.clone(),
    ));

    let tcp_addr = format!("{}:{}", config.host, config.tcp_port);
    let tcp_listener = tokio::net::TcpListener::bind(&tcp_addr)
        .await
        .with_context(|| format!("failed to bind controller listener on {tcp_addr}"))?;
    tracing::info!(
        addr = %tcp_addr,
        framing = %config.frame_format,
        channels = config.channel_count,
        "controller listener started"
    );
    let tcp_task = tokio::spawn(controller::serve(
        tcp_listener,
        handle.clone(),
        coordinator.clone(),
        config.frame_format,
    ));

    let http_addr = format!("{}:{}", config.host, config.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;
    tracing::info!(addr = %http_addr, "operator server started");
    let router = build_router(AppState {
        coordinator,
        hub,
        controller: handle,
    });
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, router).await.ok();
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    tcp_task.abort();
    http_task.abort();
    Ok(())
}
