//! Rift Mock Server CLI
//!
//! Usage:
//!   rift-mock-server --port 8080 --expectations expectations.yaml
//!   rift-mock-server --crud

use anyhow::Context;
use clap::Parser;
use rift_mock_server::crud::{JsonAttributeExtractor, JsonListComposer};
use rift_mock_server::{ExpectationFile, MockServer, MockServerConfig};
use std::sync::Arc;
use tracing::info;

/// Rift Mock Server - programmable HTTP/WebSocket mocks for tests
#[derive(Parser, Debug)]
#[command(name = "rift-mock-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides the config file; 0 picks a free port)
    #[arg(short, long, env = "RIFT_MOCK_PORT")]
    port: Option<u16>,

    /// Host to bind (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// YAML/JSON file of expectations to register at startup
    #[arg(short, long, conflicts_with = "crud")]
    expectations: Option<String>,

    /// Serve an in-memory CRUD store instead of expectations
    #[arg(long)]
    crud: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MockServerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => MockServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(host) = args.host {
        config.listen.host = host;
    }
    config.validate()?;

    let server = if args.crud {
        MockServer::crud(
            config,
            Arc::new(JsonAttributeExtractor),
            Arc::new(JsonListComposer),
        )
    } else {
        MockServer::with_config(config)
    };

    if let (Some(path), Some(registry)) = (&args.expectations, server.registry()) {
        let file = ExpectationFile::from_file(path)
            .with_context(|| format!("Failed to load expectations from {path}"))?;
        let count = file.register(registry)?;
        info!("Registered {} expectation(s)", count);
    }

    server.start().await?;
    info!(
        "Rift mock server ready at {} ({} mode)",
        server.url("/"),
        if args.crud { "crud" } else { "expectation" }
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");
    server.shutdown().await;
    Ok(())
}
