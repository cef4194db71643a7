//! scene-bridge: serve a scene engine over JSON-RPC.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scene_bridge::server::{http, stdio};
use scene_bridge::{Bridge, BridgeConfig, Transport};

/// Task bridge between JSON-RPC clients and a single-threaded scene
#[derive(Parser, Debug)]
#[command(name = "scene-bridge")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./scene-bridge.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to bind the HTTP transport to
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP transport
    #[arg(long)]
    port: Option<u16>,

    /// Transport to serve
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    /// Directory for previews and exported models
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Executor tick period in milliseconds
    #[arg(long)]
    tick_interval_ms: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(tick) = self.tick_interval_ms {
            config.tick_interval_ms = tick;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = BridgeConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);
    config.validate().context("validating configuration")?;

    let bridge = Bridge::start(config.clone()).context("starting bridge")?;
    let handler = bridge.handler();
    let shutdown = CancellationToken::new();
    let executor_exited = bridge.executor_exited();

    let mut server = {
        let shutdown = shutdown.clone();
        let config = config.clone();
        tokio::spawn(async move {
            match config.transport {
                Transport::Http => http::serve(handler, &config.bind_address(), shutdown).await,
                Transport::Stdio => stdio::serve_stdio(handler, shutdown).await,
            }
        })
    };
    info!(transport = %config.transport, "serving");

    let fatal = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
            false
        },
        _ = executor_exited.cancelled() => {
            error!("executor thread is gone; exiting");
            true
        },
        finished = &mut server => {
            // stdio ends on EOF; a failed bind ends here too
            finished.context("server task panicked")?.context("server failed")?;
            false
        },
    };

    shutdown.cancel();
    if !server.is_finished() {
        server.await.context("server task panicked")?.context("server failed")?;
    }
    bridge.shutdown();

    if fatal {
        anyhow::bail!("executor thread exited unexpectedly");
    }
    Ok(())
}

/// Log to stderr so stdout stays clean for the stdio transport.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
