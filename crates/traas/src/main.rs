#![forbid(unsafe_code)]

use clap::Parser;
use cli::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;
use traas_core::{link, CaptureEngine, Config, Injector, LinkHeader, Probe, TraceTable};

mod cli;
mod server;
mod sink;

use sink::TraceSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = cli::load(&args)?;
    info!(?config, "using config");
    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let src = link::interface_ipv4(&config.device)?;
    info!(source = %src, device = %config.device, "capture source");

    let gateway = link::parse_mac(&config.dst)?;
    let local = link::interface_mac(&config.device)?;
    let egress = link::open_egress(&config.device)?;
    let injector = Arc::new(Injector::device(egress, LinkHeader::new(gateway, local)));

    let probe = Arc::new(Probe::default());
    let table = Arc::new(TraceTable::new());
    let ingress = link::open_ingress(&config.device, src, config.listen_port)?;
    let engine = Arc::new(CaptureEngine::new(
        Arc::clone(&table),
        injector,
        Arc::clone(&probe),
        &config.path,
        Handle::current(),
    ));
    let _capture = engine.spawn(ingress)?;

    let sink = TraceSink::open(&config.trace_file)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.serve_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "serving");
    let app = server::router(server::AppState::new(table, probe, Arc::new(config), sink));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
