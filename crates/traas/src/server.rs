use crate::sink::TraceSink;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use traas_core::{defaults, Config, Probe, TraceTable};

/// Shared state of the session layer.
///
/// The session layer is the only writer of trace-table membership; the
/// capture engine mutates existing entries but never installs or removes
/// them.
#[derive(Clone, Debug)]
pub struct AppState {
    table: Arc<TraceTable>,
    probe: Arc<Probe>,
    config: Arc<Config>,
    sink: TraceSink,
    probe_window: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(
        table: Arc<TraceTable>,
        probe: Arc<Probe>,
        config: Arc<Config>,
        sink: TraceSink,
    ) -> Self {
        Self {
            table,
            probe,
            config,
            sink,
            probe_window: defaults::DEFAULT_PROBE_WINDOW,
        }
    }
}

/// Build the HTTP surface: the four trace endpoints plus the static demo
/// files, all under the configured prefix.
pub fn router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    Router::new()
        .route(&config.endpoint("start"), get(start_handler))
        .route(&config.endpoint("probe"), get(probe_handler))
        .route(&config.endpoint("done"), get(done_handler))
        .route(&config.endpoint("error"), get(error_handler))
        .nest_service(&config.endpoint("client"), ServeDir::new(&config.root))
        .with_state(state)
}

/// Install a trace for the client and send it on to `probe`.
///
/// The trace must be in the table before the redirect goes out, or the
/// capture thread would miss the client's follow-up request.
async fn start_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(client) = client_ip(&state, &headers, peer) else {
        return found(&state.config.endpoint("error"));
    };
    info!(%client, "beginning trace");
    state.table.begin(client);
    found(&state.config.endpoint("probe"))
}

/// Hold the client's socket open while the probe volley runs.
///
/// The client never sees this handler's response: the spoofed 302 arrives on
/// the wire first and the client follows it, closing this socket, which drops
/// this handler mid-wait. Still being here after the window means the
/// injection failed, so the trace is torn down.
async fn probe_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(client) = client_ip(&state, &headers, peer) else {
        return found(&state.config.endpoint("error"));
    };
    tokio::time::sleep(state.probe_window).await;
    state.table.end(client);
    found(&state.config.endpoint("error"))
}

/// Finalize the trace and return it as JSON.
async fn done_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(client) = client_ip(&state, &headers, peer) else {
        return found(&state.config.endpoint("error"));
    };
    if state.table.get(client).is_none() {
        return StatusCode::OK.into_response();
    }
    // Late ICMPs may still be in flight; the capture thread keeps recording
    // hops until the trace leaves the table.
    tokio::time::sleep(state.probe.settling_window()).await;
    let Some(trace) = state.table.get(client) else {
        return StatusCode::OK.into_response();
    };
    state.table.end(client);
    let record = trace.finalize();
    match serde_json::to_string(&record) {
        Ok(json) => {
            info!(%client, recorded = record.recorded, "trace complete");
            state.sink.append(&json);
            (
                [(header::CONTENT_TYPE, "application/json")],
                json,
            )
                .into_response()
        }
        Err(err) => {
            warn!(%client, %err, "could not serialize trace");
            StatusCode::OK.into_response()
        }
    }
}

async fn error_handler() -> &'static str {
    "\"Error.\""
}

/// Resolve the client IPv4 address from the socket peer, or from the
/// configured forwarded-for header when deployed behind a reverse proxy.
fn client_ip(state: &AppState, headers: &HeaderMap, peer: SocketAddr) -> Option<Ipv4Addr> {
    let mut ip = peer.ip();
    if !state.config.ip_header.is_empty() {
        if let Some(forwarded) = headers
            .get(&state.config.ip_header)
            .and_then(|value| value.to_str().ok())
        {
            ip = forwarded.trim().parse().ok()?;
        }
    }
    match ip {
        IpAddr::V4(client) => Some(client),
        IpAddr::V6(_) => None,
    }
}

/// A genuine `302 Found`, matching the status the spoofed responses carry.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}
