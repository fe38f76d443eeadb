use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use livetrace_sink::{router, SinkState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("LIVETRACE_SINK_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port = std::env::var("LIVETRACE_SINK_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(4317);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid sink listen address")?;

    let state = Arc::new(SinkState::new());
    tracing::info!(%addr, "event sink listening");

    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await
        .context("event sink server failed")?;

    Ok(())
}
