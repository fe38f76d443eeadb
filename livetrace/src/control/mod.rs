pub mod routes;

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde_json::json;
use tokio::sync::oneshot;

use crate::agent::Agent;
use crate::config::ControlSection;

/// Typed failures surfaced to control-plane clients as JSON error bodies.
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(inner: anyhow::Error) -> Self {
        ApiError::Internal(inner)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(inner) => {
                tracing::error!("{:#?}", inner);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "something went wrong".to_owned(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// A running control plane: the bound address plus the handle used to
/// stop it. The server runs on a dedicated thread with its own
/// single-threaded runtime, fully apart from the hit path.
pub struct ControlHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ControlHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind and serve the control API in the background. Binding happens
/// here, synchronously, so the caller learns the final port (port 0
/// requests an ephemeral one).
pub fn spawn(agent: Arc<Agent>, config: &ControlSection) -> Result<ControlHandle> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .with_context(|| format!("unable to bind control api on {}:{}", config.host, config.port))?;
    listener
        .set_nonblocking(true)
        .context("unable to configure control api listener")?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let router = routes::router(agent);

    let thread = std::thread::Builder::new()
        .name("livetrace-control".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    tracing::error!(%err, "unable to start control api runtime");
                    return;
                }
            };

            let serve = async move {
                let server = match axum::Server::from_tcp(listener) {
                    Ok(builder) => builder,
                    Err(err) => {
                        tracing::error!(%err, "unable to start control api server");
                        return;
                    }
                };
                let result = server
                    .serve(router.into_make_service())
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
                if let Err(err) = result {
                    tracing::error!(%err, "control api server exited with error");
                }
            };
            runtime.block_on(serve);
        })
        .context("unable to spawn control api thread")?;

    tracing::info!(%addr, "control api listening");
    Ok(ControlHandle {
        addr,
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}
