//! HTTP transport: JSON-RPC over `POST /rpc`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::RpcHandler;
use crate::error::Result;
use crate::gateway::Pong;

/// Build the router. `/RPC2` is accepted as an alias of `/rpc`.
pub fn router(handler: Arc<RpcHandler>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rpc", post(rpc))
        .route("/RPC2", post(rpc))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(handler)
}

async fn rpc(State(handler): State<Arc<RpcHandler>>, body: String) -> Response {
    match handler.handle_str(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn health(State(handler): State<Arc<RpcHandler>>) -> Json<Pong> {
    Json(handler.gateway().ping())
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(
    handler: Arc<RpcHandler>,
    addr: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(handler, listener, shutdown).await
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve_on(
    handler: Arc<RpcHandler>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(target: "bridge.http", addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(handler))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!(target: "bridge.http", "stopped");
    Ok(())
}
