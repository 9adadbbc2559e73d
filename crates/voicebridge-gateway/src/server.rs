//! HTTP server exposing the webhook endpoint.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use voicebridge_core::config::GatewaySettings;

use crate::state::GatewayState;

/// Build the router. The same router serves every listen address.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/callback", post(callback_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway on the configured address, plus the alternate address if set.
pub async fn start_gateway(
    state: Arc<GatewayState>,
    settings: &GatewaySettings,
) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", settings.bind, settings.port);

    match &settings.alt_bind {
        Some(alt) => {
            tokio::try_join!(serve_on(app.clone(), &addr), serve_on(app, alt))?;
        }
        None => serve_on(app, &addr).await?,
    }

    Ok(())
}

async fn serve_on(app: Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn callback_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(state.relay.signature_header())
        .and_then(|v| v.to_str().ok());

    debug!(body = %String::from_utf8_lossy(&body), "Request body");

    match state.relay.handle_webhook(&body, signature).await {
        Ok(replies) => {
            debug!(replies, "Webhook handled");
            (StatusCode::OK, "OK")
        }
        Err(e) if e.is_client_error() => {
            warn!(%e, "Webhook rejected");
            (StatusCode::BAD_REQUEST, "Bad Request")
        }
        Err(e) => {
            error!(%e, "Webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
