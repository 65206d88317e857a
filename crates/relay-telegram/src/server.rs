//! Webhook endpoint (axum).
//!
//! Updates are acknowledged as soon as they parse; relaying happens on a
//! spawned task bounded by the configured handler deadline.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json,
};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use relay_core::{config::Config, router::Router, update::Update};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct ServerState {
    pub cfg: Arc<Config>,
    pub router: Arc<Router>,
}

pub fn webhook_router(state: ServerState) -> axum::Router {
    axum::Router::new()
        .route(&state.cfg.webhook_path, post(receive_update))
        .route("/healthz", get(health_check))
        .fallback(not_found)
        .with_state(state)
}

pub async fn serve(cfg: Arc<Config>, router: Arc<Router>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(cfg.listen_addr).await?;
    info!(
        addr = %cfg.listen_addr,
        path = %cfg.webhook_path,
        "webhook server listening"
    );
    axum::serve(listener, webhook_router(ServerState { cfg, router })).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn receive_update(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<&'static str, (StatusCode, &'static str)> {
    if let Some(expected) = &state.cfg.webhook_secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            warn!(update_id = update.update_id, "rejecting update with bad secret token");
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }

    debug!(update_id = update.update_id, "update accepted");
    tokio::spawn(dispatch(
        state.router.clone(),
        update,
        state.cfg.handler_deadline,
    ));
    Ok("OK")
}

/// Relay one update. Failures are logged and the update is dropped; nothing is
/// reported back to the sender or the staff group.
async fn dispatch(router: Arc<Router>, update: Update, deadline: Duration) {
    let update_id = update.update_id;
    match tokio::time::timeout(deadline, router.handle_update(update)).await {
        Ok(Ok(())) => debug!(update_id, "update handled"),
        Ok(Err(e)) => error!(update_id, error = %e, "dropping update"),
        Err(_) => error!(
            update_id,
            deadline_ms = deadline.as_millis() as u64,
            "update exceeded handler deadline; dropping"
        ),
    }
}
