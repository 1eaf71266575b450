use crate::server::BotState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/health", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<BotState>>) -> Json<serde_json::Value> {
    let signing_secret_configured = state.signing_secret_configured;

    Json(serde_json::json!({
        "status": if signing_secret_configured { "ok" } else { "degraded" },
        "ready": signing_secret_configured,
        "checked_at": Utc::now(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "checks": {
            "slack_signing_secret": signing_secret_configured,
            "model": state.model,
            "github_repo": state.github_repo,
            "active_conversations": state.conversations.len(),
        }
    }))
}
