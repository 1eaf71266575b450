pub mod health;
pub mod slack;

use crate::server::BotState;
use axum::{Extension, Router};
use std::sync::Arc;

pub fn router(bot_state: Arc<BotState>, webhook_state: Arc<slack::SlackWebhookState>) -> Router {
    Router::new()
        .merge(health::router().layer(Extension(bot_state)))
        .merge(slack::router(webhook_state))
}
