//! Slack Events API webhook.

use crate::assistant::IssueAssistant;
use crate::commands::handle_command;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use bytes::BytesMut;
use futures_util::StreamExt;
use ib_channels::{
    ChannelAdapter, DirectMessage, OutboundMessage, SlackEnvelope, verify_slack_signature,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

pub const SLACK_EVENTS_PATH: &str = "/api/slack/events";

const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";

// Slack event payloads are a few KiB; anything this large is not from Slack.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub struct SlackWebhookState {
    pub assistant: Arc<IssueAssistant>,
    pub sender: Arc<dyn ChannelAdapter>,
    pub signing_secret: Option<String>,
    pub body_read_timeout: Duration,
    /// In-flight turns. They outlive the HTTP response and are drained on shutdown.
    pub turns: TaskTracker,
}

/// Owned copy of a [`DirectMessage`] for a turn that runs after the response.
#[derive(Debug, Clone)]
struct DirectMessageTurn {
    user_id: String,
    channel: String,
    text: String,
}

impl From<DirectMessage<'_>> for DirectMessageTurn {
    fn from(message: DirectMessage<'_>) -> Self {
        Self {
            user_id: message.user.to_string(),
            channel: message.channel.to_string(),
            text: message.text.to_string(),
        }
    }
}

/// Request body already consumed by an upstream layer.
///
/// The webhook falls back to this when the raw stream yields nothing. A
/// re-serialized `Json` value may not match what Slack signed.
#[derive(Debug, Clone)]
pub enum PreparsedBody {
    Text(String),
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl PreparsedBody {
    fn into_bytes(self) -> Bytes {
        match self {
            Self::Text(text) => Bytes::from(text),
            Self::Bytes(bytes) => bytes,
            Self::Json(value) => Bytes::from(value.to_string()),
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookRejection {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    Configuration(&'static str),
    #[error("{0}")]
    MalformedRequest(String),
    #[error("{0}")]
    Authentication(&'static str),
    #[error("request body too large")]
    PayloadTooLarge,
}

impl WebhookRejection {
    fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: Arc<SlackWebhookState>) -> Router {
    Router::new()
        .route(SLACK_EVENTS_PATH, any(slack_events))
        .with_state(state)
}

#[tracing::instrument(level = "info", skip_all, fields(method = %request.method()))]
async fn slack_events(
    State(state): State<Arc<SlackWebhookState>>,
    request: Request,
) -> Result<Response, WebhookRejection> {
    let (parts, body) = request.into_parts();
    if parts.method != Method::POST {
        return Err(WebhookRejection::MethodNotAllowed);
    }

    if let Some(retry_num) = header_str(&parts.headers, RETRY_NUM_HEADER) {
        tracing::info!(
            retry_num,
            retry_reason = header_str(&parts.headers, RETRY_REASON_HEADER).unwrap_or_default(),
            "ignoring slack retry"
        );
        return Ok(ok_response());
    }

    let Some(signing_secret) = state.signing_secret.as_deref() else {
        tracing::error!("slack signing secret is not configured");
        return Err(WebhookRejection::Configuration(
            "SLACK_SIGNING_SECRET is not set",
        ));
    };

    let mut raw_body = read_raw_body(body, state.body_read_timeout).await?;
    let mut body_source = "stream";
    if raw_body.is_empty() {
        let Some(preparsed) = parts.extensions.get::<PreparsedBody>().cloned() else {
            tracing::warn!("slack webhook request has no body");
            return Err(WebhookRejection::MalformedRequest("No body".to_string()));
        };
        body_source = preparsed.source();
        raw_body = preparsed.into_bytes();
    }
    tracing::debug!(body_source, body_len = raw_body.len(), "slack webhook body read");

    let timestamp = header_str(&parts.headers, TIMESTAMP_HEADER);
    let signature = header_str(&parts.headers, SIGNATURE_HEADER);
    let verified = match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => {
            verify_slack_signature(signing_secret, timestamp, &raw_body, signature)
        }
        _ => false,
    };
    if !verified {
        tracing::warn!(
            has_timestamp = timestamp.is_some(),
            has_signature = signature.is_some(),
            body_source,
            "slack signature verification failed"
        );
        return Err(WebhookRejection::Authentication("Invalid signature"));
    }

    let envelope = SlackEnvelope::from_slice(&raw_body).map_err(|error| {
        tracing::warn!(%error, "invalid slack event payload");
        WebhookRejection::MalformedRequest(format!("invalid slack event payload: {error}"))
    })?;

    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            tracing::info!("answering slack url verification challenge");
            Ok(Json(serde_json::json!({ "challenge": challenge })).into_response())
        }
        SlackEnvelope::EventCallback { event: Some(event) } => {
            if let Some(message) = event.direct_message() {
                let turn = DirectMessageTurn::from(message);
                let turn_state = Arc::clone(&state);
                state.turns.spawn(
                    async move { handle_direct_message(turn_state, turn).await }.in_current_span(),
                );
            } else {
                tracing::debug!(
                    event_type = event.kind.as_deref().unwrap_or_default(),
                    channel_type = event.channel_type.as_deref().unwrap_or_default(),
                    has_bot_id = event.bot_id.is_some(),
                    "ignoring slack event"
                );
            }
            Ok(ok_response())
        }
        SlackEnvelope::EventCallback { event: None } | SlackEnvelope::Other => Ok(ok_response()),
    }
}

/// Runs one turn and delivers the reply. Never fails: Slack has already seen 200.
#[tracing::instrument(
    level = "info",
    skip_all,
    fields(user_id = %turn.user_id, channel = %turn.channel)
)]
async fn handle_direct_message(state: Arc<SlackWebhookState>, turn: DirectMessageTurn) {
    let assistant = state.assistant.as_ref();
    let user_id = turn.user_id.as_str();
    let channel = turn.channel.as_str();

    let outcome = async {
        let reply = match handle_command(
            assistant.conversations(),
            assistant.notices(),
            user_id,
            &turn.text,
        ) {
            Some(reply) => reply,
            None => assistant.reply(user_id, &turn.text).await?,
        };
        state
            .sender
            .send(channel, OutboundMessage::text(reply))
            .await
    }
    .await;

    match outcome {
        Ok(()) => tracing::info!(adapter = state.sender.channel_id(), "reply sent"),
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "failed to answer direct message");
            let apology = OutboundMessage::text(assistant.notices().apology());
            if let Err(error) = state.sender.send(channel, apology).await {
                tracing::error!(error = %format!("{error:#}"), "failed to send apology");
            }
        }
    }
}

/// Reads the body stream until it ends or `limit` elapses.
///
/// On timeout whatever arrived is kept; a stream error yields an empty body.
async fn read_raw_body(body: Body, limit: Duration) -> Result<Bytes, WebhookRejection> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(chunk))) => {
                if buf.len() + chunk.len() > MAX_BODY_BYTES {
                    return Err(WebhookRejection::PayloadTooLarge);
                }
                buf.extend_from_slice(&chunk);
            }
            Ok(Some(Err(error))) => {
                tracing::warn!(%error, "slack webhook body stream failed");
                return Ok(Bytes::new());
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = limit.as_millis() as u64,
                    partial_len = buf.len(),
                    "slack webhook body read timed out"
                );
                break;
            }
        }
    }
    Ok(buf.freeze())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn ok_response() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
}
