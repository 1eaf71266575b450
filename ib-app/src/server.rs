//! IdeaBot HTTP server and one-shot commands.

use crate::assistant::IssueAssistant;
use crate::config::IdeaBotConfig;
use crate::conversation::InMemoryConversationStore;
use crate::routes;
use crate::routes::slack::SlackWebhookState;
use anyhow::Result;
use axum::Router;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use ib_channels::{ChannelAdapter, OutboundMessage, SlackAdapter};
use ib_llm::LlmClient;
use ib_tools::{GithubIssueClient, GithubRepo};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

// Upper bound on waiting for spawned DM turns at shutdown: two model calls,
// one issue call and one Slack post.
const TURN_DRAIN_TIMEOUT: Duration = Duration::from_secs(210);

/// Process-wide facts reported by the health route.
pub struct BotState {
    pub started_at: Instant,
    pub conversations: Arc<InMemoryConversationStore>,
    pub signing_secret_configured: bool,
    pub model: String,
    pub github_repo: String,
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = IdeaBotConfig::load(config_path).await?;
    tracing::info!(
        model = %cfg.llm.model,
        max_tokens = cfg.llm.max_tokens,
        github_repo = %format!("{}/{}", cfg.github.owner, cfg.github.repo),
        locale = ?cfg.locale,
        bind_addr = %cfg.server.bind_addr,
        slack_signing_secret_configured = cfg.signing_secret().is_some(),
        "config ok"
    );
    if cfg.signing_secret().is_none() {
        tracing::warn!("SLACK_SIGNING_SECRET is not set; the webhook will answer 500");
    }

    let slack = slack_adapter(&cfg)?;
    let bot_user_id = slack.auth_test().await?;
    tracing::info!(bot_user_id = %bot_user_id, "slack token ok");
    Ok(())
}

pub async fn send_one_shot(config_path: Option<PathBuf>, channel: &str, message: &str) -> Result<()> {
    let cfg = IdeaBotConfig::load(config_path).await?;
    let slack = slack_adapter(&cfg)?;
    slack.send(channel, OutboundMessage::text(message)).await?;
    tracing::info!(channel, "one-shot message sent");
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = IdeaBotConfig::load(config_path).await?;
    let started_at = Instant::now();
    let addr: SocketAddr = cfg
        .server
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", cfg.server.bind_addr))?;
    tracing::info!(
        bind_addr = %addr,
        model = %cfg.llm.model,
        github_repo = %format!("{}/{}", cfg.github.owner, cfg.github.repo),
        locale = ?cfg.locale,
        conversation_ttl_minutes = cfg.conversation.ttl_minutes,
        conversation_max_messages = cfg.conversation.max_messages,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        max_concurrent_requests = cfg.server.max_concurrent_requests,
        "ideabot starting"
    );
    if cfg.signing_secret().is_none() {
        tracing::warn!("SLACK_SIGNING_SECRET is not set; the webhook will answer 500");
    }

    let listener = preflight_bind_listener(addr).await?;

    let llm = match cfg.llm.api_base.as_deref() {
        Some(api_base) => LlmClient::with_api_base(&cfg.llm.api_key, &cfg.llm.model, api_base)?,
        None => LlmClient::new(&cfg.llm.api_key, &cfg.llm.model)?,
    }
    .with_max_tokens(cfg.llm.max_tokens);

    let repo = GithubRepo::new(&cfg.github.owner, &cfg.github.repo)?;
    let issues = match cfg.github.api_base.as_deref() {
        Some(api_base) => GithubIssueClient::with_api_base(&cfg.github.token, repo, api_base)?,
        None => GithubIssueClient::new(&cfg.github.token, repo)?,
    };
    let github_repo = format!("{}/{}", issues.repo().owner, issues.repo().name);

    let conversations = Arc::new(InMemoryConversationStore::new(
        cfg.conversation.ttl(),
        cfg.conversation.max_messages,
    ));
    let assistant = Arc::new(IssueAssistant::new(
        Arc::new(llm),
        Arc::new(issues),
        conversations.clone(),
        cfg.locale,
    ));
    let sender: Arc<dyn ChannelAdapter> = Arc::new(slack_adapter(&cfg)?);

    let bot_state = Arc::new(BotState {
        started_at,
        conversations: conversations.clone(),
        signing_secret_configured: cfg.signing_secret().is_some(),
        model: cfg.llm.model.clone(),
        github_repo,
    });
    let turns = TaskTracker::new();
    let webhook_state = Arc::new(SlackWebhookState {
        assistant,
        sender,
        signing_secret: cfg.signing_secret().map(ToOwned::to_owned),
        body_read_timeout: cfg.server.body_read_timeout(),
        turns: turns.clone(),
    });

    let shutdown = CancellationToken::new();
    let sweeper = spawn_conversation_sweeper(
        conversations,
        cfg.conversation.sweep_interval(),
        shutdown.child_token(),
    );

    let app = build_app(&cfg, bot_state, webhook_state);

    tracing::info!(%addr, "ideabot serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");

    turns.close();
    if !turns.is_empty() {
        tracing::info!(in_flight = turns.len(), "waiting for in-flight turns");
    }
    match tokio::time::timeout(TURN_DRAIN_TIMEOUT, turns.wait()).await {
        Ok(()) => tracing::info!("in-flight turns drained"),
        Err(_) => tracing::warn!(
            in_flight = turns.len(),
            "in-flight turns still running at shutdown; abandoning them"
        ),
    }

    shutdown.cancel();
    match sweeper.await {
        Ok(()) => tracing::info!("conversation sweeper shutdown completed"),
        Err(e) => tracing::error!(error = %e, "conversation sweeper join failed during shutdown"),
    }

    Ok(())
}

fn slack_adapter(cfg: &IdeaBotConfig) -> Result<SlackAdapter> {
    match cfg.slack.api_base.as_deref() {
        Some(api_base) => SlackAdapter::with_api_base(&cfg.slack.bot_token, api_base),
        None => SlackAdapter::new(&cfg.slack.bot_token),
    }
}

fn build_app(
    cfg: &IdeaBotConfig,
    bot_state: Arc<BotState>,
    webhook_state: Arc<SlackWebhookState>,
) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    routes::router(bot_state, webhook_state)
        .layer(GlobalConcurrencyLimitLayer::new(
            cfg.server.max_concurrent_requests,
        ))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Periodically drops idle conversations so memory stays bounded by active users.
fn spawn_conversation_sweeper(
    conversations: Arc<InMemoryConversationStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = conversations.purge_expired();
                    if purged > 0 {
                        tracing::info!(
                            purged,
                            remaining = conversations.len(),
                            "expired conversations purged"
                        );
                    }
                }
            }
        }
        tracing::debug!("conversation sweeper stopped");
    })
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => {}
        }
    }
    shutdown.cancel();
}
