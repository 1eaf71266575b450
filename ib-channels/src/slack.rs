use crate::traits::ChannelAdapter;
use crate::types::OutboundMessage;
use anyhow::{Result, anyhow};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Clone)]
pub struct SlackAdapter {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl SlackAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        Self::with_api_base(bot_token, SLACK_API_BASE)
    }

    pub fn with_api_base(bot_token: &str, api_base: &str) -> Result<Self> {
        let token = bot_token.trim();
        if token.is_empty() {
            return Err(anyhow!("slack bot token is required"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            bot_token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/{method}", self.api_base))?)
    }

    /// Calls `auth.test` and returns the bot user id the token belongs to.
    pub async fn auth_test(&self) -> Result<String> {
        let url = self.api_url("auth.test")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bot_token)
            .send()
            .await?;
        let status = response.status();
        let body: SlackAuthTestResponse = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(anyhow!(
                "slack auth.test failed: status={} error={}",
                status,
                body.error.unwrap_or_else(|| "unknown".to_string())
            ));
        }
        body.user_id
            .ok_or_else(|| anyhow!("slack auth.test response is missing user_id"))
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for SlackAdapter {
    fn channel_id(&self) -> &str {
        "slack"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(channel = %recipient_id))]
    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()> {
        let channel_id = recipient_id.trim();
        if channel_id.is_empty() {
            return Err(anyhow!("recipient_id (slack channel id) is required"));
        }
        let text = message.content.trim();
        if text.is_empty() {
            return Err(anyhow!("message content is empty"));
        }

        let payload = serde_json::json!({
            "channel": channel_id,
            "text": text,
        });

        let url = self.api_url("chat.postMessage")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body: SlackPostMessageResponse = response.json().await?;
        if !status.is_success() || !body.ok {
            return Err(anyhow!(
                "slack chat.postMessage failed: status={} error={}",
                status,
                body.error.unwrap_or_else(|| "unknown".to_string())
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SlackPostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn new_rejects_blank_token() {
        assert!(SlackAdapter::new("  ").is_err());
    }

    #[tokio::test]
    async fn send_posts_channel_and_text_with_bearer_token() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .json_body(json!({ "channel": "D123", "text": "hello there" }));
            then.status(200).json_body(json!({ "ok": true }));
        });

        let adapter = SlackAdapter::with_api_base("xoxb-test", &server.base_url()).expect("adapter");
        adapter
            .send("D123", OutboundMessage::text("  hello there "))
            .await
            .expect("send succeeds");
        post.assert();
    }

    #[tokio::test]
    async fn send_surfaces_slack_error_code() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200)
                .json_body(json!({ "ok": false, "error": "channel_not_found" }));
        });

        let adapter = SlackAdapter::with_api_base("xoxb-test", &server.base_url()).expect("adapter");
        let err = adapter
            .send("D404", OutboundMessage::text("hi"))
            .await
            .expect_err("ok=false should fail");
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn send_rejects_empty_content_without_calling_slack() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200).json_body(json!({ "ok": true }));
        });

        let adapter = SlackAdapter::with_api_base("xoxb-test", &server.base_url()).expect("adapter");
        assert!(adapter.send("D123", OutboundMessage::text("  ")).await.is_err());
        post.assert_calls(0);
    }

    #[tokio::test]
    async fn auth_test_returns_bot_user_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth.test");
            then.status(200)
                .json_body(json!({ "ok": true, "user_id": "UBOT", "team": "acme" }));
        });

        let adapter = SlackAdapter::with_api_base("xoxb-test", &server.base_url()).expect("adapter");
        assert_eq!(adapter.auth_test().await.expect("auth.test"), "UBOT");
    }
}
