use crate::anthropic::{ANTHROPIC_API_BASE, AnthropicClient, AnthropicRequest};
use crate::error::{LlmError, Result};
use crate::types::{CompletionResponse, Message, ToolDefinition};
use async_trait::async_trait;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// One non-streaming completion against a hosted model.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        tools: &[ToolDefinition],
        messages: &[Message],
    ) -> Result<CompletionResponse>;
}

#[derive(Clone)]
pub struct LlmClient {
    model: String,
    max_tokens: u32,
    inner: AnthropicClient,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        Self::with_api_base(api_key, model, ANTHROPIC_API_BASE)
    }

    pub fn with_api_base(api_key: &str, model: &str, api_base: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::InvalidInput("api key is required".to_string()));
        }
        let model = model.trim();
        if model.is_empty() {
            return Err(LlmError::InvalidInput("model is required".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self {
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            inner: AnthropicClient::new(http, api_base, api_key),
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    #[tracing::instrument(level = "info", skip_all, fields(messages = messages.len()))]
    async fn complete(
        &self,
        system: &str,
        tools: &[ToolDefinition],
        messages: &[Message],
    ) -> Result<CompletionResponse> {
        let req = AnthropicRequest::new(&self.model, self.max_tokens, system, messages, tools)?;
        self.inner.messages(&req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, StopReason};
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn new_rejects_blank_credentials() {
        assert!(LlmClient::new("  ", DEFAULT_MODEL).is_err());
        assert!(LlmClient::new("sk-ant-test", "").is_err());
    }

    #[test]
    fn max_tokens_is_clamped_to_at_least_one() {
        let client = LlmClient::new("sk-ant-test", DEFAULT_MODEL)
            .expect("client")
            .with_max_tokens(0);
        assert_eq!(client.max_tokens(), 1);
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn complete_posts_messages_request_and_parses_tool_use() {
        let server = MockServer::start();
        let messages_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "sk-ant-test")
                .header("anthropic-version", "2023-06-01")
                .body_includes("\"model\":\"claude-test\"")
                .body_includes("\"max_tokens\":1024")
                .body_includes("create_github_issue");
            then.status(200).json_body(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "stop_reason": "tool_use",
                "content": [
                    { "type": "text", "text": "Filing it." },
                    {
                        "type": "tool_use",
                        "id": "toolu_1",
                        "name": "create_github_issue",
                        "input": { "title": "T", "body": "B" }
                    }
                ],
                "usage": { "input_tokens": 12, "output_tokens": 7 }
            }));
        });

        let client = LlmClient::with_api_base("sk-ant-test", "claude-test", &server.base_url())
            .expect("client");
        let tools = vec![ToolDefinition {
            name: "create_github_issue".to_string(),
            description: "file".to_string(),
            input_schema: json!({ "type": "object" }),
        }];
        let response = client
            .complete("system", &tools, &[Message::user_text("please file")])
            .await
            .expect("completion");

        messages_mock.assert();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.text(), "Filing it.");
        assert!(matches!(
            response.content.get(1),
            Some(ContentBlock::ToolUse { name, .. }) if name == "create_github_issue"
        ));
    }

    #[tokio::test]
    async fn complete_surfaces_non_success_status_as_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(529)
                .json_body(json!({ "type": "error", "error": { "type": "overloaded_error" } }));
        });

        let client = LlmClient::with_api_base("sk-ant-test", "claude-test", &server.base_url())
            .expect("client");
        let err = client
            .complete("", &[], &[Message::user_text("hi")])
            .await
            .expect_err("529 should fail");
        assert!(matches!(err, LlmError::Http(_)));
        assert!(err.to_string().contains("overloaded_error"));
    }
}
