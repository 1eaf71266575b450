use crate::error::{LlmError, Result};
use crate::types::{CompletionResponse, Message, ToolDefinition};
use serde::Serialize;

pub(crate) const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub(crate) struct AnthropicClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl AnthropicClient {
    pub(crate) fn new(http: reqwest::Client, api_base: &str, api_key: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %req.model))]
    pub(crate) async fn messages(&self, req: &AnthropicRequest<'_>) -> Result<CompletionResponse> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "anthropic messages status={status} body={body}"
            )));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)?;
        tracing::debug!(
            stop_reason = ?parsed.stop_reason,
            blocks = parsed.content.len(),
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "anthropic messages response parsed"
        );
        Ok(parsed)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) max_tokens: u32,
    #[serde(skip_serializing_if = "is_blank")]
    pub(crate) system: &'a str,
    pub(crate) messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    pub(crate) tools: &'a [ToolDefinition],
}

fn is_blank(system: &&str) -> bool {
    system.trim().is_empty()
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

impl<'a> AnthropicRequest<'a> {
    pub(crate) fn new(
        model: &'a str,
        max_tokens: u32,
        system: &'a str,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> Result<Self> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput(
                "at least one message is required".to_string(),
            ));
        }
        Ok(Self {
            model,
            max_tokens,
            system,
            messages,
            tools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Message};
    use serde_json::json;

    #[test]
    fn request_serializes_system_tools_and_mixed_content() {
        let tools = vec![ToolDefinition {
            name: "create_github_issue".to_string(),
            description: "file an issue".to_string(),
            input_schema: json!({ "type": "object" }),
        }];
        let messages = vec![
            Message::user_text("file it"),
            Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "tu_1".to_string(),
                name: "create_github_issue".to_string(),
                input: json!({ "title": "T", "body": "B" }),
            }]),
            Message::tool_result("tu_1", "Issue #1", false),
        ];
        let req = AnthropicRequest::new("claude-test", 1024, "be brief", &messages, &tools)
            .expect("request");
        let value = serde_json::to_value(&req).expect("serialize");

        assert_eq!(value["model"], "claude-test");
        assert_eq!(value["max_tokens"], 1024);
        assert_eq!(value["system"], "be brief");
        assert_eq!(value["tools"][0]["input_schema"], json!({ "type": "object" }));
        assert_eq!(value["messages"][0]["content"], "file it");
        assert_eq!(value["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(value["messages"][2]["role"], "user");
        assert_eq!(value["messages"][2]["content"][0]["tool_use_id"], "tu_1");
    }

    #[test]
    fn request_without_tools_omits_tools_field() {
        let messages = vec![Message::user_text("hi")];
        let req = AnthropicRequest::new("claude-test", 16, "", &messages, &[]).expect("request");
        let value = serde_json::to_value(&req).expect("serialize");
        assert!(value.get("tools").is_none());
        assert!(value.get("system").is_none());
    }

    #[test]
    fn request_rejects_empty_history() {
        let err = AnthropicRequest::new("claude-test", 16, "", &[], &[])
            .expect_err("empty history should be rejected");
        assert!(err.to_string().contains("at least one message"));
    }
}
