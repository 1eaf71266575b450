//! Conversation orchestrator: history + model + issue tool.
//!
//! Each turn makes one completion. When the model asks for the issue tool,
//! the issue is filed and, on success only, a second completion lets the
//! model phrase the confirmation. There is never more than one tool round
//! trip per turn.

use crate::config::Locale;
use crate::conversation::ConversationStore;
use crate::prompt::{Notices, issue_tool_text, system_prompt};
use anyhow::Result;
use ib_llm::{
    CompletionProvider, CompletionResponse, ContentBlock, Message, StopReason, ToolDefinition,
};
use ib_tools::{
    CREATE_ISSUE_TOOL_NAME, IssueRequest, IssueResult, IssueTracker, ToolError,
    create_issue_tool_definition,
};
use std::sync::Arc;
use std::time::Instant;

pub struct IssueAssistant {
    llm: Arc<dyn CompletionProvider>,
    issues: Arc<dyn IssueTracker>,
    conversations: Arc<dyn ConversationStore>,
    system_prompt: &'static str,
    tools: Vec<ToolDefinition>,
    notices: Notices,
}

struct RequestedToolCall {
    id: String,
    name: String,
    input: serde_json::Value,
}

impl IssueAssistant {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        issues: Arc<dyn IssueTracker>,
        conversations: Arc<dyn ConversationStore>,
        locale: Locale,
    ) -> Self {
        Self {
            llm,
            issues,
            conversations,
            system_prompt: system_prompt(locale),
            tools: vec![create_issue_tool_definition(issue_tool_text(locale))],
            notices: Notices::new(locale),
        }
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn conversations(&self) -> &dyn ConversationStore {
        self.conversations.as_ref()
    }

    /// Runs one turn for `user_id` and returns the text to send back.
    ///
    /// Model errors are returned to the caller. Issue-filing errors are not:
    /// they become the failure notice.
    #[tracing::instrument(level = "info", skip_all, fields(user_id = %user_id))]
    pub async fn reply(&self, user_id: &str, text: &str) -> Result<String> {
        let started = Instant::now();
        self.conversations.append(user_id, Message::user_text(text));

        let response = self.complete(user_id).await?;

        let tool_call = match response.stop_reason {
            StopReason::ToolUse => response.first_tool_use().map(|tool| RequestedToolCall {
                id: tool.id.to_string(),
                name: tool.name.to_string(),
                input: tool.input.clone(),
            }),
            _ => None,
        };

        let Some(call) = tool_call else {
            let reply = self.reply_text(&response);
            self.record_assistant(user_id, response.content, &reply);
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                reply_chars = reply.chars().count(),
                "assistant turn complete"
            );
            return Ok(reply);
        };

        self.conversations
            .append(user_id, Message::assistant_blocks(response.content));

        match self.file_issue(&call).await {
            Ok(issue) => {
                let tool_result = self.notices.issue_created(issue.number, &issue.url);
                self.conversations
                    .append(user_id, Message::tool_result(&call.id, &tool_result, false));

                let final_response = self.complete(user_id).await?;
                let final_text = final_response.text();
                let reply = if final_text.is_empty() {
                    tool_result
                } else {
                    final_text
                };
                let blocks = without_tool_use(final_response.content);
                self.record_assistant(user_id, blocks, &reply);
                tracing::info!(
                    issue_number = issue.number,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "assistant turn complete with issue"
                );
                Ok(reply)
            }
            Err(error) => {
                let message = error.to_string();
                tracing::warn!(tool_call_id = %call.id, error = %message, "issue filing failed");
                self.conversations.append(
                    user_id,
                    Message::tool_result(&call.id, format!("Error: {message}"), true),
                );
                Ok(self.notices.issue_failed(&message))
            }
        }
    }

    async fn complete(&self, user_id: &str) -> Result<CompletionResponse> {
        let history = self.conversations.history(user_id);
        let response = self
            .llm
            .complete(self.system_prompt, &self.tools, &history)
            .await?;
        tracing::debug!(
            history_len = history.len(),
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "llm completion received"
        );
        Ok(response)
    }

    async fn file_issue(&self, call: &RequestedToolCall) -> ib_tools::Result<IssueResult> {
        if call.name != CREATE_ISSUE_TOOL_NAME {
            return Err(ToolError::InvalidArguments(format!(
                "unknown tool: {}",
                call.name
            )));
        }
        let request = IssueRequest::from_tool_input(&call.input)?;
        tracing::info!(
            tool_call_id = %call.id,
            title = %request.title,
            labels = ?request.labels,
            "filing issue"
        );
        self.issues.create_issue(&request).await
    }

    fn reply_text(&self, response: &CompletionResponse) -> String {
        let text = response.text();
        if text.is_empty() {
            self.notices.empty_response().to_string()
        } else {
            text
        }
    }

    // The API rejects assistant turns with no content, so an empty reply is
    // stored as the text actually sent.
    fn record_assistant(&self, user_id: &str, blocks: Vec<ContentBlock>, reply: &str) {
        let blocks = if blocks.is_empty() {
            vec![ContentBlock::Text {
                text: reply.to_string(),
            }]
        } else {
            blocks
        };
        self.conversations
            .append(user_id, Message::assistant_blocks(blocks));
    }
}

// A tool_use left in history without a matching tool_result makes the next
// request invalid.
fn without_tool_use(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    blocks
        .into_iter()
        .filter(|block| !matches!(block, ContentBlock::ToolUse { .. }))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::{FakeTracker, ScriptedLlm};
    use super::*;
    use crate::conversation::InMemoryConversationStore;
    use ib_llm::{MessageContent, Role, Usage};
    use serde_json::json;

    struct Harness {
        llm: Arc<ScriptedLlm>,
        tracker: Arc<FakeTracker>,
        store: Arc<InMemoryConversationStore>,
        assistant: IssueAssistant,
    }

    fn harness(
        responses: Vec<ib_llm::Result<CompletionResponse>>,
        tracker: FakeTracker,
    ) -> Harness {
        let llm = Arc::new(ScriptedLlm::new(responses));
        let tracker = Arc::new(tracker);
        let store = Arc::new(InMemoryConversationStore::default());
        let assistant = IssueAssistant::new(llm.clone(), tracker.clone(), store.clone(), Locale::Ja);
        Harness {
            llm,
            tracker,
            store,
            assistant,
        }
    }

    fn text_response(parts: &[&str]) -> CompletionResponse {
        CompletionResponse {
            content: parts
                .iter()
                .map(|text| ContentBlock::Text {
                    text: text.to_string(),
                })
                .collect(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    fn tool_response(input: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            content: vec![
                ContentBlock::Text {
                    text: "起票します".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_01".to_string(),
                    name: CREATE_ISSUE_TOOL_NAME.to_string(),
                    input,
                },
            ],
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }

    fn tool_result_of(message: &Message) -> (&str, &str, Option<bool>) {
        assert_eq!(message.role, Role::User);
        match &message.content {
            MessageContent::Blocks(blocks) => match blocks.as_slice() {
                [
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    },
                ] => (tool_use_id.as_str(), content.as_str(), *is_error),
                other => panic!("expected a single tool_result block, got {other:?}"),
            },
            MessageContent::Text(text) => panic!("expected blocks, got text {text:?}"),
        }
    }

    #[tokio::test]
    async fn plain_reply_concatenates_text_and_records_history() {
        let h = harness(
            vec![Ok(text_response(&["どんな", "アイデアですか？"]))],
            FakeTracker::succeeding(1, "unused"),
        );

        let reply = h.assistant.reply("U1", "アイデアがある").await.expect("reply");

        assert_eq!(reply, "どんなアイデアですか？");
        let calls = h.llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, system_prompt(Locale::Ja));
        assert_eq!(
            calls[0].tools,
            vec![create_issue_tool_definition(&ib_tools::IssueToolText::JAPANESE)]
        );
        assert_eq!(
            calls[0].tools[0].input_schema["properties"]["title"]["description"],
            "Issue のタイトル"
        );
        assert_eq!(calls[0].messages, vec![Message::user_text("アイデアがある")]);

        let history = h.store.history("U1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(h.tracker.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_model_reply_uses_fallback_notice() {
        let h = harness(
            vec![Ok(text_response(&[]))],
            FakeTracker::succeeding(1, "unused"),
        );

        let reply = h.assistant.reply("U1", "hi").await.expect("reply");

        assert_eq!(reply, "（応答を生成できませんでした）");
        let history = h.store.history("U1");
        assert_eq!(
            history[1],
            Message::assistant_blocks(vec![ContentBlock::Text {
                text: "（応答を生成できませんでした）".to_string(),
            }])
        );
    }

    #[tokio::test]
    async fn tool_use_stop_without_tool_block_is_treated_as_plain() {
        let mut response = text_response(&["考え中"]);
        response.stop_reason = StopReason::ToolUse;
        let h = harness(vec![Ok(response)], FakeTracker::succeeding(1, "unused"));

        let reply = h.assistant.reply("U1", "起票して").await.expect("reply");

        assert_eq!(reply, "考え中");
        assert!(h.tracker.requests().is_empty());
        assert_eq!(h.llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn tool_use_files_issue_and_makes_second_completion() {
        let url = "https://github.com/acme/ideas/issues/42";
        let h = harness(
            vec![
                Ok(tool_response(json!({
                    "title": "ダークモード対応",
                    "body": "## 概要\nダークモードが欲しい"
                }))),
                Ok(text_response(&["Issue #42 を作成しました！"])),
            ],
            FakeTracker::succeeding(42, url),
        );

        let reply = h.assistant.reply("U1", "起票して").await.expect("reply");

        assert_eq!(reply, "Issue #42 を作成しました！");
        assert_eq!(
            h.tracker.requests(),
            vec![IssueRequest {
                title: "ダークモード対応".to_string(),
                body: "## 概要\nダークモードが欲しい".to_string(),
                labels: None,
            }]
        );

        let calls = h.llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].system, calls[0].system);
        assert_eq!(calls[1].tools, calls[0].tools);
        let second = &calls[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        let (tool_use_id, content, is_error) = tool_result_of(&second[2]);
        assert_eq!(tool_use_id, "toolu_01");
        assert_eq!(content, format!("Issue #42 を作成しました: {url}"));
        assert_eq!(is_error, None);

        assert_eq!(h.store.history("U1").len(), 4);
    }

    #[tokio::test]
    async fn empty_second_completion_falls_back_to_tool_result_text() {
        let url = "https://github.com/acme/ideas/issues/7";
        let h = harness(
            vec![
                Ok(tool_response(json!({ "title": "T", "body": "B", "labels": ["idea"] }))),
                Ok(text_response(&[])),
            ],
            FakeTracker::succeeding(7, url),
        );

        let reply = h.assistant.reply("U1", "Issueにして").await.expect("reply");

        assert_eq!(reply, format!("Issue #7 を作成しました: {url}"));
        assert_eq!(
            h.tracker.requests()[0].labels,
            Some(vec!["idea".to_string()])
        );
    }

    #[tokio::test]
    async fn gateway_failure_returns_notice_without_second_completion() {
        let h = harness(
            vec![Ok(tool_response(json!({ "title": "T", "body": "B" })))],
            FakeTracker::failing("rate limit"),
        );

        let reply = h.assistant.reply("U1", "起票して").await.expect("reply");

        assert_eq!(reply, "Issue の作成に失敗しました: rate limit");
        assert_eq!(h.llm.calls().len(), 1);
        let history = h.store.history("U1");
        assert_eq!(history.len(), 3);
        let (tool_use_id, content, is_error) = tool_result_of(&history[2]);
        assert_eq!(tool_use_id, "toolu_01");
        assert_eq!(content, "Error: rate limit");
        assert_eq!(is_error, Some(true));
    }

    #[tokio::test]
    async fn invalid_tool_input_is_reported_like_a_gateway_failure() {
        let h = harness(
            vec![Ok(tool_response(json!({ "title": "T" })))],
            FakeTracker::succeeding(1, "unused"),
        );

        let reply = h.assistant.reply("U1", "起票して").await.expect("reply");

        assert!(reply.starts_with("Issue の作成に失敗しました: "));
        assert!(reply.contains("missing key: body"));
        assert!(h.tracker.requests().is_empty());
        assert_eq!(h.llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn model_error_propagates_and_keeps_user_message() {
        let h = harness(
            vec![Err(ib_llm::LlmError::Http("anthropic messages status=529".to_string()))],
            FakeTracker::succeeding(1, "unused"),
        );

        let err = h
            .assistant
            .reply("U1", "hello")
            .await
            .expect_err("model error propagates");

        assert!(err.to_string().contains("529"));
        assert_eq!(h.store.history("U1"), vec![Message::user_text("hello")]);
    }

    #[tokio::test]
    async fn second_turn_sends_prior_history() {
        let h = harness(
            vec![
                Ok(text_response(&["詳しく教えてください"])),
                Ok(text_response(&["了解です"])),
            ],
            FakeTracker::succeeding(1, "unused"),
        );

        h.assistant.reply("U1", "first").await.expect("first reply");
        h.assistant.reply("U1", "second").await.expect("second reply");

        let calls = h.llm.calls();
        assert_eq!(calls[1].messages.len(), 3);
        assert_eq!(calls[1].messages[0], Message::user_text("first"));
        assert_eq!(calls[1].messages[2], Message::user_text("second"));
    }
}
