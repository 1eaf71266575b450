use crate::args::{optional_string_array, require_non_empty_string};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const CREATE_ISSUE_TOOL_NAME: &str = "create_github_issue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl IssueRequest {
    /// Reads `title`, `body`, and optional `labels` from a tool-use input payload.
    pub fn from_tool_input(input: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            title: require_non_empty_string(input, "title")?,
            body: require_non_empty_string(input, "body")?,
            labels: optional_string_array(input, "labels")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResult {
    pub number: u64,
    pub url: String,
}

/// Files issues in an external tracker. Implementations do not retry.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, request: &IssueRequest) -> Result<IssueResult>;
}

/// Model-facing wording of the issue tool, in the conversation's language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueToolText {
    pub description: &'static str,
    pub title: &'static str,
    pub body: &'static str,
    pub labels: &'static str,
}

impl IssueToolText {
    pub const ENGLISH: Self = Self {
        description: "Create an issue in the GitHub repository. Use only after the user has \
                      approved filing it.",
        title: "Issue title",
        body: "Issue body (Markdown)",
        labels: "Labels to apply (optional)",
    };

    pub const JAPANESE: Self = Self {
        description: "GitHub リポジトリに Issue を作成する。ユーザーが起票を承認した後に使用する。",
        title: "Issue のタイトル",
        body: "Issue の本文（Markdown）",
        labels: "付与するラベル（省略可）",
    };
}

pub fn create_issue_tool_definition(text: &IssueToolText) -> ib_llm::ToolDefinition {
    ib_llm::ToolDefinition {
        name: CREATE_ISSUE_TOOL_NAME.to_string(),
        description: text.description.to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": text.title
                },
                "body": {
                    "type": "string",
                    "description": text.body
                },
                "labels": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": text.labels
                }
            },
            "required": ["title", "body"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_definition_requires_title_and_body_only() {
        let def = create_issue_tool_definition(&IssueToolText::ENGLISH);
        assert_eq!(def.name, "create_github_issue");
        let required = def.input_schema["required"]
            .as_array()
            .expect("required array");
        assert!(required.contains(&json!("title")));
        assert!(required.contains(&json!("body")));
        assert!(!required.contains(&json!("labels")));
        let props = &def.input_schema["properties"];
        assert!(props.get("labels").is_some());
        assert_eq!(props["labels"]["items"]["type"], "string");
    }

    #[test]
    fn tool_definition_uses_the_given_wording() {
        let ja = create_issue_tool_definition(&IssueToolText::JAPANESE);
        assert!(ja.description.contains("起票を承認した後"));
        assert_eq!(ja.input_schema["properties"]["title"]["description"], "Issue のタイトル");
        assert_eq!(
            ja.input_schema["properties"]["labels"]["description"],
            "付与するラベル（省略可）"
        );

        let en = create_issue_tool_definition(&IssueToolText::ENGLISH);
        assert_eq!(en.input_schema["properties"]["body"]["description"], "Issue body (Markdown)");
        assert_eq!(en.input_schema, {
            let mut schema = ja.input_schema.clone();
            schema["properties"]["title"]["description"] = json!("Issue title");
            schema["properties"]["body"]["description"] = json!("Issue body (Markdown)");
            schema["properties"]["labels"]["description"] = json!("Labels to apply (optional)");
            schema
        });
    }

    #[test]
    fn from_tool_input_reads_all_fields() {
        let request =
            IssueRequest::from_tool_input(&json!({ "title": "T", "body": "B", "labels": ["bug"] }))
                .expect("valid input");
        assert_eq!(
            request,
            IssueRequest {
                title: "T".to_string(),
                body: "B".to_string(),
                labels: Some(vec!["bug".to_string()]),
            }
        );
    }

    #[test]
    fn from_tool_input_rejects_missing_body() {
        let err = IssueRequest::from_tool_input(&json!({ "title": "T" }))
            .expect_err("body is required");
        assert!(err.to_string().contains("missing key: body"));
    }
}
