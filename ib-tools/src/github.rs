use crate::error::{Result, ToolError};
use crate::issue::{IssueRequest, IssueResult, IssueTracker};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone)]
pub struct GithubRepo {
    pub owner: String,
    pub name: String,
}

impl GithubRepo {
    pub fn new(owner: &str, name: &str) -> Result<Self> {
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() {
            return Err(ToolError::Configuration(
                "github owner and repo are required".to_string(),
            ));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct GithubIssueClient {
    http: reqwest::Client,
    api_base: String,
    repo: GithubRepo,
}

impl GithubIssueClient {
    pub fn new(token: &str, repo: GithubRepo) -> Result<Self> {
        Self::with_api_base(token, repo, GITHUB_API_BASE)
    }

    pub fn with_api_base(token: &str, repo: GithubRepo, api_base: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ToolError::Configuration(
                "github token is required".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("ideabot"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        let auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ToolError::Configuration("github token is not a valid header value".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
        })
    }

    pub fn repo(&self) -> &GithubRepo {
        &self.repo
    }
}

#[async_trait]
impl IssueTracker for GithubIssueClient {
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(owner = %self.repo.owner, repo = %self.repo.name)
    )]
    async fn create_issue(&self, request: &IssueRequest) -> Result<IssueResult> {
        let url = format!(
            "{}/repos/{}/{}/issues",
            self.api_base, self.repo.owner, self.repo.name
        );
        let payload = CreateIssuePayload {
            title: &request.title,
            body: &request.body,
            labels: request.labels.as_deref(),
        };
        let response = self.http.post(url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            let message = serde_json::from_str::<GithubErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.message)
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), error = %message, "github issue create failed");
            return Err(ToolError::Provider(format!(
                "github issue create failed: status={status} message={message}"
            )));
        }

        let created: CreatedIssue = response.json().await?;
        tracing::info!(number = created.number, url = %created.html_url, "github issue created");
        Ok(IssueResult {
            number: created.number,
            url: created.html_url,
        })
    }
}

#[derive(Debug, Serialize)]
struct CreateIssuePayload<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    #[serde(default)]
    message: Option<String>,
}
