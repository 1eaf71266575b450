//! Issue-filing gateway for IdeaBot.
//!
//! The assistant calls an [`IssueTracker`] when the model asks to run the
//! `create_github_issue` tool; [`GithubIssueClient`] is the REST-backed tracker.

mod args;
mod error;
mod github;
mod issue;

pub use error::{Result, ToolError};
pub use github::{GITHUB_API_BASE, GithubIssueClient, GithubRepo};
pub use issue::{
    CREATE_ISSUE_TOOL_NAME, IssueRequest, IssueResult, IssueToolText, IssueTracker,
    create_issue_tool_definition,
};
