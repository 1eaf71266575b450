//! Model provider client for IdeaBot.
//!
//! Pure HTTP client over the Anthropic Messages API. Content blocks are a
//! tagged enum so callers match text, tool-use, and tool-result exhaustively.

mod anthropic;
mod client;
mod error;
mod types;

pub use client::{CompletionProvider, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, LlmClient};
pub use error::{LlmError, Result};
pub use types::{
    CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, ToolDefinition,
    ToolUse, Usage,
};
