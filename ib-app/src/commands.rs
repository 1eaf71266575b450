//! Slash commands handled without calling the model.

use crate::conversation::ConversationStore;
use crate::prompt::Notices;

/// Returns a reply when `input` is a bot command; `None` means "send to the model".
///
/// Unrecognized slash text is not an error: users paste paths and code.
pub fn handle_command(
    conversations: &dyn ConversationStore,
    notices: &Notices,
    user_id: &str,
    input: &str,
) -> Option<String> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match command.as_str() {
        "/new" | "/reset" => {
            conversations.clear(user_id);
            tracing::info!(user_id, "conversation reset by command");
            Some(notices.conversation_reset().to_string())
        }
        "/help" => Some(notices.help().to_string()),
        _ => None,
    }
}
