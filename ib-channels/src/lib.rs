//! Slack boundary for IdeaBot.
//!
//! Inbound: Events API envelope parsing and `v0` request-signature checks.
//! Outbound: [`SlackAdapter`] posts replies through `chat.postMessage`.

mod events;
mod signature;
mod slack;
mod traits;
mod types;

pub use events::{DirectMessage, SlackEnvelope, SlackMessageEvent};
pub use signature::{
    SLACK_SIGNATURE_MAX_AGE_SECONDS, slack_signature, verify_slack_signature,
    verify_slack_signature_at,
};
pub use slack::{SLACK_API_BASE, SlackAdapter};
pub use traits::ChannelAdapter;
pub use types::{ChannelId, OutboundMessage, UserId};
