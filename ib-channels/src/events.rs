use crate::types::{ChannelId, UserId};
use serde::{Deserialize, Deserializer};

/// Outer payload of a Slack Events API delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    UrlVerification {
        #[serde(default)]
        challenge: String,
    },
    EventCallback {
        #[serde(default, deserialize_with = "lenient_event")]
        event: Option<SlackMessageEvent>,
    },
    #[serde(other)]
    Other,
}

impl SlackEnvelope {
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackMessageEvent {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<ChannelId>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

// Non-message events reuse field names with other shapes (`user_change`
// carries a user object, `channel_created` a channel object). Those keep
// only their `type` so they are logged and ignored.
fn lenient_event<'de, D>(deserializer: D) -> Result<Option<SlackMessageEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned);
    Ok(Some(serde_json::from_value(value).unwrap_or_else(|_| {
        SlackMessageEvent {
            kind,
            ..SlackMessageEvent::default()
        }
    })))
}

/// A human-authored direct message the bot should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectMessage<'a> {
    pub user: &'a UserId,
    pub channel: &'a ChannelId,
    pub text: &'a str,
}

impl SlackMessageEvent {
    /// Returns the message when it is a plain `im` message from a person.
    ///
    /// Edits, joins and other subtyped events are skipped, as is anything
    /// posted by a bot (including this one).
    pub fn direct_message(&self) -> Option<DirectMessage<'_>> {
        if self.kind.as_deref() != Some("message") || self.channel_type.as_deref() != Some("im") {
            return None;
        }
        if self.subtype.is_some() || self.bot_id.is_some() {
            return None;
        }
        let text = self.text.as_deref().filter(|text| !text.is_empty())?;
        let user = self.user.as_ref().filter(|user| !user.is_empty())?;
        let channel = self.channel.as_ref().filter(|channel| !channel.is_empty())?;
        Some(DirectMessage {
            user,
            channel,
            text,
        })
    }
}
