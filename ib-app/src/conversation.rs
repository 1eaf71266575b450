//! Per-user conversation history with idle expiry.
//!
//! One entry per Slack user id. Entries are capped to the most recent
//! `max_messages` and are treated as absent once idle for longer than `ttl`.

use dashmap::DashMap;
use ib_llm::Message;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_MESSAGES: usize = 20;

pub trait ConversationStore: Send + Sync {
    /// Returns the stored history, or an empty list when absent or expired.
    fn history(&self, user_id: &str) -> Vec<Message>;

    fn append(&self, user_id: &str, message: Message);

    fn clear(&self, user_id: &str);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct ConversationEntry {
    messages: Vec<Message>,
    updated_at: Instant,
}

pub struct InMemoryConversationStore {
    entries: DashMap<String, ConversationEntry>,
    ttl: Duration,
    max_messages: usize,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_MESSAGES)
    }
}

impl InMemoryConversationStore {
    pub fn new(ttl: Duration, max_messages: usize) -> Self {
        Self::with_clock(ttl, max_messages, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_messages: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_messages: max_messages.max(1),
            clock,
        }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !is_expired(entry, now, self.ttl));
        before.saturating_sub(self.entries.len())
    }
}

// Strictly older than the ttl; an entry exactly `ttl` old is still live.
fn is_expired(entry: &ConversationEntry, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(entry.updated_at) > ttl
}

impl ConversationStore for InMemoryConversationStore {
    fn history(&self, user_id: &str) -> Vec<Message> {
        let now = self.clock.now();
        match self.entries.get(user_id) {
            None => return Vec::new(),
            Some(entry) if !is_expired(&entry, now, self.ttl) => return entry.messages.clone(),
            Some(_) => {}
        }
        if self
            .entries
            .remove_if(user_id, |_, entry| is_expired(entry, now, self.ttl))
            .is_some()
        {
            tracing::debug!(user_id, "conversation expired");
        }
        Vec::new()
    }

    fn append(&self, user_id: &str, message: Message) {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(user_id.to_string())
            .or_insert_with(|| ConversationEntry {
                messages: Vec::new(),
                updated_at: now,
            });
        if is_expired(&entry, now, self.ttl) {
            entry.messages.clear();
        }
        entry.messages.push(message);
        entry.updated_at = now;
        let len = entry.messages.len();
        if len > self.max_messages {
            entry.messages.drain(..len - self.max_messages);
        }
    }

    fn clear(&self, user_id: &str) {
        self.entries.remove(user_id);
    }
}
