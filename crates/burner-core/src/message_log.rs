//! Room message log
//!
//! An append-only, insertion-ordered list of chat and system messages.
//! Entries are never reordered or edited once appended.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::ChatDeliver;

/// How many recent coordinator ids are remembered for duplicate detection
pub const DEDUP_WINDOW: usize = 1024;

/// Locally assigned message identifier
///
/// Derived from the receipt time in microseconds, bumped when two messages
/// land within the same microsecond so ids stay strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Membership notice from the coordinator
    System,
    /// Message written by a room member
    Chat,
}

/// One entry in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub kind: MessageKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_connection_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    /// Whether the local connection wrote this message, fixed at receipt
    pub is_own: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    seen_remote_ids: HashSet<String>,
    /// Insertion order of `seen_remote_ids`, oldest first
    seen_order: VecDeque<String>,
    last_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.last()
    }

    /// Append a system notice
    pub(crate) fn push_system(&mut self, text: impl Into<String>) -> &ChatMessage {
        let now = Utc::now();
        let message = ChatMessage {
            id: self.next_id(now),
            kind: MessageKind::System,
            text: text.into(),
            sender_display_name: None,
            sender_connection_id: None,
            sent_at: now,
            is_own: false,
        };
        self.push(message)
    }

    /// Append a delivered chat message
    ///
    /// Returns `None` when the coordinator already delivered a message with
    /// the same id.
    pub(crate) fn push_chat(&mut self, deliver: ChatDeliver, is_own: bool) -> Option<&ChatMessage> {
        if let Some(remote_id) = &deliver.id {
            if !self.remember(remote_id) {
                return None;
            }
        }

        let now = Utc::now();
        let message = ChatMessage {
            id: self.next_id(now),
            kind: MessageKind::Chat,
            text: deliver.text,
            sender_display_name: Some(deliver.sender_display_name),
            sender_connection_id: Some(deliver.sender_connection_id),
            sent_at: deliver.sent_at.unwrap_or(now),
            is_own,
        };
        Some(self.push(message))
    }

    /// Record a coordinator id, returning false if it is already known
    fn remember(&mut self, remote_id: &str) -> bool {
        if !self.seen_remote_ids.insert(remote_id.to_string()) {
            return false;
        }
        self.seen_order.push_back(remote_id.to_string());
        if self.seen_order.len() > DEDUP_WINDOW {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_remote_ids.remove(&oldest);
            }
        }
        true
    }

    fn push(&mut self, message: ChatMessage) -> &ChatMessage {
        self.entries.push(message);
        &self.entries[self.entries.len() - 1]
    }

    fn next_id(&mut self, now: DateTime<Utc>) -> MessageId {
        let micros = u64::try_from(now.timestamp_micros()).unwrap_or_default();
        self.last_id = micros.max(self.last_id + 1);
        MessageId(self.last_id)
    }
}
