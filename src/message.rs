//! Conversation model
//!
//! A conversation is an append-only sequence of messages; each message is an
//! ordered sequence of typed parts that preserves generation order.

mod part;

pub use part::{Part, ToolCallState, ToolErrorKind, ToolOutcome};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// How a message came to rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Parts are still being appended
    Streaming,
    /// The turn reached `finish`
    #[default]
    Complete,
    /// The user stopped the turn
    Cancelled,
    /// The stream broke before `finish`
    Incomplete,
}

impl MessageStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, MessageStatus::Streaming)
    }
}

/// Violations of the part ordering and tool correlation rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartInvariantError {
    #[error("tool result {call_id} has no preceding tool call")]
    OrphanResult { call_id: String },
    #[error("tool call {call_id} already has a result")]
    DuplicateResult { call_id: String },
    #[error("tool call id {call_id} is already in use")]
    DuplicateCallId { call_id: String },
    #[error("message {message_id} is finalized")]
    Finalized { message_id: String },
    #[error("message id {message_id} is already in the conversation")]
    DuplicateMessageId { message_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// Create an empty message that is still accepting parts
    pub fn streaming(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
            status: MessageStatus::Streaming,
            error: None,
        }
    }

    /// Create a complete single-text-part user message with a fresh id
    pub fn user(text: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            parts: vec![Part::text(format!("{id}-text"), text)],
            id,
            role: Role::User,
            status: MessageStatus::Complete,
            error: None,
        }
    }

    /// Concatenation of all text parts, in order
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Append a part while the message is streaming, enforcing tool correlation
    pub fn push_part(&mut self, part: Part) -> Result<(), PartInvariantError> {
        if self.status.is_final() {
            return Err(PartInvariantError::Finalized {
                message_id: self.id.clone(),
            });
        }
        check_next_part(&self.parts, &part)?;
        self.parts.push(part);
        Ok(())
    }

    /// Check the per-message invariants over the full part list
    pub fn validate(&self) -> Result<(), PartInvariantError> {
        for (index, part) in self.parts.iter().enumerate() {
            check_next_part(&self.parts[..index], part)?;
        }
        Ok(())
    }

    /// Call ids introduced by tool-call parts in this message
    pub fn call_ids(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::ToolCall { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
    }
}

fn check_next_part(existing: &[Part], part: &Part) -> Result<(), PartInvariantError> {
    match part {
        Part::ToolCall { call_id, .. } => {
            if existing.iter().any(|p| p.call_id() == Some(call_id)) {
                return Err(PartInvariantError::DuplicateCallId {
                    call_id: call_id.clone(),
                });
            }
        }
        Part::ToolResult { call_id, .. } => {
            let mut has_call = false;
            for earlier in existing {
                match earlier {
                    Part::ToolCall { call_id: id, .. } if id == call_id => has_call = true,
                    Part::ToolResult { call_id: id, .. } if id == call_id => {
                        return Err(PartInvariantError::DuplicateResult {
                            call_id: call_id.clone(),
                        });
                    }
                    _ => {}
                }
            }
            if !has_call {
                return Err(PartInvariantError::OrphanResult {
                    call_id: call_id.clone(),
                });
            }
        }
        Part::Text { .. } | Part::Reasoning { .. } => {}
    }
    Ok(())
}

/// Ordered, append-only list of messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a conversation from untrusted input, checking every invariant
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, PartInvariantError> {
        let mut conversation = Self::new();
        for message in messages {
            conversation.push(message)?;
        }
        Ok(conversation)
    }

    /// Append a message; call ids may not be reused across messages
    pub fn push(&mut self, message: Message) -> Result<(), PartInvariantError> {
        message.validate()?;
        if self.messages.iter().any(|m| m.id == message.id) {
            return Err(PartInvariantError::DuplicateMessageId {
                message_id: message.id,
            });
        }
        let known: HashSet<&str> = self.messages.iter().flat_map(Message::call_ids).collect();
        if let Some(reused) = message.call_ids().find(|id| known.contains(id)) {
            return Err(PartInvariantError::DuplicateCallId {
                call_id: reused.to_string(),
            });
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// A message that has not come to rest; persisted and client-supplied
    /// history must have none
    pub fn first_unfinished(&self) -> Option<&Message> {
        self.messages.iter().find(|m| !m.status.is_final())
    }

    pub fn validate(&self) -> Result<(), PartInvariantError> {
        Self::from_messages(self.messages.clone()).map(|_| ())
    }
}

/// Concatenated text of the most recent user message, empty if there is none
pub fn latest_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(Message::text)
        .unwrap_or_default()
}

/// Address of a part within the conversation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartKey {
    pub message_id: String,
    pub part_index: usize,
}

impl PartKey {
    pub fn new(message_id: impl Into<String>, part_index: usize) -> Self {
        Self {
            message_id: message_id.into(),
            part_index,
        }
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.message_id, self.part_index)
    }

    fn decode(key: &str) -> Option<Self> {
        let (message_id, index) = key.rsplit_once(':')?;
        Some(Self::new(message_id, index.parse().ok()?))
    }
}

/// Display-only reasoning timings in milliseconds.
///
/// Serialized as `"<messageId>:<partIndex>" -> ms`. Keys that fail to parse
/// are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct DurationMap {
    entries: HashMap<PartKey, u64>,
}

impl DurationMap {
    pub fn insert(&mut self, key: PartKey, millis: u64) {
        self.entries.insert(key, millis);
    }
}

impl From<BTreeMap<String, u64>> for DurationMap {
    fn from(raw: BTreeMap<String, u64>) -> Self {
        let entries = raw
            .into_iter()
            .filter_map(|(key, millis)| PartKey::decode(&key).map(|k| (k, millis)))
            .collect();
        Self { entries }
    }
}

impl From<DurationMap> for BTreeMap<String, u64> {
    fn from(map: DurationMap) -> Self {
        map.entries
            .into_iter()
            .map(|(key, millis)| (key.encode(), millis))
            .collect()
    }
}
