//! A single turn in an agent's conversation, carrying a decaying importance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::budget::estimate_tokens;

/// Importance of a standing directive. Never decayed, never evicted.
pub const PINNED: i32 = i32::MAX;

/// Default importance of a user turn.
pub const DEFAULT_USER_IMPORTANCE: i32 = 20;

/// Default importance of an assistant response.
pub const DEFAULT_RESPONSE_IMPORTANCE: i32 = 100;

/// Who a message is attributed to in the serialized context.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Standing instruction from the developer (system prompt, delegation
    /// results, knowledge).
    #[serde(rename = "developer")]
    SystemDirective,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::SystemDirective => write!(f, "developer"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One record of the message wire form.
#[derive(Serialize)]
struct WireRecord<'a> {
    role: Role,
    message: Option<&'a str>,
}

/// A message held by a [`ConversationBuffer`](super::ConversationBuffer).
///
/// Role and content are fixed at construction. The importance only moves
/// through the buffer's decay step, and `created_at` is stamped by the
/// buffer on insertion.
#[derive(Debug, Clone)]
pub struct Message {
    role: Role,
    content: Option<String>,
    importance: i32,
    created_at: u64,
    timestamp: DateTime<Utc>,
    token_size: OnceLock<usize>,
}

impl Message {
    pub fn new(role: Role, importance: i32, content: Option<String>) -> Self {
        Self {
            role,
            content,
            importance,
            created_at: 0,
            timestamp: Utc::now(),
            token_size: OnceLock::new(),
        }
    }

    /// A pinned developer directive.
    pub fn directive(content: impl Into<String>) -> Self {
        Self::new(Role::SystemDirective, PINNED, Some(content.into()))
    }

    pub fn user(importance: i32, content: impl Into<String>) -> Self {
        Self::new(Role::User, importance, Some(content.into()))
    }

    pub fn assistant(importance: i32, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, importance, Some(content.into()))
    }

    /// Pre-set the token size instead of estimating it from the content.
    pub fn with_token_size(mut self, tokens: usize) -> Self {
        self.token_size = OnceLock::from(tokens);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn importance(&self) -> i32 {
        self.importance
    }

    pub fn is_pinned(&self) -> bool {
        self.importance == PINNED
    }

    /// Logical insertion time within the owning buffer.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Wall-clock creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Approximate token cost. Computed on first use, then cached.
    pub fn token_size(&self, chars_per_token: f64) -> usize {
        *self.token_size.get_or_init(|| {
            self.content
                .as_deref()
                .map_or(0, |c| estimate_tokens(c, chars_per_token))
        })
    }

    /// One wire-form record: `{"role": ..., "message": ...}`.
    pub fn to_wire(&self) -> String {
        let record = WireRecord {
            role: self.role,
            message: self.content.as_deref(),
        };
        serde_json::to_string(&record).unwrap_or_default()
    }

    pub(crate) fn stamp(&mut self, created_at: u64) {
        self.created_at = created_at;
    }

    /// Lower the importance by one. Pinned messages are untouched.
    pub(crate) fn decay(&mut self) {
        if !self.is_pinned() {
            self.importance = self.importance.saturating_sub(1);
        }
    }
}
