//! Conversation memory: messages, token estimation, and the decaying buffer.
//!
//! Each agent owns one [`ConversationBuffer`]. Messages carry an importance
//! score that drops by one every time anything is added, so transient
//! dialogue ages out on its own:
//!
//! 1. **[`message`]**: [`Message`] and its [`Role`]. Importance
//!    [`PINNED`] marks a standing directive that never decays.
//!
//! 2. **[`budget`]**: [`BufferConfig`] and the character-based
//!    [`estimate_tokens`] approximation.
//!
//! 3. **[`buffer`]**: the [`ConversationBuffer`] itself: decay, expiry,
//!    eviction to the clean threshold, and the newline-delimited JSON wire
//!    form handed to the agent runtime.

pub mod budget;
pub mod buffer;
pub mod message;

pub use budget::{BufferConfig, DEFAULT_CHARS_PER_TOKEN, estimate_tokens};
pub use buffer::{AddReport, BufferSnapshot, ConversationBuffer, MessageView};
pub use message::{
    DEFAULT_RESPONSE_IMPORTANCE, DEFAULT_USER_IMPORTANCE, Message, PINNED, Role,
};
