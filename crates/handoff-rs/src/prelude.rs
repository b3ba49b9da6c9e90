//! Convenience re-exports for building and running agents.
//!
//! ```ignore
//! use handoff_rs::prelude::*;
//! ```

pub use crate::agent::{
    Agent, AgentRuntime, AgentSettings, OpenRouterRuntime, RuntimeFuture, RuntimeRequest,
    Session, TurnRequest,
};
pub use crate::api::RetryConfig;
pub use crate::config::{ConfigError, SessionConfig};
pub use crate::context::{BufferConfig, ConversationBuffer, Message, PINNED, Role};
pub use crate::delegation::{
    DelegationConfig, DelegationManager, HandoffRequest, Subordinate, TaskId, extract_handoffs,
};
pub use crate::io::{ConsoleOutput, FileInput, FileOutput, InputSource, OutputSink, StdinInput};
pub use crate::{ChatMessage, ChatRequest, DEFAULT_MODEL, OpenRouterClient};
