//! Agents and the drivers around them.
//!
//! - [`flow::Agent`] — one buffer, an optional delegation manager, and the
//!   turn loop. Start here.
//! - [`runtime`] — the [`AgentRuntime`] trait and the OpenRouter-backed
//!   [`OpenRouterRuntime`].
//! - [`session`] — [`Session`]: input source → primary turn → reviewers →
//!   output sink.
//! - [`prompt`] — [`DelegationDirectives`] for agents with subordinates.

pub mod flow;
pub mod prompt;
pub mod runtime;
pub mod session;

pub use flow::{Agent, AgentSettings, DEFAULT_INPUT, TurnRequest};
pub use prompt::DelegationDirectives;
pub use runtime::{AgentRuntime, OpenRouterRuntime, RuntimeFuture, RuntimeRequest};
pub use session::{REVIEW_IMPORTANCE, Session, SessionReport};
