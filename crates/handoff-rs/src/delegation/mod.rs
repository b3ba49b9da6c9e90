//! Delegation of work from an agent to its subordinates.
//!
//! - [`extract`] — tolerant scanner that pulls `{"handoff": {...}}`
//!   annotations out of free-form agent output.
//! - [`manager`] — [`DelegationManager`]: launches handoffs as background
//!   tasks, tracks them by [`TaskId`], and reconciles results into the
//!   delegating agent's buffer on its next turn.

pub mod extract;
pub mod manager;

pub use extract::{Extraction, HANDOFF_KEY, HandoffRequest, extract_handoffs};
pub use manager::{
    DelegationConfig, DelegationManager, DelegationTask, ReconcileReport, Subordinate, TaskId,
    TaskStatus, TurnFuture,
};
