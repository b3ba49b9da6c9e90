//! Resilience for calls to the chat completions API.
//!
//! - [`retry`] — transient error detection (429, 5xx, network timeouts) with
//!   configurable exponential backoff, and the [`retry_api_call`] loop that
//!   wraps a runtime call with it. Never retries 400/401 errors.

pub mod retry;

pub use retry::{RetryConfig, is_permanent_error, is_transient_error, retry_api_call};
