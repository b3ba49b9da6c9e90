//! Token budget settings and the character-based token estimate.
//!
//! There is no real tokenizer here. Sizes are approximated from character
//! counts with a configurable chars-per-token ratio.

use serde::{Deserialize, Serialize};

/// Default characters per token. Below one, so estimates run high.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 0.75;

/// Default context window size in tokens.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 128_000;

/// Default fraction of the context window at which cleaning kicks in.
pub const DEFAULT_CLEAN_THRESHOLD: f64 = 0.8;

/// Estimate the token cost of `text`: `ceil(chars / chars_per_token)`.
///
/// A non-positive ratio falls back to one token per character.
pub fn estimate_tokens(text: &str, chars_per_token: f64) -> usize {
    let chars = text.chars().count();
    if chars_per_token <= 0.0 || !chars_per_token.is_finite() {
        return chars;
    }
    (chars as f64 / chars_per_token).ceil() as usize
}

/// Size limits for a [`ConversationBuffer`](super::ConversationBuffer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Context window size in tokens.
    pub max_context_tokens: usize,
    /// Fraction of `max_context_tokens` the buffer is cleaned down to.
    pub clean_threshold: f64,
    /// Characters per token for [`estimate_tokens`].
    pub chars_per_token: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            clean_threshold: DEFAULT_CLEAN_THRESHOLD,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl BufferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the context window size (in tokens).
    pub fn with_max_context_tokens(mut self, tokens: usize) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Override the clean threshold fraction.
    pub fn with_clean_threshold(mut self, threshold: f64) -> Self {
        self.clean_threshold = threshold;
        self
    }

    /// Override the chars-per-token ratio.
    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = ratio;
        self
    }

    /// Token budget for a given threshold fraction, rounded down.
    pub fn budget_for(&self, threshold: f64) -> usize {
        // Products like 100 * 0.29 land just below the integer.
        (self.max_context_tokens as f64 * threshold + 1e-9).floor() as usize
    }

    /// Token budget at the configured clean threshold.
    pub fn token_budget(&self) -> usize {
        self.budget_for(self.clean_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        // 3 chars / 0.75 = 4 exactly; 4 chars / 0.75 = 5.33 -> 6.
        assert_eq!(estimate_tokens("abc", 0.75), 4);
        assert_eq!(estimate_tokens("abcd", 0.75), 6);
        assert_eq!(estimate_tokens("", 0.75), 0);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        // Four multi-byte chars.
        assert_eq!(estimate_tokens("ñüéø", 1.0), 4);
    }

    #[test]
    fn estimate_with_bad_ratio_falls_back() {
        assert_eq!(estimate_tokens("hello", 0.0), 5);
        assert_eq!(estimate_tokens("hello", -2.0), 5);
    }

    #[test]
    fn default_budget_is_eighty_percent() {
        let config = BufferConfig::default();
        assert_eq!(config.token_budget(), 102_400);
    }

    #[test]
    fn budget_for_explicit_threshold() {
        let config = BufferConfig::new().with_max_context_tokens(1000);
        assert_eq!(config.budget_for(0.8), 800);
        assert_eq!(config.budget_for(0.5), 500);
    }

    #[test]
    fn budget_for_absorbs_float_error() {
        let config = BufferConfig::new().with_max_context_tokens(100);
        assert_eq!(config.budget_for(0.29), 29);
        assert_eq!(config.budget_for(0.57), 57);
        assert_eq!(config.budget_for(0.705), 70);
    }

    #[test]
    fn custom_chars_per_token_is_kept() {
        let config = BufferConfig::new().with_chars_per_token(4.0);
        assert_eq!(config.chars_per_token, 4.0);
        assert_eq!(estimate_tokens("abcdefghi", config.chars_per_token), 3);
        assert_eq!(config.token_budget(), 102_400);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: BufferConfig = toml::from_str("max_context_tokens = 4000").unwrap();
        assert_eq!(config.max_context_tokens, 4000);
        assert_eq!(config.clean_threshold, DEFAULT_CLEAN_THRESHOLD);
        assert_eq!(config.chars_per_token, DEFAULT_CHARS_PER_TOKEN);
    }
}
