//! Importance-decay conversation buffer.
//!
//! Every insertion is one transaction: all non-pinned messages lose one
//! point of importance, anything that drops below zero expires, the new
//! message is appended, and if the buffer is at or over its clean threshold
//! the least important (then oldest) messages are evicted until it fits.
//! Pinned directives survive both steps unconditionally, even when they alone
//! exceed the budget.

use serde::Serialize;
use tracing::debug;

use super::budget::BufferConfig;
use super::message::{Message, Role};

/// What a single [`ConversationBuffer::add`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Messages whose importance decayed below zero.
    pub expired: usize,
    /// Messages removed by eviction.
    pub evicted: usize,
}

/// Ordered, token-bounded message store for one agent.
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    messages: Vec<Message>,
    config: BufferConfig,
    next_created_at: u64,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

impl ConversationBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            messages: Vec::new(),
            config,
            next_created_at: 1,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Messages in chronological order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sum of the approximate token sizes of all held messages.
    pub fn total_tokens(&self) -> usize {
        total_tokens(&self.messages, self.config.chars_per_token)
    }

    /// Decay, expire, append, then clean if over the threshold.
    pub fn add(&mut self, mut message: Message) -> AddReport {
        for held in &mut self.messages {
            held.decay();
        }

        let before = self.messages.len();
        self.messages.retain(|m| m.importance() >= 0);
        let expired = before - self.messages.len();

        message.stamp(self.next_created_at);
        self.next_created_at += 1;
        self.messages.push(message);

        let evicted = if self.total_tokens() >= self.config.token_budget() {
            self.evict(self.config.clean_threshold)
        } else {
            0
        };

        if expired > 0 {
            debug!("Expired {expired} message(s) with negative importance");
        }
        AddReport { expired, evicted }
    }

    /// Evict least-important, oldest-first messages until the buffer fits in
    /// `max_context_tokens * threshold`. Returns the number removed.
    ///
    /// Pinned messages count toward the total but are never removed; if only
    /// pinned messages remain the buffer stays over budget.
    pub fn evict(&mut self, threshold: f64) -> usize {
        let budget = self.config.budget_for(threshold);
        let cpt = self.config.chars_per_token;
        let before_tokens = self.total_tokens();
        if before_tokens <= budget {
            return 0;
        }

        let mut working = std::mem::take(&mut self.messages);
        working.sort_by_key(|m| (m.importance(), m.created_at()));
        let (mut survivors, candidates): (Vec<Message>, Vec<Message>) =
            working.into_iter().partition(Message::is_pinned);

        let mut total = before_tokens;
        let mut candidates = candidates.into_iter();
        let mut evicted = 0;
        while total > budget {
            match candidates.next() {
                Some(m) => {
                    total -= m.token_size(cpt);
                    evicted += 1;
                }
                None => break,
            }
        }
        survivors.extend(candidates);
        survivors.sort_by_key(Message::created_at);
        self.messages = survivors;

        debug!(
            "Evicted {evicted} message(s): {before_tokens} -> {total} tokens (budget {budget})"
        );
        if total > budget {
            debug!("Buffer remains over budget with only pinned messages left");
        }
        evicted
    }

    /// Newline-joined wire records in chronological order.
    pub fn serialize(&self) -> String {
        self.messages
            .iter()
            .map(Message::to_wire)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Read-only view of the buffer for diagnostics.
    pub fn snapshot(&self) -> BufferSnapshot {
        let cpt = self.config.chars_per_token;
        BufferSnapshot {
            messages: self
                .messages
                .iter()
                .map(|m| MessageView {
                    role: m.role(),
                    importance: m.importance(),
                    pinned: m.is_pinned(),
                    created_at: m.created_at(),
                    timestamp: m.timestamp().to_rfc3339(),
                    tokens: m.token_size(cpt),
                    content: m.content().map(str::to_string),
                })
                .collect(),
            total_tokens: self.total_tokens(),
            token_budget: self.config.token_budget(),
            max_context_tokens: self.config.max_context_tokens,
        }
    }
}

fn total_tokens(messages: &[Message], chars_per_token: f64) -> usize {
    messages.iter().map(|m| m.token_size(chars_per_token)).sum()
}

/// Point-in-time copy of a buffer's contents and size.
#[derive(Debug, Clone, Serialize)]
pub struct BufferSnapshot {
    pub messages: Vec<MessageView>,
    pub total_tokens: usize,
    pub token_budget: usize,
    pub max_context_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub role: Role,
    pub importance: i32,
    pub pinned: bool,
    pub created_at: u64,
    pub timestamp: String,
    pub tokens: usize,
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::message::PINNED;

    fn small_buffer(max: usize) -> ConversationBuffer {
        ConversationBuffer::new(BufferConfig::new().with_max_context_tokens(max))
    }

    fn sized(importance: i32, label: &str, tokens: usize) -> Message {
        Message::user(importance, label).with_token_size(tokens)
    }

    fn contents(buffer: &ConversationBuffer) -> Vec<&str> {
        buffer
            .messages()
            .iter()
            .map(|m| m.content().unwrap_or(""))
            .collect()
    }

    #[test]
    fn add_decays_existing_messages() {
        let mut buffer = small_buffer(10_000);
        buffer.add(Message::user(5, "a"));
        buffer.add(Message::user(5, "b"));
        buffer.add(Message::directive("rule"));

        let importances: Vec<i32> = buffer.messages().iter().map(|m| m.importance()).collect();
        assert_eq!(importances, vec![3, 4, PINNED]);
    }

    #[test]
    fn negative_importance_expires_on_next_add() {
        let mut buffer = small_buffer(10_000);
        buffer.add(Message::user(0, "ephemeral"));
        assert_eq!(buffer.len(), 1);

        let report = buffer.add(Message::user(10, "next"));
        assert_eq!(report.expired, 1);
        assert_eq!(contents(&buffer), vec!["next"]);
    }

    #[test]
    fn message_added_negative_survives_until_next_add() {
        let mut buffer = small_buffer(10_000);
        buffer.add(Message::user(-3, "already stale"));
        assert_eq!(buffer.len(), 1);
        buffer.add(Message::user(1, "fresh"));
        assert_eq!(contents(&buffer), vec!["fresh"]);
    }

    #[test]
    fn every_survivor_is_non_negative_or_pinned() {
        let mut buffer = small_buffer(10_000);
        for i in 0..30 {
            buffer.add(Message::user(i % 4, format!("m{i}")));
            if i % 7 == 0 {
                buffer.add(Message::directive(format!("d{i}")));
            }
        }
        assert!(
            buffer
                .messages()
                .iter()
                .all(|m| m.importance() >= 0 || m.is_pinned())
        );
    }

    #[test]
    fn created_at_is_monotonic() {
        let mut buffer = small_buffer(10_000);
        for i in 0..5 {
            buffer.add(Message::user(50, format!("m{i}")));
        }
        let stamps: Vec<u64> = buffer.messages().iter().map(|m| m.created_at()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn eviction_is_noop_under_budget() {
        let mut buffer = small_buffer(1000);
        buffer.add(sized(10, "a", 100));
        buffer.add(sized(10, "b", 100));
        let before: Vec<String> = contents(&buffer).iter().map(|s| s.to_string()).collect();

        assert_eq!(buffer.evict(0.8), 0);
        assert_eq!(contents(&buffer), before);
    }

    #[test]
    fn eviction_removes_least_important_first() {
        let mut buffer = small_buffer(2000);
        buffer.add(sized(50, "keep-high", 300));
        buffer.add(sized(5, "drop-low", 300));
        buffer.add(sized(50, "keep-late", 300));

        // Decayed importances are 48, 4, 50. 900 tokens against a 500
        // budget: the low one goes first, then the next least important.
        let removed = buffer.evict(0.25);
        assert_eq!(removed, 2);
        assert_eq!(contents(&buffer), vec!["keep-late"]);
    }

    #[test]
    fn eviction_breaks_ties_oldest_first() {
        let mut buffer = small_buffer(100);
        let mut a = sized(7, "a", 40);
        let mut b = sized(7, "b", 40);
        a.stamp(1);
        b.stamp(2);
        buffer.messages = vec![a, b];

        assert_eq!(buffer.evict(0.5), 1);
        assert_eq!(contents(&buffer), vec!["b"]);
    }

    #[test]
    fn eviction_preserves_chronological_order() {
        let mut buffer = small_buffer(100_000);
        let importances = [40, 90, 10, 70, 30, 80, 20, 60];
        for (i, imp) in importances.iter().enumerate() {
            buffer.add(sized(*imp, &format!("m{i}"), 100));
        }
        buffer.evict(0.004); // budget 400

        let stamps: Vec<u64> = buffer.messages().iter().map(|m| m.created_at()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(buffer.total_tokens() <= 400);
        assert_eq!(contents(&buffer), vec!["m1", "m3", "m5", "m7"]);
    }

    #[test]
    fn pinned_messages_survive_any_pressure() {
        let mut buffer = small_buffer(100);
        for i in 0..5 {
            buffer.add(Message::directive(format!("rule {i}")).with_token_size(500));
        }
        buffer.add(sized(100, "chatter", 10));

        assert_eq!(buffer.messages().iter().filter(|m| m.is_pinned()).count(), 5);
        assert!(!contents(&buffer).contains(&"chatter"));
        // Over budget with only pinned messages left is accepted.
        assert!(buffer.total_tokens() > buffer.config().token_budget());
    }

    #[test]
    fn pinned_survive_explicit_zero_threshold() {
        let mut buffer = small_buffer(1000);
        buffer.add(Message::directive("a").with_token_size(1));
        buffer.add(sized(1000, "b", 1));
        buffer.evict(0.0);
        assert_eq!(contents(&buffer), vec!["a"]);
    }

    #[test]
    fn budget_scenario_keeps_pinned_and_latest() {
        // Budget 1000 * 0.8 = 800. One 50-token directive, then ten
        // 100-token turns at importance 10.
        let mut buffer = ConversationBuffer::new(
            BufferConfig::new()
                .with_max_context_tokens(1000)
                .with_clean_threshold(0.8),
        );
        buffer.add(Message::directive("system").with_token_size(50));

        let mut saw_eviction = false;
        for i in 0..10 {
            let report = buffer.add(sized(10, &format!("turn {i}"), 100));
            saw_eviction |= report.evicted > 0;
            assert!(buffer.total_tokens() <= 800, "after insert {i}");
        }
        assert!(saw_eviction);

        let remaining = contents(&buffer);
        assert_eq!(remaining[0], "system");
        assert!(buffer.messages()[0].is_pinned());
        // The survivors are the most recent turns, contiguous and in order.
        let turns: Vec<&str> = remaining[1..].to_vec();
        let expected: Vec<String> = (10 - turns.len()..10).map(|i| format!("turn {i}")).collect();
        assert_eq!(turns, expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(buffer.total_tokens(), 750);
    }

    #[test]
    fn serialize_emits_one_record_per_line() {
        let mut buffer = small_buffer(10_000);
        buffer.add(Message::directive("be brief"));
        buffer.add(Message::user(20, "hello"));
        buffer.add(Message::assistant(100, "hi"));

        let wire = buffer.serialize();
        let lines: Vec<&str> = wire.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"role":"developer","message":"be brief"}"#,
                r#"{"role":"user","message":"hello"}"#,
                r#"{"role":"assistant","message":"hi"}"#,
            ]
        );
    }

    #[test]
    fn serialize_empty_buffer_is_empty() {
        assert_eq!(small_buffer(10).serialize(), "");
    }

    #[test]
    fn snapshot_reports_sizes() {
        let mut buffer = small_buffer(1000);
        buffer.add(Message::directive("rule").with_token_size(50));
        buffer.add(sized(10, "turn", 100));

        let snap = buffer.snapshot();
        assert_eq!(snap.total_tokens, 150);
        assert_eq!(snap.token_budget, 800);
        assert_eq!(snap.messages.len(), 2);
        assert!(snap.messages[0].pinned);
        assert_eq!(snap.messages[1].importance, 10);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["messages"][0]["role"], "developer");
    }
}
