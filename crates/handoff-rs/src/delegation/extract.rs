//! Tolerant scanner for `{"handoff": {...}}` annotations in free-form text.
//!
//! The scanner is an explicit state machine over byte positions:
//!
//! ```text
//!  Scanning ──candidate──▶ Matching ──balanced──▶ Decoding ──ok──▶ Scanning (after span)
//!     │                       │                      │
//!     └─none──▶ Done          └─ran off the end─┐    └─rejected─┐
//!                                               ▼               ▼
//!                                           Recovering ──▶ Scanning (start + 1)
//! ```
//!
//! Braces and quotes are ASCII, so byte positions always land on char
//! boundaries. Brace counting ignores braces inside string literals; the
//! decoded JSON is the final arbiter either way. Nothing here fails: text
//! that doesn't decode is left where it was.

use std::ops::Range;

/// Top-level key that marks a delegation annotation.
pub const HANDOFF_KEY: &str = "handoff";

/// One delegation instruction pulled out of agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub subagent: String,
    pub prompt: String,
}

impl HandoffRequest {
    pub fn new(subagent: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            subagent: subagent.into(),
            prompt: prompt.into(),
        }
    }

    /// The annotation an agent writes to request this handoff.
    pub fn to_annotation(&self) -> String {
        serde_json::json!({
            HANDOFF_KEY: { "subagent": self.subagent, "prompt": self.prompt }
        })
        .to_string()
    }
}

/// Result of [`extract_handoffs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Input with every matched span removed and whitespace collapsed, or the
    /// input untouched when nothing matched.
    pub cleaned: String,
    /// Requests in left-to-right order, duplicates included.
    pub handoffs: Vec<HandoffRequest>,
    /// Byte ranges of the matched spans in the original input.
    pub spans: Vec<Range<usize>>,
}

/// Pull every handoff annotation out of `text`.
pub fn extract_handoffs(text: &str) -> Extraction {
    let matches = Scanner::new(text).run();
    if matches.is_empty() {
        return Extraction {
            cleaned: text.to_string(),
            handoffs: Vec::new(),
            spans: Vec::new(),
        };
    }

    let mut remaining = String::with_capacity(text.len());
    let mut last_end = 0;
    for m in &matches {
        remaining.push_str(text.get(last_end..m.span.start).unwrap_or_default());
        last_end = m.span.end;
    }
    remaining.push_str(text.get(last_end..).unwrap_or_default());

    let cleaned = remaining.split_whitespace().collect::<Vec<_>>().join(" ");
    let (spans, handoffs) = matches.into_iter().map(|m| (m.span, m.request)).unzip();
    Extraction {
        cleaned,
        handoffs,
        spans,
    }
}

#[derive(Debug)]
struct Match {
    span: Range<usize>,
    request: HandoffRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the next candidate at or after `from`.
    Scanning { from: usize },
    /// Counting braces from `start`; `cursor` is the next byte to read.
    Matching {
        start: usize,
        cursor: usize,
        depth: usize,
        in_string: bool,
        escaped: bool,
    },
    /// `start..end` is brace-balanced; try to decode it.
    Decoding { start: usize, end: usize },
    /// The candidate at `start` was rejected; resume one byte later.
    Recovering { start: usize },
    Done,
}

struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    state: State,
    matches: Vec<Match>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            state: State::Scanning { from: 0 },
            matches: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Match> {
        while self.state != State::Done {
            self.state = self.step();
        }
        self.matches
    }

    fn step(&mut self) -> State {
        match self.state {
            State::Scanning { from } => match self.next_candidate(from) {
                Some(start) => State::Matching {
                    start,
                    cursor: start,
                    depth: 0,
                    in_string: false,
                    escaped: false,
                },
                None => State::Done,
            },
            State::Matching {
                start,
                cursor,
                depth,
                in_string,
                escaped,
            } => self.match_byte(start, cursor, depth, in_string, escaped),
            State::Decoding { start, end } => {
                match self.text.get(start..end).and_then(decode_annotation) {
                    Some(request) => {
                        self.matches.push(Match {
                            span: start..end,
                            request,
                        });
                        State::Scanning { from: end }
                    }
                    None => State::Recovering { start },
                }
            }
            State::Recovering { start } => State::Scanning { from: start + 1 },
            State::Done => State::Done,
        }
    }

    fn match_byte(
        &self,
        start: usize,
        cursor: usize,
        depth: usize,
        in_string: bool,
        escaped: bool,
    ) -> State {
        let Some(&byte) = self.bytes.get(cursor) else {
            return State::Recovering { start };
        };
        let next = |depth, in_string, escaped| State::Matching {
            start,
            cursor: cursor + 1,
            depth,
            in_string,
            escaped,
        };

        if in_string {
            return match (escaped, byte) {
                (true, _) => next(depth, true, false),
                (false, b'\\') => next(depth, true, true),
                (false, b'"') => next(depth, false, false),
                (false, _) => next(depth, true, false),
            };
        }

        match byte {
            b'"' => next(depth, true, false),
            b'{' => next(depth + 1, false, false),
            b'}' if depth <= 1 => State::Decoding {
                start,
                end: cursor + 1,
            },
            b'}' => next(depth - 1, false, false),
            _ => next(depth, false, false),
        }
    }

    /// Next `{` at or after `from` whose first non-whitespace token is the
    /// quoted marker key.
    fn next_candidate(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        while pos < self.bytes.len() {
            let offset = self.bytes.get(pos..)?.iter().position(|&b| b == b'{')?;
            let open = pos + offset;
            if self.opens_annotation(open) {
                return Some(open);
            }
            pos = open + 1;
        }
        None
    }

    fn opens_annotation(&self, open: usize) -> bool {
        let rest = self.text.get(open + 1..).unwrap_or_default();
        rest.trim_start()
            .strip_prefix('"')
            .and_then(|r| r.strip_prefix(HANDOFF_KEY))
            .is_some_and(|r| r.starts_with('"'))
    }
}

/// Decode a balanced span. Accepted when the top-level value is an object
/// whose marker key holds an object; absent or non-string fields become empty
/// strings for `dispatch` to reject.
fn decode_annotation(span: &str) -> Option<HandoffRequest> {
    let value: serde_json::Value = serde_json::from_str(span).ok()?;
    let inner = value.as_object()?.get(HANDOFF_KEY)?.as_object()?;
    let field = |key: &str| {
        inner
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    Some(HandoffRequest {
        subagent: field("subagent"),
        prompt: field("prompt"),
    })
}
