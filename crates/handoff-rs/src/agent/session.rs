//! The interactive driver around a primary agent.
//!
//! Each input line becomes one primary turn. Reviewer agents then read the
//! primary's full serialized context and may add a low-importance note back
//! into it. The primary's reply goes to the output sink.

use std::sync::Arc;
use tracing::{info, warn};

use super::flow::{Agent, TurnRequest};
use crate::io::{InputSource, OutputSink};

/// Importance of reviewer requests and of the notes they leave behind.
pub const REVIEW_IMPORTANCE: i32 = 1;

/// Counters from a finished [`Session::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub turns: usize,
    pub failed_turns: usize,
    pub reviewer_notes: usize,
}

pub struct Session {
    primary: Arc<Agent>,
    reviewers: Vec<Arc<Agent>>,
    input: Box<dyn InputSource>,
    output: Box<dyn OutputSink>,
}

impl Session {
    pub fn new(
        primary: Arc<Agent>,
        input: Box<dyn InputSource>,
        output: Box<dyn OutputSink>,
    ) -> Self {
        Self {
            primary,
            reviewers: Vec::new(),
            input,
            output,
        }
    }

    pub fn with_reviewers(mut self, reviewers: Vec<Arc<Agent>>) -> Self {
        self.reviewers = reviewers;
        self
    }

    pub fn primary(&self) -> &Arc<Agent> {
        &self.primary
    }

    /// Drive turns until the input source is exhausted.
    ///
    /// A failed primary turn is reported to the output sink as `Error: ...`
    /// and the session continues. Only output sink failures end it early.
    /// Outstanding delegations are awaited before returning.
    pub async fn run(&mut self) -> Result<SessionReport, String> {
        let mut report = SessionReport::default();
        info!("Session started with primary agent '{}'", self.primary.name());

        while let Some(line) = self.input.next_line().await {
            report.turns += 1;
            let reply = match self.primary.run_turn(TurnRequest::user(line)).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Turn {} failed: {e}", report.turns);
                    report.failed_turns += 1;
                    self.output.emit(&format!("Error: {e}"))?;
                    continue;
                }
            };

            report.reviewer_notes += self.review().await;
            self.output.emit(&reply)?;
        }

        self.primary.settled().await;
        info!(
            "Session ended after {} turns ({} failed)",
            report.turns, report.failed_turns
        );
        Ok(report)
    }

    /// Let each reviewer read the primary's context. Returns how many notes
    /// were added back.
    async fn review(&self) -> usize {
        let mut notes = 0;
        for reviewer in &self.reviewers {
            let context = self.primary.serialize_context();
            match reviewer
                .run_turn(TurnRequest::new(REVIEW_IMPORTANCE, Some(context)))
                .await
            {
                Ok(note) if !note.trim().is_empty() => {
                    self.primary.add_assistant_turn(REVIEW_IMPORTANCE, note);
                    notes += 1;
                }
                Ok(_) => {}
                Err(e) => warn!("Reviewer '{}' failed: {e}", reviewer.name()),
            }
        }
        notes
    }
}
