//! Non-blocking delegation of work to subordinate agents.
//!
//! A [`DelegationManager`] belongs to one delegating agent. It launches each
//! [`HandoffRequest`] on a subordinate as a background Tokio task and records
//! the task in a lock-guarded table. Background completions only ever write to
//! that table; the delegating agent folds results into its own buffer at the
//! start of its next turn via [`reconcile`](DelegationManager::reconcile).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::extract::HandoffRequest;
use crate::context::{ConversationBuffer, Message};

/// Boxed future returned by [`Subordinate::handle`].
pub type TurnFuture = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'static>>;

/// Something a [`DelegationManager`] can hand work to.
///
/// Implemented by [`Agent`](crate::agent::Agent); tests use scripted doubles.
pub trait Subordinate: Send + Sync {
    /// Name used in handoff annotations.
    fn name(&self) -> &str;

    /// Run one turn with `prompt` as the request at the given importance.
    fn handle(self: Arc<Self>, importance: i32, prompt: String) -> TurnFuture;
}

// ── Config ─────────────────────────────────────────────────────────

/// Importances and preview lengths for the notes a manager writes into its
/// owner's buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Note for a request missing its subordinate name or prompt.
    pub invalid_note_importance: i32,
    /// Note for a request naming an unknown subordinate.
    pub unknown_note_importance: i32,
    /// Acknowledgement added when a task is launched.
    pub ack_importance: i32,
    /// Prompt characters quoted in the acknowledgement.
    pub ack_preview_chars: usize,
    /// Combined status note for pending tasks.
    pub status_importance: i32,
    /// Prompt characters quoted per task in the status note.
    pub status_preview_chars: usize,
    /// Note for a failed task.
    pub failure_importance: i32,
    /// Importance of the request a subordinate receives.
    pub subordinate_request_importance: i32,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            invalid_note_importance: 5,
            unknown_note_importance: 5,
            ack_importance: 2,
            ack_preview_chars: 50,
            status_importance: 1,
            status_preview_chars: 30,
            failure_importance: 5,
            subordinate_request_importance: 10,
        }
    }
}

// ── Tasks ──────────────────────────────────────────────────────────

/// Identifier of a delegated task. Strictly increasing per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

/// One unit of delegated work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationTask {
    pub id: TaskId,
    pub subordinate: String,
    pub prompt: String,
    pub status: TaskStatus,
    /// Output on success, error description on failure. `None` while pending.
    pub result: Option<String>,
}

/// A task id lives in exactly one of the two maps until it is reconciled.
#[derive(Debug, Default)]
struct TaskTable {
    pending: BTreeMap<TaskId, DelegationTask>,
    resolved: BTreeMap<TaskId, DelegationTask>,
}

impl TaskTable {
    fn resolve(&mut self, id: TaskId, status: TaskStatus, result: String) {
        match self.pending.remove(&id) {
            Some(mut task) => {
                task.status = status;
                task.result = Some(result);
                self.resolved.insert(id, task);
            }
            None => warn!("Resolution for unknown {id} dropped"),
        }
    }
}

fn lock(table: &Mutex<TaskTable>) -> MutexGuard<'_, TaskTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of one [`DelegationManager::reconcile`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tasks still pending (covered by the status note, if any).
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

// ── Manager ────────────────────────────────────────────────────────

/// Tracks in-flight and resolved delegations for one delegating agent.
pub struct DelegationManager {
    owner: String,
    subordinates: Vec<Arc<dyn Subordinate>>,
    config: DelegationConfig,
    table: Arc<Mutex<TaskTable>>,
    next_id: AtomicU64,
    completions: Arc<Notify>,
}

impl fmt::Debug for DelegationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationManager")
            .field("owner", &self.owner)
            .field("subordinates", &self.list_subordinates())
            .field("pending", &self.pending_count())
            .field("resolved", &self.resolved_count())
            .finish()
    }
}

impl DelegationManager {
    pub fn new(
        owner: impl Into<String>,
        subordinates: Vec<Arc<dyn Subordinate>>,
        config: DelegationConfig,
    ) -> Self {
        Self {
            owner: owner.into(),
            subordinates,
            config,
            table: Arc::new(Mutex::new(TaskTable::default())),
            next_id: AtomicU64::new(1),
            completions: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &DelegationConfig {
        &self.config
    }

    /// Subordinate names in registration order.
    pub fn list_subordinates(&self) -> Vec<String> {
        self.subordinates
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.table).pending.len()
    }

    pub fn resolved_count(&self) -> usize {
        lock(&self.table).resolved.len()
    }

    /// Copies of the pending tasks in id order.
    pub fn pending_tasks(&self) -> Vec<DelegationTask> {
        lock(&self.table).pending.values().cloned().collect()
    }

    /// Launch `request` on its subordinate without waiting for it.
    ///
    /// Invalid requests and unknown names leave a note in `buffer` and return
    /// `None`. Must be called from within a Tokio runtime.
    pub fn dispatch(
        &self,
        buffer: &mut ConversationBuffer,
        request: HandoffRequest,
    ) -> Option<TaskId> {
        if request.subagent.is_empty() || request.prompt.is_empty() {
            debug!("{}: rejected handoff with missing fields", self.owner);
            buffer.add(Message::assistant(
                self.config.invalid_note_importance,
                "Invalid handoff format; missing 'subagent' or 'prompt'.",
            ));
            return None;
        }

        let Some(subordinate) = self
            .subordinates
            .iter()
            .find(|s| s.name() == request.subagent)
            .map(Arc::clone)
        else {
            warn!(
                "{}: handoff to unknown subordinate '{}'",
                self.owner, request.subagent
            );
            buffer.add(Message::assistant(
                self.config.unknown_note_importance,
                format!(
                    "Subagent '{}' not found. Available: {}",
                    request.subagent,
                    self.list_subordinates().join(", ")
                ),
            ));
            return None;
        };

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.table).pending.insert(
            id,
            DelegationTask {
                id,
                subordinate: request.subagent.clone(),
                prompt: request.prompt.clone(),
                status: TaskStatus::Pending,
                result: None,
            },
        );
        buffer.add(Message::assistant(
            self.config.ack_importance,
            format!(
                "Task successfully delegated to {}: \"{}\"",
                request.subagent,
                preview(&request.prompt, self.config.ack_preview_chars)
            ),
        ));
        info!("{}: delegated {id} to {}", self.owner, request.subagent);

        let table = Arc::clone(&self.table);
        let completions = Arc::clone(&self.completions);
        let importance = self.config.subordinate_request_importance;
        let name = request.subagent;
        let work = subordinate.handle(importance, request.prompt);

        tokio::spawn(async move {
            // Run the turn as its own task so a panic surfaces as a JoinError.
            let (status, result) = match tokio::spawn(work).await {
                Ok(Ok(output)) => (TaskStatus::Completed, output),
                Ok(Err(e)) => (TaskStatus::Failed, format!("Error: {e}")),
                Err(e) if e.is_panic() => (
                    TaskStatus::Failed,
                    "Error: subordinate panicked".to_string(),
                ),
                Err(e) => (TaskStatus::Failed, format!("Error: {e}")),
            };
            match status {
                TaskStatus::Failed => warn!("{id} for {name} failed: {result}"),
                _ => debug!("{id} for {name} completed ({} chars)", result.len()),
            }
            lock(&table).resolve(id, status, result);
            completions.notify_waiters();
        });

        Some(id)
    }

    /// Fold delegation state into `buffer`: one status note covering all
    /// pending tasks, then every resolved task in id order. Resolved records
    /// are deleted.
    pub fn reconcile(&self, buffer: &mut ConversationBuffer) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let (status_note, resolved) = {
            let mut table = lock(&self.table);
            report.pending = table.pending.len();
            let status_note = (!table.pending.is_empty()).then(|| {
                let mut note = String::from("Currently processing:\n");
                for task in table.pending.values() {
                    note.push_str(&format!(
                        "- Task for {}: \"{}\"\n",
                        task.subordinate,
                        preview(&task.prompt, self.config.status_preview_chars)
                    ));
                }
                note
            });
            (status_note, std::mem::take(&mut table.resolved))
        };

        if let Some(note) = status_note {
            buffer.add(Message::assistant(self.config.status_importance, note));
        }

        for task in resolved.into_values() {
            let result = task.result.unwrap_or_default();
            match task.status {
                TaskStatus::Completed => {
                    report.completed += 1;
                    buffer.add(Message::directive(format!(
                        "Response from {}: {result}",
                        task.subordinate
                    )));
                }
                _ => {
                    report.failed += 1;
                    buffer.add(Message::assistant(
                        self.config.failure_importance,
                        format!("Task for {} failed: {result}", task.subordinate),
                    ));
                }
            }
        }

        if report != ReconcileReport::default() {
            debug!(
                "{}: reconciled {} completed, {} failed, {} pending",
                self.owner, report.completed, report.failed, report.pending
            );
        }
        report
    }

    /// Wait until no task is pending.
    pub async fn settled(&self) {
        loop {
            let notified = self.completions.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// First `max_chars` characters of `text`, with `...` when cut.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text.get(..cut).unwrap_or(text)),
        None => text.to_string(),
    }
}
