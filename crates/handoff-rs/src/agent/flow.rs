//! A single agent: one conversation buffer, an optional delegation manager,
//! and the turn loop that ties them to an [`AgentRuntime`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::prompt::DelegationDirectives;
use super::runtime::{AgentRuntime, RuntimeRequest};
use crate::DEFAULT_MODEL;
use crate::context::{
    BufferConfig, BufferSnapshot, ConversationBuffer, DEFAULT_RESPONSE_IMPORTANCE,
    DEFAULT_USER_IMPORTANCE, Message,
};
use crate::delegation::{
    DelegationConfig, DelegationManager, Subordinate, TurnFuture, extract_handoffs,
};

/// Input used when a turn is requested without text.
pub const DEFAULT_INPUT: &str = "Continue working on the request";

// ── Settings ───────────────────────────────────────────────────────

/// Construction-time settings for an [`Agent`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    pub model: String,
    /// Added as a pinned directive when non-empty.
    pub system_prompt: String,
    /// Each entry adds a pinned `Knowledge from <entry>` directive.
    pub knowledge: Vec<String>,
    /// Importance given to the agent's own responses.
    pub response_importance: i32,
    pub buffer: BufferConfig,
    pub delegation: DelegationConfig,
}

impl AgentSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: String::new(),
            knowledge: Vec::new(),
            response_importance: DEFAULT_RESPONSE_IMPORTANCE,
            buffer: BufferConfig::default(),
            delegation: DelegationConfig::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_knowledge(mut self, entry: impl Into<String>) -> Self {
        self.knowledge.push(entry.into());
        self
    }

    pub fn with_response_importance(mut self, importance: i32) -> Self {
        self.response_importance = importance;
        self
    }

    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_delegation(mut self, delegation: DelegationConfig) -> Self {
        self.delegation = delegation;
        self
    }
}

/// One request for [`Agent::run_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub importance: i32,
    /// `None` resumes with [`DEFAULT_INPUT`].
    pub text: Option<String>,
}

impl TurnRequest {
    pub fn new(importance: i32, text: Option<String>) -> Self {
        Self { importance, text }
    }

    /// A user turn at the default user importance.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(DEFAULT_USER_IMPORTANCE, Some(text.into()))
    }

    /// Continue without new input.
    pub fn resume() -> Self {
        Self::new(DEFAULT_USER_IMPORTANCE, None)
    }
}

// ── Agent ──────────────────────────────────────────────────────────

/// An agent that owns its conversation buffer and, when it has subordinates,
/// a [`DelegationManager`].
///
/// The buffer sits behind a `Mutex` that is only held between awaits, so an
/// agent can be shared as `Arc<Agent>` and run as a subordinate of several
/// delegating agents at once.
pub struct Agent {
    name: String,
    model: String,
    response_importance: i32,
    delegation_config: DelegationConfig,
    runtime: Arc<dyn AgentRuntime>,
    buffer: Mutex<ConversationBuffer>,
    delegation: Option<DelegationManager>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("delegation", &self.delegation)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(settings: AgentSettings, runtime: Arc<dyn AgentRuntime>) -> Self {
        let mut buffer = ConversationBuffer::new(settings.buffer);
        if !settings.system_prompt.is_empty() {
            buffer.add(Message::directive(settings.system_prompt));
        }
        for entry in &settings.knowledge {
            buffer.add(Message::directive(format!("Knowledge from {entry}")));
        }
        debug!("Agent '{}' created with model {}", settings.name, settings.model);

        Self {
            name: settings.name,
            model: settings.model,
            response_importance: settings.response_importance,
            delegation_config: settings.delegation,
            runtime,
            buffer: Mutex::new(buffer),
            delegation: None,
        }
    }

    /// Give this agent subordinate agents to delegate to.
    pub fn with_subordinates(self, subordinates: Vec<Arc<Agent>>) -> Self {
        self.with_delegates(
            subordinates
                .into_iter()
                .map(|a| a as Arc<dyn Subordinate>)
                .collect(),
        )
    }

    /// Give this agent arbitrary [`Subordinate`]s. An empty list leaves the
    /// agent without a delegation manager.
    pub fn with_delegates(mut self, subordinates: Vec<Arc<dyn Subordinate>>) -> Self {
        if subordinates.is_empty() {
            return self;
        }
        let manager =
            DelegationManager::new(&self.name, subordinates, self.delegation_config.clone());
        {
            let buffer = self.buffer.get_mut().unwrap_or_else(PoisonError::into_inner);
            for directive in DelegationDirectives::new(manager.list_subordinates()).build() {
                buffer.add(Message::directive(directive));
            }
        }
        info!(
            "Agent '{}' can delegate to: {}",
            self.name,
            manager.list_subordinates().join(", ")
        );
        self.delegation = Some(manager);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn delegation(&self) -> Option<&DelegationManager> {
        self.delegation.as_ref()
    }

    /// Names of this agent's subordinates. Empty when it cannot delegate.
    pub fn list_subordinates(&self) -> Vec<String> {
        self.delegation
            .as_ref()
            .map(DelegationManager::list_subordinates)
            .unwrap_or_default()
    }

    pub fn add_directive(&self, text: impl Into<String>) {
        self.buffer().add(Message::directive(text));
    }

    pub fn add_user_turn(&self, importance: i32, text: impl Into<String>) {
        self.buffer().add(Message::user(importance, text));
    }

    pub fn add_assistant_turn(&self, importance: i32, text: impl Into<String>) {
        self.buffer().add(Message::assistant(importance, text));
    }

    /// The buffer's newline-delimited JSON wire form.
    pub fn serialize_context(&self) -> String {
        self.buffer().serialize()
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.buffer().snapshot()
    }

    /// Wait until no delegated task is pending. Returns immediately for
    /// agents without subordinates.
    pub async fn settled(&self) {
        if let Some(manager) = &self.delegation {
            manager.settled().await;
        }
    }

    /// Run one turn.
    ///
    /// Resolved delegations are folded in first, then the buffer is
    /// serialized as context and the request added. The runtime's response
    /// has its handoff annotations dispatched and stripped before it is added
    /// to the buffer and returned.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<String, String> {
        let input = request.text.unwrap_or_else(|| DEFAULT_INPUT.to_string());

        let context = {
            let mut buffer = self.buffer();
            if let Some(manager) = &self.delegation {
                manager.reconcile(&mut buffer);
            }
            let context = buffer.serialize();
            buffer.add(Message::user(request.importance, input.clone()));
            context
        };

        let response = self
            .runtime
            .respond(RuntimeRequest {
                agent: &self.name,
                model: &self.model,
                context: &context,
                input: &input,
            })
            .await
            .map_err(|e| format!("{}: {e}", self.name))?;

        let mut buffer = self.buffer();
        let cleaned = match &self.delegation {
            Some(manager) => {
                let extraction = extract_handoffs(&response);
                for handoff in extraction.handoffs {
                    manager.dispatch(&mut buffer, handoff);
                }
                extraction.cleaned
            }
            None => response,
        };
        let report = buffer.add(Message::assistant(self.response_importance, cleaned.clone()));
        if report.evicted > 0 || report.expired > 0 {
            debug!(
                "{}: {} expired, {} evicted, {} tokens held",
                self.name,
                report.expired,
                report.evicted,
                buffer.total_tokens()
            );
        }
        info!("{}: {cleaned}", self.name);
        Ok(cleaned)
    }

    fn buffer(&self) -> MutexGuard<'_, ConversationBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Subordinate for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(self: Arc<Self>, importance: i32, prompt: String) -> TurnFuture {
        Box::pin(async move {
            self.run_turn(TurnRequest::new(importance, Some(prompt)))
                .await
        })
    }
}
