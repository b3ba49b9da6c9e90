//! TOML configuration for an agent tree and the session around it.
//!
//! ```toml
//! model = "openai/gpt-4o-mini"
//! input = "user_cli"        # user_cli | file | none
//! output = "console"        # console | file | none
//!
//! [buffer]
//! max_context_tokens = 128000
//!
//! [[agents]]
//! name = "lead"
//! system_prompt = "You coordinate a small team."
//!
//!   [[agents.subagents]]
//!   name = "research"
//!   system_prompt = "You find sources."
//!
//! [[agents]]
//! name = "critic"
//! system_prompt = "Point out mistakes in the conversation you are shown."
//! ```
//!
//! The first top-level agent is the primary. Any further top-level agents are
//! reviewers for the [`Session`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::DEFAULT_MODEL;
use crate::agent::{Agent, AgentRuntime, AgentSettings, Session};
use crate::api::RetryConfig;
use crate::context::BufferConfig;
use crate::delegation::DelegationConfig;
use crate::io::{
    ConsoleOutput, DEFAULT_PROMPT, FileInput, FileOutput, InputSource, NoInput, NoOutput,
    OutputSink, StdinInput,
};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "agents.toml";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    UserCli,
    File,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Console,
    File,
    None,
}

/// Settings for the bundled OpenRouter runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            max_retries: 2,
        }
    }
}

impl RuntimeSection {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_retries(self.max_retries)
    }
}

/// One agent in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    /// Falls back to the top-level `model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub knowledge: Vec<String>,
    #[serde(default)]
    pub subagents: Vec<AgentSpec>,
}

/// The whole config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub input: InputKind,
    #[serde(default)]
    pub input_file: Option<PathBuf>,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub output: OutputKind,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub delegation: DelegationConfig,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

impl SessionConfig {
    /// Load and validate configuration from a file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        info!(
            "Loaded {} top-level agents from {}",
            config.agents.len(),
            path.display()
        );
        Ok(config)
    }

    /// Check structural constraints that serde can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[agents]] entry is required".into(),
            ));
        }
        validate_siblings(&self.agents, "top level")?;

        let threshold = self.buffer.clean_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "buffer.clean_threshold must be in (0, 1]".into(),
            ));
        }
        if self.buffer.chars_per_token <= 0.0 || !self.buffer.chars_per_token.is_finite() {
            return Err(ConfigError::ValidationError(
                "buffer.chars_per_token must be > 0".into(),
            ));
        }
        if self.buffer.max_context_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "buffer.max_context_tokens must be > 0".into(),
            ));
        }
        if self.input == InputKind::File && self.input_file.is_none() {
            return Err(ConfigError::ValidationError(
                "input = \"file\" requires input_file".into(),
            ));
        }
        if self.output == OutputKind::File && self.output_file.is_none() {
            return Err(ConfigError::ValidationError(
                "output = \"file\" requires output_file".into(),
            ));
        }
        Ok(())
    }

    /// Build every top-level agent (and its subtree). The first is the
    /// primary.
    pub fn build_agents(&self, runtime: &Arc<dyn AgentRuntime>) -> Vec<Arc<Agent>> {
        self.agents
            .iter()
            .map(|spec| self.build_agent(spec, runtime))
            .collect()
    }

    fn build_agent(&self, spec: &AgentSpec, runtime: &Arc<dyn AgentRuntime>) -> Arc<Agent> {
        let subordinates = spec
            .subagents
            .iter()
            .map(|sub| self.build_agent(sub, runtime))
            .collect();

        let mut settings = AgentSettings::new(&spec.name)
            .with_model(spec.model.as_deref().unwrap_or(&self.model))
            .with_system_prompt(&spec.system_prompt)
            .with_buffer(self.buffer.clone())
            .with_delegation(self.delegation.clone());
        for entry in &spec.knowledge {
            settings = settings.with_knowledge(entry);
        }

        Arc::new(Agent::new(settings, Arc::clone(runtime)).with_subordinates(subordinates))
    }

    pub fn build_input(&self) -> Result<Box<dyn InputSource>, ConfigError> {
        Ok(match (self.input, &self.input_file) {
            (InputKind::UserCli, _) => Box::new(StdinInput::new(&self.prompt)),
            (InputKind::File, Some(path)) => {
                Box::new(FileInput::open(path).map_err(ConfigError::ValidationError)?)
            }
            (InputKind::File, None) => {
                return Err(ConfigError::ValidationError(
                    "input = \"file\" requires input_file".into(),
                ));
            }
            (InputKind::None, _) => Box::new(NoInput),
        })
    }

    pub fn build_output(&self) -> Result<Box<dyn OutputSink>, ConfigError> {
        Ok(match (self.output, &self.output_file) {
            (OutputKind::Console, _) => Box::new(ConsoleOutput),
            (OutputKind::File, Some(path)) => {
                Box::new(FileOutput::append(path).map_err(ConfigError::ValidationError)?)
            }
            (OutputKind::File, None) => {
                return Err(ConfigError::ValidationError(
                    "output = \"file\" requires output_file".into(),
                ));
            }
            (OutputKind::None, _) => Box::new(NoOutput),
        })
    }

    /// Build the agent tree and wire it into a [`Session`].
    pub fn build_session(&self, runtime: Arc<dyn AgentRuntime>) -> Result<Session, ConfigError> {
        let mut agents = self.build_agents(&runtime).into_iter();
        let primary = agents
            .next()
            .ok_or_else(|| ConfigError::ValidationError("no agents configured".into()))?;
        Ok(
            Session::new(primary, self.build_input()?, self.build_output()?)
                .with_reviewers(agents.collect()),
        )
    }
}

/// Names must be non-empty and unique among siblings, recursively.
fn validate_siblings(agents: &[AgentSpec], parent: &str) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for agent in agents {
        if agent.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "agent with empty name under {parent}"
            )));
        }
        if !seen.insert(agent.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate agent name '{}' under {parent}",
                agent.name
            )));
        }
        validate_siblings(&agent.subagents, &format!("'{}'", agent.name))?;
    }
    Ok(())
}
