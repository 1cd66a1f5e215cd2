//! Persona resolution from environment variables.
//!
//! The system prompt comes from one of two sources, checked in order:
//!
//! 1. `LANGSMITH_SYSTEM_PROMPT`: a prompt hub reference, pulled and rendered
//!    with the current date.
//! 2. `SYSTEM_PROMPT`: the prompt text itself.
//!
//! At least one must be defined. When a defined source is empty the default
//! prompt is used. `INITIAL_MESSAGE` sets the greeting.

use crate::prompt_hub::{PromptHub, PromptHubError, PromptRef};
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

pub const LANGSMITH_SYSTEM_PROMPT_VAR: &str = "LANGSMITH_SYSTEM_PROMPT";
pub const SYSTEM_PROMPT_VAR: &str = "SYSTEM_PROMPT";
pub const INITIAL_MESSAGE_VAR: &str = "INITIAL_MESSAGE";

pub const DEFAULT_INITIAL_MESSAGE: &str = "Hello!";
pub const DEFAULT_PROMPT: &str = "Have a pleasant conversation about life";

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("Either 'LANGSMITH_SYSTEM_PROMPT' or 'SYSTEM_PROMPT' must be defined in the environment.")]
    MissingPrompt,

    #[error(transparent)]
    Hub(#[from] PromptHubError),

    #[error("remote prompt {0} rendered to empty text")]
    EmptyPrompt(String),
}

/// Snapshot of the persona-related environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVars {
    pub langsmith_system_prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub initial_message: Option<String>,
}

/// Where the system prompt will come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Remote(String),
    Literal(String),
    Default,
}

/// The persona handed to every new conversation's agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaConfig {
    pub initial_message: String,
    pub prompt_preamble: String,
}

impl PromptVars {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            langsmith_system_prompt: lookup(LANGSMITH_SYSTEM_PROMPT_VAR),
            system_prompt: lookup(SYSTEM_PROMPT_VAR),
            initial_message: lookup(INITIAL_MESSAGE_VAR),
        }
    }

    /// True when both prompt sources are defined and non-empty.
    pub fn both_defined(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.langsmith_system_prompt) && set(&self.system_prompt)
    }

    /// Picks the prompt source, applying precedence.
    ///
    /// # Errors
    ///
    /// Returns [`PersonaError::MissingPrompt`] when neither variable is defined.
    pub fn source(&self) -> Result<PromptSource, PersonaError> {
        if self.langsmith_system_prompt.is_none() && self.system_prompt.is_none() {
            return Err(PersonaError::MissingPrompt);
        }

        if self.both_defined() {
            tracing::info!(
                "Both '{}' and '{}' are defined. '{}' will be used.",
                LANGSMITH_SYSTEM_PROMPT_VAR,
                SYSTEM_PROMPT_VAR,
                LANGSMITH_SYSTEM_PROMPT_VAR
            );
        }

        let source = match (&self.langsmith_system_prompt, &self.system_prompt) {
            (Some(reference), _) if !reference.is_empty() => PromptSource::Remote(reference.clone()),
            (_, Some(text)) if !text.is_empty() => PromptSource::Literal(text.clone()),
            _ => PromptSource::Default,
        };
        Ok(source)
    }

    pub fn initial_message(&self) -> String {
        self.initial_message
            .clone()
            .unwrap_or_else(|| DEFAULT_INITIAL_MESSAGE.to_string())
    }
}

/// Variables available to remote prompt templates.
pub fn template_vars(today: NaiveDate) -> HashMap<&'static str, String> {
    HashMap::from([
        ("current_date", today.format("%Y-%m-%d").to_string()),
        ("question", String::new()),
    ])
}

/// Resolves the persona once at startup.
///
/// # Errors
///
/// Fails when no prompt variable is defined or the remote prompt cannot be
/// pulled and rendered.
pub async fn resolve_persona(
    vars: &PromptVars,
    hub: &PromptHub,
    today: NaiveDate,
) -> Result<PersonaConfig, PersonaError> {
    let prompt_preamble = match vars.source()? {
        PromptSource::Remote(reference) => {
            let parsed: PromptRef = reference.parse()?;
            let rendered = hub.pull_and_render(&parsed, &template_vars(today)).await?;
            if rendered.trim().is_empty() {
                return Err(PersonaError::EmptyPrompt(reference));
            }
            tracing::info!(prompt = %parsed, "using remote system prompt");
            rendered
        }
        PromptSource::Literal(text) => {
            tracing::info!("using system prompt from {}", SYSTEM_PROMPT_VAR);
            text
        }
        PromptSource::Default => {
            tracing::warn!("prompt variable is empty, using default system prompt");
            DEFAULT_PROMPT.to_string()
        }
    };

    Ok(PersonaConfig {
        initial_message: vars.initial_message(),
        prompt_preamble,
    })
}
