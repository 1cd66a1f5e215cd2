use crate::config::{ApiCredentials, ChatGptAgentConfig};
use crate::error::VoiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for a single chat-completions request.
const AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of user/assistant turns kept after the system prompt.
const MAX_HISTORY_MESSAGES: usize = 40;

/// Produces the conversational replies for one session.
#[async_trait]
pub trait Agent: Send {
    /// Text spoken before the human says anything, if any.
    fn initial_message(&self) -> Option<&str>;

    /// Generates the reply to one human utterance.
    async fn respond(&mut self, human_input: &str) -> Result<String, VoiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Agent backed by an OpenAI-compatible chat-completions endpoint.
///
/// Each instance owns the history of exactly one conversation.
#[derive(Debug)]
pub struct ChatGptAgent {
    config: ChatGptAgentConfig,
    credentials: ApiCredentials,
    client: Client,
    system: ChatMessage,
    history: Vec<ChatMessage>,
}

impl ChatGptAgent {
    pub fn new(config: ChatGptAgentConfig, credentials: ApiCredentials) -> Result<Self, VoiceError> {
        if config.prompt_preamble.trim().is_empty() {
            return Err(VoiceError::Config(
                "prompt preamble must not be empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(AGENT_TIMEOUT).build()?;
        let system = ChatMessage::new(ChatRole::System, config.prompt_preamble.clone());
        let history = config
            .initial_message
            .iter()
            .map(|text| ChatMessage::new(ChatRole::Assistant, text.clone()))
            .collect();

        info!(model = %config.model_name, "chat agent created");

        Ok(Self {
            config,
            credentials,
            client,
            system,
            history,
        })
    }

    /// Conversation turns so far, excluding the system prompt.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn trim_history(&mut self) {
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }
    }
}

#[async_trait]
impl Agent for ChatGptAgent {
    fn initial_message(&self) -> Option<&str> {
        self.config.initial_message.as_deref()
    }

    async fn respond(&mut self, human_input: &str) -> Result<String, VoiceError> {
        debug!("Human: {}", human_input);

        let user = ChatMessage::new(ChatRole::User, human_input);
        let url = format!(
            "{}/chat/completions",
            self.credentials.base_url.trim_end_matches('/')
        );
        let response = {
            let request = CompletionRequest {
                model: &self.config.model_name,
                messages: std::iter::once(&self.system)
                    .chain(self.history.iter())
                    .chain(std::iter::once(&user))
                    .collect(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };
            self.client
                .post(url)
                .bearer_auth(&self.credentials.api_key)
                .json(&request)
                .send()
                .await?
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Agent(format!(
                "completion request failed with {}: {}",
                status, error_text
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| VoiceError::Agent("completion returned no choices".to_string()))?;

        debug!("Agent: {}", reply);

        self.history.push(user);
        self.history
            .push(ChatMessage::new(ChatRole::Assistant, reply.clone()));
        self.trim_history();

        Ok(reply)
    }
}
