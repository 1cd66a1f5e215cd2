//! Client for pulling versioned prompts from a LangSmith-style prompt hub.
//!
//! A prompt reference has the form `[owner/]name[:commit]`. The hub returns a
//! serialized chat prompt template; the first message's template is rendered
//! with f-string semantics (`{var}` substitution, `{{` and `}}` escapes).

use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HUB_ENDPOINT: &str = "https://api.smith.langchain.com";

/// Timeout for a single hub request.
const HUB_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while pulling or rendering a remote prompt.
#[derive(Debug, Error)]
pub enum PromptHubError {
    #[error("invalid prompt reference: {0:?}")]
    InvalidReference(String),

    #[error("prompt hub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prompt hub returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected prompt manifest: {0}")]
    Manifest(String),

    #[error("invalid prompt template: {0}")]
    Template(String),
}

/// Parsed `[owner/]name[:commit]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRef {
    pub owner: String,
    pub name: String,
    pub commit: String,
}

impl FromStr for PromptRef {
    type Err = PromptHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PromptHubError::InvalidReference(s.to_string());
        let trimmed = s.trim();

        let (path, commit) = match trimmed.split_once(':') {
            Some((path, commit)) if !commit.is_empty() => (path, commit),
            Some(_) => return Err(invalid()),
            None => (trimmed, "latest"),
        };
        let (owner, name) = match path.split_once('/') {
            Some((owner, name)) => (owner, name),
            None => ("-", path),
        };

        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            commit: commit.to_string(),
        })
    }
}

impl fmt::Display for PromptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.name, self.commit)
    }
}

/// HTTP client for the prompt hub.
#[derive(Clone)]
pub struct PromptHub {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl fmt::Debug for PromptHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptHub")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl PromptHub {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, PromptHubError> {
        let client = Client::builder().timeout(HUB_TIMEOUT).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }

    /// Hub configured from `LANGSMITH_ENDPOINT` and `LANGSMITH_API_KEY`.
    pub fn from_env() -> Result<Self, PromptHubError> {
        let endpoint = std::env::var("LANGSMITH_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HUB_ENDPOINT.to_string());
        let api_key = std::env::var("LANGSMITH_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self::new(endpoint, api_key)
    }

    /// Fetches the template of the first message in the referenced prompt.
    pub async fn pull_template(&self, reference: &PromptRef) -> Result<String, PromptHubError> {
        let url = format!(
            "{}/commits/{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            reference.owner,
            reference.name,
            reference.commit
        );

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PromptHubError::Status { status, body });
        }

        let commit: Value = response.json().await?;
        tracing::debug!(prompt = %reference, "pulled prompt manifest");
        first_message_template(&commit["manifest"])
    }

    /// Pulls the referenced prompt and renders it with `vars`.
    pub async fn pull_and_render(
        &self,
        reference: &PromptRef,
        vars: &HashMap<&str, String>,
    ) -> Result<String, PromptHubError> {
        let template = self.pull_template(reference).await?;
        render_template(&template, vars)
    }
}

/// Extracts the first message template from a serialized prompt manifest.
pub fn first_message_template(manifest: &Value) -> Result<String, PromptHubError> {
    let kwargs = &manifest["kwargs"];

    if let Some(messages) = kwargs["messages"].as_array() {
        let first = messages
            .first()
            .ok_or_else(|| PromptHubError::Manifest("prompt has no messages".to_string()))?;
        return first["kwargs"]["prompt"]["kwargs"]["template"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PromptHubError::Manifest("first message has no string template".to_string())
            });
    }

    kwargs["template"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PromptHubError::Manifest("manifest has no messages or template".to_string()))
}

/// Renders an f-string style template.
///
/// # Errors
///
/// Returns [`PromptHubError::Template`] for unbalanced braces or variables
/// missing from `vars`.
pub fn render_template(template: &str, vars: &HashMap<&str, String>) -> Result<String, PromptHubError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(PromptHubError::Template(format!(
                                "unclosed placeholder {{{}",
                                name
                            )))
                        }
                    }
                }
                let value = vars.get(name.trim()).ok_or_else(|| {
                    PromptHubError::Template(format!("missing variable {:?}", name))
                })?;
                out.push_str(value);
            }
            '}' => {
                return Err(PromptHubError::Template(
                    "single '}' encountered in template".to_string(),
                ))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
