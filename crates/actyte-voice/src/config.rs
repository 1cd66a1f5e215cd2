use crate::audio::{AudioEncoding, InputAudioConfig, OutputAudioConfig};
use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com";
pub const DEFAULT_AZURE_VOICE_NAME: &str = "en-US-SteffanNeural";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

fn default_model_name() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

/// Base URL and key for one hosted provider.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Reads the API key from `key_var`.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] if the variable is unset or empty.
    pub fn from_env(key_var: &str, base_url: impl Into<String>) -> Result<Self, VoiceError> {
        match std::env::var(key_var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(base_url, key)),
            _ => Err(VoiceError::Config(format!("{} is not set", key_var))),
        }
    }

    /// OpenAI credentials from `OPENAI_API_KEY`.
    pub fn openai_from_env() -> Result<Self, VoiceError> {
        Self::from_env("OPENAI_API_KEY", DEFAULT_OPENAI_BASE_URL)
    }

    /// Azure speech credentials from `AZURE_SPEECH_KEY` and `AZURE_SPEECH_REGION`.
    pub fn azure_from_env() -> Result<Self, VoiceError> {
        let region = std::env::var("AZURE_SPEECH_REGION")
            .ok()
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| VoiceError::Config("AZURE_SPEECH_REGION is not set".to_string()))?;
        Self::from_env("AZURE_SPEECH_KEY", azure_base_url(&region))
    }

    /// Deepgram credentials from `DEEPGRAM_API_KEY`.
    pub fn deepgram_from_env() -> Result<Self, VoiceError> {
        Self::from_env("DEEPGRAM_API_KEY", DEFAULT_DEEPGRAM_BASE_URL)
    }
}

/// Regional Azure text-to-speech endpoint.
pub fn azure_base_url(region: &str) -> String {
    format!("https://{}.tts.speech.microsoft.com", region)
}

/// Persona and sampling settings for the chat-completions agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatGptAgentConfig {
    /// Spoken by the agent as soon as the conversation starts.
    pub initial_message: Option<String>,
    /// System prompt sent ahead of the conversation history.
    pub prompt_preamble: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl ChatGptAgentConfig {
    pub fn new(initial_message: Option<String>, prompt_preamble: impl Into<String>) -> Self {
        Self {
            initial_message,
            prompt_preamble: prompt_preamble.into(),
            model_name: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }
}

/// Voice and output format for Azure speech synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureSynthesizerConfig {
    pub voice_name: String,
    /// Pitch shift in percent.
    pub pitch: i32,
    /// Speaking rate change in percent.
    pub rate: i32,
    pub output_audio_config: OutputAudioConfig,
}

impl AzureSynthesizerConfig {
    /// Builds a synthesizer config that produces audio in the format the
    /// client asked for.
    pub fn from_output_audio_config(
        output_audio_config: &OutputAudioConfig,
        voice_name: impl Into<String>,
    ) -> Self {
        Self {
            voice_name: voice_name.into(),
            pitch: 0,
            rate: 15,
            output_audio_config: output_audio_config.clone(),
        }
    }

    /// The `X-Microsoft-OutputFormat` value for the configured output.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::UnsupportedAudio`] for rate/encoding pairs the
    /// service cannot produce as raw audio.
    pub fn output_format(&self) -> Result<&'static str, VoiceError> {
        let OutputAudioConfig {
            sampling_rate,
            audio_encoding,
        } = self.output_audio_config;
        match (audio_encoding, sampling_rate) {
            (AudioEncoding::Mulaw, 8_000) => Ok("raw-8khz-8bit-mono-mulaw"),
            (AudioEncoding::Linear16, 8_000) => Ok("raw-8khz-16bit-mono-pcm"),
            (AudioEncoding::Linear16, 16_000) => Ok("raw-16khz-16bit-mono-pcm"),
            (AudioEncoding::Linear16, 22_050) => Ok("raw-22050hz-16bit-mono-pcm"),
            (AudioEncoding::Linear16, 24_000) => Ok("raw-24khz-16bit-mono-pcm"),
            (AudioEncoding::Linear16, 44_100) => Ok("raw-44100hz-16bit-mono-pcm"),
            (AudioEncoding::Linear16, 48_000) => Ok("raw-48khz-16bit-mono-pcm"),
            (encoding, rate) => Err(VoiceError::UnsupportedAudio(format!(
                "azure cannot synthesize {:?} at {} Hz",
                encoding, rate
            ))),
        }
    }
}

/// Settings for Deepgram pre-recorded transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepgramTranscriberConfig {
    pub input_audio_config: InputAudioConfig,
    pub model: String,
    pub language: String,
}

impl DeepgramTranscriberConfig {
    pub fn from_input_audio_config(input_audio_config: &InputAudioConfig) -> Self {
        Self {
            input_audio_config: input_audio_config.clone(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
        }
    }
}
