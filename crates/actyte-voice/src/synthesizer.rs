use crate::audio::OutputAudioConfig;
use crate::config::{ApiCredentials, AzureSynthesizerConfig};
use crate::error::VoiceError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for one synthesis request.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Converts agent text into raw audio for the client.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Format of the audio returned by [`Synthesizer::synthesize`].
    fn output_audio_config(&self) -> &OutputAudioConfig;

    /// Renders `text` to headerless audio in the output format.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

/// Synthesizer backed by the Azure speech REST API.
#[derive(Debug, Clone)]
pub struct AzureSynthesizer {
    config: AzureSynthesizerConfig,
    credentials: ApiCredentials,
    output_format: &'static str,
    client: Client,
}

impl AzureSynthesizer {
    /// Creates a synthesizer, rejecting output formats Azure cannot produce.
    pub fn new(
        config: AzureSynthesizerConfig,
        credentials: ApiCredentials,
    ) -> Result<Self, VoiceError> {
        let output_format = config.output_format()?;
        let client = Client::builder().timeout(TTS_TIMEOUT).build()?;
        Ok(Self {
            config,
            credentials,
            output_format,
            client,
        })
    }

    /// Builds the SSML document sent to the service.
    pub fn ssml(&self, text: &str) -> String {
        format!(
            "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"en-US\">\
             <voice name=\"{}\"><prosody pitch=\"{}%\" rate=\"{}%\">{}</prosody></voice></speak>",
            escape_xml(&self.config.voice_name),
            self.config.pitch,
            self.config.rate,
            escape_xml(text)
        )
    }
}

#[async_trait]
impl Synthesizer for AzureSynthesizer {
    fn output_audio_config(&self) -> &OutputAudioConfig {
        &self.config.output_audio_config
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let url = format!(
            "{}/cognitiveservices/v1",
            self.credentials.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .header("Ocp-Apim-Subscription-Key", &self.credentials.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", self.output_format)
            .header("User-Agent", "actyte-voice")
            .body(self.ssml(text))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "Azure synthesis failed with {}: {}",
                status, error_text
            )));
        }

        let audio = response.bytes().await?;
        debug!(
            bytes = audio.len(),
            voice = %self.config.voice_name,
            "synthesized speech"
        );
        Ok(audio.to_vec())
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
