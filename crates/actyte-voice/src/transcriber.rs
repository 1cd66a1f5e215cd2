use crate::audio::AudioEncoding;
use crate::config::{ApiCredentials, DeepgramTranscriberConfig};
use crate::error::VoiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for one transcription request.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns one complete utterance into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes raw audio in the session's input format. Returns an empty
    /// string when nothing intelligible was said.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

#[derive(Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Deserialize)]
struct ListenAlternative {
    transcript: String,
}

/// Transcriber backed by Deepgram's pre-recorded `listen` endpoint.
#[derive(Debug, Clone)]
pub struct DeepgramTranscriber {
    config: DeepgramTranscriberConfig,
    credentials: ApiCredentials,
    client: Client,
}

impl DeepgramTranscriber {
    pub fn new(
        config: DeepgramTranscriberConfig,
        credentials: ApiCredentials,
    ) -> Result<Self, VoiceError> {
        let client = Client::builder().timeout(STT_TIMEOUT).build()?;
        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    fn encoding_param(&self) -> &'static str {
        match self.config.input_audio_config.audio_encoding {
            AudioEncoding::Linear16 => "linear16",
            AudioEncoding::Mulaw => "mulaw",
        }
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let url = format!(
            "{}/v1/listen",
            self.credentials.base_url.trim_end_matches('/')
        );
        let sample_rate = self.config.input_audio_config.sampling_rate.to_string();
        let response = self
            .client
            .post(url)
            .query(&[
                ("encoding", self.encoding_param()),
                ("sample_rate", sample_rate.as_str()),
                ("channels", "1"),
                ("model", self.config.model.as_str()),
                ("language", self.config.language.as_str()),
                ("punctuate", "true"),
            ])
            .header("Authorization", format!("Token {}", self.credentials.api_key))
            .header("Content-Type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!(
                "Deepgram transcription failed with {}: {}",
                status, error_text
            )));
        }

        let listen: ListenResponse = response.json().await?;
        let text = listen
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|channel| channel.alternatives.into_iter().next())
            .map(|alt| alt.transcript.trim().to_string())
            .unwrap_or_default();
        Ok(text)
    }
}
