//! Websocket conversation endpoint.
//!
//! The router is parameterized by factory closures: each new session builds
//! its own agent, synthesizer and transcriber, so no pipeline state is shared
//! between callers.
//!
//! Session protocol (JSON text frames tagged by `type`):
//!
//! 1. client sends `websocket_audio_config_start` with its audio formats;
//! 2. server answers `websocket_ready` and speaks the agent's greeting;
//! 3. client streams `websocket_audio` chunks (base64); each completed
//!    utterance is transcribed, answered and spoken back as `websocket_audio`;
//! 4. either side ends with `websocket_stop`.
//!
//! With `subscribe_transcript` set, both sides of the dialogue are also sent
//! as `websocket_transcript` messages.

use actyte_voice::audio::{chunk_audio, decode_samples, rms};
use actyte_voice::{
    Agent, ApiCredentials, AudioEncoding, DeepgramTranscriber, DeepgramTranscriberConfig,
    InputAudioConfig, OutputAudioConfig, Synthesizer, Transcriber, VoiceError,
};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    routing::get,
    Router,
};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_CONVERSATION_ENDPOINT: &str = "/api/python/conversation";

/// Length of each outbound audio frame.
const OUTPUT_CHUNK_MILLIS: u32 = 100;

pub type AgentFactory = Arc<dyn Fn() -> Result<Box<dyn Agent>, VoiceError> + Send + Sync>;
pub type SynthesizerFactory =
    Arc<dyn Fn(&OutputAudioConfig) -> Result<Box<dyn Synthesizer>, VoiceError> + Send + Sync>;
pub type TranscriberFactory =
    Arc<dyn Fn(&InputAudioConfig) -> Result<Box<dyn Transcriber>, VoiceError> + Send + Sync>;

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "websocket_audio_config_start")]
    AudioConfigStart {
        input_audio_config: InputAudioConfig,
        output_audio_config: OutputAudioConfig,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        subscribe_transcript: Option<bool>,
    },
    #[serde(rename = "websocket_audio")]
    Audio { data: String },
    #[serde(rename = "websocket_stop")]
    Stop,
}

/// Who said a transcribed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Bot,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "websocket_ready")]
    Ready,
    #[serde(rename = "websocket_audio")]
    Audio { data: String },
    #[serde(rename = "websocket_transcript")]
    Transcript {
        text: String,
        sender: Speaker,
        timestamp: f64,
    },
    #[serde(rename = "websocket_stop")]
    Stop,
}

/// Silence-based utterance segmentation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointingConfig {
    /// RMS amplitude (16-bit sample units) above which a chunk counts as speech.
    pub energy_threshold: f64,
    /// Trailing silence that closes an utterance.
    pub silence_millis: u32,
    /// Hard cap on one utterance.
    pub max_utterance_millis: u32,
}

impl Default for EndpointingConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 500.0,
            silence_millis: 600,
            max_utterance_millis: 30_000,
        }
    }
}

/// Buffers inbound audio and yields complete utterances.
///
/// Leading silence is dropped; once speech is heard, audio is buffered until
/// enough trailing silence accumulates or the utterance hits its cap.
#[derive(Debug)]
pub struct Endpointer {
    config: EndpointingConfig,
    encoding: AudioEncoding,
    sampling_rate: u32,
    buffer: Vec<u8>,
    heard_speech: bool,
    trailing_silence_millis: f64,
}

impl Endpointer {
    pub fn new(config: EndpointingConfig, input: &InputAudioConfig) -> Self {
        Self {
            config,
            encoding: input.audio_encoding,
            sampling_rate: input.sampling_rate.max(1),
            buffer: Vec::new(),
            heard_speech: false,
            trailing_silence_millis: 0.0,
        }
    }

    fn millis_of(&self, bytes: usize) -> f64 {
        let samples = bytes / self.encoding.bytes_per_sample();
        samples as f64 * 1000.0 / self.sampling_rate as f64
    }

    /// Feeds one chunk; returns the buffered utterance once it is complete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, VoiceError> {
        let samples = decode_samples(chunk, self.encoding)?;
        let is_speech = rms(&samples) >= self.config.energy_threshold;

        if is_speech {
            self.heard_speech = true;
            self.trailing_silence_millis = 0.0;
        } else if self.heard_speech {
            self.trailing_silence_millis += self.millis_of(chunk.len());
        } else {
            return Ok(None);
        }
        self.buffer.extend_from_slice(chunk);

        let complete = self.trailing_silence_millis >= self.config.silence_millis as f64
            || self.millis_of(self.buffer.len()) >= self.config.max_utterance_millis as f64;
        if complete {
            self.heard_speech = false;
            self.trailing_silence_millis = 0.0;
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }
        Ok(None)
    }
}

/// Registers the conversation websocket and builds per-session pipelines.
#[derive(Clone)]
pub struct ConversationRouter {
    agent_factory: AgentFactory,
    synthesizer_factory: SynthesizerFactory,
    transcriber_factory: TranscriberFactory,
    conversation_endpoint: String,
    endpointing: EndpointingConfig,
}

impl std::fmt::Debug for ConversationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRouter")
            .field("conversation_endpoint", &self.conversation_endpoint)
            .field("endpointing", &self.endpointing)
            .finish_non_exhaustive()
    }
}

/// Deepgram transcriber using credentials from the environment.
pub fn deepgram_transcriber(
    input: &InputAudioConfig,
) -> Result<Box<dyn Transcriber>, VoiceError> {
    let transcriber = DeepgramTranscriber::new(
        DeepgramTranscriberConfig::from_input_audio_config(input),
        ApiCredentials::deepgram_from_env()?,
    )?;
    Ok(Box::new(transcriber))
}

impl ConversationRouter {
    pub fn new<A, S>(agent_factory: A, synthesizer_factory: S) -> Self
    where
        A: Fn() -> Result<Box<dyn Agent>, VoiceError> + Send + Sync + 'static,
        S: Fn(&OutputAudioConfig) -> Result<Box<dyn Synthesizer>, VoiceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            agent_factory: Arc::new(agent_factory),
            synthesizer_factory: Arc::new(synthesizer_factory),
            transcriber_factory: Arc::new(deepgram_transcriber),
            conversation_endpoint: DEFAULT_CONVERSATION_ENDPOINT.to_string(),
            endpointing: EndpointingConfig::default(),
        }
    }

    pub fn with_transcriber_factory<T>(mut self, transcriber_factory: T) -> Self
    where
        T: Fn(&InputAudioConfig) -> Result<Box<dyn Transcriber>, VoiceError>
            + Send
            + Sync
            + 'static,
    {
        self.transcriber_factory = Arc::new(transcriber_factory);
        self
    }

    pub fn with_conversation_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.conversation_endpoint = endpoint.into();
        self
    }

    pub fn with_endpointing(mut self, endpointing: EndpointingConfig) -> Self {
        self.endpointing = endpointing;
        self
    }

    pub fn conversation_endpoint(&self) -> &str {
        &self.conversation_endpoint
    }

    /// Builds the routes serving the endpoint with and without a trailing slash.
    pub fn into_router<St>(self) -> Router<St>
    where
        St: Clone + Send + Sync + 'static,
    {
        let base = self.conversation_endpoint.trim_end_matches('/').to_string();
        let this = Arc::new(self);

        let handler = move |ws: WebSocketUpgrade| {
            let this = this.clone();
            async move { ws.on_upgrade(move |socket| this.run_session(socket)) }
        };

        Router::new()
            .route(&base, get(handler.clone()))
            .route(&format!("{}/", base), get(handler))
    }

    fn build_session(&self, start: SessionStart) -> Result<Session, VoiceError> {
        let agent = (self.agent_factory)()?;
        let synthesizer = (self.synthesizer_factory)(&start.output_audio_config)?;
        let transcriber = (self.transcriber_factory)(&start.input_audio_config)?;
        Ok(Session {
            id: start.conversation_id,
            agent,
            synthesizer,
            transcriber,
            endpointer: Endpointer::new(self.endpointing, &start.input_audio_config),
            input_encoding: start.input_audio_config.audio_encoding,
            subscribe_transcript: start.subscribe_transcript,
        })
    }

    async fn run_session(self: Arc<Self>, mut socket: WebSocket) {
        let start = match first_client_message(&mut socket).await {
            Some(ClientMessage::AudioConfigStart {
                input_audio_config,
                output_audio_config,
                conversation_id,
                subscribe_transcript,
            }) => SessionStart {
                conversation_id: conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                input_audio_config,
                output_audio_config,
                subscribe_transcript: subscribe_transcript.unwrap_or(false),
            },
            Some(other) => {
                tracing::warn!(?other, "conversation must begin with audio config, closing");
                return;
            }
            None => return,
        };

        let conversation_id = start.conversation_id.clone();
        let mut session = match self.build_session(start) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    "failed to build conversation pipeline: {}",
                    e
                );
                let _ = send(&mut socket, &ServerMessage::Stop).await;
                return;
            }
        };

        tracing::info!(conversation_id = %session.id, "conversation started");

        if let Err(e) = session.run(&mut socket).await {
            tracing::debug!(conversation_id = %session.id, "conversation socket error: {}", e);
        }

        tracing::info!(conversation_id = %session.id, "conversation ended");
    }
}

struct SessionStart {
    conversation_id: String,
    input_audio_config: InputAudioConfig,
    output_audio_config: OutputAudioConfig,
    subscribe_transcript: bool,
}

struct Session {
    id: String,
    agent: Box<dyn Agent>,
    synthesizer: Box<dyn Synthesizer>,
    transcriber: Box<dyn Transcriber>,
    endpointer: Endpointer,
    input_encoding: AudioEncoding,
    subscribe_transcript: bool,
}

impl Session {
    async fn run(&mut self, socket: &mut WebSocket) -> Result<(), axum::Error> {
        send(socket, &ServerMessage::Ready).await?;

        if let Some(greeting) = self.agent.initial_message().map(str::to_string) {
            if !greeting.is_empty() {
                self.speak(socket, &greeting).await?;
            }
        }

        while let Some(message) = next_client_message(socket).await {
            match message {
                ClientMessage::Audio { data } => {
                    let chunk = match base64::engine::general_purpose::STANDARD.decode(&data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            tracing::warn!(conversation_id = %self.id, "invalid base64 audio: {}", e);
                            continue;
                        }
                    };
                    match self.endpointer.push(&chunk) {
                        Ok(Some(utterance)) => self.take_turn(socket, &utterance).await?,
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                conversation_id = %self.id,
                                encoding = ?self.input_encoding,
                                "dropping undecodable audio: {}",
                                e
                            );
                        }
                    }
                }
                ClientMessage::Stop => {
                    send(socket, &ServerMessage::Stop).await?;
                    break;
                }
                ClientMessage::AudioConfigStart { .. } => {
                    tracing::warn!(conversation_id = %self.id, "ignoring repeated audio config");
                }
            }
        }

        Ok(())
    }

    /// Transcribes, answers and speaks one utterance. Provider failures skip
    /// the turn; only socket failures end the session.
    async fn take_turn(&mut self, socket: &mut WebSocket, utterance: &[u8]) -> Result<(), axum::Error> {
        let heard = match self.transcriber.transcribe(utterance).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(conversation_id = %self.id, "transcription failed: {}", e);
                return Ok(());
            }
        };
        if heard.is_empty() {
            return Ok(());
        }

        tracing::debug!(conversation_id = %self.id, "Human: {}", heard);
        if self.subscribe_transcript {
            send(socket, &transcript(&heard, Speaker::Human)).await?;
        }

        let reply = match self.agent.respond(&heard).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(conversation_id = %self.id, "agent failed to respond: {}", e);
                return Ok(());
            }
        };
        if reply.is_empty() {
            return Ok(());
        }

        self.speak(socket, &reply).await
    }

    async fn speak(&mut self, socket: &mut WebSocket, text: &str) -> Result<(), axum::Error> {
        let audio = match self.synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(conversation_id = %self.id, "synthesis failed: {}", e);
                return Ok(());
            }
        };

        if self.subscribe_transcript {
            send(socket, &transcript(text, Speaker::Bot)).await?;
        }

        let output = self.synthesizer.output_audio_config().clone();
        for chunk in chunk_audio(&audio, &output, OUTPUT_CHUNK_MILLIS) {
            let data = base64::engine::general_purpose::STANDARD.encode(chunk);
            send(socket, &ServerMessage::Audio { data }).await?;
        }
        Ok(())
    }
}

fn transcript(text: &str, sender: Speaker) -> ServerMessage {
    ServerMessage::Transcript {
        text: text.to_string(),
        sender,
        timestamp: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
    }
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(payload.into())).await
}

/// The opening frame of a session. Anything but a parseable text message
/// yields `None`, which ends the session.
async fn first_client_message(socket: &mut WebSocket) -> Option<ClientMessage> {
    loop {
        match socket.recv().await? {
            Ok(Message::Text(text)) => {
                return match parse_client_message(text.as_str()) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!("invalid opening conversation message, closing: {}", e);
                        None
                    }
                };
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                tracing::warn!("binary opening conversation frame, closing");
                return None;
            }
            Ok(Message::Close(_)) => return None,
            Err(e) => {
                tracing::debug!("conversation receive error: {}", e);
                return None;
            }
        }
    }
}

fn parse_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Next parseable client message; `None` once the socket closes.
async fn next_client_message(socket: &mut WebSocket) -> Option<ClientMessage> {
    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(Message::Text(text)) => match parse_client_message(text.as_str()) {
                Ok(message) => return Some(message),
                Err(e) => {
                    tracing::warn!("failed to parse conversation message: {}", e);
                }
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("conversation receive error: {}", e);
                return None;
            }
        }
    }
    None
}
