//! Voice pipeline components for the Actyte backend.
//!
//! A conversation is assembled from three pieces, each behind a trait so the
//! server can build them per session from factory closures:
//!
//! - [`Agent`]: produces the persona's replies (OpenAI chat completions).
//! - [`Synthesizer`]: renders replies to audio (Azure speech).
//! - [`Transcriber`]: turns the caller's speech into text (Deepgram).
//!
//! Audio travels as raw `linear16` or `mulaw` samples described by
//! [`InputAudioConfig`] and [`OutputAudioConfig`].

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod synthesizer;
pub mod transcriber;

pub use agent::{Agent, ChatGptAgent, ChatMessage, ChatRole};
pub use audio::{AudioEncoding, InputAudioConfig, OutputAudioConfig};
pub use config::{
    ApiCredentials, AzureSynthesizerConfig, ChatGptAgentConfig, DeepgramTranscriberConfig,
    DEFAULT_AZURE_VOICE_NAME, DEFAULT_OPENAI_MODEL,
};
pub use error::VoiceError;
pub use synthesizer::{AzureSynthesizer, Synthesizer};
pub use transcriber::{DeepgramTranscriber, Transcriber};
