//! Actyte voice backend library logic.
//!
//! Serves a persona-driven voice conversation over websockets together with a
//! small latency probe. The persona's system prompt is resolved once at
//! startup (see [`persona`]); every conversation then gets its own agent and
//! synthesizer built from the factories registered in [`app`].

pub mod api_ping;
pub mod config;
pub mod conversation;
pub mod persona;
pub mod prompt_hub;

use actyte_voice::{
    Agent, ApiCredentials, AzureSynthesizer, AzureSynthesizerConfig, ChatGptAgent,
    ChatGptAgentConfig, Synthesizer,
};
use axum::{routing::get, Json, Router};
use config::VoiceConfig;
use conversation::ConversationRouter;
use persona::PersonaConfig;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Conversation router whose sessions talk as `persona`: a chat-completions
/// agent seeded with the persona, voiced by Azure speech.
pub fn persona_conversation_router(persona: PersonaConfig, voice: &VoiceConfig) -> ConversationRouter {
    let agent_config = ChatGptAgentConfig::new(
        Some(persona.initial_message).filter(|m| !m.is_empty()),
        persona.prompt_preamble,
    )
    .with_model_name(voice.openai_model.clone());
    let voice_name = voice.voice_name.clone();

    ConversationRouter::new(
        move || {
            let agent = ChatGptAgent::new(agent_config.clone(), ApiCredentials::openai_from_env()?)?;
            Ok(Box::new(agent) as Box<dyn Agent>)
        },
        move |output_audio_config| {
            let synthesizer = AzureSynthesizer::new(
                AzureSynthesizerConfig::from_output_audio_config(output_audio_config, voice_name.clone()),
                ApiCredentials::azure_from_env()?,
            )?;
            Ok(Box::new(synthesizer) as Box<dyn Synthesizer>)
        },
    )
}

/// Builds the application router with all routes.
pub fn app(conversation: ConversationRouter) -> Router {
    tracing::info!(
        endpoint = conversation.conversation_endpoint(),
        "registering conversation endpoint"
    );

    Router::new()
        .route("/health", get(health))
        .route("/api/ping", get(api_ping::ping_handler))
        .route("/api/ping/", get(api_ping::ping_handler))
        .merge(conversation.into_router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
