//! Actyte server binary.
//!
//! Loads `.env`, resolves the persona, and starts an axum HTTP server with
//! structured logging and graceful shutdown on SIGTERM/SIGINT.

use actyte_server::persona::{self, PromptVars};
use actyte_server::prompt_hub::PromptHub;
use actyte_server::{app, config, persona_conversation_router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("ACTYTE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let dotenv_path = dotenvy::dotenv().ok();

    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        dotenv = ?dotenv_path,
        "resolved startup configuration path"
    );

    // Resolve the persona once; a missing prompt aborts startup
    let hub = PromptHub::from_env().expect("failed to create prompt hub client");
    let persona = persona::resolve_persona(
        &PromptVars::from_env(),
        &hub,
        chrono::Local::now().date_naive(),
    )
    .await
    .expect("failed to resolve system prompt");

    tracing::info!(
        initial_message = %persona.initial_message,
        prompt_len = persona.prompt_preamble.len(),
        "persona resolved"
    );

    // Build application
    let conversation = persona_conversation_router(persona, &config.voice)
        .with_conversation_endpoint(config.server.conversation_endpoint.clone());
    let app = app(conversation);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting actyte server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("actyte server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
