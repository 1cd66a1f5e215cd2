//! End-to-end conversation sessions with scripted pipeline components.

mod common;

use actyte_server::conversation::ConversationRouter;
use actyte_voice::audio::encode_linear16;
use actyte_voice::{
    Agent, InputAudioConfig, OutputAudioConfig, Synthesizer, Transcriber, VoiceError,
};
use async_trait::async_trait;
use base64::Engine;
use common::{closed_by_server, next_json, spawn_app, WsStream};
use futures_util::SinkExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

struct ScriptedAgent {
    greeting: Option<String>,
    heard: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn initial_message(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    async fn respond(&mut self, human_input: &str) -> Result<String, VoiceError> {
        self.heard.lock().unwrap().push(human_input.to_string());
        Ok(format!("You said: {}", human_input))
    }
}

/// "Synthesizes" text as its UTF-8 bytes so the client can check what was spoken.
struct TextSynthesizer {
    output: OutputAudioConfig,
}

#[async_trait]
impl Synthesizer for TextSynthesizer {
    fn output_audio_config(&self) -> &OutputAudioConfig {
        &self.output
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        Ok(text.as_bytes().to_vec())
    }
}

struct FixedTranscriber {
    utterances: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        self.utterances.lock().unwrap().push(audio.len());
        Ok("hello there".to_string())
    }
}

struct Harness {
    heard: Arc<Mutex<Vec<String>>>,
    utterances: Arc<Mutex<Vec<usize>>>,
    router: ConversationRouter,
}

fn harness(greeting: Option<&str>) -> Harness {
    let heard = Arc::new(Mutex::new(Vec::new()));
    let utterances = Arc::new(Mutex::new(Vec::new()));
    let greeting = greeting.map(str::to_string);

    let agent_heard = heard.clone();
    let transcriber_utterances = utterances.clone();
    let router = ConversationRouter::new(
        move || {
            Ok(Box::new(ScriptedAgent {
                greeting: greeting.clone(),
                heard: agent_heard.clone(),
            }) as Box<dyn Agent>)
        },
        |output: &OutputAudioConfig| {
            Ok(Box::new(TextSynthesizer {
                output: output.clone(),
            }) as Box<dyn Synthesizer>)
        },
    )
    .with_transcriber_factory(move |_input: &InputAudioConfig| {
        Ok(Box::new(FixedTranscriber {
            utterances: transcriber_utterances.clone(),
        }) as Box<dyn Transcriber>)
    });

    Harness {
        heard,
        utterances,
        router,
    }
}

fn config_start(subscribe_transcript: bool) -> Message {
    Message::Text(
        json!({
            "type": "websocket_audio_config_start",
            "input_audio_config": {
                "sampling_rate": 1000,
                "audio_encoding": "linear16",
                "chunk_size": 100
            },
            "output_audio_config": {
                "sampling_rate": 8000,
                "audio_encoding": "linear16"
            },
            "conversation_id": "test-conversation",
            "subscribe_transcript": subscribe_transcript
        })
        .to_string()
        .into(),
    )
}

/// 100 ms of audio at 1 kHz.
fn audio_frame(amplitude: i16) -> Message {
    let samples: Vec<i16> = (0..100)
        .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
        .collect();
    let data = base64::engine::general_purpose::STANDARD.encode(encode_linear16(&samples));
    Message::Text(
        json!({ "type": "websocket_audio", "data": data })
            .to_string()
            .into(),
    )
}

fn decoded_audio(message: &Value) -> String {
    assert_eq!(message["type"], "websocket_audio");
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(message["data"].as_str().unwrap())
        .unwrap();
    String::from_utf8(bytes).unwrap()
}

async fn connect(addr: std::net::SocketAddr, path: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path))
        .await
        .expect("failed to connect");
    ws
}

#[tokio::test]
async fn conversation_greets_transcribes_and_replies() {
    let Harness {
        heard,
        utterances,
        router,
    } = harness(Some("Hello!"));
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation").await;

    ws.send(config_start(true)).await.unwrap();

    assert_eq!(next_json(&mut ws).await, json!({ "type": "websocket_ready" }));

    let greeting = next_json(&mut ws).await;
    assert_eq!(greeting["type"], "websocket_transcript");
    assert_eq!(greeting["sender"], "bot");
    assert_eq!(greeting["text"], "Hello!");
    assert_eq!(decoded_audio(&next_json(&mut ws).await), "Hello!");

    // leading silence, speech, then enough trailing silence to end the turn
    ws.send(audio_frame(0)).await.unwrap();
    ws.send(audio_frame(4_000)).await.unwrap();
    for _ in 0..6 {
        ws.send(audio_frame(0)).await.unwrap();
    }

    let human = next_json(&mut ws).await;
    assert_eq!(human["type"], "websocket_transcript");
    assert_eq!(human["sender"], "human");
    assert_eq!(human["text"], "hello there");

    let bot = next_json(&mut ws).await;
    assert_eq!(bot["sender"], "bot");
    assert_eq!(bot["text"], "You said: hello there");
    assert_eq!(
        decoded_audio(&next_json(&mut ws).await),
        "You said: hello there"
    );

    ws.send(Message::Text(
        json!({ "type": "websocket_stop" }).to_string().into(),
    ))
    .await
    .unwrap();
    assert_eq!(next_json(&mut ws).await, json!({ "type": "websocket_stop" }));

    assert_eq!(heard.lock().unwrap().as_slice(), ["hello there"]);
    // one speech frame and six silent frames, 200 bytes each
    assert_eq!(utterances.lock().unwrap().as_slice(), [1_400]);
}

#[tokio::test]
async fn conversation_without_transcript_subscription_sends_only_audio() {
    let Harness { router, .. } = harness(Some("Hi"));
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation/").await;

    ws.send(config_start(false)).await.unwrap();

    assert_eq!(next_json(&mut ws).await["type"], "websocket_ready");
    assert_eq!(decoded_audio(&next_json(&mut ws).await), "Hi");
}

#[tokio::test]
async fn conversation_requires_audio_config_first() {
    let Harness { router, .. } = harness(None);
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation").await;

    ws.send(audio_frame(4_000)).await.unwrap();
    assert!(closed_by_server(&mut ws).await);
}

#[tokio::test]
async fn conversation_closes_on_unknown_first_message_type() {
    let Harness { router, .. } = harness(Some("Hello!"));
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation").await;

    ws.send(Message::Text(
        json!({ "type": "websocket_hello" }).to_string().into(),
    ))
    .await
    .unwrap();
    assert!(closed_by_server(&mut ws).await);
}

#[tokio::test]
async fn conversation_closes_on_non_json_first_message() {
    let Harness { router, .. } = harness(Some("Hello!"));
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation").await;

    ws.send(Message::Text("garbage".into())).await.unwrap();
    assert!(closed_by_server(&mut ws).await);
}

#[tokio::test]
async fn conversation_closes_on_binary_first_message() {
    let Harness { router, .. } = harness(Some("Hello!"));
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation").await;

    ws.send(Message::Binary(vec![0u8, 1, 2, 3].into()))
        .await
        .unwrap();
    assert!(closed_by_server(&mut ws).await);
}

#[tokio::test]
async fn conversation_stops_when_pipeline_cannot_be_built() {
    let router = ConversationRouter::new(
        || Err::<Box<dyn Agent>, _>(VoiceError::Config("OPENAI_API_KEY is not set".to_string())),
        |output: &OutputAudioConfig| {
            Ok(Box::new(TextSynthesizer {
                output: output.clone(),
            }) as Box<dyn Synthesizer>)
        },
    );
    let addr = spawn_app(router).await;
    let mut ws = connect(addr, "/api/python/conversation").await;

    ws.send(config_start(true)).await.unwrap();
    assert_eq!(next_json(&mut ws).await, json!({ "type": "websocket_stop" }));
}

#[tokio::test]
async fn custom_endpoint_is_served() {
    let Harness { router, .. } = harness(None);
    let addr = spawn_app(router.with_conversation_endpoint("/conversation")).await;
    let mut ws = connect(addr, "/conversation").await;

    ws.send(config_start(false)).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "websocket_ready");
}
