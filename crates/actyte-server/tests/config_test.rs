use actyte_server::config::{apply_env_overrides, load_config, Config, ConfigError};
use std::collections::HashMap;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_match_the_conversation_service() {
    let config = Config::default();
    assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.conversation_endpoint, "/api/python/conversation");
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json);
    assert_eq!(config.voice.voice_name, "en-US-SteffanNeural");
    assert_eq!(config.voice.openai_model, "gpt-3.5-turbo");
}

#[test]
fn loads_partial_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
port = 9100
conversation_endpoint = "/conversation"

[voice]
voice_name = "en-US-JennyNeural"
"#
    )
    .unwrap();

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.server.conversation_endpoint, "/conversation");
    assert_eq!(config.voice.voice_name, "en-US-JennyNeural");
    assert_eq!(config.voice.openai_model, "gpt-3.5-turbo");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let config = load_config(path.to_str()).unwrap();
    assert_eq!(config.server.conversation_endpoint, "/api/python/conversation");
}

#[test]
fn malformed_file_is_a_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server\nport = 1").unwrap();
    assert!(matches!(
        load_config(file.path().to_str()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn env_overrides_replace_file_values() {
    let mut config = Config::default();
    apply_env_overrides(
        &mut config,
        lookup(&[
            ("ACTYTE_HOST", "0.0.0.0"),
            ("ACTYTE_PORT", "3000"),
            ("ACTYTE_LOG_LEVEL", "debug"),
            ("ACTYTE_LOG_JSON", "true"),
            ("ACTYTE_VOICE_NAME", "en-GB-RyanNeural"),
            ("ACTYTE_OPENAI_MODEL", "gpt-4o-mini"),
        ]),
    );

    assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(config.voice.voice_name, "en-GB-RyanNeural");
    assert_eq!(config.voice.openai_model, "gpt-4o-mini");
}

#[test]
fn invalid_or_blank_overrides_are_ignored() {
    let mut config = Config::default();
    apply_env_overrides(
        &mut config,
        lookup(&[
            ("ACTYTE_HOST", "not-an-ip"),
            ("ACTYTE_PORT", "eighty"),
            ("ACTYTE_VOICE_NAME", "  "),
        ]),
    );

    assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.voice.voice_name, "en-US-SteffanNeural");
}

#[test]
fn unusable_conversation_endpoint_is_rejected() {
    for endpoint in ["/", "conversation", "", "/api//conversation"] {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nconversation_endpoint = {:?}", endpoint).unwrap();

        let result = load_config(file.path().to_str());
        assert!(
            matches!(
                result,
                Err(ConfigError::Invalid {
                    field: "server.conversation_endpoint",
                    ..
                })
            ),
            "endpoint {:?} was accepted",
            endpoint
        );
    }
}

#[test]
fn trailing_slash_endpoint_is_accepted() {
    let mut config = Config::default();
    config.server.conversation_endpoint = "/api/python/conversation/".to_string();
    assert!(config.validate().is_ok());
}
