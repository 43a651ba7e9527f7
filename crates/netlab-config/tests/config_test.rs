#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use netlab_config::{
    Config, ConfigError, Defaults, Profile, load_config_from, profile_to_session_config,
    resolve_token, save_config_to,
};
use netlab_core::{SessionConfig, TlsVerification};

const SAMPLE: &str = r#"
default_profile = "lab"

[defaults]
timeout = 12
poll_interval_ms = 2000

[profiles.lab]
url = "https://lab.example/api"
token = "plain-secret"
layout_debounce_ms = 150

[profiles.scratch]
url = "http://127.0.0.1:8000/api"
insecure = true
metrics_interval_ms = 0
"#;

fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    path
}

#[test]
fn loads_profiles_and_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&write_sample(&dir)).unwrap();

    assert_eq!(config.default_profile.as_deref(), Some("lab"));
    assert_eq!(config.defaults.timeout, 12);
    assert_eq!(config.defaults.metrics_interval_ms, 10_000);
    assert_eq!(config.profiles.len(), 2);

    let (name, profile) = config.profile(None).unwrap();
    assert_eq!(name, "lab");
    assert_eq!(profile.url, "https://lab.example/api");
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.default_profile.as_deref(), Some("default"));
    assert!(config.profiles.is_empty());
    assert!(matches!(
        config.profile(None),
        Err(ConfigError::UnknownProfile { .. })
    ));
}

#[test]
fn profile_translates_to_session_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&write_sample(&dir)).unwrap();

    let (name, profile) = config.profile(Some("lab")).unwrap();
    let session = profile_to_session_config(profile, name, &config.defaults).unwrap();
    assert_eq!(session.url.as_str(), "https://lab.example/api");
    assert_eq!(session.tls, TlsVerification::SystemDefaults);
    assert_eq!(session.timeout, Duration::from_secs(12));
    assert_eq!(session.poll_interval, Duration::from_secs(2));
    assert_eq!(session.layout_debounce, Duration::from_millis(150));
    assert_eq!(session.topology_debounce, SessionConfig::DEFAULT_TOPOLOGY_DEBOUNCE);
    assert_eq!(
        session.token.as_ref().map(|t| t.expose_secret().to_owned()),
        Some("plain-secret".to_owned())
    );

    let (name, profile) = config.profile(Some("scratch")).unwrap();
    let session = profile_to_session_config(profile, name, &config.defaults).unwrap();
    assert_eq!(session.tls, TlsVerification::DangerAcceptInvalid);
    assert!(session.metrics_interval.is_zero());
    assert!(session.token.is_none());
}

#[test]
fn invalid_url_is_rejected() {
    let profile = Profile {
        url: "not a url".into(),
        ..Profile::default()
    };
    let err = profile_to_session_config(&profile, "bad", &Defaults::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));
}

#[test]
fn unset_token_env_falls_back_to_plaintext() {
    let profile = Profile {
        url: "https://lab.example/api".into(),
        token: Some("fallback".into()),
        token_env: Some("NETLAB_TEST_TOKEN_THAT_IS_NEVER_SET".into()),
        ..Profile::default()
    };
    let token = resolve_token(&profile, "lab").unwrap();
    assert_eq!(token.expose_secret(), "fallback");
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.profiles.insert(
        "default".into(),
        Profile {
            url: "https://lab.example/api".into(),
            use_keyring: true,
            topology_debounce_ms: Some(500),
            ..Profile::default()
        },
    );
    save_config_to(&path, &config).unwrap();

    let loaded = load_config_from(&path).unwrap();
    let (_, profile) = loaded.profile(None).unwrap();
    assert!(profile.use_keyring);
    assert_eq!(profile.topology_debounce_ms, Some(500));
}
