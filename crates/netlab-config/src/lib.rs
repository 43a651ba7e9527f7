//! Shared configuration for netlab clients.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `netlab_core::SessionConfig`. Front ends load a
//! [`Config`], pick a [`Profile`] and hand the result to `LabSession`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use netlab_core::{SessionConfig, TlsVerification};

const KEYRING_SERVICE: &str = "netlab";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Timing defaults applied to every profile that doesn't override them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Node-state and job poll cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// System metrics cadence in milliseconds; 0 disables it.
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            metrics_interval_ms: default_metrics_interval_ms(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    duration_ms(SessionConfig::DEFAULT_POLL_INTERVAL)
}
fn default_metrics_interval_ms() -> u64 {
    duration_ms(SessionConfig::DEFAULT_METRICS_INTERVAL)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A named backend profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Backend API root (e.g., "https://lab.example/api").
    pub url: String,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Look the token up in the system keyring.
    #[serde(default)]
    pub use_keyring: bool,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override poll cadence (milliseconds).
    pub poll_interval_ms: Option<u64>,

    /// Override metrics cadence (milliseconds).
    pub metrics_interval_ms: Option<u64>,

    /// Layout write debounce (milliseconds).
    pub layout_debounce_ms: Option<u64>,

    /// Topology write debounce (milliseconds).
    pub topology_debounce_ms: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "netlab", "netlab").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("netlab");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` merged with `NETLAB_` environment variables
/// (`NETLAB_DEFAULTS__TIMEOUT=10`). A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETLAB_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: env var, then keyring (if enabled), then
/// plaintext. `None` means the backend is used unauthenticated.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if profile.use_keyring {
        match keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
            .and_then(|entry| entry.get_password())
        {
            Ok(secret) => return Some(SecretString::from(secret)),
            Err(e) => debug!(profile = profile_name, error = %e, "no keyring token"),
        }
    }

    // 3. Plaintext in config
    profile
        .token
        .as_ref()
        .map(|token| SecretString::from(token.clone()))
}

/// Store `token` in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("not a base URL: {}", profile.url),
        });
    }

    let mut config = SessionConfig::new(url);
    config.token = resolve_token(profile, profile_name);
    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.poll_interval =
        Duration::from_millis(profile.poll_interval_ms.unwrap_or(defaults.poll_interval_ms));
    config.metrics_interval = Duration::from_millis(
        profile
            .metrics_interval_ms
            .unwrap_or(defaults.metrics_interval_ms),
    );
    if let Some(ms) = profile.layout_debounce_ms {
        config.layout_debounce = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.topology_debounce_ms {
        config.topology_debounce = Duration::from_millis(ms);
    }
    Ok(config)
}

/// Load the config and translate the named (or default) profile.
pub fn load_session_config(profile_name: Option<&str>) -> Result<SessionConfig, ConfigError> {
    let config = load_config()?;
    let (name, profile) = config.profile(profile_name)?;
    profile_to_session_config(profile, name, &config.defaults)
}
