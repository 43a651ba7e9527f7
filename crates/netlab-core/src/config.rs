// ── Runtime session configuration ──
//
// These types describe *how* to talk to the lab backend and how eagerly
// to poll and persist. They carry credential data and timing tuning but
// never touch disk. `netlab-config` (or any other front end) builds a
// `SessionConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use netlab_api::transport::{TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab servers).
    DangerAcceptInvalid,
}

/// Configuration for one [`LabSession`](crate::LabSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend API root (e.g. `https://lab.example/api`).
    pub url: Url,
    /// Pre-issued bearer token, if the backend requires one.
    pub token: Option<SecretString>,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Node-state + job poll cadence. Also the age after which a local
    /// optimistic status yields to disagreeing server truth.
    pub poll_interval: Duration,
    /// System metrics poll cadence. Zero disables the metrics poller.
    pub metrics_interval: Duration,
    /// Quiet period before a layout write.
    pub layout_debounce: Duration,
    /// Quiet period before a topology write.
    pub topology_debounce: Duration,
    /// Delay between a power command and the follow-up state reload.
    pub reload_delay: Duration,
}

impl SessionConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);
    pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_LAYOUT_DEBOUNCE: Duration = Duration::from_millis(300);
    pub const DEFAULT_TOPOLOGY_DEBOUNCE: Duration = Duration::from_secs(2);
    pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_millis(500);

    /// Config for `url` with default timings and no token.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            metrics_interval: Self::DEFAULT_METRICS_INTERVAL,
            layout_debounce: Self::DEFAULT_LAYOUT_DEBOUNCE,
            topology_debounce: Self::DEFAULT_TOPOLOGY_DEBOUNCE,
            reload_delay: Self::DEFAULT_RELOAD_DELAY,
        }
    }

    /// Build the API-level transport settings.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
            token: self.token.clone(),
        }
    }
}
