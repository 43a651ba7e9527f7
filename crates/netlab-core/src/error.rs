// ── Core error types ──
//
// Domain-level errors from netlab-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<netlab_api::Error>`
// impl translates transport-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Backend request timed out")]
    Timeout,

    // ── Session errors ───────────────────────────────────────────────
    #[error("No lab is open")]
    NoActiveLab,

    #[error("Lab not found: {lab_id}")]
    LabNotFound { lab_id: String },

    // ── Topology errors ──────────────────────────────────────────────
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Link not found: {link_id}")]
    LinkNotFound { link_id: String },

    #[error("Annotation not found: {annotation_id}")]
    AnnotationNotFound { annotation_id: String },

    #[error("No free interface on node {node_id} (pattern allows {max_interfaces})")]
    InterfacePoolExhausted { node_id: String, max_interfaces: u32 },

    #[error("Interface {interface} is already used on node {node_id}")]
    InterfaceInUse { node_id: String, interface: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid {field} value from backend: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Failed to save {channel}: {message}")]
    PersistFailed { channel: String, message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` if the presentation layer should force re-authentication.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<netlab_api::Error> for CoreError {
    fn from(err: netlab_api::Error) -> Self {
        if err.is_unauthorized() {
            return CoreError::Unauthorized {
                message: err.to_string(),
            };
        }

        match err {
            netlab_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            netlab_api::Error::InvalidUrl(e) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Invalid URL: {e}"),
            },
            netlab_api::Error::InvalidBaseUrl(url) => CoreError::ConnectionFailed {
                url,
                reason: "URL cannot be used as an API root".into(),
            },
            netlab_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            netlab_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            netlab_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            netlab_api::Error::Unauthorized { status } => CoreError::Unauthorized {
                message: format!("HTTP {status}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_api_error_maps_to_unauthorized() {
        let err: CoreError = netlab_api::Error::Unauthorized { status: 403 }.into();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn api_status_is_preserved() {
        let err: CoreError = netlab_api::Error::Api {
            status: 409,
            message: "conflict".into(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Api {
                status: Some(409),
                ..
            }
        ));
    }
}
