// ── Session log and signals ──
//
// User-facing log lines and out-of-band session signals, fanned out over
// broadcast channels. Background tasks report through an `EventSink`
// instead of returning errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::CoreError;

const LOG_CHANNEL_SIZE: usize = 256;
const SIGNAL_CHANNEL_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One line in the session's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Backend job this line describes, if any.
    pub job_id: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            job_id: None,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Session-level notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// The backend rejected the bearer token (HTTP 401/403).
    Unauthorized,
    LabOpened(String),
    LabClosed(String),
}

// ── EventSink ────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct EventSink {
    log_tx: broadcast::Sender<LogEntry>,
    signal_tx: broadcast::Sender<SessionSignal>,
}

impl EventSink {
    pub(crate) fn new() -> Self {
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_SIZE);
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_SIZE);
        Self { log_tx, signal_tx }
    }

    pub(crate) fn log(&self, entry: LogEntry) {
        // No subscribers is fine.
        let _ = self.log_tx.send(entry);
    }

    pub(crate) fn signal(&self, signal: SessionSignal) {
        let _ = self.signal_tx.send(signal);
    }

    /// Log a failed background operation and raise `Unauthorized` when the
    /// backend rejected the token.
    pub(crate) fn report(&self, context: &str, err: &CoreError) {
        warn!(error = %err, "{context} failed");
        if err.is_unauthorized() {
            self.signal(SessionSignal::Unauthorized);
        }
        self.log(LogEntry::new(LogLevel::Error, format!("{context} failed: {err}")));
    }

    pub(crate) fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    pub(crate) fn subscribe_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signal_tx.subscribe()
    }
}
