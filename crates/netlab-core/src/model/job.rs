// ── Backend jobs ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Queued or running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

/// What a job does. Node-scoped actions arrive as `node:<verb>:<nodeName>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobAction {
    /// Lab-wide action such as `up` or `down`.
    Global(String),
    Node { verb: String, node: String },
}

impl JobAction {
    pub fn parse(raw: &str) -> Self {
        if let Some((verb, node)) = raw.strip_prefix("node:").and_then(|rest| rest.split_once(':'))
        {
            if !verb.is_empty() && !node.is_empty() {
                return Self::Node {
                    verb: verb.to_owned(),
                    node: node.to_owned(),
                };
            }
        }
        Self::Global(raw.to_owned())
    }

    /// Human-readable label: `start r1` for node actions, the raw action
    /// otherwise.
    pub fn label(&self) -> String {
        match self {
            Self::Global(action) => action.clone(),
            Self::Node { verb, node } => format!("{verb} {node}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub action: JobAction,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
