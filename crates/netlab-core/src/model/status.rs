// ── Node power and runtime status ──
//
// `DesiredState` is user intent, `ActualState` is what the backend
// observed, and `RuntimeStatus` is the badge shown to the user. The
// badge is a pure function of the other two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The user's intended power state for a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Stopped,
    Running,
}

impl DesiredState {
    /// Status to show optimistically while the backend converges.
    pub fn optimistic_status(self) -> RuntimeStatus {
        match self {
            Self::Running => RuntimeStatus::Booting,
            Self::Stopped => RuntimeStatus::Stopped,
        }
    }
}

/// Backend-observed state of a node's workload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActualState {
    Undeployed,
    Pending,
    Running,
    Stopped,
    Error,
}

/// Displayable runtime badge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    Booting,
    Running,
    Stopped,
    Error,
}

impl RuntimeStatus {
    /// Whether the node is on or heading there.
    pub fn is_powered(self) -> bool {
        matches!(self, Self::Booting | Self::Running)
    }
}

/// Derive the badge from desired and actual state. `None` means no badge
/// (the node was never deployed).
pub fn derive_status(desired: DesiredState, actual: ActualState) -> Option<RuntimeStatus> {
    match actual {
        ActualState::Error => Some(RuntimeStatus::Error),
        ActualState::Pending => Some(desired.optimistic_status()),
        ActualState::Running => Some(RuntimeStatus::Running),
        ActualState::Stopped => Some(RuntimeStatus::Stopped),
        ActualState::Undeployed => None,
    }
}

/// Local mirror of one backend node-state row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub node_id: String,
    /// Backend workload name (the node's container name).
    pub node_name: String,
    pub desired: DesiredState,
    pub actual: ActualState,
    pub is_ready: bool,
    pub error_message: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NodeState {
    pub fn runtime_status(&self) -> Option<RuntimeStatus> {
        derive_status(self.desired, self.actual)
    }

    /// Whether the backend has ever materialized this node.
    pub fn is_deployed(&self) -> bool {
        self.actual != ActualState::Undeployed
    }
}
