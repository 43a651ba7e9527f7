// Backend wire types
//
// Serde shapes exactly as the backend sends and accepts them. State and
// status fields stay stringly-typed here; `netlab-core` parses them into
// domain enums.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Topology graph (export-graph / import-graph) ─────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    /// Backend workload name. Older labs may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Device model identifier from the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_interface: Option<String>,
    #[serde(default)]
    pub target_interface: Option<String>,
}

// ── Layout ───────────────────────────────────────────────────────────

/// Saved canvas layout for a lab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub version: u32,
    /// Node id -> position.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeLayout>,
    #[serde(default)]
    pub annotations: Vec<AnnotationDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLayout {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDocument {
    pub id: String,
    /// `text`, `rect`, `circle` or `arrow`.
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

// ── Node runtime state ───────────────────────────────────────────────

/// One row of `GET /labs/{id}/nodes/states`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStateEntry {
    pub node_id: String,
    pub node_name: String,
    /// `stopped` or `running`.
    pub desired_state: String,
    /// `undeployed`, `pending`, `running`, `stopped` or `error`.
    pub actual_state: String,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateRequest {
    pub state: String,
}

// ── Jobs ─────────────────────────────────────────────────────────────

/// One row of `GET /labs/{id}/jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub id: String,
    /// Global action (`up`, `down`) or `node:<verb>:<nodeName>`.
    pub action: String,
    /// `queued`, `running`, `completed` or `failed`.
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

// ── Device catalog ───────────────────────────────────────────────────

/// A vendor grouping from `GET /vendors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorCategory {
    pub name: String,
    #[serde(default)]
    pub models: Vec<VendorModel>,
}

/// A device model entry in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorModel {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub port_naming: Option<String>,
    #[serde(default)]
    pub port_start_index: Option<u32>,
    #[serde(default)]
    pub max_ports: Option<u32>,
}

// ── System ───────────────────────────────────────────────────────────

/// Host metrics from `GET /dashboard/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub containers_running: u32,
    #[serde(default)]
    pub containers_total: u32,
}
