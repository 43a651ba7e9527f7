// ── Device catalog types ──

use serde::{Deserialize, Serialize};

/// A device model from the catalog.
///
/// Immutable for the lifetime of a loaded catalog; interface naming is
/// derived from it by the [`PatternRegistry`](crate::interfaces::PatternRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModel {
    pub id: String,
    /// Display label.
    pub label: Option<String>,
    /// Backend node kind (e.g. `ceos`, `srl`, `linux`).
    pub kind: Option<String>,
    pub vendor: Option<String>,
    /// Raw interface naming, with or without an `{index}` placeholder.
    pub port_naming: Option<String>,
    pub port_start_index: Option<u32>,
    pub max_ports: Option<u32>,
}

impl DeviceModel {
    /// A bare model with only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            kind: None,
            vendor: None,
            port_naming: None,
            port_start_index: None,
            max_ports: None,
        }
    }

    /// Set the naming template, start index and port ceiling.
    pub fn with_ports(mut self, naming: impl Into<String>, start_index: u32, max_ports: u32) -> Self {
        self.port_naming = Some(naming.into());
        self.port_start_index = Some(start_index);
        self.max_ports = Some(max_ports);
        self
    }

    /// Set the backend kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}
