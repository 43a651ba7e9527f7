// ── Interface pattern registry ──
//
// Per-model interface naming. The registry is an immutable value built
// from the device catalog; a catalog reload builds a new one and the
// session swaps it in whole.

use std::collections::HashMap;

use crate::model::DeviceModel;

/// Placeholder substituted with the interface index.
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// How interfaces on one device model are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfacePattern {
    /// Naming template containing exactly one `{index}`.
    pub template: String,
    /// First allocatable index.
    pub start_index: u32,
    /// Reserved out-of-band interface, never allocated to a link.
    pub management_interface: Option<String>,
    /// Size of the allocatable pool.
    pub max_interfaces: u32,
}

impl InterfacePattern {
    /// Build a pattern from a raw naming string. `"Ethernet"` becomes
    /// `"Ethernet{index}"`; a string already holding the placeholder is
    /// kept as is.
    pub fn new(
        raw: &str,
        start_index: u32,
        max_interfaces: u32,
        management_interface: Option<String>,
    ) -> Self {
        let template = if raw.contains(INDEX_PLACEHOLDER) {
            raw.to_owned()
        } else {
            format!("{raw}{INDEX_PLACEHOLDER}")
        };
        Self {
            template,
            start_index,
            management_interface,
            max_interfaces,
        }
    }

    /// `eth{index}` from 1, 32 ports, `eth0` for management.
    pub fn generic() -> Self {
        Self::new("eth", 1, 32, Some("eth0".into()))
    }

    pub fn generate(&self, index: u32) -> String {
        self.template
            .replacen(INDEX_PLACEHOLDER, &index.to_string(), 1)
    }

    /// Inverse of [`generate`](Self::generate). `None` for names this
    /// pattern cannot produce.
    pub fn parse(&self, name: &str) -> Option<u32> {
        let (prefix, suffix) = self.template.split_once(INDEX_PLACEHOLDER)?;
        let digits = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: u32 = digits.parse().ok()?;
        // Rejects zero-padded forms such as `eth01`.
        (self.generate(index) == name).then_some(index)
    }

    /// Allocatable indices, `start_index` inclusive.
    pub fn index_range(&self) -> std::ops::Range<u32> {
        self.start_index..self.start_index.saturating_add(self.max_interfaces)
    }

    pub fn is_management(&self, name: &str) -> bool {
        self.management_interface.as_deref() == Some(name)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Lookup table from device model id to [`InterfacePattern`].
///
/// Resolution order: pattern learned from the catalog, then the built-in
/// table of well-known models, then [`InterfacePattern::generic`].
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    learned: HashMap<String, InterfacePattern>,
}

impl PatternRegistry {
    /// Empty registry; every lookup falls through to the built-ins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn patterns from catalog entries. Models without a port naming
    /// string are left to the fallbacks.
    pub fn from_models<'a>(models: impl IntoIterator<Item = &'a DeviceModel>) -> Self {
        let learned = models
            .into_iter()
            .filter_map(|model| {
                let naming = model.port_naming.as_deref()?;
                let fallback = builtin_pattern(&model.id);
                let start = model
                    .port_start_index
                    .or_else(|| fallback.as_ref().map(|p| p.start_index))
                    .unwrap_or(1);
                let max = model
                    .max_ports
                    .or_else(|| fallback.as_ref().map(|p| p.max_interfaces))
                    .unwrap_or(32);
                let mgmt = management_interface_for(model.kind.as_deref(), &model.id);
                Some((
                    model.id.clone(),
                    InterfacePattern::new(naming, start, max, Some(mgmt.to_owned())),
                ))
            })
            .collect();
        Self { learned }
    }

    pub fn len(&self) -> usize {
        self.learned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.learned.is_empty()
    }

    pub fn pattern(&self, model_id: &str) -> InterfacePattern {
        if let Some(pattern) = self.learned.get(model_id) {
            return pattern.clone();
        }
        builtin_pattern(model_id).unwrap_or_else(InterfacePattern::generic)
    }

    pub fn generate_interface_name(&self, model_id: &str, index: u32) -> String {
        self.pattern(model_id).generate(index)
    }

    pub fn parse_interface_index(&self, model_id: &str, name: &str) -> Option<u32> {
        self.pattern(model_id).parse(name)
    }
}

// ── Built-in table ───────────────────────────────────────────────────

fn builtin_pattern(model_id: &str) -> Option<InterfacePattern> {
    let (raw, start, max) = match model_id {
        "linux" | "alpine" | "ubuntu" | "frr" | "host" | "juniper_crpd" => ("eth", 1, 32),
        "ceos" | "arista_ceos" => ("Ethernet", 1, 64),
        "nokia_srlinux" | "srl" => ("e1-", 1, 34),
        "cisco_iosv" => ("GigabitEthernet0/", 1, 7),
        "cisco_csr1000v" | "cisco_c8000v" => ("GigabitEthernet", 2, 16),
        "cisco_iosxr" | "cisco_xrd" => ("GigabitEthernet0/0/0/", 0, 16),
        "juniper_vjunos" | "juniper_vmx" | "juniper_vsrx" => ("ge-0/0/", 0, 10),
        _ => return None,
    };
    let mgmt = management_interface_for(None, model_id);
    Some(InterfacePattern::new(raw, start, max, Some(mgmt.to_owned())))
}

/// Management interface for a model, from its `kind` or else its id.
pub fn management_interface_for(kind: Option<&str>, model_id: &str) -> &'static str {
    let key = kind.unwrap_or(model_id).to_ascii_lowercase();
    if key.contains("ceos") {
        "Management0"
    } else if key.contains("srl") || key.contains("srlinux") {
        "mgmt0"
    } else if key.contains("crpd") {
        "eth0"
    } else if key.contains("juniper") || key.contains("vjunos") || key.contains("vmx") {
        "fxp0"
    } else if key.contains("xr") {
        "MgmtEth0/RP0/CPU0/0"
    } else if key.contains("csr") || key.contains("c8000v") {
        "GigabitEthernet1"
    } else if key.contains("iosv") {
        "GigabitEthernet0/0"
    } else {
        "eth0"
    }
}
