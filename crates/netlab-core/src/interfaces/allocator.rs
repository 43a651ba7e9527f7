// ── Port allocator ──
//
// Read-only view over a topology that answers "which interface names
// are taken on this node, and which one comes next". Nothing is reserved
// here; a name only becomes used once a link holding it is stored.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::CoreError;
use crate::interfaces::registry::{InterfacePattern, PatternRegistry};
use crate::model::Topology;

/// Default length of [`PortAllocator::available_interfaces`] results.
pub const DEFAULT_AVAILABLE_COUNT: usize = 10;

pub struct PortAllocator<'a> {
    registry: &'a PatternRegistry,
    topology: &'a Topology,
}

impl<'a> PortAllocator<'a> {
    pub fn new(registry: &'a PatternRegistry, topology: &'a Topology) -> Self {
        Self { registry, topology }
    }

    /// Pattern for the node's current model. Unknown nodes get the generic
    /// pattern.
    pub fn pattern_for(&self, node_id: &str) -> InterfacePattern {
        self.topology
            .node(node_id)
            .map_or_else(InterfacePattern::generic, |node| {
                self.registry.pattern(&node.model)
            })
    }

    /// Interface names held by links touching `node_id`.
    ///
    /// Dangling links still count for the endpoint that exists.
    pub fn used_interfaces(&self, node_id: &str) -> BTreeSet<String> {
        self.topology
            .links_of(node_id)
            .flat_map(|link| link.interfaces_on(node_id))
            .map(str::to_owned)
            .collect()
    }

    pub fn is_interface_used(&self, node_id: &str, name: &str) -> bool {
        self.topology
            .links_of(node_id)
            .any(|link| link.interfaces_on(node_id).any(|used| used == name))
    }

    /// Up to `count` free names in index order, skipping used names and the
    /// management interface. Never walks past the pattern's pool.
    pub fn available_interfaces(&self, node_id: &str, count: usize) -> Vec<String> {
        let pattern = self.pattern_for(node_id);
        let used = self.used_interfaces(node_id);
        free_names(&pattern, &used).take(count).collect()
    }

    /// The next name a new link on `node_id` should take.
    ///
    /// When the pool is full this degrades to `start_index + |used|`; if
    /// even that name is taken the node is reported exhausted.
    pub fn next_interface(&self, node_id: &str) -> Result<String, CoreError> {
        let pattern = self.pattern_for(node_id);
        let used = self.used_interfaces(node_id);
        next_free(node_id, &pattern, &used)
    }

    /// Two distinct names for the ends of a self-loop.
    pub(crate) fn next_pair(&self, node_id: &str) -> Result<(String, String), CoreError> {
        let pattern = self.pattern_for(node_id);
        let mut used = self.used_interfaces(node_id);
        let first = next_free(node_id, &pattern, &used)?;
        used.insert(first.clone());
        let second = next_free(node_id, &pattern, &used)?;
        Ok((first, second))
    }
}

fn free_names<'p>(
    pattern: &'p InterfacePattern,
    used: &'p BTreeSet<String>,
) -> impl Iterator<Item = String> + 'p {
    pattern
        .index_range()
        .map(|index| pattern.generate(index))
        .filter(|name| !pattern.is_management(name) && !used.contains(name))
}

fn next_free(
    node_id: &str,
    pattern: &InterfacePattern,
    used: &BTreeSet<String>,
) -> Result<String, CoreError> {
    if let Some(name) = free_names(pattern, used).next() {
        return Ok(name);
    }

    let offset = u32::try_from(used.len()).unwrap_or(u32::MAX);
    let fallback = pattern.generate(pattern.start_index.saturating_add(offset));
    if used.contains(&fallback) || pattern.is_management(&fallback) {
        return Err(CoreError::InterfacePoolExhausted {
            node_id: node_id.to_owned(),
            max_interfaces: pattern.max_interfaces,
        });
    }
    warn!(
        node_id,
        interface = %fallback,
        max = pattern.max_interfaces,
        "interface pool exhausted, using overflow name"
    );
    Ok(fallback)
}


#[cfg(test)]
mod properties {
    use super::*;
    use crate::model::{DeviceModel, Link, Position};
    use proptest::prelude::*;

    const NODES: [&str; 3] = ["n1", "n2", "n3"];

    /// n1 is linux (32 ports), n2 is iosv (7 ports), n3 is a four-port box
    /// whose first index collides with its `eth0` management interface.
    fn registry() -> PatternRegistry {
        PatternRegistry::from_models(&[DeviceModel::new("tiny")
            .with_ports("eth", 0, 4)
            .with_kind("linux")])
    }

    fn lab(links: Vec<Link>) -> Topology {
        let mut topo = Topology::default();
        topo.add_node("n1", "r1", "linux", Position::default());
        topo.add_node("n2", "r2", "cisco_iosv", Position::default());
        topo.add_node("n3", "r3", "tiny", Position::default());
        topo.links = links;
        topo
    }

    fn arb_endpoint() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("n1".to_owned()),
            Just("n2".to_owned()),
            Just("n3".to_owned()),
            Just("ghost".to_owned()),
        ]
    }

    fn arb_interface() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            (0u32..40).prop_map(|i| Some(format!("eth{i}"))),
            (0u32..10).prop_map(|i| Some(format!("GigabitEthernet0/{i}"))),
            Just(Some("eth0".to_owned())),
            Just(Some("GigabitEthernet0/0".to_owned())),
            Just(Some("Gi0/1".to_owned())),
            Just(Some("eth01".to_owned())),
        ]
    }

    fn arb_links() -> impl Strategy<Value = Vec<Link>> {
        prop::collection::vec(
            (arb_endpoint(), arb_interface(), arb_endpoint(), arb_interface()),
            0..48,
        )
        .prop_map(|ends| {
            ends.into_iter()
                .enumerate()
                .map(|(i, (source, source_interface, target, target_interface))| Link {
                    id: format!("l{i}"),
                    source,
                    target,
                    source_interface,
                    target_interface,
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn next_is_free_or_exhausted(links in arb_links()) {
            let registry = registry();
            let topo = lab(links);
            let alloc = PortAllocator::new(&registry, &topo);

            for node in NODES {
                let used = alloc.used_interfaces(node);
                if let Ok(next) = alloc.next_interface(node) {
                    prop_assert!(!used.contains(&next), "{} reused {}", node, next);
                    prop_assert!(!alloc.pattern_for(node).is_management(&next));
                }
                if let Ok((first, second)) = alloc.next_pair(node) {
                    prop_assert_ne!(&first, &second);
                    prop_assert!(!used.contains(&first) && !used.contains(&second));
                }
            }
        }

        #[test]
        fn available_stays_within_pool(links in arb_links(), count in 0usize..48) {
            let registry = registry();
            let topo = lab(links);
            let alloc = PortAllocator::new(&registry, &topo);

            for node in NODES {
                let pattern = alloc.pattern_for(node);
                let pool = usize::try_from(pattern.max_interfaces).unwrap_or(usize::MAX);
                let used = alloc.used_interfaces(node);
                let names = alloc.available_interfaces(node, count);

                prop_assert!(names.len() <= count);
                prop_assert!(names.len() <= pool);
                for name in &names {
                    prop_assert!(!used.contains(name), "{} offered used {}", node, name);
                    prop_assert!(!pattern.is_management(name));
                }
            }
        }
    }
}
