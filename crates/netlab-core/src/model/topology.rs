// ── Topology domain types ──
//
// Nodes, links and canvas annotations of one lab. Topology values are
// plain data; the `LabStore` owns the live copy and publishes snapshots.

use serde::{Deserialize, Serialize};

/// Longest container name the slug will produce.
const CONTAINER_NAME_MAX: usize = 40;

/// Canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A device in the lab.
///
/// `container_name` is fixed at creation; renaming a node only changes
/// `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Display name.
    pub name: String,
    container_name: String,
    /// Device model identifier.
    pub model: String,
    pub position: Position,
    pub image: Option<String>,
    pub version: Option<String>,
}

impl Node {
    pub(crate) fn with_container_name(
        id: String,
        name: String,
        container_name: String,
        model: String,
        position: Position,
    ) -> Self {
        Self {
            id,
            name,
            container_name,
            model,
            position,
            image: None,
            version: None,
        }
    }

    /// Backend workload name, assigned once at creation.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }
}

/// A point-to-point connection between two node interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_interface: Option<String>,
    pub target_interface: Option<String>,
}

impl Link {
    /// Interface names this link occupies on `node_id`. A self-loop yields
    /// both ends.
    pub fn interfaces_on<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let source = if self.source == node_id {
            self.source_interface.as_deref()
        } else {
            None
        };
        let target = if self.target == node_id {
            self.target_interface.as_deref()
        } else {
            None
        };
        source.into_iter().chain(target)
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Free-form canvas decoration. Persisted with the layout only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    /// `text`, `rect`, `circle` or `arrow`.
    pub kind: String,
    pub position: Position,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub text: Option<String>,
    pub color: Option<String>,
}

impl Annotation {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position,
            width: None,
            height: None,
            text: None,
            color: None,
        }
    }
}

/// Everything the user edits for one lab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub annotations: Vec<Annotation>,
}

impl Topology {
    // ── Nodes ────────────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn node_by_container_name(&self, container_name: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.container_name == container_name)
    }

    /// Slug of `display_name`, suffixed `-2`, `-3`, ... until it is unused
    /// in this lab.
    pub fn unique_container_name(&self, display_name: &str) -> String {
        let base = container_name_for(display_name);
        if self.node_by_container_name(&base).is_none() {
            return base;
        }
        (2u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| self.node_by_container_name(candidate).is_none())
            .unwrap_or(base)
    }

    /// Add a node, deriving its container name from `name`.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        model: impl Into<String>,
        position: Position,
    ) -> &Node {
        let name = name.into();
        let container_name = self.unique_container_name(&name);
        let idx = self.nodes.len();
        self.nodes.push(Node::with_container_name(
            id.into(),
            name,
            container_name,
            model.into(),
            position,
        ));
        &self.nodes[idx]
    }

    /// Remove a node and every link touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<(Node, Vec<Link>)> {
        let idx = self.nodes.iter().position(|n| n.id == id)?;
        let node = self.nodes.remove(idx);
        let (removed, kept): (Vec<Link>, Vec<Link>) =
            std::mem::take(&mut self.links)
                .into_iter()
                .partition(|l| l.touches(id));
        self.links = kept;
        Some((node, removed))
    }

    // ── Links ────────────────────────────────────────────────────────

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn link_mut(&mut self, id: &str) -> Option<&mut Link> {
        self.links.iter_mut().find(|l| l.id == id)
    }

    pub fn links_of<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.touches(node_id))
    }

    pub fn remove_link(&mut self, id: &str) -> Option<Link> {
        let idx = self.links.iter().position(|l| l.id == id)?;
        Some(self.links.remove(idx))
    }

    // ── Annotations ──────────────────────────────────────────────────

    pub fn annotation_mut(&mut self, id: &str) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn remove_annotation(&mut self, id: &str) -> Option<Annotation> {
        let idx = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(idx))
    }
}

/// Lossy slug used as a node's container name: lowercase ASCII
/// alphanumerics, every other run of characters collapsed to one `-`.
pub fn container_name_for(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len());
    for ch in display_name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(CONTAINER_NAME_MAX);
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "node".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_lowercase_and_dashed() {
        assert_eq!(container_name_for("Core Router #1"), "core-router-1");
        assert_eq!(container_name_for("  spine--01  "), "spine-01");
        assert_eq!(container_name_for("🚀"), "node");
    }

    #[test]
    fn slug_is_bounded() {
        let long = "a".repeat(100);
        assert_eq!(container_name_for(&long).len(), CONTAINER_NAME_MAX);
    }

    #[test]
    fn container_names_are_deduplicated() {
        let mut topo = Topology::default();
        topo.add_node("n1", "R1", "linux", Position::default());
        topo.add_node("n2", "r1", "linux", Position::default());
        topo.add_node("n3", "R 1", "linux", Position::default());
        let names: Vec<&str> = topo.nodes.iter().map(Node::container_name).collect();
        assert_eq!(names, vec!["r1", "r1-2", "r-1"]);
    }

    #[test]
    fn rename_keeps_container_name() {
        let mut topo = Topology::default();
        topo.add_node("n1", "Leaf A", "linux", Position::default());
        topo.node_mut("n1").unwrap().name = "Spine".into();
        assert_eq!(topo.node("n1").unwrap().container_name(), "leaf-a");
    }

    #[test]
    fn remove_node_cascades_links() {
        let mut topo = Topology::default();
        topo.add_node("n1", "a", "linux", Position::default());
        topo.add_node("n2", "b", "linux", Position::default());
        topo.add_node("n3", "c", "linux", Position::default());
        for (id, s, t) in [("l1", "n1", "n2"), ("l2", "n2", "n3"), ("l3", "n3", "n1")] {
            topo.links.push(Link {
                id: id.into(),
                source: s.into(),
                target: t.into(),
                source_interface: None,
                target_interface: None,
            });
        }

        let (node, removed) = topo.remove_node("n1").unwrap();
        assert_eq!(node.id, "n1");
        assert_eq!(removed.len(), 2);
        assert_eq!(topo.links.len(), 1);
        assert_eq!(topo.links[0].id, "l2");
    }

    #[test]
    fn self_loop_reports_both_interfaces() {
        let link = Link {
            id: "l1".into(),
            source: "n1".into(),
            target: "n1".into(),
            source_interface: Some("eth1".into()),
            target_interface: Some("eth2".into()),
        };
        let ifaces: Vec<&str> = link.interfaces_on("n1").collect();
        assert_eq!(ifaces, vec!["eth1", "eth2"]);
        assert_eq!(link.interfaces_on("n2").count(), 0);
    }
}
