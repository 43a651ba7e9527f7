// ── Wire <-> domain conversion ──
//
// Bridges `netlab_api::models` and the domain model. State rows and jobs
// carry free-form strings on the wire; rows that fail to parse are
// dropped with a warning instead of failing the whole poll.

use std::collections::HashSet;

use tracing::warn;

use netlab_api::models::{
    AnnotationDocument, GraphLink, GraphNode, JobEntry, LayoutDocument, NodeLayout,
    NodeStateEntry, TopologyGraph, VendorCategory, VendorModel,
};

use crate::error::CoreError;
use crate::model::{
    Annotation, DeviceModel, Job, JobAction, Link, Node, NodeState, Position, Topology,
    container_name_for,
};

/// Layout document schema version written by this crate.
pub const LAYOUT_VERSION: u32 = 1;

/// Model assumed for graph nodes that carry no device reference.
pub const DEFAULT_MODEL: &str = "linux";

// ── Catalog ──────────────────────────────────────────────────────────

impl From<&VendorModel> for DeviceModel {
    fn from(m: &VendorModel) -> Self {
        Self {
            id: m.id.clone(),
            label: m.label.clone(),
            kind: m.kind.clone(),
            vendor: m.vendor.clone(),
            port_naming: m.port_naming.clone(),
            port_start_index: m.port_start_index,
            max_ports: m.max_ports,
        }
    }
}

/// Flatten vendor categories into one model list. A model without its
/// own vendor inherits the category name.
pub fn flatten_catalog(categories: &[VendorCategory]) -> Vec<DeviceModel> {
    categories
        .iter()
        .flat_map(|category| {
            category.models.iter().map(move |m| {
                let mut model = DeviceModel::from(m);
                if model.vendor.is_none() {
                    model.vendor = Some(category.name.clone());
                }
                model
            })
        })
        .collect()
}

// ── Node states and jobs ─────────────────────────────────────────────

impl TryFrom<NodeStateEntry> for NodeState {
    type Error = CoreError;

    fn try_from(e: NodeStateEntry) -> Result<Self, Self::Error> {
        let desired = e
            .desired_state
            .parse()
            .map_err(|_| CoreError::InvalidValue {
                field: "desired_state",
                value: e.desired_state.clone(),
            })?;
        let actual = e
            .actual_state
            .parse()
            .map_err(|_| CoreError::InvalidValue {
                field: "actual_state",
                value: e.actual_state.clone(),
            })?;
        Ok(Self {
            node_id: e.node_id,
            node_name: e.node_name,
            desired,
            actual,
            is_ready: e.is_ready,
            error_message: e.error_message,
            updated_at: e.updated_at.or(e.created_at),
        })
    }
}

impl TryFrom<JobEntry> for Job {
    type Error = CoreError;

    fn try_from(e: JobEntry) -> Result<Self, Self::Error> {
        let status = e.status.parse().map_err(|_| CoreError::InvalidValue {
            field: "job status",
            value: e.status.clone(),
        })?;
        Ok(Self {
            action: JobAction::parse(&e.action),
            id: e.id,
            status,
            error_message: e.error_message,
            created_at: e.created_at,
        })
    }
}

/// Convert every row that parses; log and skip the rest.
pub(crate) fn parse_rows<W, D>(rows: Vec<W>) -> Vec<D>
where
    D: TryFrom<W, Error = CoreError>,
{
    rows.into_iter()
        .filter_map(|row| match D::try_from(row) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(error = %e, "skipping unparseable backend row");
                None
            }
        })
        .collect()
}

// ── Topology ─────────────────────────────────────────────────────────

/// Assemble a topology from the exported graph and the saved layout.
///
/// Nodes without a layout entry sit at the origin. Nodes without a
/// container name get one derived from their display name.
pub fn topology_from_parts(graph: TopologyGraph, layout: Option<LayoutDocument>) -> Topology {
    let layout = layout.unwrap_or_default();
    let mut taken: HashSet<String> = graph
        .nodes
        .iter()
        .filter_map(|n| n.container_name.clone())
        .collect();

    let nodes = graph
        .nodes
        .into_iter()
        .map(|n| {
            let container_name = n
                .container_name
                .unwrap_or_else(|| claim_container_name(&mut taken, &n.name));
            let position = layout
                .nodes
                .get(&n.id)
                .map(|l| Position::new(l.x, l.y))
                .unwrap_or_default();
            let mut node = Node::with_container_name(
                n.id,
                n.name,
                container_name,
                n.device.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
                position,
            );
            node.image = n.image;
            node.version = n.version;
            node
        })
        .collect();

    let links = graph
        .links
        .into_iter()
        .map(|l| Link {
            id: l.id,
            source: l.source,
            target: l.target,
            source_interface: l.source_interface,
            target_interface: l.target_interface,
        })
        .collect();

    let annotations = layout.annotations.into_iter().map(annotation_from_doc).collect();

    Topology {
        nodes,
        links,
        annotations,
    }
}

fn claim_container_name(taken: &mut HashSet<String>, display_name: &str) -> String {
    let base = container_name_for(display_name);
    let mut candidate = base.clone();
    let mut suffix = 2u32;
    while taken.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn annotation_from_doc(a: AnnotationDocument) -> Annotation {
    Annotation {
        id: a.id,
        kind: a.kind,
        position: Position::new(a.x, a.y),
        width: a.width,
        height: a.height,
        text: a.text,
        color: a.color,
    }
}

/// Graph payload for the topology channel.
pub fn to_graph(topology: &Topology) -> TopologyGraph {
    TopologyGraph {
        nodes: topology
            .nodes
            .iter()
            .map(|n| GraphNode {
                id: n.id.clone(),
                name: n.name.clone(),
                container_name: Some(n.container_name().to_owned()),
                device: Some(n.model.clone()),
                image: n.image.clone(),
                version: n.version.clone(),
            })
            .collect(),
        links: topology
            .links
            .iter()
            .map(|l| GraphLink {
                id: l.id.clone(),
                source: l.source.clone(),
                target: l.target.clone(),
                source_interface: l.source_interface.clone(),
                target_interface: l.target_interface.clone(),
            })
            .collect(),
    }
}

/// Layout payload for the layout channel.
pub fn to_layout(topology: &Topology) -> LayoutDocument {
    LayoutDocument {
        version: LAYOUT_VERSION,
        nodes: topology
            .nodes
            .iter()
            .map(|n| {
                (
                    n.id.clone(),
                    NodeLayout {
                        x: n.position.x,
                        y: n.position.y,
                        label: Some(n.name.clone()),
                    },
                )
            })
            .collect(),
        annotations: topology
            .annotations
            .iter()
            .map(|a| AnnotationDocument {
                id: a.id.clone(),
                kind: a.kind.clone(),
                x: a.position.x,
                y: a.position.y,
                width: a.width,
                height: a.height,
                text: a.text.clone(),
                color: a.color.clone(),
            })
            .collect(),
    }
}
