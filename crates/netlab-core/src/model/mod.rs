// ── Domain model ──
//
// Canonical lab types. Wire shapes live in `netlab_api::models`;
// `crate::convert` bridges the two.

pub mod device;
pub mod job;
pub mod status;
pub mod topology;

pub use device::DeviceModel;
pub use job::{Job, JobAction, JobStatus};
pub use status::{ActualState, DesiredState, NodeState, RuntimeStatus};
pub use topology::{Annotation, Link, Node, Position, Topology, container_name_for};
