//! Client-side reconciliation core between `netlab-api` and lab editors.
//!
//! This crate owns the domain model and the logic that keeps a locally
//! edited lab topology in step with the lab backend:
//!
//! - **[`LabSession`]** - Central facade. [`open_lab()`](LabSession::open_lab)
//!   loads the graph and layout, then spawns background tasks for
//!   debounced persistence, power commands, node-state/job polling and
//!   system metrics. Edits are synchronous and land in the [`LabStore`]
//!   immediately.
//!
//! - **[`PatternRegistry`] / [`PortAllocator`]** - Per-device interface
//!   naming patterns and next-free-interface allocation.
//!
//! - **[`NodeStateReconciler`]** - Merges polled node state, active jobs
//!   and optimistic local transitions into one status map, published only
//!   when it changes.
//!
//! - **[`JobLogProjector`]** - Turns successive job polls into log
//!   entries for status transitions.
//!
//! - **[`SnapshotStream<T>`]** - Subscription handle over topology and
//!   status snapshots with `current()` / `latest()` / `changed()`.
//!
//! The [`LabBackend`] trait is the seam to the backend; [`LabClient`]
//! implements it over HTTP.

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod interfaces;
pub mod log;
pub mod model;
pub mod persist;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::LabBackend;
pub use config::{SessionConfig, TlsVerification};
pub use error::CoreError;
pub use interfaces::{InterfacePattern, PatternRegistry, PortAllocator};
pub use log::{LogEntry, LogLevel, SessionSignal};
pub use persist::{PersistChannel, PersistHandle};
pub use reconcile::{JobLogProjector, NodeStateReconciler, StatusMap, StatusTag};
pub use session::LabSession;
pub use store::LabStore;
pub use stream::{SnapshotStream, StatusStream, TopologyStream};

pub use netlab_api::LabClient;
pub use netlab_api::models::SystemMetrics;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ActualState, Annotation, DesiredState, DeviceModel, Job, JobAction, JobStatus, Link, Node,
    NodeState, Position, RuntimeStatus, Topology,
};
