// ── Reconciliation ──
//
// Node status convergence and the job activity log, both driven by the
// session's poll task.

pub mod job_log;
pub mod node_state;

pub use job_log::JobLogProjector;
pub use node_state::{NodeStateReconciler, StatusMap, StatusTag};
