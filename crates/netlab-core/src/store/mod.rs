// ── Lab state storage ──

mod lab_store;

pub use lab_store::LabStore;
