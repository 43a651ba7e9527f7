// ── Interface naming and allocation ──

pub mod allocator;
pub mod registry;

pub use allocator::{DEFAULT_AVAILABLE_COUNT, PortAllocator};
pub use registry::{InterfacePattern, PatternRegistry, management_interface_for};
