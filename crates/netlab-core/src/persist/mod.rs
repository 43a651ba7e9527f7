// ── Debounced persistence ──

mod scheduler;

pub(crate) use scheduler::spawn;
pub use scheduler::{Debounce, PersistChannel, PersistHandle};
