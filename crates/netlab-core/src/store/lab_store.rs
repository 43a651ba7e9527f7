// ── Lab store ──
//
// Holds the live topology of the open lab in a `watch` channel. Edits
// run against a private copy and are published in one step, so readers
// (including the persistence scheduler) only ever see whole edits.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::CoreError;
use crate::model::Topology;
use crate::stream::TopologyStream;

pub struct LabStore {
    topology: watch::Sender<Arc<Topology>>,
}

impl Default for LabStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LabStore {
    pub fn new() -> Self {
        let (topology, _) = watch::channel(Arc::new(Topology::default()));
        Self { topology }
    }

    /// Current topology.
    pub fn snapshot(&self) -> Arc<Topology> {
        self.topology.borrow().clone()
    }

    pub fn subscribe(&self) -> TopologyStream {
        TopologyStream::new(self.topology.subscribe())
    }

    pub(crate) fn receiver(&self) -> watch::Receiver<Arc<Topology>> {
        self.topology.subscribe()
    }

    /// Swap in a freshly loaded topology.
    pub fn replace(&self, topology: Topology) {
        self.topology.send_replace(Arc::new(topology));
    }

    /// Run `edit` on a copy of the topology and publish the copy if the
    /// edit succeeds. A failed edit leaves the store untouched.
    pub fn try_modify<R>(
        &self,
        edit: impl FnOnce(&mut Topology) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let mut outcome = None;
        self.topology.send_if_modified(|current| {
            let mut draft = Topology::clone(current);
            match edit(&mut draft) {
                Ok(value) => {
                    *current = Arc::new(draft);
                    outcome = Some(Ok(value));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    false
                }
            }
        });
        outcome.unwrap_or_else(|| Err(CoreError::Internal("topology edit did not run".into())))
    }
}
