// In-memory backend for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use netlab_api::Error;
use netlab_api::models::{
    JobEntry, LayoutDocument, NodeStateEntry, SystemMetrics, TopologyGraph, VendorCategory,
};

use crate::backend::LabBackend;

#[derive(Default)]
pub(crate) struct FakeState {
    pub graph: TopologyGraph,
    pub layout: Option<LayoutDocument>,
    pub states: Vec<NodeStateEntry>,
    pub jobs: Vec<JobEntry>,
    pub vendors: Vec<VendorCategory>,
    pub metrics: SystemMetrics,

    // Recorded calls, in order. Writes are recorded when they start.
    pub graph_writes: Vec<TopologyGraph>,
    pub layout_writes: Vec<LayoutDocument>,
    pub desired_writes: Vec<(String, String)>,
    pub syncs: Vec<String>,
    pub state_polls: usize,
    pub ups: usize,
    pub downs: usize,
    pub refreshes: usize,

    /// Operation names that answer HTTP 500.
    pub failing: HashSet<&'static str>,
    /// Every call answers HTTP 401.
    pub unauthorized: bool,
    /// Latency of graph and layout writes.
    pub write_delay: Duration,
    /// Latency of successive job polls; empty answers at once.
    pub job_delays: VecDeque<Duration>,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    inner: Mutex<FakeState>,
}

impl FakeBackend {
    pub(crate) fn with(setup: impl FnOnce(&mut FakeState)) -> Self {
        let backend = Self::default();
        setup(&mut backend.state());
        backend
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check(&self, op: &'static str) -> Result<(), Error> {
        let state = self.state();
        if state.unauthorized {
            return Err(Error::Unauthorized { status: 401 });
        }
        if state.failing.contains(op) {
            return Err(Error::Api {
                status: 500,
                message: format!("{op} unavailable"),
            });
        }
        Ok(())
    }
}

impl LabBackend for FakeBackend {
    async fn export_graph(&self, _lab_id: &str) -> Result<TopologyGraph, Error> {
        self.check("export_graph")?;
        Ok(self.state().graph.clone())
    }

    async fn import_graph(&self, _lab_id: &str, graph: &TopologyGraph) -> Result<(), Error> {
        let delay = {
            let mut state = self.state();
            state.graph_writes.push(graph.clone());
            state.write_delay
        };
        tokio::time::sleep(delay).await;
        self.check("import_graph")
    }

    async fn get_layout(&self, _lab_id: &str) -> Result<Option<LayoutDocument>, Error> {
        self.check("get_layout")?;
        Ok(self.state().layout.clone())
    }

    async fn put_layout(&self, _lab_id: &str, layout: &LayoutDocument) -> Result<(), Error> {
        let delay = {
            let mut state = self.state();
            state.layout_writes.push(layout.clone());
            state.write_delay
        };
        tokio::time::sleep(delay).await;
        self.check("put_layout")
    }

    async fn node_states(&self, _lab_id: &str) -> Result<Vec<NodeStateEntry>, Error> {
        self.state().state_polls += 1;
        self.check("node_states")?;
        Ok(self.state().states.clone())
    }

    async fn set_desired_state(&self, _lab_id: &str, node_id: &str, state: &str) -> Result<(), Error> {
        self.state()
            .desired_writes
            .push((node_id.to_owned(), state.to_owned()));
        self.check("set_desired_state")
    }

    async fn sync_node(&self, _lab_id: &str, node_id: &str) -> Result<(), Error> {
        self.state().syncs.push(node_id.to_owned());
        self.check("sync_node")
    }

    async fn refresh_nodes(&self, _lab_id: &str) -> Result<(), Error> {
        self.state().refreshes += 1;
        self.check("refresh_nodes")
    }

    async fn list_jobs(&self, _lab_id: &str) -> Result<Vec<JobEntry>, Error> {
        let (jobs, delay) = {
            let mut state = self.state();
            (state.jobs.clone(), state.job_delays.pop_front().unwrap_or_default())
        };
        tokio::time::sleep(delay).await;
        self.check("list_jobs")?;
        Ok(jobs)
    }

    async fn list_vendors(&self) -> Result<Vec<VendorCategory>, Error> {
        self.check("list_vendors")?;
        Ok(self.state().vendors.clone())
    }

    async fn lab_up(&self, _lab_id: &str) -> Result<(), Error> {
        self.state().ups += 1;
        self.check("lab_up")
    }

    async fn lab_down(&self, _lab_id: &str) -> Result<(), Error> {
        self.state().downs += 1;
        self.check("lab_down")
    }

    async fn system_metrics(&self) -> Result<SystemMetrics, Error> {
        self.check("system_metrics")?;
        Ok(self.state().metrics.clone())
    }
}

/// A backend node-state row.
pub(crate) fn state_row(node_id: &str, node_name: &str, desired: &str, actual: &str) -> NodeStateEntry {
    NodeStateEntry {
        node_id: node_id.into(),
        node_name: node_name.into(),
        desired_state: desired.into(),
        actual_state: actual.into(),
        is_ready: actual == "running",
        error_message: None,
        created_at: None,
        updated_at: None,
    }
}

/// A backend job row.
pub(crate) fn job_row(id: &str, action: &str, status: &str) -> JobEntry {
    JobEntry {
        id: id.into(),
        action: action.into(),
        status: status.into(),
        error_message: None,
        created_at: None,
        completed_at: None,
    }
}
