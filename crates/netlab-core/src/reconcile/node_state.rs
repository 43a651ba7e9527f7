// ── Node state reconciler ──
//
// Merges three sources into the displayed status map: polled node-state
// rows, active backend jobs, and local overrides set by power commands.
// The map is published through a `watch` channel and only replaced when
// its contents change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use strum::Display;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::model::{DesiredState, Job, JobAction, NodeState, RuntimeStatus, Topology};

/// Node id -> displayed status. Nodes without a badge are absent.
pub type StatusMap = HashMap<String, RuntimeStatus>;

/// Provenance of a locally set status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StatusTag {
    /// Server truth, or a local command the backend accepted.
    Confirmed,
    /// Set before the backend answered.
    Optimistic,
    /// The backend rejected the command.
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct LocalOverride {
    status: RuntimeStatus,
    tag: StatusTag,
    set_at: Instant,
    generation: u64,
}

pub struct NodeStateReconciler {
    published: watch::Sender<Arc<StatusMap>>,
    /// Last poll result with the job overlay applied.
    server: Mutex<Arc<StatusMap>>,
    /// Jobs from the last successful job poll.
    jobs: Mutex<Arc<[Job]>>,
    overrides: DashMap<String, LocalOverride>,
    generations: DashMap<String, u64>,
    /// Container names the backend has ever reported as deployed.
    deployed: DashSet<String>,
    override_ttl: Duration,
}

impl NodeStateReconciler {
    /// `override_ttl` is how long a disagreeing local status outlives
    /// server truth; normally one poll interval.
    pub fn new(override_ttl: Duration) -> Self {
        let (published, _) = watch::channel(Arc::new(StatusMap::new()));
        Self {
            published,
            server: Mutex::new(Arc::new(StatusMap::new())),
            jobs: Mutex::new(Arc::from(Vec::new())),
            overrides: DashMap::new(),
            generations: DashMap::new(),
            deployed: DashSet::new(),
            override_ttl,
        }
    }

    // ── Power commands ───────────────────────────────────────────────

    /// Record a new desired state and show its optimistic status at once.
    /// Returns the command generation for this node.
    pub fn begin_transition(&self, node_id: &str, desired: DesiredState) -> u64 {
        let generation = {
            let mut current = self.generations.entry(node_id.to_owned()).or_insert(0);
            *current += 1;
            *current
        };
        self.overrides.insert(
            node_id.to_owned(),
            LocalOverride {
                status: desired.optimistic_status(),
                tag: StatusTag::Optimistic,
                set_at: Instant::now(),
                generation,
            },
        );
        debug!(node_id, %desired, generation, "optimistic transition");
        self.publish();
        generation
    }

    /// The backend accepted command `generation`. Stale generations are
    /// ignored.
    pub fn mark_confirmed(&self, node_id: &str, generation: u64) -> bool {
        if !self.is_current(node_id, generation) {
            return false;
        }
        let updated = match self.overrides.get_mut(node_id) {
            Some(mut entry) if entry.generation == generation => {
                entry.tag = StatusTag::Confirmed;
                true
            }
            _ => false,
        };
        if updated {
            self.publish();
        }
        updated
    }

    /// The backend rejected command `generation`; show the node as errored.
    /// Only the latest generation may do this.
    pub fn mark_failed(&self, node_id: &str, generation: u64) -> bool {
        if !self.is_current(node_id, generation) {
            debug!(node_id, generation, "ignoring failure of superseded command");
            return false;
        }
        self.overrides.insert(
            node_id.to_owned(),
            LocalOverride {
                status: RuntimeStatus::Error,
                tag: StatusTag::Failed,
                set_at: Instant::now(),
                generation,
            },
        );
        self.publish();
        true
    }

    fn is_current(&self, node_id: &str, generation: u64) -> bool {
        self.generations
            .get(node_id)
            .is_some_and(|current| *current == generation)
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Fold one poll into the status map. `jobs` is `None` when the job
    /// list could not be fetched; the previous list is reused.
    pub fn apply_poll(&self, states: &[NodeState], jobs: Option<&[Job]>, topology: &Topology) {
        for state in states.iter().filter(|s| s.is_deployed()) {
            self.deployed.insert(state.node_name.clone());
        }

        let jobs = match jobs {
            Some(fresh) => {
                let fresh: Arc<[Job]> = Arc::from(fresh);
                *lock(&self.jobs) = Arc::clone(&fresh);
                fresh
            }
            None => Arc::clone(&lock(&self.jobs)),
        };

        let mut server = StatusMap::new();
        for state in states {
            if let Some(status) = state.runtime_status() {
                server.insert(resolve_node_id(topology, state), status);
            }
        }
        self.overlay_jobs(&mut server, &jobs, topology);

        let now = Instant::now();
        self.overrides.retain(|node_id, local| {
            let agrees = server.get(node_id) == Some(&local.status);
            let expired = now.saturating_duration_since(local.set_at) >= self.override_ttl;
            !(agrees || expired)
        });

        *lock(&self.server) = Arc::new(server);
        self.publish();
    }

    /// Active jobs override polled status. Node-scoped jobs win over
    /// lab-wide ones, which only touch nodes that were deployed before.
    fn overlay_jobs(&self, server: &mut StatusMap, jobs: &[Job], topology: &Topology) {
        let mut global = None;
        let mut scoped = StatusMap::new();

        for job in jobs.iter().filter(|j| j.status.is_active()) {
            match &job.action {
                JobAction::Global(action) => {
                    if let Some(status) = job_status(action) {
                        global = Some(status);
                    }
                }
                JobAction::Node { verb, node } => {
                    let Some(status) = job_status(verb) else {
                        continue;
                    };
                    let target = topology
                        .node_by_container_name(node)
                        .or_else(|| topology.nodes.iter().find(|n| n.name == *node));
                    if let Some(target) = target {
                        scoped.insert(target.id.clone(), status);
                    }
                }
            }
        }

        if let Some(status) = global {
            for node in &topology.nodes {
                if self.deployed.contains(node.container_name()) {
                    server.insert(node.id.clone(), status);
                }
            }
        }
        server.extend(scoped);
    }

    // ── Publishing ───────────────────────────────────────────────────

    /// Merges under the watch write lock, so the last publish always sees
    /// every mutation that preceded it.
    fn publish(&self) {
        self.published.send_if_modified(|current| {
            let mut merged = StatusMap::clone(&lock(&self.server));
            for entry in &self.overrides {
                merged.insert(entry.key().clone(), entry.value().status);
            }
            if **current == merged {
                false
            } else {
                *current = Arc::new(merged);
                true
            }
        });
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<Arc<StatusMap>> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> Arc<StatusMap> {
        self.published.borrow().clone()
    }

    pub fn status(&self, node_id: &str) -> Option<RuntimeStatus> {
        self.published.borrow().get(node_id).copied()
    }

    /// Provenance of the node's displayed status, if it has one.
    pub fn tag(&self, node_id: &str) -> Option<StatusTag> {
        if let Some(local) = self.overrides.get(node_id) {
            return Some(local.tag);
        }
        lock(&self.server)
            .contains_key(node_id)
            .then_some(StatusTag::Confirmed)
    }

    pub fn is_deployed(&self, container_name: &str) -> bool {
        self.deployed.contains(container_name)
    }

    /// Forget everything; used when the active lab changes.
    pub fn clear(&self) {
        self.overrides.clear();
        self.generations.clear();
        self.deployed.clear();
        *lock(&self.server) = Arc::new(StatusMap::new());
        *lock(&self.jobs) = Arc::from(Vec::new());
        self.publish();
    }
}

/// Topology node a state row belongs to: by id, else by container name.
fn resolve_node_id(topology: &Topology, state: &NodeState) -> String {
    if topology.node(&state.node_id).is_some() {
        return state.node_id.clone();
    }
    topology
        .node_by_container_name(&state.node_name)
        .map_or_else(|| state.node_id.clone(), |n| n.id.clone())
}

fn job_status(verb: &str) -> Option<RuntimeStatus> {
    match verb {
        "start" | "restart" | "up" | "deploy" => Some(RuntimeStatus::Booting),
        "stop" | "down" | "destroy" => Some(RuntimeStatus::Stopped),
        _ => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
