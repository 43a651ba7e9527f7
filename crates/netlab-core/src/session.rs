// ── Lab session ──
//
// Lifecycle of one backend connection and the lab currently open in it.
// Opening a lab loads its graph and layout, then spawns the persistence
// scheduler, the power command processor, the node-state/job poller and
// the system metrics poller. Closing or switching labs flushes the
// layout, cancels those tasks and joins them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use netlab_api::LabClient;
use netlab_api::models::SystemMetrics;

use crate::backend::LabBackend;
use crate::config::SessionConfig;
use crate::convert::{flatten_catalog, parse_rows, topology_from_parts};
use crate::error::CoreError;
use crate::interfaces::{PatternRegistry, PortAllocator};
use crate::log::{EventSink, LogEntry, SessionSignal};
use crate::model::{
    Annotation, DesiredState, DeviceModel, Job, Link, Node, NodeState, Position, RuntimeStatus,
    Topology,
};
use crate::persist::{self, Debounce, PersistChannel, PersistHandle};
use crate::reconcile::{JobLogProjector, NodeStateReconciler, StatusMap, StatusTag};
use crate::store::LabStore;
use crate::stream::{StatusStream, TopologyStream};

const COMMAND_CHANNEL_SIZE: usize = 64;

/// A queued power change for one node.
#[derive(Debug)]
struct PowerCommand {
    node_id: String,
    desired: DesiredState,
    generation: u64,
}

/// Per-lab runtime handles, replaced on every `open_lab`.
struct LabHandle {
    lab_id: String,
    cancel: CancellationToken,
    persist: PersistHandle,
    commands: mpsc::Sender<PowerCommand>,
}

// ── LabSession ───────────────────────────────────────────────────────

/// The main entry point for presentation layers.
///
/// Cheaply cloneable. Edits are synchronous and land in the local store
/// immediately; persistence, polling and power commands run on
/// background tasks and report through [`logs`](Self::logs) and
/// [`signals`](Self::signals).
pub struct LabSession<B: LabBackend = LabClient> {
    inner: Arc<SessionInner<B>>,
}

impl<B: LabBackend> Clone for LabSession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<B: LabBackend> {
    config: SessionConfig,
    backend: Arc<B>,
    registry: ArcSwap<PatternRegistry>,
    models: ArcSwap<Vec<DeviceModel>>,
    store: LabStore,
    reconciler: NodeStateReconciler,
    job_log: Mutex<JobLogProjector>,
    lab: ArcSwapOption<LabHandle>,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Serializes open/close.
    lifecycle: tokio::sync::Mutex<()>,
    /// Held from fetch to apply so polls land in request order.
    poll_lock: tokio::sync::Mutex<()>,
    events: EventSink,
    metrics: watch::Sender<Option<SystemMetrics>>,
}

impl LabSession<LabClient> {
    /// Build a session talking HTTP to `config.url`. No request is made
    /// until a catalog load or `open_lab`.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let client = LabClient::new(config.url.as_str(), &config.transport())?;
        Ok(Self::with_backend(config, client))
    }
}

impl<B: LabBackend> LabSession<B> {
    pub fn with_backend(config: SessionConfig, backend: B) -> Self {
        let (metrics, _) = watch::channel(None);
        let reconciler = NodeStateReconciler::new(config.poll_interval);
        Self {
            inner: Arc::new(SessionInner {
                config,
                backend: Arc::new(backend),
                registry: ArcSwap::from_pointee(PatternRegistry::new()),
                models: ArcSwap::from_pointee(Vec::new()),
                store: LabStore::new(),
                reconciler,
                job_log: Mutex::new(JobLogProjector::new()),
                lab: ArcSwapOption::empty(),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                poll_lock: tokio::sync::Mutex::new(()),
                events: EventSink::new(),
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    /// Id of the open lab.
    pub fn lab_id(&self) -> Option<String> {
        self.inner.lab.load_full().map(|h| h.lab_id.clone())
    }

    fn active_lab(&self) -> Result<Arc<LabHandle>, CoreError> {
        self.inner.lab.load_full().ok_or(CoreError::NoActiveLab)
    }

    fn is_current_lab(&self, lab_id: &str) -> bool {
        self.inner
            .lab
            .load_full()
            .is_some_and(|h| h.lab_id == lab_id)
    }

    /// Convert a foreground API failure, raising `Unauthorized` on 401/403.
    fn api_error(&self, err: netlab_api::Error) -> CoreError {
        let err = CoreError::from(err);
        if err.is_unauthorized() {
            self.inner.events.signal(SessionSignal::Unauthorized);
        }
        err
    }

    // ── Catalog ──────────────────────────────────────────────────────

    /// Fetch the device catalog and swap in a registry built from it.
    /// Returns the number of models loaded.
    pub async fn load_catalog(&self) -> Result<usize, CoreError> {
        let categories = self
            .inner
            .backend
            .list_vendors()
            .await
            .map_err(|e| self.api_error(e))?;
        let models = flatten_catalog(&categories);
        let registry = PatternRegistry::from_models(&models);
        let count = models.len();
        info!(models = count, learned = registry.len(), "device catalog loaded");
        self.inner.registry.store(Arc::new(registry));
        self.inner.models.store(Arc::new(models));
        Ok(count)
    }

    pub fn registry(&self) -> Arc<PatternRegistry> {
        self.inner.registry.load_full()
    }

    pub fn device_models(&self) -> Arc<Vec<DeviceModel>> {
        self.inner.models.load_full()
    }

    // ── Lab lifecycle ────────────────────────────────────────────────

    /// Open `lab_id`, closing the current lab first.
    pub async fn open_lab(&self, lab_id: &str) -> Result<(), CoreError> {
        let _guard = self.inner.lifecycle.lock().await;
        self.shutdown_lab().await;

        let backend = &self.inner.backend;
        let (graph, layout) = tokio::join!(backend.export_graph(lab_id), backend.get_layout(lab_id));
        let graph = graph.map_err(|e| match e {
            e if e.is_not_found() => CoreError::LabNotFound {
                lab_id: lab_id.to_owned(),
            },
            e => self.api_error(e),
        })?;
        let layout = layout.map_err(|e| self.api_error(e))?;

        if self.inner.models.load().is_empty() {
            if let Err(e) = self.load_catalog().await {
                warn!(error = %e, "device catalog unavailable, using built-in interface patterns");
            }
        }

        self.inner.store.replace(topology_from_parts(graph, layout));
        self.inner.reconciler.clear();
        lock(&self.inner.job_log).reset();

        let cancel = CancellationToken::new();
        let config = &self.inner.config;
        let (persist, persist_task) = persist::spawn(
            Arc::clone(&self.inner.backend),
            lab_id.to_owned(),
            self.inner.store.receiver(),
            Debounce {
                layout: config.layout_debounce,
                topology: config.topology_debounce,
            },
            self.inner.events.clone(),
            cancel.clone(),
        );
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        self.inner.lab.store(Some(Arc::new(LabHandle {
            lab_id: lab_id.to_owned(),
            cancel: cancel.clone(),
            persist,
            commands,
        })));

        // Initial statuses before anything is shown.
        self.poll_once(lab_id).await;

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(persist_task);
        handles.push(tokio::spawn(command_processor_task(
            self.clone(),
            lab_id.to_owned(),
            command_rx,
            cancel.clone(),
        )));
        if !config.poll_interval.is_zero() {
            handles.push(tokio::spawn(poll_task(
                self.clone(),
                lab_id.to_owned(),
                config.poll_interval,
                cancel.clone(),
            )));
        }
        if !config.metrics_interval.is_zero() {
            handles.push(tokio::spawn(metrics_task(
                self.clone(),
                config.metrics_interval,
                cancel,
            )));
        }
        drop(handles);

        self.inner
            .events
            .signal(SessionSignal::LabOpened(lab_id.to_owned()));
        info!(lab_id, nodes = self.inner.store.snapshot().nodes.len(), "lab opened");
        Ok(())
    }

    /// Close the open lab. Pending layout edits are written first; pending
    /// topology edits are not guaranteed to be.
    pub async fn close(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        self.shutdown_lab().await;
    }

    async fn shutdown_lab(&self) {
        let Some(handle) = self.inner.lab.swap(None) else {
            return;
        };

        if let Err(e) = handle.persist.flush(PersistChannel::Layout).await {
            warn!(lab_id = %handle.lab_id, error = %e, "layout not saved on close");
        }
        handle.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for task in handles.drain(..) {
            let _ = task.await;
        }
        drop(handles);

        self.inner.store.replace(Topology::default());
        self.inner.reconciler.clear();
        lock(&self.inner.job_log).reset();

        self.inner
            .events
            .signal(SessionSignal::LabClosed(handle.lab_id.clone()));
        info!(lab_id = %handle.lab_id, "lab closed");
    }

    /// Wait until `channel` has no unsaved edits.
    pub async fn flush(&self, channel: PersistChannel) -> Result<(), CoreError> {
        self.active_lab()?.persist.flush(channel).await
    }

    // ── Global actions ───────────────────────────────────────────────

    /// Save the topology, then ask the backend to deploy the lab.
    pub async fn deploy(&self) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        handle.persist.flush(PersistChannel::Topology).await?;
        self.inner
            .backend
            .lab_up(&handle.lab_id)
            .await
            .map_err(|e| self.api_error(e))?;
        info!(lab_id = %handle.lab_id, "deploy requested");
        self.schedule_reload(&handle.lab_id, &handle.cancel);
        Ok(())
    }

    /// Ask the backend to tear the lab down.
    pub async fn destroy(&self) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        self.inner
            .backend
            .lab_down(&handle.lab_id)
            .await
            .map_err(|e| self.api_error(e))?;
        info!(lab_id = %handle.lab_id, "destroy requested");
        self.schedule_reload(&handle.lab_id, &handle.cancel);
        Ok(())
    }

    /// Ask the backend to re-read node states, then poll immediately.
    pub async fn refresh_states(&self) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        self.inner
            .backend
            .refresh_nodes(&handle.lab_id)
            .await
            .map_err(|e| self.api_error(e))?;
        self.poll_once(&handle.lab_id).await;
        Ok(())
    }

    // ── Power control ────────────────────────────────────────────────

    /// Queue a desired-state change. The displayed status flips
    /// optimistically before this returns; the backend write and sync
    /// happen on the command processor in submission order.
    pub async fn set_desired_state(
        &self,
        node_id: &str,
        desired: DesiredState,
    ) -> Result<u64, CoreError> {
        let handle = self.active_lab()?;
        if self.inner.store.snapshot().node(node_id).is_none() {
            return Err(CoreError::NodeNotFound {
                node_id: node_id.to_owned(),
            });
        }
        let generation = self.inner.reconciler.begin_transition(node_id, desired);
        handle
            .commands
            .send(PowerCommand {
                node_id: node_id.to_owned(),
                desired,
                generation,
            })
            .await
            .map_err(|_| CoreError::Internal("command processor stopped".into()))?;
        Ok(generation)
    }

    /// Start a stopped node or stop a running one. Returns the new
    /// desired state.
    pub async fn toggle_power(&self, node_id: &str) -> Result<DesiredState, CoreError> {
        let desired = if self.status(node_id).is_some_and(RuntimeStatus::is_powered) {
            DesiredState::Stopped
        } else {
            DesiredState::Running
        };
        self.set_desired_state(node_id, desired).await?;
        Ok(desired)
    }

    async fn run_power_command(&self, lab_id: &str, cmd: PowerCommand, cancel: &CancellationToken) {
        let backend = &self.inner.backend;
        let state = cmd.desired.to_string();
        let result = match backend.set_desired_state(lab_id, &cmd.node_id, &state).await {
            Ok(()) => backend.sync_node(lab_id, &cmd.node_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.inner
                    .reconciler
                    .mark_confirmed(&cmd.node_id, cmd.generation);
                debug!(node_id = %cmd.node_id, %state, "power command accepted");
            }
            Err(e) => {
                let err = CoreError::from(e);
                if self.inner.reconciler.mark_failed(&cmd.node_id, cmd.generation) {
                    let name = self
                        .inner
                        .store
                        .snapshot()
                        .node(&cmd.node_id)
                        .map_or_else(|| cmd.node_id.clone(), |n| n.name.clone());
                    self.inner
                        .events
                        .report(&format!("Setting {name} {state}"), &err);
                } else if err.is_unauthorized() {
                    self.inner.events.signal(SessionSignal::Unauthorized);
                }
            }
        }

        self.schedule_reload(lab_id, cancel);
    }

    /// Poll once more after the configured reload delay.
    fn schedule_reload(&self, lab_id: &str, cancel: &CancellationToken) {
        let session = self.clone();
        let lab_id = lab_id.to_owned();
        let cancel = cancel.clone();
        let delay = self.inner.config.reload_delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => session.poll_once(&lab_id).await,
            }
        });
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Fetch node states and jobs, fold them into the status map and the
    /// job log. Failures keep the previous data.
    async fn poll_once(&self, lab_id: &str) {
        let _polling = self.inner.poll_lock.lock().await;
        let backend = &self.inner.backend;
        let (states, jobs) = tokio::join!(backend.node_states(lab_id), backend.list_jobs(lab_id));
        if !self.is_current_lab(lab_id) {
            return;
        }

        let jobs: Option<Vec<Job>> = match jobs {
            Ok(rows) => Some(parse_rows(rows)),
            Err(e) => {
                self.poll_failed("job poll", e);
                None
            }
        };
        if let Some(ref jobs) = jobs {
            let entries = lock(&self.inner.job_log).observe(jobs);
            for entry in entries {
                self.inner.events.log(entry);
            }
        }

        match states {
            Ok(rows) => {
                let states: Vec<NodeState> = parse_rows(rows);
                let topology = self.inner.store.snapshot();
                self.inner
                    .reconciler
                    .apply_poll(&states, jobs.as_deref(), &topology);
            }
            Err(e) => self.poll_failed("node state poll", e),
        }
    }

    fn poll_failed(&self, what: &str, err: netlab_api::Error) {
        let err = CoreError::from(err);
        debug!(error = %err, "{what} failed, keeping previous data");
        if err.is_unauthorized() {
            self.inner.events.signal(SessionSignal::Unauthorized);
        }
    }

    async fn refresh_metrics(&self) {
        match self.inner.backend.system_metrics().await {
            Ok(metrics) => {
                self.inner.metrics.send_replace(Some(metrics));
            }
            Err(e) => self.poll_failed("metrics poll", e),
        }
    }

    // ── Topology edits ───────────────────────────────────────────────

    /// Add a node with a fresh id and a container name derived from
    /// `name`.
    pub fn add_node(&self, name: &str, model: &str, position: Position) -> Result<Node, CoreError> {
        let handle = self.active_lab()?;
        let id = Uuid::new_v4().to_string();
        let node = self
            .inner
            .store
            .try_modify(|topo| Ok(topo.add_node(id, name, model, position).clone()))?;
        handle.persist.touch(PersistChannel::Topology);
        handle.persist.touch(PersistChannel::Layout);
        Ok(node)
    }

    /// Change the display name. The container name is kept.
    pub fn rename_node(&self, node_id: &str, name: &str) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        self.inner.store.try_modify(|topo| {
            node_mut(topo, node_id)?.name = name.to_owned();
            Ok(())
        })?;
        handle.persist.touch(PersistChannel::Topology);
        handle.persist.touch(PersistChannel::Layout);
        Ok(())
    }

    pub fn move_node(&self, node_id: &str, position: Position) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        self.inner.store.try_modify(|topo| {
            node_mut(topo, node_id)?.position = position;
            Ok(())
        })?;
        handle.persist.touch(PersistChannel::Layout);
        Ok(())
    }

    /// Switch the device model. Interfaces already assigned keep their
    /// names; only later allocations follow the new pattern.
    pub fn set_node_model(&self, node_id: &str, model: &str) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        self.inner.store.try_modify(|topo| {
            node_mut(topo, node_id)?.model = model.to_owned();
            Ok(())
        })?;
        handle.persist.touch(PersistChannel::Topology);
        Ok(())
    }

    /// Remove a node and its links. Returns the removed links.
    pub fn remove_node(&self, node_id: &str) -> Result<Vec<Link>, CoreError> {
        let handle = self.active_lab()?;
        let links = self.inner.store.try_modify(|topo| {
            topo.remove_node(node_id)
                .map(|(_, links)| links)
                .ok_or_else(|| CoreError::NodeNotFound {
                    node_id: node_id.to_owned(),
                })
        })?;
        handle.persist.touch(PersistChannel::Topology);
        handle.persist.touch(PersistChannel::Layout);
        Ok(links)
    }

    /// Link two nodes, allocating the next free interface on each end in
    /// the same store update.
    pub fn connect(&self, source: &str, target: &str) -> Result<Link, CoreError> {
        let handle = self.active_lab()?;
        let registry = self.inner.registry.load_full();
        let id = Uuid::new_v4().to_string();
        let link = self.inner.store.try_modify(|topo| {
            for node_id in [source, target] {
                if topo.node(node_id).is_none() {
                    return Err(CoreError::NodeNotFound {
                        node_id: node_id.to_owned(),
                    });
                }
            }
            let (source_interface, target_interface) = {
                let alloc = PortAllocator::new(&registry, topo);
                if source == target {
                    alloc.next_pair(source)?
                } else {
                    (alloc.next_interface(source)?, alloc.next_interface(target)?)
                }
            };
            let link = Link {
                id,
                source: source.to_owned(),
                target: target.to_owned(),
                source_interface: Some(source_interface),
                target_interface: Some(target_interface),
            };
            topo.links.push(link.clone());
            Ok(link)
        })?;
        handle.persist.touch(PersistChannel::Topology);
        Ok(link)
    }

    /// Explicitly set a link's interface names. A name already held by
    /// another link on the same node is rejected.
    pub fn set_link_interfaces(
        &self,
        link_id: &str,
        source_interface: Option<String>,
        target_interface: Option<String>,
    ) -> Result<(), CoreError> {
        let handle = self.active_lab()?;
        self.inner.store.try_modify(|topo| {
            let link = topo
                .link(link_id)
                .ok_or_else(|| CoreError::LinkNotFound {
                    link_id: link_id.to_owned(),
                })?
                .clone();
            if link.source == link.target
                && source_interface.is_some()
                && source_interface == target_interface
            {
                return Err(CoreError::InterfaceInUse {
                    node_id: link.source,
                    interface: source_interface.unwrap_or_default(),
                });
            }
            for (node_id, name) in [
                (&link.source, &source_interface),
                (&link.target, &target_interface),
            ] {
                let Some(name) = name else { continue };
                let taken = topo
                    .links
                    .iter()
                    .filter(|other| other.id != link_id)
                    .any(|other| {
                        other
                            .interfaces_on(node_id)
                            .any(|used| used == name.as_str())
                    });
                if taken {
                    return Err(CoreError::InterfaceInUse {
                        node_id: node_id.clone(),
                        interface: name.clone(),
                    });
                }
            }
            if let Some(stored) = topo.link_mut(link_id) {
                stored.source_interface = source_interface;
                stored.target_interface = target_interface;
            }
            Ok(())
        })?;
        handle.persist.touch(PersistChannel::Topology);
        Ok(())
    }

    pub fn remove_link(&self, link_id: &str) -> Result<Link, CoreError> {
        let handle = self.active_lab()?;
        let link = self.inner.store.try_modify(|topo| {
            topo.remove_link(link_id)
                .ok_or_else(|| CoreError::LinkNotFound {
                    link_id: link_id.to_owned(),
                })
        })?;
        handle.persist.touch(PersistChannel::Topology);
        Ok(link)
    }

    // ── Annotation edits ─────────────────────────────────────────────

    pub fn add_annotation(&self, kind: &str, position: Position) -> Result<Annotation, CoreError> {
        self.edit_layout(|topo| {
            let annotation = Annotation::new(Uuid::new_v4().to_string(), kind, position);
            topo.annotations.push(annotation.clone());
            Ok(annotation)
        })
    }

    /// Replace an annotation's size, text and color.
    pub fn update_annotation(&self, annotation: Annotation) -> Result<(), CoreError> {
        self.edit_layout(|topo| {
            *annotation_mut(topo, &annotation.id)? = annotation.clone();
            Ok(())
        })
    }

    pub fn move_annotation(&self, annotation_id: &str, position: Position) -> Result<(), CoreError> {
        self.edit_layout(|topo| {
            annotation_mut(topo, annotation_id)?.position = position;
            Ok(())
        })
    }

    pub fn remove_annotation(&self, annotation_id: &str) -> Result<Annotation, CoreError> {
        self.edit_layout(|topo| {
            topo.remove_annotation(annotation_id)
                .ok_or_else(|| CoreError::AnnotationNotFound {
                    annotation_id: annotation_id.to_owned(),
                })
        })
    }

    fn edit_layout<R>(
        &self,
        edit: impl FnOnce(&mut Topology) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let handle = self.active_lab()?;
        let value = self.inner.store.try_modify(edit)?;
        handle.persist.touch(PersistChannel::Layout);
        Ok(value)
    }

    // ── Interface queries ────────────────────────────────────────────

    pub fn next_interface(&self, node_id: &str) -> Result<String, CoreError> {
        let registry = self.inner.registry.load();
        let topology = self.inner.store.snapshot();
        PortAllocator::new(&registry, &topology).next_interface(node_id)
    }

    pub fn available_interfaces(&self, node_id: &str, count: usize) -> Vec<String> {
        let registry = self.inner.registry.load();
        let topology = self.inner.store.snapshot();
        PortAllocator::new(&registry, &topology).available_interfaces(node_id, count)
    }

    pub fn used_interfaces(&self, node_id: &str) -> std::collections::BTreeSet<String> {
        let registry = self.inner.registry.load();
        let topology = self.inner.store.snapshot();
        PortAllocator::new(&registry, &topology).used_interfaces(node_id)
    }

    pub fn is_interface_used(&self, node_id: &str, name: &str) -> bool {
        let registry = self.inner.registry.load();
        let topology = self.inner.store.snapshot();
        PortAllocator::new(&registry, &topology).is_interface_used(node_id, name)
    }

    // ── Snapshots and subscriptions ──────────────────────────────────

    pub fn topology(&self) -> Arc<Topology> {
        self.inner.store.snapshot()
    }

    pub fn subscribe_topology(&self) -> TopologyStream {
        self.inner.store.subscribe()
    }

    pub fn statuses(&self) -> Arc<StatusMap> {
        self.inner.reconciler.snapshot()
    }

    pub fn subscribe_statuses(&self) -> StatusStream {
        StatusStream::new(self.inner.reconciler.subscribe())
    }

    pub fn status(&self, node_id: &str) -> Option<RuntimeStatus> {
        self.inner.reconciler.status(node_id)
    }

    pub fn status_tag(&self, node_id: &str) -> Option<StatusTag> {
        self.inner.reconciler.tag(node_id)
    }

    pub fn logs(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.events.subscribe_logs()
    }

    pub fn signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.inner.events.subscribe_signals()
    }

    pub fn metrics(&self) -> watch::Receiver<Option<SystemMetrics>> {
        self.inner.metrics.subscribe()
    }
}

fn node_mut<'t>(topo: &'t mut Topology, node_id: &str) -> Result<&'t mut Node, CoreError> {
    topo.node_mut(node_id).ok_or_else(|| CoreError::NodeNotFound {
        node_id: node_id.to_owned(),
    })
}

fn annotation_mut<'t>(
    topo: &'t mut Topology,
    annotation_id: &str,
) -> Result<&'t mut Annotation, CoreError> {
    topo.annotation_mut(annotation_id)
        .ok_or_else(|| CoreError::AnnotationNotFound {
            annotation_id: annotation_id.to_owned(),
        })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Background tasks ─────────────────────────────────────────────────

/// Applies power commands one at a time so writes for a node reach the
/// backend in submission order.
async fn command_processor_task<B: LabBackend>(
    session: LabSession<B>,
    lab_id: String,
    mut rx: mpsc::Receiver<PowerCommand>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                session.run_power_command(&lab_id, cmd, &cancel).await;
            }
        }
    }
}

async fn poll_task<B: LabBackend>(
    session: LabSession<B>,
    lab_id: String,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // open_lab already polled

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => session.poll_once(&lab_id).await,
        }
    }
}

async fn metrics_task<B: LabBackend>(
    session: LabSession<B>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => session.refresh_metrics().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use netlab_api::models::{GraphLink, GraphNode, TopologyGraph, VendorCategory, VendorModel};
    use pretty_assertions::assert_eq;

    use crate::log::LogLevel;
    use crate::testing::{FakeBackend, job_row, state_row};

    fn config() -> SessionConfig {
        SessionConfig::new(url::Url::parse("http://backend.invalid/api").unwrap())
    }

    fn graph_node(id: &str, name: &str, device: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            name: name.into(),
            container_name: Some(name.into()),
            device: Some(device.into()),
            image: None,
            version: None,
        }
    }

    fn graph_link(id: &str, source: (&str, &str), target: (&str, &str)) -> GraphLink {
        GraphLink {
            id: id.into(),
            source: source.0.into(),
            target: target.0.into(),
            source_interface: Some(source.1.into()),
            target_interface: Some(target.1.into()),
        }
    }

    /// Three linux nodes; n1 already uses eth1 and eth2.
    fn seeded_backend() -> FakeBackend {
        FakeBackend::with(|s| {
            s.graph = TopologyGraph {
                nodes: vec![
                    graph_node("n1", "r1", "linux"),
                    graph_node("n2", "r2", "linux"),
                    graph_node("n3", "r3", "ceos"),
                ],
                links: vec![
                    graph_link("l1", ("n1", "eth1"), ("n2", "eth1")),
                    graph_link("l2", ("n1", "eth2"), ("n3", "Ethernet1")),
                ],
            };
            s.vendors = vec![VendorCategory {
                name: "Arista".into(),
                models: vec![VendorModel {
                    id: "ceos".into(),
                    label: Some("cEOS".into()),
                    kind: Some("ceos".into()),
                    vendor: None,
                    port_naming: Some("Ethernet".into()),
                    port_start_index: Some(1),
                    max_ports: Some(64),
                }],
            }];
            s.states = vec![
                state_row("n1", "r1", "running", "running"),
                state_row("n2", "r2", "stopped", "stopped"),
                state_row("n3", "r3", "stopped", "undeployed"),
            ];
        })
    }

    async fn open(backend: FakeBackend) -> LabSession<FakeBackend> {
        let session = LabSession::with_backend(config(), backend);
        session.open_lab("lab1").await.unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn open_lab_loads_everything() {
        let session = open(seeded_backend()).await;

        assert_eq!(session.lab_id().as_deref(), Some("lab1"));
        assert_eq!(session.topology().nodes.len(), 3);
        assert_eq!(session.device_models().len(), 1);
        assert_eq!(session.status("n1"), Some(RuntimeStatus::Running));
        assert_eq!(session.status("n3"), None);
        assert_eq!(session.next_interface("n1").unwrap(), "eth3");
        assert_eq!(session.next_interface("n3").unwrap(), "Ethernet2");
        assert_eq!(session.next_interface("n2").unwrap(), "eth2");

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_allocates_and_persists_topology() {
        let session = open(seeded_backend()).await;

        let link = session.connect("n1", "n3").unwrap();
        assert_eq!(link.source_interface.as_deref(), Some("eth3"));
        assert_eq!(link.target_interface.as_deref(), Some("Ethernet2"));
        assert!(session.is_interface_used("n1", "eth3"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(session.backend().state().graph_writes.is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        let writes = session.backend().state().graph_writes.clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].links.len(), 3);

        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn self_loop_gets_two_interfaces() {
        let session = open(seeded_backend()).await;
        let link = session.connect("n2", "n2").unwrap();
        assert_eq!(link.source_interface.as_deref(), Some("eth2"));
        assert_eq!(link.target_interface.as_deref(), Some("eth3"));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connect_unknown_node_changes_nothing() {
        let session = open(seeded_backend()).await;
        let err = session.connect("n1", "ghost").unwrap_err();
        assert!(matches!(err, CoreError::NodeNotFound { .. }));
        assert_eq!(session.topology().links.len(), 2);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn link_interface_edits_reject_duplicates() {
        let session = open(seeded_backend()).await;

        let err = session
            .set_link_interfaces("l2", Some("eth1".into()), Some("Ethernet1".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InterfaceInUse { .. }), "{err:?}");

        session
            .set_link_interfaces("l2", Some("eth9".into()), Some("Ethernet1".into()))
            .unwrap();
        assert_eq!(
            session.topology().link("l2").unwrap().source_interface.as_deref(),
            Some("eth9")
        );
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rename_and_remodel_keep_existing_names() {
        let session = open(seeded_backend()).await;

        session.rename_node("n1", "Core Router").unwrap();
        session.set_node_model("n1", "ceos").unwrap();

        let topo = session.topology();
        let n1 = topo.node("n1").unwrap();
        assert_eq!(n1.name, "Core Router");
        assert_eq!(n1.container_name(), "r1");
        assert_eq!(topo.link("l1").unwrap().source_interface.as_deref(), Some("eth1"));
        assert_eq!(session.next_interface("n1").unwrap(), "Ethernet1");
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn remove_node_cascades() {
        let session = open(seeded_backend()).await;
        let removed = session.remove_node("n1").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(session.topology().links.is_empty());
        assert!(matches!(
            session.remove_node("n1"),
            Err(CoreError::NodeNotFound { .. })
        ));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn moves_coalesce_into_one_layout_write() {
        let session = open(seeded_backend()).await;

        for i in 1..=5 {
            session
                .move_node("n2", Position::new(f64::from(i), 0.0))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        {
            let state = session.backend().state();
            assert_eq!(state.layout_writes.len(), 1);
            assert_eq!(state.layout_writes[0].nodes["n2"].x, 5.0);
        }
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_pending_layout() {
        let session = open(seeded_backend()).await;
        let annotation = session.add_annotation("text", Position::new(3.0, 4.0)).unwrap();
        session.close().await;

        let state = session.backend().state();
        assert_eq!(state.layout_writes.len(), 1);
        assert_eq!(state.layout_writes[0].annotations[0].id, annotation.id);
        drop(state);
        assert!(matches!(
            session.move_node("n1", Position::default()),
            Err(CoreError::NoActiveLab)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn running_then_stopped_ends_stopped() {
        let session = open(seeded_backend()).await;

        session.set_desired_state("n2", DesiredState::Running).await.unwrap();
        session.set_desired_state("n2", DesiredState::Stopped).await.unwrap();
        assert_eq!(session.status("n2"), Some(RuntimeStatus::Stopped));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            session.backend().state().desired_writes,
            vec![
                ("n2".to_owned(), "running".to_owned()),
                ("n2".to_owned(), "stopped".to_owned()),
            ]
        );
        assert_eq!(session.status("n2"), Some(RuntimeStatus::Stopped));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.status("n2"), Some(RuntimeStatus::Stopped));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sync_marks_node_error() {
        let backend = seeded_backend();
        backend.state().failing.insert("sync_node");
        let session = open(backend).await;
        let mut logs = session.logs();

        let desired = session.toggle_power("n2").await.unwrap();
        assert_eq!(desired, DesiredState::Running);
        assert_eq!(session.status("n2"), Some(RuntimeStatus::Booting));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status("n2"), Some(RuntimeStatus::Error));
        assert_eq!(session.status_tag("n2"), Some(StatusTag::Failed));
        let entry = logs.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Error);
        assert!(entry.message.contains("r2"), "{}", entry.message);
        // Not retried.
        assert_eq!(session.backend().state().syncs.len(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn job_transitions_are_logged_once() {
        let backend = seeded_backend();
        backend.state().jobs = vec![
            job_row("j1", "up", "running"),
            job_row("j2", "node:start:r1", "completed"),
            job_row("j3", "node:stop:r2", "queued"),
        ];
        let session = open(backend).await;
        let mut logs = session.logs();

        session.backend().state().jobs[0].status = "completed".into();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let entry = logs.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.message, "up: completed");
        assert!(logs.try_recv().is_err());
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_polls_apply_in_order() {
        let backend = seeded_backend();
        backend.state().jobs = vec![job_row("j1", "up", "running")];
        let session = open(backend).await;
        let mut logs = session.logs();

        // A manual refresh fetches "running" and is slow to answer; the
        // next tick must not overtake it with the newer "completed".
        tokio::time::sleep(Duration::from_secs(3)).await;
        session.backend().state().job_delays.push_back(Duration::from_secs(3));
        let refresh = tokio::spawn({
            let session = session.clone();
            async move { session.refresh_states().await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        session.backend().state().jobs[0].status = "completed".into();
        tokio::time::sleep(Duration::from_secs(7)).await;
        refresh.await.unwrap().unwrap();

        let mut messages = Vec::new();
        while let Ok(entry) = logs.try_recv() {
            messages.push(entry.message);
        }
        assert_eq!(messages, vec!["up: completed".to_owned()]);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn identical_polls_do_not_republish() {
        let session = open(seeded_backend()).await;
        let before = session.statuses();
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(session.backend().state().state_polls >= 3);
        assert!(Arc::ptr_eq(&before, &session.statuses()));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_poll_raises_signal_and_keeps_data() {
        let session = open(seeded_backend()).await;
        let mut signals = session.signals();

        session.backend().state().unauthorized = true;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(signals.recv().await.unwrap(), SessionSignal::Unauthorized);
        assert_eq!(session.status("n1"), Some(RuntimeStatus::Running));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_saves_topology_first() {
        let session = open(seeded_backend()).await;
        session.add_node("Edge", "linux", Position::default()).unwrap();
        session.deploy().await.unwrap();

        let state = session.backend().state();
        assert_eq!(state.graph_writes.len(), 1);
        assert_eq!(state.graph_writes[0].nodes.len(), 4);
        assert_eq!(state.ups, 1);
        drop(state);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_lab_is_reported() {
        let backend = FakeBackend::default();
        backend.state().failing.insert("export_graph");
        let session = LabSession::with_backend(config(), backend);
        assert!(session.open_lab("nope").await.is_err());
        assert_eq!(session.lab_id(), None);
        assert!(matches!(
            session.add_node("x", "linux", Position::default()),
            Err(CoreError::NoActiveLab)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_are_published() {
        let backend = seeded_backend();
        backend.state().metrics.containers_running = 2;
        let session = open(backend).await;
        let mut metrics = session.metrics();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let latest = metrics.borrow_and_update().clone();
        assert_eq!(latest.map(|m| m.containers_running), Some(2));
        session.close().await;
    }
}
