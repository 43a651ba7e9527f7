// ── Persistence scheduler ──
//
// A single actor task owns the dirty flags and debounce deadlines for the
// layout and topology channels. Edits arrive as `Touch` messages; when a
// channel's quiet period elapses the actor reads the *current* topology
// and starts one write. At most one write per channel is in flight.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::LabBackend;
use crate::convert::{to_graph, to_layout};
use crate::error::CoreError;
use crate::log::EventSink;
use crate::model::Topology;

/// Independent write channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PersistChannel {
    /// Node positions and annotations (`PUT /labs/{id}/layout`).
    Layout,
    /// Nodes and links (`POST /labs/{id}/import-graph`).
    Topology,
}

impl PersistChannel {
    const ALL: [Self; 2] = [Self::Layout, Self::Topology];

    fn index(self) -> usize {
        match self {
            Self::Layout => 0,
            Self::Topology => 1,
        }
    }
}

type FlushReply = oneshot::Sender<Result<(), CoreError>>;

enum PersistMessage {
    Touch(PersistChannel),
    Flush {
        channel: PersistChannel,
        reply: FlushReply,
    },
}

/// Cheap handle for marking channels dirty and forcing writes.
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistMessage>,
}

impl PersistHandle {
    /// Mark `channel` dirty and restart its debounce timer.
    pub fn touch(&self, channel: PersistChannel) {
        if self.tx.send(PersistMessage::Touch(channel)).is_err() {
            debug!(%channel, "scheduler stopped, edit not persisted");
        }
    }

    /// Write `channel` now if it is dirty and wait for the outcome.
    pub async fn flush(&self, channel: PersistChannel) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PersistMessage::Flush { channel, reply })
            .map_err(|_| CoreError::Internal("persistence scheduler stopped".into()))?;
        rx.await
            .map_err(|_| CoreError::Internal("persistence scheduler stopped".into()))?
    }
}

/// Debounce windows per channel.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    pub layout: Duration,
    pub topology: Duration,
}

impl Debounce {
    fn get(self, channel: PersistChannel) -> Duration {
        match channel {
            PersistChannel::Layout => self.layout,
            PersistChannel::Topology => self.topology,
        }
    }
}

// ── Actor ────────────────────────────────────────────────────────────

#[derive(Default)]
struct ChannelState {
    dirty: bool,
    /// Bumped on every edit; a write only clears `dirty` if no edit
    /// arrived after it started.
    edit_seq: u64,
    deadline: Option<Instant>,
    in_flight: Option<u64>,
    waiters: Vec<FlushReply>,
}

struct Settled {
    channel: PersistChannel,
    seq: u64,
    result: Result<(), CoreError>,
}

struct PersistScheduler<B: LabBackend> {
    backend: Arc<B>,
    lab_id: String,
    topology: watch::Receiver<Arc<Topology>>,
    debounce: Debounce,
    events: EventSink,
    channels: [ChannelState; 2],
    writes: JoinSet<Settled>,
}

/// Start the scheduler actor for `lab_id`.
pub(crate) fn spawn<B: LabBackend>(
    backend: Arc<B>,
    lab_id: String,
    topology: watch::Receiver<Arc<Topology>>,
    debounce: Debounce,
    events: EventSink,
    cancel: CancellationToken,
) -> (PersistHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = PersistScheduler {
        backend,
        lab_id,
        topology,
        debounce,
        events,
        channels: Default::default(),
        writes: JoinSet::new(),
    };
    let handle = tokio::spawn(scheduler.run(rx, cancel));
    (PersistHandle { tx }, handle)
}

impl<B: LabBackend> PersistScheduler<B> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PersistMessage>, cancel: CancellationToken) {
        debug!(lab_id = %self.lab_id, "persistence scheduler started");
        loop {
            let next = self.next_deadline();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(joined) = self.writes.join_next() => match joined {
                    Ok(settled) => self.on_settled(settled),
                    Err(e) => self.events.report("Background save", &CoreError::Internal(e.to_string())),
                },
                msg = rx.recv() => match msg {
                    Some(msg) => self.on_message(msg),
                    None => break,
                },
                () = sleep_until_opt(next) => self.fire_due(Instant::now()),
            }
        }

        // Writes already sent keep running to completion.
        self.writes.detach_all();
        info!(lab_id = %self.lab_id, "persistence scheduler stopped");
    }

    fn state(&mut self, channel: PersistChannel) -> &mut ChannelState {
        &mut self.channels[channel.index()]
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.channels
            .iter()
            .filter(|c| c.dirty && c.in_flight.is_none())
            .filter_map(|c| c.deadline)
            .min()
    }

    fn on_message(&mut self, msg: PersistMessage) {
        match msg {
            PersistMessage::Touch(channel) => {
                let window = self.debounce.get(channel);
                let state = self.state(channel);
                state.dirty = true;
                state.edit_seq += 1;
                state.deadline = Some(Instant::now() + window);
            }
            PersistMessage::Flush { channel, reply } => {
                let state = self.state(channel);
                if !state.dirty && state.in_flight.is_none() {
                    let _ = reply.send(Ok(()));
                    return;
                }
                state.waiters.push(reply);
                if state.in_flight.is_none() {
                    self.start_write(channel);
                }
            }
        }
    }

    fn fire_due(&mut self, now: Instant) {
        for channel in PersistChannel::ALL {
            let state = self.state(channel);
            let due = state.dirty
                && state.in_flight.is_none()
                && state.deadline.is_some_and(|d| d <= now);
            if due {
                self.start_write(channel);
            }
        }
    }

    fn start_write(&mut self, channel: PersistChannel) {
        let state = self.state(channel);
        let seq = state.edit_seq;
        state.deadline = None;
        state.in_flight = Some(seq);

        let snapshot = self.topology.borrow().clone();
        let backend = Arc::clone(&self.backend);
        let lab_id = self.lab_id.clone();
        debug!(%channel, seq, "writing");

        self.writes.spawn(async move {
            let result = match channel {
                PersistChannel::Layout => backend.put_layout(&lab_id, &to_layout(&snapshot)).await,
                PersistChannel::Topology => {
                    backend.import_graph(&lab_id, &to_graph(&snapshot)).await
                }
            };
            Settled {
                channel,
                seq,
                result: result.map_err(CoreError::from),
            }
        });
    }

    fn on_settled(&mut self, settled: Settled) {
        let Settled {
            channel,
            seq,
            result,
        } = settled;
        let state = self.state(channel);
        state.in_flight = None;

        match result {
            Ok(()) => {
                if state.edit_seq == seq {
                    state.dirty = false;
                }
                debug!(%channel, seq, dirty = state.dirty, "write settled");
                if state.dirty && !state.waiters.is_empty() {
                    // A flush is waiting and edits landed mid-write.
                    self.start_write(channel);
                } else {
                    for waiter in state.waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                }
            }
            Err(err) => {
                let waiters: Vec<FlushReply> = state.waiters.drain(..).collect();
                for waiter in waiters {
                    let _ = waiter.send(Err(CoreError::PersistFailed {
                        channel: channel.to_string(),
                        message: err.to_string(),
                    }));
                }
                self.events.report(&format!("Saving {channel}"), &err);
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
