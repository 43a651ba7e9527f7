// ── Reactive snapshot streams ──
//
// Subscription handles over `watch` channels of `Arc` snapshots.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Topology;
use crate::reconcile::StatusMap;

/// Node status map subscription.
pub type StatusStream = SnapshotStream<StatusMap>;

/// Topology subscription.
pub type TopologyStream = SnapshotStream<Topology>;

/// A subscription to a published snapshot.
///
/// Provides point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct SnapshotStream<T: Send + Sync + 'static> {
    current: Arc<T>,
    receiver: watch::Receiver<Arc<T>>,
}

impl<T: Send + Sync + 'static> SnapshotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<T> {
        &self.current
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    pub fn into_stream(self) -> SnapshotWatchStream<T> {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each new snapshot, starting with the current
/// one.
pub struct SnapshotWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Arc<T>>,
}

impl<T: Send + Sync + 'static> Stream for SnapshotWatchStream<T> {
    type Item = Arc<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn changed_tracks_latest() {
        let (tx, rx) = watch::channel(Arc::new(1u32));
        let mut stream = SnapshotStream::new(rx);
        assert_eq!(**stream.current(), 1);

        tx.send(Arc::new(2)).unwrap();
        assert_eq!(*stream.latest(), 2);
        assert_eq!(**stream.current(), 1);

        assert_eq!(*stream.changed().await.unwrap(), 2);
        assert_eq!(**stream.current(), 2);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }
}
