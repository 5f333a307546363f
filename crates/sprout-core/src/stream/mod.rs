// ── Reactive snapshot stream ──
//
// Subscription type for consuming store changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::Snapshot;

/// A subscription to the channel store.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct SnapshotStream {
    current: Arc<Snapshot>,
    receiver: watch::Receiver<Arc<Snapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Snapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation time or by the last `changed()`.
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<Snapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Wait until a snapshot satisfies `predicate`, checking the latest
    /// one first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<Arc<Snapshot>>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let latest = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&latest);
        if predicate(&latest) {
            return Some(latest);
        }
        loop {
            let snap = self.changed().await?;
            if predicate(&snap) {
                return Some(snap);
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then one per store mutation
/// (intermediate versions may be skipped under load).
pub struct SnapshotWatchStream {
    inner: WatchStream<Arc<Snapshot>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use futures_util::StreamExt;

    use crate::model::{ChannelId, ChannelValue, UpdateSource};
    use crate::store::ChannelStore;

    #[tokio::test]
    async fn changed_follows_store_mutations() {
        let store = ChannelStore::new();
        let mut stream = store.subscribe();
        assert_eq!(stream.current().version, 0);

        store.apply_update(
            &ChannelId::sensor("light"),
            ChannelValue::Reading(640.0),
            UpdateSource::Stream,
            Utc::now(),
        );

        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(stream.current().version, 1);
    }

    #[tokio::test]
    async fn into_stream_yields_current_first() {
        let store = ChannelStore::new();
        store.mark_stale(true);

        let mut stream = store.subscribe().into_stream();
        let first = stream.next().await.unwrap();
        assert!(first.stale);
    }
}
