// ── Central channel store ──
//
// All channel state and pending-command bookkeeping lives behind one
// mutex, so a reader can never observe half of a merge. Nothing inside the
// critical section awaits. Every mutation rebuilds the snapshot and
// publishes it through a `watch` channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::debug;
use uuid::Uuid;

use super::snapshot::Snapshot;
use crate::model::{
    ChannelId, ChannelState, ChannelUpdate, ChannelValue, Clock, CommandResolution,
    CommandStatus, PendingCommand, UpdateSource,
};
use crate::stream::SnapshotStream;

const RESOLUTION_CHANNEL_SIZE: usize = 256;

/// What [`ChannelStore::apply_update`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The stored state changed.
    Applied,
    /// Identical to what is already stored.
    Unchanged,
    /// Backend-stamped, but older than the last backend-stamped value.
    /// Dropped.
    Outdated,
}

/// Canonical, reconciled view of every channel.
pub struct ChannelStore {
    inner: Mutex<StoreInner>,
    snapshot: watch::Sender<Arc<Snapshot>>,
    resolutions: broadcast::Sender<CommandResolution>,
}

#[derive(Default)]
struct StoreInner {
    channels: BTreeMap<String, Slot>,
    pending: HashMap<String, PendingEntry>,
    stale: bool,
    version: u64,
}

struct Slot {
    current: ChannelState,
    /// Last value that came from the backend; the rollback target.
    authoritative: Option<ChannelState>,
    /// Newest backend-clock timestamp applied so far.
    backend_time: Option<DateTime<Utc>>,
    /// Command whose prediction `current` holds, while provisional.
    predicted_by: Option<Uuid>,
}

struct PendingEntry {
    command: PendingCommand,
    notify: oneshot::Sender<CommandStatus>,
}

impl ChannelStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        let (resolutions, _) = broadcast::channel(RESOLUTION_CHANNEL_SIZE);

        Self {
            inner: Mutex::new(StoreInner::default()),
            snapshot,
            resolutions,
        }
    }

    // ── Updates ──────────────────────────────────────────────────────

    /// Merge one update whose timestamp comes from the backend.
    ///
    /// Authoritative updates (stream, poll) replace whatever is stored,
    /// including a provisional prediction, and acknowledge the channel's
    /// pending command when the values match. Optimistic updates are
    /// stored as provisional.
    pub fn apply_update(
        &self,
        channel: &ChannelId,
        value: ChannelValue,
        source: UpdateSource,
        timestamp: DateTime<Utc>,
    ) -> ApplyOutcome {
        self.merge(channel, value, source, timestamp, Clock::Backend)
    }

    /// [`apply_update`](Self::apply_update) for a decoded update, honoring
    /// the clock its timestamp came from.
    pub fn apply(&self, update: ChannelUpdate) -> ApplyOutcome {
        self.merge(
            &update.channel,
            update.value,
            update.source,
            update.timestamp,
            update.clock,
        )
    }

    /// An authoritative update is dropped only when both it and the last
    /// backend-stamped value carry backend timestamps and it is older.
    /// Receive-time stamps are never compared against backend time.
    fn merge(
        &self,
        channel: &ChannelId,
        value: ChannelValue,
        source: UpdateSource,
        timestamp: DateTime<Utc>,
        clock: Clock,
    ) -> ApplyOutcome {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let name = channel.name();

        let incoming = ChannelState {
            id: channel.clone(),
            value,
            updated_at: timestamp,
            source,
            provisional: !source.is_authoritative(),
        };
        let backend_stamp =
            (source.is_authoritative() && clock == Clock::Backend).then_some(timestamp);

        if let Some(slot) = inner.channels.get(name) {
            if slot.current == incoming {
                return ApplyOutcome::Unchanged;
            }
            let older = backend_stamp
                .zip(slot.backend_time)
                .is_some_and(|(incoming, last)| incoming < last);
            if older {
                debug!(channel = name, %source, "dropping outdated update");
                return ApplyOutcome::Outdated;
            }
        }

        let authoritative = source.is_authoritative().then(|| incoming.clone());
        match inner.channels.get_mut(name) {
            Some(slot) => {
                slot.current = incoming;
                slot.predicted_by = None;
                if authoritative.is_some() {
                    slot.authoritative = authoritative;
                }
                if backend_stamp.is_some() {
                    slot.backend_time = backend_stamp;
                }
            }
            None => {
                inner.channels.insert(
                    name.to_owned(),
                    Slot {
                        current: incoming,
                        authoritative,
                        backend_time: backend_stamp,
                        predicted_by: None,
                    },
                );
            }
        }

        let resolution = if source.is_authoritative() {
            inner.acknowledge(name, value)
        } else {
            None
        };

        self.commit(inner);
        if let Some(resolution) = resolution {
            debug!(channel = name, command = %resolution.id, "command acknowledged");
            let _ = self.resolutions.send(resolution);
        }
        ApplyOutcome::Applied
    }

    /// Raise or clear the global staleness flag. Values are kept.
    pub fn mark_stale(&self, stale: bool) {
        let mut guard = self.lock();
        if guard.stale == stale {
            return;
        }
        guard.stale = stale;
        debug!(stale, "staleness changed");
        self.commit(&mut guard);
    }

    // ── Command bookkeeping ──────────────────────────────────────────

    /// Register a new command for `channel` and apply its prediction.
    ///
    /// Any command already pending for the channel is superseded: it is
    /// told so through its notifier and never produces a resolution.
    pub(crate) fn begin_command(
        &self,
        channel: &ChannelId,
        value: ChannelValue,
    ) -> (PendingCommand, oneshot::Receiver<CommandStatus>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let name = channel.name();

        if let Some(old) = inner.pending.remove(name) {
            debug!(channel = name, command = %old.command.id, "command superseded");
            let _ = old.notify.send(CommandStatus::Superseded);
        }

        let command = PendingCommand::new(channel.clone(), value);
        let (notify, rx) = oneshot::channel();
        inner.pending.insert(
            name.to_owned(),
            PendingEntry {
                command: command.clone(),
                notify,
            },
        );

        let predicted = ChannelState {
            id: channel.clone(),
            value,
            updated_at: command.issued_at,
            source: UpdateSource::OptimisticLocal,
            provisional: true,
        };
        match inner.channels.get_mut(name) {
            Some(slot) => {
                slot.current = predicted;
                slot.predicted_by = Some(command.id);
            }
            None => {
                inner.channels.insert(
                    name.to_owned(),
                    Slot {
                        current: predicted,
                        authoritative: None,
                        backend_time: None,
                        predicted_by: Some(command.id),
                    },
                );
            }
        }

        self.commit(inner);
        (command, rx)
    }

    /// The send failed: mark the command failed and roll back.
    ///
    /// Returns `false` if the command is no longer pending.
    pub(crate) fn fail_command(&self, channel: &str, id: Uuid, error: &str) -> bool {
        self.resolve_unconfirmed(channel, id, CommandStatus::Failed, Some(error.to_owned()))
    }

    /// No confirmation arrived in time: mark the command timed out and
    /// roll back.
    ///
    /// Returns `false` if the command is no longer pending.
    pub(crate) fn expire_command(&self, channel: &str, id: Uuid) -> bool {
        self.resolve_unconfirmed(channel, id, CommandStatus::TimedOut, None)
    }

    fn resolve_unconfirmed(
        &self,
        channel: &str,
        id: Uuid,
        status: CommandStatus,
        error: Option<String>,
    ) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.pending.get(channel).is_none_or(|entry| entry.command.id != id) {
            return false;
        }
        let Some(entry) = inner.pending.remove(channel) else {
            return false;
        };

        inner.rollback(channel, id);
        let _ = entry.notify.send(status);
        let resolution = CommandResolution::of(&entry.command, status, error);

        self.commit(inner);
        debug!(channel, command = %id, %status, "command resolved without confirmation");
        let _ = self.resolutions.send(resolution);
        true
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.snapshot.subscribe())
    }

    /// Subscribe to terminal command resolutions.
    pub fn resolutions(&self) -> broadcast::Receiver<CommandResolution> {
        self.resolutions.subscribe()
    }

    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    /// The command currently pending for `channel`, if any.
    pub fn pending(&self, channel: &str) -> Option<PendingCommand> {
        self.lock()
            .pending
            .get(channel)
            .map(|entry| entry.command.clone())
    }

    pub fn pending_commands(&self) -> Vec<PendingCommand> {
        self.lock()
            .pending
            .values()
            .map(|entry| entry.command.clone())
            .collect()
    }

    /// Last value received from the backend for `channel`.
    pub fn last_authoritative(&self, channel: &str) -> Option<ChannelState> {
        self.lock()
            .channels
            .get(channel)
            .and_then(|slot| slot.authoritative.clone())
    }

    /// Every channel observed so far.
    pub fn known_channels(&self) -> Vec<ChannelId> {
        self.lock()
            .channels
            .values()
            .map(|slot| slot.current.id.clone())
            .collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the version and publish a fresh snapshot. Called with the
    /// lock held so snapshots are published in mutation order.
    fn commit(&self, inner: &mut StoreInner) {
        inner.version += 1;
        let snapshot = Snapshot {
            channels: inner
                .channels
                .iter()
                .map(|(name, slot)| (name.clone(), slot.current.clone()))
                .collect(),
            stale: inner.stale,
            version: inner.version,
        };
        // `send_replace` updates unconditionally, even with zero receivers.
        self.snapshot.send_replace(Arc::new(snapshot));
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    /// Resolve the pending command for `channel` if `value` is what it
    /// asked for.
    fn acknowledge(&mut self, channel: &str, value: ChannelValue) -> Option<CommandResolution> {
        if self
            .pending
            .get(channel)
            .is_none_or(|entry| entry.command.value != value)
        {
            return None;
        }
        let entry = self.pending.remove(channel)?;
        let _ = entry.notify.send(CommandStatus::Acknowledged);
        Some(CommandResolution::of(
            &entry.command,
            CommandStatus::Acknowledged,
            None,
        ))
    }

    /// Undo command `id`'s prediction, if it is still what `channel` shows.
    fn rollback(&mut self, channel: &str, id: Uuid) {
        let Some(slot) = self.channels.get_mut(channel) else {
            return;
        };
        if slot.predicted_by != Some(id) {
            return;
        }
        match slot.authoritative.clone() {
            Some(last) => {
                slot.current = last;
                slot.predicted_by = None;
            }
            None => {
                self.channels.remove(channel);
            }
        }
    }
}
