// ── Reconciled channel store ──
//
// Mutex-serialized channel state with push-based snapshot publication.

mod channel_store;
mod snapshot;

pub use channel_store::{ApplyOutcome, ChannelStore};
pub use snapshot::Snapshot;
