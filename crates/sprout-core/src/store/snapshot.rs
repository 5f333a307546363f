use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{ChannelState, ChannelValue};

/// Immutable, point-in-time view of every known channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Channel name → state, sorted by name.
    pub channels: BTreeMap<String, ChannelState>,
    /// Set while the push stream is down. Values are last-known-good.
    pub stale: bool,
    /// Bumped on every store mutation.
    pub version: u64,
}

impl Snapshot {
    pub fn get(&self, channel: &str) -> Option<&ChannelState> {
        self.channels.get(channel)
    }

    pub fn value(&self, channel: &str) -> Option<ChannelValue> {
        self.channels.get(channel).map(|state| state.value)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
