// ── Pending command lifecycle ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use uuid::Uuid;

use super::channel::{ChannelId, ChannelValue};

/// Lifecycle state of an actuator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CommandStatus {
    InFlight,
    Acknowledged,
    Failed,
    TimedOut,
    /// Replaced by a newer command for the same channel before it resolved.
    Superseded,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

/// A command issued to an actuator and the value it asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCommand {
    pub id: Uuid,
    pub channel: ChannelId,
    pub value: ChannelValue,
    pub issued_at: DateTime<Utc>,
    pub status: CommandStatus,
}

impl PendingCommand {
    pub(crate) fn new(channel: ChannelId, value: ChannelValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            value,
            issued_at: Utc::now(),
            status: CommandStatus::InFlight,
        }
    }
}

/// Terminal outcome of a command, broadcast to observers.
///
/// Exactly one is published per command that was not superseded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResolution {
    pub id: Uuid,
    pub channel: ChannelId,
    pub value: ChannelValue,
    pub status: CommandStatus,
    pub resolved_at: DateTime<Utc>,
    /// Failure detail for [`CommandStatus::Failed`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResolution {
    pub(crate) fn of(command: &PendingCommand, status: CommandStatus, error: Option<String>) -> Self {
        Self {
            id: command.id,
            channel: command.channel.clone(),
            value: command.value,
            status,
            resolved_at: Utc::now(),
            error,
        }
    }
}
