// ── Command API ──
//
// All writes flow through a unified `Command` enum. The controller's
// command processor handles them one at a time, in submission order.

mod dispatcher;

pub use dispatcher::{CommandDispatcher, InFlight};

use crate::error::CoreError;
use crate::model::PendingCommand;
use crate::threshold::Threshold;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against the greenhouse.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Drive an actuator. `value` is wire text, parsed per channel kind.
    SetActuator { channel: String, value: String },

    /// Write a threshold to the backend, then apply it locally. Both
    /// bounds `None` clears it.
    SetThreshold {
        channel: String,
        lower: Option<f64>,
        upper: Option<f64>,
    },

    /// Poll every known channel and merge the results.
    RefreshAll,
}

/// Result of a command execution.
#[derive(Debug)]
pub enum CommandResult {
    /// Terminal state of an actuator command.
    Actuator(PendingCommand),
    /// Threshold now in effect (`None` if cleared).
    Threshold(Option<Threshold>),
    /// Number of channels that reported a value.
    Refreshed(usize),
}
