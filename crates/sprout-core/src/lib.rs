//! State synchronization engine between `sprout-api` and consumers (CLI).
//!
//! This crate owns the channel model and the reconciliation logic that keeps
//! a single canonical view of every greenhouse sensor and actuator:
//!
//! - **[`Controller`]**: Central facade. [`connect()`](Controller::connect)
//!   opens the push stream, reconciles every channel over REST, then spawns
//!   the stream consumer, fallback poller, and command processor.
//!   [`Controller::oneshot()`](Controller::oneshot) is the REST-only mode for
//!   single CLI invocations.
//!
//! - **[`ChannelStore`]**: Mutex-serialized store that merges push, poll,
//!   and optimistic updates under one set of ordering rules, and publishes
//!   immutable [`Snapshot`]s through a `tokio::sync::watch` channel.
//!
//! - **[`CommandDispatcher`]**: Optimistic actuator commands: predict,
//!   send, then wait for the matching echo or roll back.
//!
//! - **[`ThresholdEvaluator`]**: Per-channel bounds and classification of
//!   snapshot values into normal / alert.
//!
//! - **[`Transport`]**: The seam between the engine and the network.
//!   [`RestTransport`] is the real implementation.

pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;
pub mod threshold;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandDispatcher, CommandResult, InFlight};
pub use config::{SyncConfig, TlsVerification};
pub use controller::{ConnectionState, Controller};
pub use error::{CoreError, ParseError};
pub use store::{ApplyOutcome, ChannelStore, Snapshot};
pub use stream::{SnapshotStream, SnapshotWatchStream};
pub use threshold::{
    Alert, BoundKind, Classification, Threshold, ThresholdError, ThresholdEvaluator,
};
pub use transport::{RestTransport, Transport};

pub use model::{
    ChannelCatalog, ChannelId, ChannelKind, ChannelState, ChannelUpdate, ChannelValue, Clock,
    CommandResolution, CommandStatus, PendingCommand, UpdateSource,
};

// Wire types consumers see through `Transport` and `Controller::history`.
pub use sprout_api::{FeedRecord, PushMessage, StreamEvent, ThresholdBounds, ThresholdTable};
